//! DNS-01 challenge providers and the propagation probe
//!
//! Providers are enumerated at build time; each declares the configuration
//! fields the operator must supply. Credentials travel as a per-call
//! configuration object, never through the process environment, so two
//! issuances can never clobber each other's provider settings.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::{sleep, timeout};
use tracing::debug;
use utoipa::ToSchema;

use crate::AcmeError;

/// Overall deadline for the challenge TXT record to become visible.
const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(120);
const PROPAGATION_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Recursive resolvers consulted for the challenge check, with the
/// DNS-JSON endpoint each operates.
const RESOLVERS: [(&str, &str); 2] = [
    ("8.8.8.8:53", "https://dns.google/resolve"),
    ("1.1.1.1:53", "https://cloudflare-dns.com/dns-query"),
];

/// Operator-supplied provider selection plus its credential fields
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider name from the catalog, e.g. `cloudflare`
    pub provider: String,
    /// Credential fields keyed by the catalog's required field names
    #[serde(default)]
    pub config: HashMap<String, String>,
}

/// One catalog entry: a provider and the fields it needs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub provider: String,
    pub required_fields: Vec<String>,
}

/// Supported providers and their required configuration fields.
pub fn provider_catalog() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            provider: "cloudflare".into(),
            required_fields: vec!["CF_DNS_API_TOKEN".into()],
        },
        ProviderInfo {
            provider: "digitalocean".into(),
            required_fields: vec!["DO_AUTH_TOKEN".into()],
        },
    ]
}

/// Publishes and removes the `_acme-challenge` TXT record
#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn present(&self, record_name: &str, value: &str) -> Result<(), AcmeError>;
    async fn cleanup(&self, record_name: &str, value: &str) -> Result<(), AcmeError>;
}

/// Instantiate the provider named in the configuration.
pub fn build_provider(
    config: &ProviderConfig,
    http: &reqwest::Client,
) -> Result<Box<dyn DnsProvider>, AcmeError> {
    let field = |name: &str| -> Result<String, AcmeError> {
        config
            .config
            .get(name)
            .filter(|v| !v.is_empty())
            .cloned()
            .ok_or_else(|| AcmeError::MissingProviderConfig(name.to_string()))
    };

    match config.provider.as_str() {
        "cloudflare" => Ok(Box::new(CloudflareProvider {
            token: field("CF_DNS_API_TOKEN")?,
            http: http.clone(),
        })),
        "digitalocean" => Ok(Box::new(DigitalOceanProvider {
            token: field("DO_AUTH_TOKEN")?,
            http: http.clone(),
        })),
        other => Err(AcmeError::UnsupportedProvider(other.to_string())),
    }
}

/// Poll both recursive resolvers until each returns the expected TXT value.
pub async fn wait_for_propagation(
    http: &reqwest::Client,
    record_name: &str,
    value: &str,
) -> Result<(), AcmeError> {
    let poll = async {
        loop {
            let mut all_seen = true;
            for (resolver, endpoint) in RESOLVERS {
                if !resolver_sees(http, endpoint, record_name, value).await {
                    debug!(resolver, record = %record_name, "TXT record not visible yet");
                    all_seen = false;
                }
            }
            if all_seen {
                return;
            }
            sleep(PROPAGATION_POLL_INTERVAL).await;
        }
    };

    timeout(PROPAGATION_TIMEOUT, poll)
        .await
        .map_err(|_| AcmeError::PropagationTimeout(record_name.to_string()))
}

async fn resolver_sees(
    http: &reqwest::Client,
    endpoint: &str,
    record_name: &str,
    value: &str,
) -> bool {
    let response = http
        .get(endpoint)
        .query(&[("name", record_name), ("type", "TXT")])
        .header("accept", "application/dns-json")
        .send()
        .await;

    let Ok(response) = response else { return false };
    let Ok(body) = response.json::<Value>().await else {
        return false;
    };

    body["Answer"]
        .as_array()
        .map(|answers| {
            answers.iter().any(|a| {
                a["data"]
                    .as_str()
                    .map(|d| d.trim_matches('"') == value)
                    .unwrap_or(false)
            })
        })
        .unwrap_or(false)
}

/// Walk a record name's parent domains until the provider recognizes one.
fn zone_candidates(record_name: &str) -> Vec<String> {
    let labels: Vec<&str> = record_name.split('.').collect();
    let mut candidates = Vec::new();
    for start in 0..labels.len().saturating_sub(1) {
        candidates.push(labels[start..].join("."));
    }
    candidates
}

struct CloudflareProvider {
    token: String,
    http: reqwest::Client,
}

impl CloudflareProvider {
    const API: &'static str = "https://api.cloudflare.com/client/v4";

    async fn find_zone_id(&self, record_name: &str) -> Result<String, AcmeError> {
        for candidate in zone_candidates(record_name) {
            let body: Value = self
                .http
                .get(format!("{}/zones", Self::API))
                .query(&[("name", candidate.as_str())])
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(provider_err)?
                .json()
                .await
                .map_err(provider_err)?;

            if let Some(id) = body["result"][0]["id"].as_str() {
                return Ok(id.to_string());
            }
        }
        Err(AcmeError::ProviderRequest(format!(
            "no cloudflare zone found for {record_name}"
        )))
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn present(&self, record_name: &str, value: &str) -> Result<(), AcmeError> {
        let zone_id = self.find_zone_id(record_name).await?;

        let response: Value = self
            .http
            .post(format!("{}/zones/{zone_id}/dns_records", Self::API))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "type": "TXT",
                "name": record_name,
                "content": value,
                "ttl": 60,
            }))
            .send()
            .await
            .map_err(provider_err)?
            .json()
            .await
            .map_err(provider_err)?;

        if response["success"].as_bool() != Some(true) {
            return Err(AcmeError::ProviderRequest(format!(
                "cloudflare record create failed: {}",
                response["errors"]
            )));
        }
        Ok(())
    }

    async fn cleanup(&self, record_name: &str, value: &str) -> Result<(), AcmeError> {
        let zone_id = self.find_zone_id(record_name).await?;

        let listing: Value = self
            .http
            .get(format!("{}/zones/{zone_id}/dns_records", Self::API))
            .query(&[("type", "TXT"), ("name", record_name)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(provider_err)?
            .json()
            .await
            .map_err(provider_err)?;

        if let Some(records) = listing["result"].as_array() {
            for record in records {
                let matches = record["content"].as_str().map(|c| c == value).unwrap_or(false);
                if !matches {
                    continue;
                }
                if let Some(id) = record["id"].as_str() {
                    self.http
                        .delete(format!("{}/zones/{zone_id}/dns_records/{id}", Self::API))
                        .bearer_auth(&self.token)
                        .send()
                        .await
                        .map_err(provider_err)?;
                }
            }
        }
        Ok(())
    }
}

struct DigitalOceanProvider {
    token: String,
    http: reqwest::Client,
}

impl DigitalOceanProvider {
    const API: &'static str = "https://api.digitalocean.com/v2";

    async fn find_domain(&self, record_name: &str) -> Result<String, AcmeError> {
        for candidate in zone_candidates(record_name) {
            let response = self
                .http
                .get(format!("{}/domains/{candidate}", Self::API))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(provider_err)?;

            if response.status().is_success() {
                return Ok(candidate);
            }
        }
        Err(AcmeError::ProviderRequest(format!(
            "no digitalocean domain found for {record_name}"
        )))
    }
}

#[async_trait]
impl DnsProvider for DigitalOceanProvider {
    async fn present(&self, record_name: &str, value: &str) -> Result<(), AcmeError> {
        let domain = self.find_domain(record_name).await?;
        let name = record_name
            .strip_suffix(&format!(".{domain}"))
            .unwrap_or(record_name);

        let response = self
            .http
            .post(format!("{}/domains/{domain}/records", Self::API))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "type": "TXT",
                "name": name,
                "data": value,
                "ttl": 30,
            }))
            .send()
            .await
            .map_err(provider_err)?;

        if !response.status().is_success() {
            return Err(AcmeError::ProviderRequest(format!(
                "digitalocean record create failed: {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn cleanup(&self, record_name: &str, value: &str) -> Result<(), AcmeError> {
        let domain = self.find_domain(record_name).await?;

        let listing: Value = self
            .http
            .get(format!("{}/domains/{domain}/records", Self::API))
            .query(&[("type", "TXT"), ("name", record_name)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(provider_err)?
            .json()
            .await
            .map_err(provider_err)?;

        if let Some(records) = listing["domain_records"].as_array() {
            for record in records {
                let matches = record["data"].as_str().map(|d| d == value).unwrap_or(false);
                if !matches {
                    continue;
                }
                if let Some(id) = record["id"].as_i64() {
                    self.http
                        .delete(format!("{}/domains/{domain}/records/{id}", Self::API))
                        .bearer_auth(&self.token)
                        .send()
                        .await
                        .map_err(provider_err)?;
                }
            }
        }
        Ok(())
    }
}

fn provider_err(e: reqwest::Error) -> AcmeError {
    AcmeError::ProviderRequest(e.to_string())
}
