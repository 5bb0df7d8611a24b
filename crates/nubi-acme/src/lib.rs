//! ACME certificate lifecycle for the Nubi control plane
//!
//! Owns the long-lived account credentials and the DNS-01 order flow;
//! the wire protocol itself is delegated to `instant-acme`. Issuance is
//! expected to run under the orchestrator mutex: a DNS-01 order can take
//! tens of seconds and must not interleave with other mutations.

pub mod dns;
pub mod material;

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, ChallengeType, Identifier, LetsEncrypt,
    NewAccount, NewOrder, OrderStatus, RetryPolicy,
};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use dns::{build_provider, wait_for_propagation, ProviderConfig};
use material::write_material;

/// ACME errors; the orchestrator wraps these into the `Acme` taxonomy kind.
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("account creation failed: {0}")]
    AccountCreationFailed(String),

    #[error("order creation failed: {0}")]
    OrderCreationFailed(String),

    #[error("challenge failed: {0}")]
    ChallengeFailed(String),

    #[error("certificate finalization failed: {0}")]
    FinalizationFailed(String),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("DNS-01 challenge not offered for domain: {0}")]
    Dns01NotSupported(String),

    #[error("unsupported DNS provider: {0}")]
    UnsupportedProvider(String),

    #[error("missing provider configuration field: {0}")]
    MissingProviderConfig(String),

    #[error("DNS provider request failed: {0}")]
    ProviderRequest(String),

    #[error("timed out waiting for DNS propagation of {0}")]
    PropagationTimeout(String),

    #[error("certificate generation error: {0}")]
    CertGen(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AcmeError> for nubi_model::Error {
    fn from(err: AcmeError) -> Self {
        nubi_model::Error::Acme(err.to_string())
    }
}

/// ACME agent configuration
#[derive(Debug, Clone)]
pub struct AcmeConfig {
    /// Contact email registered with the CA
    pub contact_email: String,
    /// Use the Let's Encrypt staging environment
    pub use_staging: bool,
    /// Directory certificate material is written to
    pub certs_dir: PathBuf,
}

/// Issued (or renewed) certificate material on disk
#[derive(Debug, Clone)]
pub struct IssuedMaterial {
    pub cert_path: String,
    pub key_path: String,
    pub expires_at: DateTime<Utc>,
}

/// Drives DNS-01 issuance and renewal against the configured CA
pub struct AcmeAgent {
    config: AcmeConfig,
    http: reqwest::Client,
    account: Mutex<Option<Account>>,
}

impl AcmeAgent {
    pub fn new(config: AcmeConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            account: Mutex::new(None),
        }
    }

    pub fn is_staging(&self) -> bool {
        self.config.use_staging
    }

    fn account_key_path(&self) -> PathBuf {
        self.config.certs_dir.join("letsencrypt").join("user.key")
    }

    /// Load or create the long-lived account credentials.
    async fn account(&self) -> Result<Account, AcmeError> {
        let mut slot = self.account.lock().await;
        if let Some(account) = slot.as_ref() {
            return Ok(account.clone());
        }

        let key_path = self.account_key_path();
        if let Some(parent) = key_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let account = if let Ok(creds_json) = fs::read_to_string(&key_path).await {
            let creds: AccountCredentials = serde_json::from_str(&creds_json).map_err(|e| {
                AcmeError::AccountCreationFailed(format!("failed to parse account key: {e}"))
            })?;

            let account = Account::builder()
                .map_err(|e| AcmeError::AccountCreationFailed(e.to_string()))?
                .from_credentials(creds)
                .await
                .map_err(|e| AcmeError::AccountCreationFailed(e.to_string()))?;

            info!(path = %key_path.display(), "ACME account loaded");
            account
        } else {
            let directory_url = if self.config.use_staging {
                info!("using Let's Encrypt STAGING environment");
                LetsEncrypt::Staging.url().to_string()
            } else {
                LetsEncrypt::Production.url().to_string()
            };

            let (account, creds) = Account::builder()
                .map_err(|e| AcmeError::AccountCreationFailed(e.to_string()))?
                .create(
                    &NewAccount {
                        contact: &[&format!("mailto:{}", self.config.contact_email)],
                        terms_of_service_agreed: true,
                        only_return_existing: false,
                    },
                    directory_url,
                    None,
                )
                .await
                .map_err(|e| AcmeError::AccountCreationFailed(e.to_string()))?;

            let creds_json = serde_json::to_string_pretty(&creds).map_err(|e| {
                AcmeError::AccountCreationFailed(format!("failed to serialize account key: {e}"))
            })?;
            fs::write(&key_path, creds_json).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).await?;
            }

            info!(path = %key_path.display(), "ACME account created");
            account
        };

        *slot = Some(account.clone());
        Ok(account)
    }

    /// Obtain a certificate bundle for `domains` and write it under the
    /// certs directory keyed by `cert_id`.
    ///
    /// Used for both first issuance and renewal; renewal passes the
    /// existing certificate id so host bindings survive the path rewrite.
    pub async fn issue(
        &self,
        cert_id: &str,
        domains: &[String],
        provider_config: &ProviderConfig,
    ) -> Result<IssuedMaterial, AcmeError> {
        if domains.is_empty() {
            return Err(AcmeError::InvalidDomain("no domains requested".into()));
        }
        for domain in domains {
            validate_acme_domain(domain)?;
        }

        let provider = build_provider(provider_config, &self.http)?;
        let account = self.account().await?;

        let identifiers: Vec<Identifier> = domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut order = account
            .new_order(&NewOrder::new(&identifiers))
            .await
            .map_err(|e| AcmeError::OrderCreationFailed(e.to_string()))?;

        // Publish one TXT record per pending authorization, wait for the
        // recursive resolvers to see it, then signal readiness.
        let mut published: Vec<(String, String)> = Vec::new();
        {
            let mut authorizations = order.authorizations();
            while let Some(result) = authorizations.next().await {
                let mut authz = result.map_err(|e| {
                    AcmeError::OrderCreationFailed(format!("failed to get authorization: {e}"))
                })?;

                let domain = match authz.identifier().identifier {
                    Identifier::Dns(d) => d.clone(),
                    other => {
                        return Err(AcmeError::InvalidDomain(format!(
                            "unexpected identifier: {other:?}"
                        )))
                    }
                };

                match authz.status {
                    AuthorizationStatus::Valid => {
                        info!(domain = %domain, "authorization already valid");
                        continue;
                    }
                    AuthorizationStatus::Pending => {}
                    other => {
                        return Err(AcmeError::ChallengeFailed(format!(
                            "authorization for {domain} is {other:?}"
                        )));
                    }
                }

                let mut challenge = authz
                    .challenge(ChallengeType::Dns01)
                    .ok_or_else(|| AcmeError::Dns01NotSupported(domain.clone()))?;

                let record_name =
                    format!("_acme-challenge.{}", domain.trim_start_matches("*."));
                let record_value = challenge.key_authorization().dns_value();

                provider.present(&record_name, &record_value).await?;
                published.push((record_name.clone(), record_value.clone()));
                info!(record = %record_name, "published DNS-01 record");

                wait_for_propagation(&self.http, &record_name, &record_value).await?;

                challenge.set_ready().await.map_err(|e| {
                    AcmeError::ChallengeFailed(format!("failed to set challenge ready: {e}"))
                })?;
            }
        }

        let retry_policy = RetryPolicy::new()
            .timeout(std::time::Duration::from_secs(60))
            .initial_delay(std::time::Duration::from_secs(2));

        let result = self.finish_order(&mut order, &retry_policy).await;

        // TXT records are garbage either way once the order settles.
        for (record_name, record_value) in &published {
            if let Err(e) = provider.cleanup(record_name, record_value).await {
                warn!(record = %record_name, error = %e, "failed to clean up DNS-01 record");
            }
        }

        let (cert_chain_pem, private_key_pem) = result?;

        let (cert_path, key_path) =
            write_material(&self.config.certs_dir, cert_id, &cert_chain_pem, &private_key_pem)
                .await?;

        // Let's Encrypt issues 90-day certificates; the parsed notAfter is
        // preferred, the fixed window is the upper bound.
        let expires_at = material::parse_not_after(cert_chain_pem.as_bytes())
            .unwrap_or_else(|| Utc::now() + Duration::days(90));

        info!(
            cert_id = %cert_id,
            domains = ?domains,
            expires_at = %expires_at,
            "certificate issued"
        );

        Ok(IssuedMaterial {
            cert_path,
            key_path,
            expires_at,
        })
    }

    async fn finish_order(
        &self,
        order: &mut instant_acme::Order,
        retry_policy: &RetryPolicy,
    ) -> Result<(String, String), AcmeError> {
        let status = order.poll_ready(retry_policy).await.map_err(|e| {
            AcmeError::ChallengeFailed(format!("challenge verification failed: {e}"))
        })?;

        match status {
            OrderStatus::Ready | OrderStatus::Valid => {}
            OrderStatus::Invalid => {
                return Err(AcmeError::ChallengeFailed(
                    "order became invalid - challenge verification failed".into(),
                ));
            }
            other => {
                return Err(AcmeError::ChallengeFailed(format!(
                    "unexpected order status: {other:?}"
                )));
            }
        }

        let private_key_pem = order
            .finalize()
            .await
            .map_err(|e| AcmeError::FinalizationFailed(format!("failed to finalize order: {e}")))?;

        let cert_chain_pem = order.poll_certificate(retry_policy).await.map_err(|e| {
            AcmeError::FinalizationFailed(format!("failed to download certificate: {e}"))
        })?;

        Ok((cert_chain_pem, private_key_pem))
    }
}

/// ACME rejects bare hostnames and anything but a single leading wildcard.
fn validate_acme_domain(domain: &str) -> Result<(), AcmeError> {
    if domain.is_empty() {
        return Err(AcmeError::InvalidDomain("domain cannot be empty".into()));
    }
    if domain.contains(' ') {
        return Err(AcmeError::InvalidDomain(format!(
            "domain cannot contain spaces: {domain}"
        )));
    }
    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(AcmeError::InvalidDomain(format!(
            "domain cannot start or end with a dot: {domain}"
        )));
    }
    if domain.trim_start_matches("*.").contains('*') {
        return Err(AcmeError::InvalidDomain(format!(
            "only a single leading wildcard label is allowed: {domain}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_validation() {
        assert!(validate_acme_domain("example.com").is_ok());
        assert!(validate_acme_domain("*.example.com").is_ok());
        assert!(validate_acme_domain("").is_err());
        assert!(validate_acme_domain("bad domain.com").is_err());
        assert!(validate_acme_domain(".example.com").is_err());
        assert!(validate_acme_domain("example.com.").is_err());
        assert!(validate_acme_domain("*.*.example.com").is_err());
    }

    #[test]
    fn acme_error_maps_into_taxonomy() {
        let err: nubi_model::Error = AcmeError::PropagationTimeout("_acme-challenge.x".into()).into();
        assert_eq!(err.kind(), "acme");
        assert!(err.to_string().contains("_acme-challenge.x"));
    }
}
