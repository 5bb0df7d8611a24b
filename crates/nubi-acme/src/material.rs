//! Certificate material on disk: PEM parsing, key-file hygiene and
//! self-signed generation for development use

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use tokio::fs;
use x509_parser::prelude::{GeneralName, ParsedExtension};

use crate::AcmeError;

/// Generated self-signed certificate material
#[derive(Debug, Clone)]
pub struct SelfSignedMaterial {
    pub cert_pem: String,
    pub key_pem: String,
    pub expires_at: DateTime<Utc>,
}

/// Extract `notAfter` from the leaf certificate of a PEM bundle.
pub fn parse_not_after(pem: &[u8]) -> Option<DateTime<Utc>> {
    let leaf = first_certificate_der(pem)?;
    let (_, cert) = x509_parser::parse_x509_certificate(&leaf).ok()?;
    let timestamp = cert.validity().not_after.to_datetime().unix_timestamp();
    DateTime::from_timestamp(timestamp, 0)
}

/// Extract the covered domains (subject alternative names, with the common
/// name first when it is not already listed) from a PEM bundle's leaf.
pub fn parse_domains(pem: &[u8]) -> Vec<String> {
    let Some(leaf) = first_certificate_der(pem) else {
        return Vec::new();
    };
    let Ok((_, cert)) = x509_parser::parse_x509_certificate(&leaf) else {
        return Vec::new();
    };

    let mut domains: Vec<String> = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    domains.push((*dns).to_string());
                }
            }
        }
    }

    if let Some(cn) = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
    {
        if !domains.iter().any(|d| d == cn) {
            domains.insert(0, cn.to_string());
        }
    }

    domains
}

fn first_certificate_der(pem: &[u8]) -> Option<Vec<u8>> {
    let mut reader = pem;
    let mut iter = rustls_pemfile::certs(&mut reader);
    let result = iter.next()?.ok().map(|der| der.to_vec());
    result
}

/// Write certificate and key PEM under the certs directory, keyed by the
/// certificate id. The key file is chmod 0600.
pub async fn write_material(
    certs_dir: &Path,
    cert_id: &str,
    cert_pem: &str,
    key_pem: &str,
) -> Result<(String, String), AcmeError> {
    fs::create_dir_all(certs_dir).await?;

    let cert_path = certs_dir.join(format!("{cert_id}.crt"));
    let key_path = certs_dir.join(format!("{cert_id}.key"));

    fs::write(&cert_path, cert_pem).await?;
    fs::write(&key_path, key_pem).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600)).await?;
    }

    Ok((
        cert_path.to_string_lossy().into_owned(),
        key_path.to_string_lossy().into_owned(),
    ))
}

/// Generate a self-signed certificate for the given domains, valid for 90
/// days. Development use only.
pub fn generate_self_signed(domains: &[String]) -> Result<SelfSignedMaterial, AcmeError> {
    if domains.is_empty() {
        return Err(AcmeError::InvalidDomain("no domains requested".into()));
    }

    let mut params = CertificateParams::default();

    let mut dn = DistinguishedName::new();
    dn.push(rcgen::DnType::CommonName, domains[0].clone());
    dn.push(rcgen::DnType::OrganizationName, "Nubi");
    params.distinguished_name = dn;

    params.subject_alt_names = domains
        .iter()
        .map(|d| {
            rcgen::Ia5String::try_from(d.as_str())
                .map(rcgen::SanType::DnsName)
                .map_err(|e| AcmeError::CertGen(format!("invalid SAN {d}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let not_before = Utc::now();
    let expires_at = not_before + Duration::days(90);
    params.not_before = time::OffsetDateTime::from_unix_timestamp(not_before.timestamp())
        .map_err(|e| AcmeError::CertGen(e.to_string()))?;
    params.not_after = time::OffsetDateTime::from_unix_timestamp(expires_at.timestamp())
        .map_err(|e| AcmeError::CertGen(e.to_string()))?;

    let key_pair = KeyPair::generate().map_err(|e| AcmeError::CertGen(e.to_string()))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| AcmeError::CertGen(e.to_string()))?;

    Ok(SelfSignedMaterial {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn self_signed_material_parses_back() {
        let domains = vec!["dev.example.com".to_string(), "*.dev.example.com".to_string()];
        let material = generate_self_signed(&domains).unwrap();

        assert!(material.cert_pem.contains("BEGIN CERTIFICATE"));
        assert!(material.key_pem.contains("PRIVATE KEY"));

        let not_after = parse_not_after(material.cert_pem.as_bytes()).unwrap();
        // Parsed expiry matches the declared one to the second.
        assert!((not_after - material.expires_at).num_seconds().abs() <= 1);

        let parsed = parse_domains(material.cert_pem.as_bytes());
        assert!(parsed.contains(&"dev.example.com".to_string()));
        assert!(parsed.contains(&"*.dev.example.com".to_string()));
    }

    #[test]
    fn garbage_pem_yields_nothing() {
        assert!(parse_not_after(b"not a pem").is_none());
        assert!(parse_domains(b"not a pem").is_empty());
    }

    #[test]
    fn self_signed_requires_a_domain() {
        assert!(generate_self_signed(&[]).is_err());
    }

    #[tokio::test]
    async fn write_material_sets_key_permissions() {
        let dir = TempDir::new().unwrap();
        let material = generate_self_signed(&["a.example.com".to_string()]).unwrap();

        let (cert_path, key_path) = write_material(
            dir.path(),
            "cert-1",
            &material.cert_pem,
            &material.key_pem,
        )
        .await
        .unwrap();

        assert!(cert_path.ends_with("cert-1.crt"));
        assert!(key_path.ends_with("cert-1.key"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&key_path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
