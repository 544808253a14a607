use crate::error::ProxyError;
use crate::Result;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    PKCS_ECDSA_P256_SHA256,
};
use std::fs;
use std::path::Path;
use time::{Duration, OffsetDateTime};
use tracing::info;

/// Root certificate authority used to intercept HTTPS traffic.
///
/// Persisted as `ca.pem` / `ca.key` (plus a `ca.crt` copy for browser import)
/// so that a certificate trusted once keeps working across restarts.
pub struct CertificateAuthority {
    ca_cert: Certificate,
}

impl CertificateAuthority {
    /// Load the CA stored in `ca_dir`, or generate and store a new one.
    pub fn new(ca_dir: &Path) -> Result<Self> {
        let ca_cert_path = ca_dir.join("ca.pem");
        let ca_key_path = ca_dir.join("ca.key");

        if ca_cert_path.exists() && ca_key_path.exists() {
            info!("Loading CA from {}", ca_dir.display());
            Self::load(&ca_cert_path, &ca_key_path)
        } else {
            if !ca_dir.exists() {
                fs::create_dir_all(ca_dir)?;
            }
            info!("Generating new CA in {}", ca_dir.display());
            Self::generate_and_save(&ca_cert_path, &ca_key_path)
        }
    }

    fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem = fs::read_to_string(cert_path)?;
        let key_pem = fs::read_to_string(key_path)?;

        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Create a CertificateAuthority from PEM strings (cert and key).
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key_pair = KeyPair::from_pem(key_pem)
            .map_err(|e| ProxyError::certificate(format!("failed to parse CA key: {}", e)))?;
        let params = CertificateParams::from_ca_cert_pem(cert_pem, key_pair)
            .map_err(|e| ProxyError::certificate(format!("failed to parse CA cert: {}", e)))?;
        let cert = Certificate::from_params(params)?;

        Ok(Self { ca_cert: cert })
    }

    fn generate_and_save(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "API Version Fuzzer CA");
        dn.push(DnType::OrganizationName, "API Version Fuzzer");
        params.distinguished_name = dn;
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![
            rcgen::KeyUsagePurpose::KeyCertSign,
            rcgen::KeyUsagePurpose::CrlSign,
        ];

        // Valid for 10 years
        let not_before = OffsetDateTime::now_utc();
        params.not_before = not_before;
        params.not_after = not_before + Duration::days(365 * 10);

        params.key_pair = Some(KeyPair::generate(&PKCS_ECDSA_P256_SHA256)?);

        let cert = Certificate::from_params(params)?;
        let cert_pem = cert.serialize_pem()?;
        let key_pem = cert.serialize_private_key_pem();

        fs::write(cert_path, &cert_pem)?;
        fs::write(key_path, &key_pem)?;
        fs::write(cert_path.with_extension("crt"), &cert_pem)?;

        Ok(Self { ca_cert: cert })
    }

    /// Root CA certificate in PEM format
    pub fn ca_cert_pem(&self) -> Result<String> {
        Ok(self.ca_cert.serialize_pem()?)
    }

    /// Root CA certificate in DER format (for rustls/hudsucker)
    pub fn ca_cert_der(&self) -> Result<Vec<u8>> {
        Ok(self.ca_cert.serialize_der()?)
    }

    /// Root CA private key in DER format (for rustls/hudsucker)
    pub fn ca_key_der(&self) -> Vec<u8> {
        self.ca_cert.serialize_private_key_der()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ca_generation_and_loading() {
        let dir = tempdir().unwrap();
        let ca_dir = dir.path().join("certs");

        let ca = CertificateAuthority::new(&ca_dir).expect("Failed to create CA");
        assert!(ca_dir.join("ca.pem").exists());
        assert!(ca_dir.join("ca.key").exists());
        assert!(ca_dir.join("ca.crt").exists());

        let reloaded = CertificateAuthority::new(&ca_dir).expect("Failed to load CA");
        assert_eq!(ca.ca_key_der(), reloaded.ca_key_der());
        assert!(reloaded.ca_cert_pem().unwrap().contains("BEGIN CERTIFICATE"));
        assert!(!reloaded.ca_cert_der().unwrap().is_empty());
    }

    #[test]
    fn test_from_pem_rejects_garbage() {
        assert!(matches!(
            CertificateAuthority::from_pem("nope", "nope"),
            Err(ProxyError::Certificate { .. })
        ));
    }
}
