//! Request signatures for cloud identity logins.

use crate::error::{ConfigError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::thread_rng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer};
use serde_json::{Value as JsonValue, json};
use sha2::{Digest, Sha256};
use std::fmt;

const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// AWS access key pair, with an optional session token.
#[derive(Clone, PartialEq)]
pub struct AwsCredentials {
    /// Access key id
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token of temporary credentials
    pub session_token: Option<String>,
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A request to sign with AWS Signature Version 4.
#[derive(Debug, Clone, Copy)]
pub(super) struct SigV4Request<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub headers: &'a [(String, String)],
    pub body: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// The `Authorization` header value for `request`.
///
/// Every header in the request is signed. The path must already be in
/// canonical form and the request must have no query string.
pub(super) fn sigv4_authorization(
    request: &SigV4Request<'_>,
    credentials: &AwsCredentials,
    now: DateTime<Utc>,
) -> Result<String> {
    let timestamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut canonical: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    canonical.sort();
    let signed_headers = canonical
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = canonical
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();
    let path = if request.path.is_empty() { "/" } else { request.path };

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        request.method,
        path,
        canonical_headers,
        signed_headers,
        sha256_hex(request.body.as_bytes())
    );
    let scope = format!("{}/{}/{}/aws4_request", date, request.region, request.service);
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        SIGV4_ALGORITHM,
        timestamp,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let mut key = hmac_sha256(
        format!("AWS4{}", credentials.secret_access_key).as_bytes(),
        date.as_bytes(),
    )?;
    for part in [request.region, request.service, "aws4_request"] {
        key = hmac_sha256(&key, part.as_bytes())?;
    }
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        SIGV4_ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
    ))
}

/// A compact RS256 JWT over `claims`.
pub(super) fn rs256_jwt(private_key_pem: &str, claims: &JsonValue) -> Result<String> {
    let header = URL_SAFE_NO_PAD.encode(json!({"alg": "RS256", "typ": "JWT"}).to_string());
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let input = format!("{}.{}", header, payload);

    let key = pkcs1v15::SigningKey::<Sha256>::new(private_key(private_key_pem)?);
    let signature = key
        .try_sign(input.as_bytes())
        .map_err(|e| ConfigError::Vault(format!("Failed to sign JWT: {}", e)))?;
    Ok(format!("{}.{}", input, URL_SAFE_NO_PAD.encode(signature.to_bytes())))
}

/// An RSASSA-PSS (SHA-256) signature over `message`.
pub(super) fn pss_signature(private_key_pem: &str, message: &[u8]) -> Result<Vec<u8>> {
    let key = BlindedSigningKey::<Sha256>::new(private_key(private_key_pem)?);
    let signature = key
        .try_sign_with_rng(&mut thread_rng(), message)
        .map_err(|e| ConfigError::Vault(format!("Failed to sign instance identity: {}", e)))?;
    Ok(signature.to_bytes().to_vec())
}

/// Parse a PKCS#8 or PKCS#1 PEM private key.
fn private_key(pem: &str) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| ConfigError::InvalidConfiguration(format!("Invalid RSA private key: {}", e)))
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| ConfigError::Vault(format!("Invalid signing key: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// A throwaway RSA key shared by the signing tests.
#[cfg(test)]
pub(super) fn test_private_key() -> &'static RsaPrivateKey {
    use std::sync::OnceLock;

    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut thread_rng(), 1024).unwrap())
}

/// [`test_private_key`] as PKCS#8 PEM.
#[cfg(test)]
pub(super) fn test_private_key_pem() -> String {
    use rsa::pkcs8::{EncodePrivateKey, LineEnding};

    test_private_key()
        .to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string()
}
