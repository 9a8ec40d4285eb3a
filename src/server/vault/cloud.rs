//! Cloud platform identity logins.
//!
//! Each login gathers identity material from the platform (instance metadata
//! services, STS signatures, instance certificates) and posts it to the
//! matching Vault auth backend.

use super::auth::{AuthenticationMethod, required};
use super::client::{ExternalRequest, VaultOperations};
use super::properties::{
    AwsEc2Properties, AwsIamProperties, AzureMsiProperties, GcpCredentials, GcpGceProperties,
    GcpIamProperties, PcfProperties,
};
use super::signing::{self, AwsCredentials, SigV4Request};
use crate::error::{ConfigError, Result};
use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue, json};
use tracing::debug;
use url::Url;

const STS_ENDPOINT: &str = "https://sts.amazonaws.com/";
const STS_REGION: &str = "us-east-1";
const STS_BODY: &str = "Action=GetCallerIdentity&Version=2011-06-15";
const SERVER_ID_HEADER: &str = "X-Vault-AWS-IAM-Server-ID";

const AZURE_METADATA_SERVICE: &str =
    "http://169.254.169.254/metadata/instance?api-version=2017-08-01";
const AZURE_IDENTITY_TOKEN_SERVICE: &str = "http://169.254.169.254/metadata/identity/oauth2/token?resource=https://vault.hashicorp.com&api-version=2018-02-01";

const GCE_SERVICE_ACCOUNTS: &str = "http://metadata/computeMetadata/v1/instance/service-accounts";
const GCP_IAM_CREDENTIALS: &str = "https://iamcredentials.googleapis.com/v1";
const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

fn login_path(mount: &str) -> String {
    format!("auth/{}/login", mount)
}

fn non_blank(value: &str) -> Option<&str> {
    Some(value).filter(|v| !v.trim().is_empty())
}

fn parse_json(body: &str, source: &str) -> Result<JsonValue> {
    serde_json::from_str(body)
        .map_err(|e| ConfigError::Vault(format!("Invalid response from {}: {}", source, e)))
}

fn string_field(body: &str, field: &str, source: &str) -> Result<String> {
    parse_json(body, source)?
        .get(field)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Vault(format!("Response from {} has no '{}'", source, field)))
}

fn text<'a>(value: &'a JsonValue, field: &str) -> &'a str {
    value.get(field).and_then(JsonValue::as_str).unwrap_or_default()
}

/// Log in with the instance's PKCS#7 identity document.
pub(super) async fn aws_ec2(
    properties: &AwsEc2Properties,
    operations: &dyn VaultOperations,
) -> Result<String> {
    let document = operations
        .fetch(&ExternalRequest::get(&properties.identity_document))
        .await?;
    let pkcs7: String = document.lines().map(str::trim).collect();

    let mut body = json!({ "pkcs7": pkcs7 });
    if let Some(role) = non_blank(&properties.role) {
        body["role"] = json!(role);
    }
    if let Some(nonce) = properties.nonce.as_deref().and_then(non_blank) {
        body["nonce"] = json!(nonce);
    }
    operations
        .login(&login_path(&properties.aws_ec2_path), body, None)
        .await
}

/// Log in with a signed `sts:GetCallerIdentity` request.
///
/// Credentials come from the `AWS_*` environment variables.
pub(super) async fn aws_iam(
    properties: &AwsIamProperties,
    operations: &dyn VaultOperations,
) -> Result<String> {
    let credentials = aws_credentials_from_env()?;
    let body = aws_iam_login_body(properties, &credentials, Utc::now())?;
    operations
        .login(&login_path(&properties.aws_path), body, None)
        .await
}

fn aws_credentials_from_env() -> Result<AwsCredentials> {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    let missing = |name: &str| {
        ConfigError::InvalidConfiguration(format!(
            "Environment variable '{}' must be set for {} authentication",
            name,
            AuthenticationMethod::AwsIam
        ))
    };
    Ok(AwsCredentials {
        access_key_id: var("AWS_ACCESS_KEY_ID").ok_or_else(|| missing("AWS_ACCESS_KEY_ID"))?,
        secret_access_key: var("AWS_SECRET_ACCESS_KEY")
            .ok_or_else(|| missing("AWS_SECRET_ACCESS_KEY"))?,
        session_token: var("AWS_SESSION_TOKEN"),
    })
}

/// Region of an STS endpoint host; the global endpoint signs for `us-east-1`.
fn sts_region(host: &str) -> &str {
    let parts: Vec<&str> = host.split('.').collect();
    match parts.as_slice() {
        ["sts", region, "amazonaws", ..] => *region,
        _ => STS_REGION,
    }
}

/// The login body for an AWS IAM login signed at `now`.
pub(super) fn aws_iam_login_body(
    properties: &AwsIamProperties,
    credentials: &AwsCredentials,
    now: DateTime<Utc>,
) -> Result<JsonValue> {
    let endpoint = properties
        .endpoint_uri
        .as_deref()
        .and_then(non_blank)
        .unwrap_or(STS_ENDPOINT);
    let url = Url::parse(endpoint).map_err(|e| {
        ConfigError::InvalidConfiguration(format!("Invalid STS endpoint '{}': {}", endpoint, e))
    })?;
    let host = url.host_str().ok_or_else(|| {
        ConfigError::InvalidConfiguration(format!("STS endpoint '{}' has no host", endpoint))
    })?;
    let host_header = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let mut headers = vec![
        (
            "Content-Type".to_string(),
            "application/x-www-form-urlencoded; charset=utf-8".to_string(),
        ),
        ("Host".to_string(), host_header),
        ("X-Amz-Date".to_string(), now.format("%Y%m%dT%H%M%SZ").to_string()),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("X-Amz-Security-Token".to_string(), token.clone()));
    }
    if let Some(server) = properties.server_name.as_deref().and_then(non_blank) {
        headers.push((SERVER_ID_HEADER.to_string(), server.to_string()));
    }

    let request = SigV4Request {
        method: "POST",
        path: url.path(),
        headers: &headers,
        body: STS_BODY,
        region: sts_region(host),
        service: "sts",
    };
    let authorization = signing::sigv4_authorization(&request, credentials, now)?;
    headers.push(("Authorization".to_string(), authorization));

    let header_map: Map<String, JsonValue> = headers
        .into_iter()
        .map(|(name, value)| (name, json!([value])))
        .collect();
    let mut body = json!({
        "iam_http_request_method": "POST",
        "iam_request_url": STANDARD.encode(url.as_str()),
        "iam_request_body": STANDARD.encode(STS_BODY),
        "iam_request_headers": STANDARD.encode(JsonValue::Object(header_map).to_string()),
    });
    if let Some(role) = non_blank(&properties.role) {
        body["role"] = json!(role);
    }
    Ok(body)
}

/// Log in with an Azure managed identity token and the VM's metadata.
pub(super) async fn azure_msi(
    properties: &AzureMsiProperties,
    operations: &dyn VaultOperations,
) -> Result<String> {
    let method = AuthenticationMethod::AzureMsi;
    let role = required(Some(properties.role.as_str()), "azure_msi.role", method)?;
    let metadata_url = non_blank(&properties.metadata_service).unwrap_or(AZURE_METADATA_SERVICE);
    let token_url =
        non_blank(&properties.identity_token_service).unwrap_or(AZURE_IDENTITY_TOKEN_SERVICE);

    let metadata = operations
        .fetch(&ExternalRequest::get(metadata_url).header("Metadata", "true"))
        .await?;
    let metadata = parse_json(&metadata, "the Azure instance metadata service")?;
    let token = operations
        .fetch(&ExternalRequest::get(token_url).header("Metadata", "true"))
        .await?;
    let jwt = string_field(&token, "access_token", "the Azure identity token service")?;

    let compute = &metadata["compute"];
    let body = json!({
        "role": role,
        "jwt": jwt,
        "subscription_id": text(compute, "subscriptionId"),
        "resource_group_name": text(compute, "resourceGroupName"),
        "vm_name": text(compute, "name"),
        "vmss_name": text(compute, "vmScaleSetName"),
    });
    operations
        .login(&login_path(&properties.azure_path), body, None)
        .await
}

/// Log in with a Compute Engine instance identity token.
pub(super) async fn gcp_gce(
    properties: &GcpGceProperties,
    operations: &dyn VaultOperations,
) -> Result<String> {
    let role = required(
        Some(properties.role.as_str()),
        "gcp_gce.role",
        AuthenticationMethod::GcpGce,
    )?;
    let account = non_blank(&properties.service_account).unwrap_or("default");
    let audience = format!("http://vault/{}", role);
    let url = Url::parse_with_params(
        &format!("{}/{}/identity", GCE_SERVICE_ACCOUNTS, account),
        &[("audience", audience.as_str()), ("format", "full")],
    )
    .map_err(|e| ConfigError::InvalidConfiguration(format!("Invalid GCE service account: {}", e)))?;

    let jwt = operations
        .fetch(&ExternalRequest::get(url.as_str()).header("Metadata-Flavor", "Google"))
        .await?;
    operations
        .login(
            &login_path(&properties.gcp_path),
            json!({ "role": role, "jwt": jwt.trim() }),
            None,
        )
        .await
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// Log in with a JWT signed by the IAM credentials API.
///
/// The API is called with a token for the configured service account key, or
/// for the instance's own account when no key is configured.
pub(super) async fn gcp_iam(
    properties: &GcpIamProperties,
    operations: &dyn VaultOperations,
    now: DateTime<Utc>,
) -> Result<String> {
    let method = AuthenticationMethod::GcpIam;
    let role = required(Some(properties.role.as_str()), "gcp_iam.role", method)?;
    let key = service_account_key(&properties.credentials).await?;
    let service_account = non_blank(&properties.service_account_id)
        .map(str::to_string)
        .or_else(|| key.as_ref().map(|key| key.client_email.clone()));
    let service_account = required(
        service_account.as_deref(),
        "gcp_iam.service_account_id",
        method,
    )?;

    let access_token = match &key {
        Some(key) => key_access_token(key, operations, now).await?,
        None => instance_access_token(operations).await?,
    };

    let validity = i64::try_from(properties.jwt_validity).unwrap_or(i64::MAX);
    let payload = json!({
        "aud": format!("vault/{}", role),
        "sub": service_account,
        "exp": now.timestamp().saturating_add(validity),
    });
    let project = non_blank(&properties.project_id).unwrap_or("-");
    let url = format!(
        "{}/projects/{}/serviceAccounts/{}:signJwt",
        GCP_IAM_CREDENTIALS, project, service_account
    );
    debug!(service_account = %service_account, "Signing GCP IAM login JWT");
    let response = operations
        .fetch(
            &ExternalRequest::post(url, json!({ "payload": payload.to_string() }).to_string())
                .header("Authorization", format!("Bearer {}", access_token))
                .header("Content-Type", "application/json"),
        )
        .await?;
    let jwt = string_field(&response, "signedJwt", "the IAM credentials API")?;

    operations
        .login(
            &login_path(&properties.gcp_path),
            json!({ "role": role, "jwt": jwt }),
            None,
        )
        .await
}

async fn service_account_key(credentials: &GcpCredentials) -> Result<Option<ServiceAccountKey>> {
    let raw = if let Some(encoded) = credentials.encoded_key.as_deref().and_then(non_blank) {
        STANDARD.decode(encoded.trim()).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid gcp_iam.credentials.encoded_key: {}", e))
        })?
    } else if let Some(location) = credentials.location.as_deref().and_then(non_blank) {
        tokio::fs::read(location).await.map_err(|e| {
            ConfigError::InvalidConfiguration(format!(
                "Failed to read GCP credentials '{}': {}",
                location, e
            ))
        })?
    } else {
        return Ok(None);
    };

    serde_json::from_slice(&raw).map(Some).map_err(|e| {
        ConfigError::InvalidConfiguration(format!("Invalid GCP service account key: {}", e))
    })
}

async fn key_access_token(
    key: &ServiceAccountKey,
    operations: &dyn VaultOperations,
    now: DateTime<Utc>,
) -> Result<String> {
    let issued = now.timestamp();
    let claims = json!({
        "iss": key.client_email,
        "scope": GOOGLE_SCOPE,
        "aud": key.token_uri,
        "iat": issued,
        "exp": issued + 3600,
    });
    let assertion = signing::rs256_jwt(&key.private_key, &claims)?;
    let form = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("grant_type", JWT_BEARER_GRANT)
        .append_pair("assertion", &assertion)
        .finish();

    let response = operations
        .fetch(
            &ExternalRequest::post(key.token_uri.as_str(), form)
                .header("Content-Type", "application/x-www-form-urlencoded"),
        )
        .await?;
    string_field(&response, "access_token", "the Google token endpoint")
}

async fn instance_access_token(operations: &dyn VaultOperations) -> Result<String> {
    let url = format!("{}/default/token", GCE_SERVICE_ACCOUNTS);
    let response = operations
        .fetch(&ExternalRequest::get(url).header("Metadata-Flavor", "Google"))
        .await?;
    string_field(&response, "access_token", "the GCE metadata server")
}

/// Log in with the Cloud Foundry instance identity certificate.
pub(super) async fn pcf(
    properties: &PcfProperties,
    operations: &dyn VaultOperations,
    now: DateTime<Utc>,
) -> Result<String> {
    let role = required(
        Some(properties.role.as_str()),
        "pcf.role",
        AuthenticationMethod::Pcf,
    )?;
    let certificate_path = instance_file(
        properties.instance_certificate.as_deref(),
        "pcf.instance_certificate",
        "CF_INSTANCE_CERT",
    )?;
    let key_path = instance_file(
        properties.instance_key.as_deref(),
        "pcf.instance_key",
        "CF_INSTANCE_KEY",
    )?;
    let certificate = read_instance_file(&certificate_path, "instance certificate").await?;
    let key = read_instance_file(&key_path, "instance key").await?;

    let body = pcf_login_body(role, &certificate, &key, now)?;
    operations
        .login(&login_path(&properties.pcf_path), body, None)
        .await
}

fn instance_file(configured: Option<&str>, property: &str, variable: &str) -> Result<String> {
    configured
        .and_then(non_blank)
        .map(str::to_string)
        .or_else(|| std::env::var(variable).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| {
            ConfigError::InvalidConfiguration(format!(
                "Property '{}' or environment variable '{}' must be set for {} authentication",
                property,
                variable,
                AuthenticationMethod::Pcf
            ))
        })
}

async fn read_instance_file(path: &str, kind: &str) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        ConfigError::Vault(format!("Failed to read {} '{}': {}", kind, path, e))
    })
}

/// The login body for a PCF login signed at `now`.
pub(super) fn pcf_login_body(
    role: &str,
    certificate: &str,
    key_pem: &str,
    now: DateTime<Utc>,
) -> Result<JsonValue> {
    let signing_time = now.format("%Y-%m-%dT%H:%M:%SZ").to_string();
    let message = format!("{}{}{}", signing_time, certificate, role);
    let signature = signing::pss_signature(key_pem, message.as_bytes())?;

    Ok(json!({
        "role": role,
        "cf_instance_cert": certificate,
        "signing_time": signing_time,
        "signature": format!("v1:{}", URL_SAFE.encode(signature)),
    }))
}
