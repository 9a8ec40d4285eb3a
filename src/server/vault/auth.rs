//! Obtaining a Vault token.

use super::client::VaultOperations;
use super::cloud;
use super::properties::VaultEnvironmentProperties;
use crate::error::{ConfigError, Result};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use tracing::debug;

const UNWRAP_PATH: &str = "sys/wrapping/unwrap";

/// How the repository obtains its Vault token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum AuthenticationMethod {
    /// Role id and secret id login
    #[serde(rename = "APPROLE", alias = "approle")]
    AppRole,
    /// EC2 instance identity document login
    #[serde(rename = "AWS_EC2", alias = "aws_ec2", alias = "aws-ec2")]
    AwsEc2,
    /// Signed STS `GetCallerIdentity` login
    #[serde(rename = "AWS_IAM", alias = "aws_iam", alias = "aws-iam")]
    AwsIam,
    /// Azure managed identity login
    #[serde(rename = "AZURE_MSI", alias = "azure_msi", alias = "azure-msi")]
    AzureMsi,
    /// TLS client certificate login
    #[serde(rename = "CERT", alias = "cert")]
    Cert,
    /// Unwrap a response-wrapped token
    #[serde(rename = "CUBBYHOLE", alias = "cubbyhole")]
    Cubbyhole,
    /// Compute Engine instance identity login
    #[serde(rename = "GCP_GCE", alias = "gcp_gce", alias = "gcp-gce")]
    GcpGce,
    /// IAM-signed JWT login
    #[serde(rename = "GCP_IAM", alias = "gcp_iam", alias = "gcp-iam")]
    GcpIam,
    /// Service account JWT login
    #[serde(rename = "KUBERNETES", alias = "kubernetes")]
    Kubernetes,
    /// Cloud Foundry instance identity login
    #[serde(rename = "PCF", alias = "pcf")]
    Pcf,
    /// Static token from the settings
    #[serde(rename = "TOKEN", alias = "token")]
    Token,
}

impl fmt::Display for AuthenticationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AppRole => "APPROLE",
            Self::AwsEc2 => "AWS_EC2",
            Self::AwsIam => "AWS_IAM",
            Self::AzureMsi => "AZURE_MSI",
            Self::Cert => "CERT",
            Self::Cubbyhole => "CUBBYHOLE",
            Self::GcpGce => "GCP_GCE",
            Self::GcpIam => "GCP_IAM",
            Self::Kubernetes => "KUBERNETES",
            Self::Pcf => "PCF",
            Self::Token => "TOKEN",
        };
        f.write_str(name)
    }
}

/// `value` if it has text, otherwise an error naming `property` and `method`.
pub(super) fn required<'a>(
    value: Option<&'a str>,
    property: &str,
    method: AuthenticationMethod,
) -> Result<&'a str> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        ConfigError::InvalidConfiguration(format!(
            "Property '{}' must be set for {} authentication",
            property, method
        ))
    })
}

/// Obtain a token as configured by `properties.authentication`.
///
/// Without an authentication method the static `token` is used.
///
/// # Errors
///
/// Returns an error naming the missing property when the method's
/// settings are incomplete, or the Vault error when login fails.
pub async fn acquire_token(
    properties: &VaultEnvironmentProperties,
    operations: &dyn VaultOperations,
) -> Result<String> {
    let method = properties.authentication.unwrap_or(AuthenticationMethod::Token);
    debug!(method = %method, "Acquiring Vault token");

    match method {
        AuthenticationMethod::Token => {
            required(properties.token.as_deref(), "token", method).map(str::to_string)
        }
        AuthenticationMethod::AppRole => {
            let app_role = &properties.app_role;
            let role_id = required(app_role.role_id.as_deref(), "app_role.role_id", method)?;
            let secret_id = required(app_role.secret_id.as_deref(), "app_role.secret_id", method)?;
            let path = format!("auth/{}/login", app_role.app_role_path);
            operations
                .login(&path, json!({"role_id": role_id, "secret_id": secret_id}), None)
                .await
        }
        AuthenticationMethod::Kubernetes => {
            let kubernetes = &properties.kubernetes;
            let role = required(Some(kubernetes.role.as_str()), "kubernetes.role", method)?;
            let jwt = tokio::fs::read_to_string(&kubernetes.service_account_token_file)
                .await
                .map_err(|e| {
                    ConfigError::Vault(format!(
                        "Failed to read service account token '{}': {}",
                        kubernetes.service_account_token_file, e
                    ))
                })?;
            let path = format!("auth/{}/login", kubernetes.kubernetes_path);
            operations
                .login(&path, json!({"role": role, "jwt": jwt.trim()}), None)
                .await
        }
        AuthenticationMethod::Cert => {
            // The client certificate travels in the TLS handshake.
            required(properties.ssl.key_store.as_deref(), "ssl.key_store", method)?;
            let path = format!("auth/{}/login", properties.ssl.cert_auth_path);
            operations.login(&path, json!({}), None).await
        }
        AuthenticationMethod::Cubbyhole => {
            let wrapping_token = required(properties.token.as_deref(), "token", method)?;
            operations
                .login(UNWRAP_PATH, json!({}), Some(wrapping_token))
                .await
        }
        AuthenticationMethod::AwsEc2 => cloud::aws_ec2(&properties.aws_ec2, operations).await,
        AuthenticationMethod::AwsIam => cloud::aws_iam(&properties.aws_iam, operations).await,
        AuthenticationMethod::AzureMsi => cloud::azure_msi(&properties.azure_msi, operations).await,
        AuthenticationMethod::GcpGce => cloud::gcp_gce(&properties.gcp_gce, operations).await,
        AuthenticationMethod::GcpIam => {
            cloud::gcp_iam(&properties.gcp_iam, operations, Utc::now()).await
        }
        AuthenticationMethod::Pcf => cloud::pcf(&properties.pcf, operations, Utc::now()).await,
    }
}
