//! Vault repository settings.

use super::auth::AuthenticationMethod;
use crate::error::{ConfigError, Result};
use config::{Environment, File};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable prefix for [`VaultEnvironmentProperties::load`].
pub const VAULT_ENV_PREFIX: &str = "CONFIG_SERVER_VAULT";

/// Settings of the Vault repository.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VaultEnvironmentProperties {
    /// Vault host
    pub host: String,
    /// Vault port
    pub port: u16,
    /// `http` or `https`
    pub scheme: String,
    /// Request timeout in seconds
    pub timeout: u64,
    /// KV backend mount
    pub backend: String,
    /// Key shared by all applications
    pub default_key: String,
    /// Path between the backend and the key
    pub path_to_key: String,
    /// Separator between a key and its profile
    pub profile_separator: String,
    /// Repository order
    pub order: i32,
    /// KV engine version, 1 or 2
    pub kv_version: u8,
    /// Vault Enterprise namespace
    pub namespace: Option<String>,
    /// Accept any TLS certificate from Vault
    pub skip_ssl_validation: bool,
    /// Static token, or the wrapping token for cubbyhole authentication
    pub token: Option<String>,
    /// Append the label to every secret path
    pub enable_label: bool,
    /// Label used when a request names none
    pub default_label: String,
    /// AppRole settings
    pub app_role: AppRoleProperties,
    /// AWS EC2 instance identity settings
    pub aws_ec2: AwsEc2Properties,
    /// AWS IAM settings
    pub aws_iam: AwsIamProperties,
    /// Azure managed identity settings
    pub azure_msi: AzureMsiProperties,
    /// GCP Compute Engine settings
    pub gcp_gce: GcpGceProperties,
    /// GCP IAM settings
    pub gcp_iam: GcpIamProperties,
    /// Kubernetes settings
    pub kubernetes: KubernetesProperties,
    /// Cloud Foundry instance identity settings
    pub pcf: PcfProperties,
    /// Key store, trust store and cert login settings
    pub ssl: SslProperties,
    /// How the repository obtains its token
    pub authentication: Option<AuthenticationMethod>,
}

impl Default for VaultEnvironmentProperties {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8200,
            scheme: "http".to_string(),
            timeout: 5,
            backend: "secret".to_string(),
            default_key: "application".to_string(),
            path_to_key: String::new(),
            profile_separator: ",".to_string(),
            order: crate::server::DEFAULT_ORDER,
            kv_version: 1,
            namespace: None,
            skip_ssl_validation: false,
            token: None,
            enable_label: false,
            default_label: "main".to_string(),
            app_role: AppRoleProperties::default(),
            aws_ec2: AwsEc2Properties::default(),
            aws_iam: AwsIamProperties::default(),
            azure_msi: AzureMsiProperties::default(),
            gcp_gce: GcpGceProperties::default(),
            gcp_iam: GcpIamProperties::default(),
            kubernetes: KubernetesProperties::default(),
            pcf: PcfProperties::default(),
            ssl: SslProperties::default(),
            authentication: None,
        }
    }
}

/// AppRole login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppRoleProperties {
    /// Mount path of the AppRole backend
    pub app_role_path: String,
    /// Role name
    pub role: String,
    /// Role id
    pub role_id: Option<String>,
    /// Secret id
    pub secret_id: Option<String>,
}

impl Default for AppRoleProperties {
    fn default() -> Self {
        Self {
            app_role_path: "approle".to_string(),
            role: String::new(),
            role_id: None,
            secret_id: None,
        }
    }
}

/// Kubernetes login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KubernetesProperties {
    /// Mount path of the Kubernetes backend
    pub kubernetes_path: String,
    /// Role to log in as
    pub role: String,
    /// File holding the service account JWT
    pub service_account_token_file: String,
}

impl Default for KubernetesProperties {
    fn default() -> Self {
        Self {
            kubernetes_path: "kubernetes".to_string(),
            role: String::new(),
            service_account_token_file: "/var/run/secrets/kubernetes.io/serviceaccount/token"
                .to_string(),
        }
    }
}

/// AWS EC2 login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AwsEc2Properties {
    /// URL of the PKCS#7 instance identity document
    pub identity_document: String,
    /// Mount path of the AWS EC2 backend
    pub aws_ec2_path: String,
    /// Role name, optional
    pub role: String,
    /// Client nonce; Vault issues one when absent
    pub nonce: Option<String>,
}

impl Default for AwsEc2Properties {
    fn default() -> Self {
        Self {
            identity_document: "http://169.254.169.254/latest/dynamic/instance-identity/pkcs7"
                .to_string(),
            aws_ec2_path: "aws-ec2".to_string(),
            role: String::new(),
            nonce: None,
        }
    }
}

/// AWS IAM login settings.
///
/// Credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and
/// the optional `AWS_SESSION_TOKEN`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AwsIamProperties {
    /// Mount path of the AWS backend
    pub aws_path: String,
    /// Role name, optional
    pub role: String,
    /// Value of the `X-Vault-AWS-IAM-Server-ID` header
    pub server_name: Option<String>,
    /// STS endpoint; the global endpoint when unset
    pub endpoint_uri: Option<String>,
}

impl Default for AwsIamProperties {
    fn default() -> Self {
        Self {
            aws_path: "aws".to_string(),
            role: String::new(),
            server_name: None,
            endpoint_uri: None,
        }
    }
}

/// Azure managed identity login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AzureMsiProperties {
    /// Mount path of the Azure backend
    pub azure_path: String,
    /// Role name
    pub role: String,
    /// Identity token service URL; the instance default when empty
    pub identity_token_service: String,
    /// Instance metadata service URL; the instance default when empty
    pub metadata_service: String,
}

impl Default for AzureMsiProperties {
    fn default() -> Self {
        Self {
            azure_path: "azure".to_string(),
            role: String::new(),
            identity_token_service: String::new(),
            metadata_service: String::new(),
        }
    }
}

/// GCP Compute Engine login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcpGceProperties {
    /// Mount path of the GCP backend
    pub gcp_path: String,
    /// Role name
    pub role: String,
    /// Service account; the instance default when empty
    pub service_account: String,
}

impl Default for GcpGceProperties {
    fn default() -> Self {
        Self {
            gcp_path: "gcp".to_string(),
            role: String::new(),
            service_account: String::new(),
        }
    }
}

/// GCP IAM login settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcpIamProperties {
    /// Service account key; the instance's own account when unset
    pub credentials: GcpCredentials,
    /// Mount path of the GCP backend
    pub gcp_path: String,
    /// Role name
    pub role: String,
    /// Project id; any project when empty
    pub project_id: String,
    /// Service account id; taken from the key when empty
    pub service_account_id: String,
    /// Validity of the signed JWT in seconds
    pub jwt_validity: u64,
}

impl Default for GcpIamProperties {
    fn default() -> Self {
        Self {
            credentials: GcpCredentials::default(),
            gcp_path: "gcp".to_string(),
            role: String::new(),
            project_id: String::new(),
            service_account_id: String::new(),
            jwt_validity: 15 * 60,
        }
    }
}

/// A GCP service account key, as a file or inline.
#[derive(Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct GcpCredentials {
    /// Path of the JSON key file
    pub location: Option<String>,
    /// Base64-encoded JSON key
    pub encoded_key: Option<String>,
}

impl fmt::Debug for GcpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpCredentials")
            .field("location", &self.location)
            .field("encoded_key", &self.encoded_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Cloud Foundry instance identity login settings.
///
/// The certificate and key default to the files named by `CF_INSTANCE_CERT`
/// and `CF_INSTANCE_KEY`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PcfProperties {
    /// Mount path of the PCF backend
    pub pcf_path: String,
    /// Role name
    pub role: String,
    /// Instance certificate PEM file
    pub instance_certificate: Option<String>,
    /// Instance key PEM file
    pub instance_key: Option<String>,
}

impl Default for PcfProperties {
    fn default() -> Self {
        Self {
            pcf_path: "pcf".to_string(),
            role: String::new(),
            instance_certificate: None,
            instance_key: None,
        }
    }
}

/// TLS settings of the Vault client.
///
/// The key store is a PKCS#12 archive holding the client certificate used by
/// cert login; the trust store is a PEM bundle of additional root certificates.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SslProperties {
    /// PKCS#12 key store file
    pub key_store: Option<String>,
    /// Key store password
    pub key_store_password: Option<String>,
    /// PEM trust store file
    pub trust_store: Option<String>,
    /// Trust store password; PEM bundles carry none
    pub trust_store_password: Option<String>,
    /// Mount path of the cert backend
    pub cert_auth_path: String,
}

impl Default for SslProperties {
    fn default() -> Self {
        Self {
            key_store: None,
            key_store_password: None,
            trust_store: None,
            trust_store_password: None,
            cert_auth_path: "cert".to_string(),
        }
    }
}

impl fmt::Debug for SslProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted = |value: &Option<String>| value.as_ref().map(|_| "<redacted>");
        f.debug_struct("SslProperties")
            .field("key_store", &self.key_store)
            .field("key_store_password", &redacted(&self.key_store_password))
            .field("trust_store", &self.trust_store)
            .field("trust_store_password", &redacted(&self.trust_store_password))
            .field("cert_auth_path", &self.cert_auth_path)
            .finish()
    }
}

impl VaultEnvironmentProperties {
    /// Load settings from an optional file and `CONFIG_SERVER_VAULT_*` variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or a value has the wrong type.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder
            .add_source(
                Environment::with_prefix(VAULT_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigError::LoadError(format!("Failed to load Vault settings: {}", e)))?
            .try_deserialize::<Self>()
            .map_err(|e| {
                ConfigError::DeserializationError(format!("Invalid Vault settings: {}", e))
            })
    }

    /// `scheme://host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parts do not form a URL.
    pub fn base_url(&self) -> Result<Url> {
        let raw = format!("{}://{}:{}", self.scheme, self.host, self.port);
        Url::parse(&raw).map_err(|e| {
            ConfigError::InvalidConfiguration(format!("Invalid Vault address '{}': {}", raw, e))
        })
    }

    /// Request timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
