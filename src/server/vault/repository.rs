//! Environment repository backed by Vault KV secrets.

use super::auth::acquire_token;
use super::client::{VaultHttpClient, VaultOperations};
use super::properties::VaultEnvironmentProperties;
use crate::environment::{Environment, PropertySource, flatten, split_list};
use crate::error::Result;
use crate::server::EnvironmentRepository;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

const DEFAULT_PROFILE: &str = "default";
const SOURCE_PREFIX: &str = "vault:";

/// Serves secrets from a Vault KV backend.
///
/// The token is acquired on first use and reused for the lifetime of the
/// repository. Requests that carry their own token go through
/// [`find_one_for_token`](Self::find_one_for_token) instead.
pub struct VaultEnvironmentRepository {
    properties: VaultEnvironmentProperties,
    operations: Arc<dyn VaultOperations>,
    token: OnceCell<String>,
}

impl VaultEnvironmentRepository {
    /// Create a repository over `operations`.
    pub fn new<O: VaultOperations + 'static>(
        properties: VaultEnvironmentProperties,
        operations: O,
    ) -> Self {
        Self {
            properties,
            operations: Arc::new(operations),
            token: OnceCell::new(),
        }
    }

    /// Create a repository talking to the Vault described by `properties`.
    ///
    /// # Errors
    ///
    /// Returns an error if the Vault address is invalid.
    pub fn from_properties(properties: VaultEnvironmentProperties) -> Result<Self> {
        let client = VaultHttpClient::new(&properties)?;
        Ok(Self::new(properties, client))
    }

    /// Repository settings.
    pub fn properties(&self) -> &VaultEnvironmentProperties {
        &self.properties
    }

    /// Secret keys to read, most specific first.
    ///
    /// The shared default key comes first unless an application has the same
    /// name, then each application; every key is followed by its profile
    /// variants. The result is reversed so the last profile of the last
    /// application wins.
    pub fn find_keys(&self, application: &str, profiles: &[String]) -> Vec<String> {
        let applications = split_list(application);
        let separator = &self.properties.profile_separator;
        let default_key = &self.properties.default_key;

        let mut bases: Vec<&str> = Vec::new();
        if !applications.iter().any(|a| a == default_key) {
            bases.push(default_key);
        }
        bases.extend(applications.iter().map(String::as_str));

        let mut keys = Vec::new();
        for base in bases {
            keys.push(base.to_string());
            for profile in profiles {
                keys.push(format!("{}{}{}", base, separator, profile));
            }
        }
        keys.reverse();
        keys
    }

    /// Full secret path for `key`.
    ///
    /// `backend[/data]/[path_to_key/]key[/label]`; the label is appended only
    /// when labels are enabled.
    pub fn secret_path(&self, key: &str, label: Option<&str>) -> String {
        let properties = &self.properties;
        let mut path = properties.backend.trim_end_matches('/').to_string();
        if properties.kv_version == 2 {
            path.push_str("/data");
        }
        let path_to_key = properties.path_to_key.trim_matches('/');
        if !path_to_key.is_empty() {
            path.push('/');
            path.push_str(path_to_key);
        }
        path.push('/');
        path.push_str(key);
        if properties.enable_label {
            let label = label
                .filter(|l| !l.trim().is_empty())
                .unwrap_or(&properties.default_label);
            path.push('/');
            path.push_str(label);
        }
        path
    }

    /// Locate the environment using a caller-supplied token.
    ///
    /// # Errors
    ///
    /// Returns an error if a secret cannot be read.
    pub async fn find_one_for_token(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
        token: &str,
    ) -> Result<Environment> {
        let requested = split_list(profile);
        let profiles: Vec<String> = requested
            .iter()
            .filter(|p| p.as_str() != DEFAULT_PROFILE)
            .cloned()
            .collect();
        let profiles_for_env = if requested.is_empty() {
            vec![DEFAULT_PROFILE.to_string()]
        } else {
            requested
        };

        let mut environment = Environment::new(application, profiles_for_env).with_label(label);
        for key in self.find_keys(application, &profiles) {
            let path = self.secret_path(&key, label);
            let Some(data) = self.operations.read(&path, token).await? else {
                continue;
            };
            let secrets = self.unwrap_secrets(data);
            if secrets.is_empty() {
                continue;
            }
            debug!(path = %path, properties = secrets.len(), "Read Vault secret");
            environment.add(PropertySource::new(format!("{}{}", SOURCE_PREFIX, key), secrets));
        }
        Ok(environment)
    }

    fn unwrap_secrets(&self, mut data: JsonValue) -> serde_json::Map<String, JsonValue> {
        if self.properties.kv_version == 2 {
            data = data.get_mut("data").map(JsonValue::take).unwrap_or(JsonValue::Null);
        }
        match data {
            JsonValue::Object(_) => flatten(data),
            _ => serde_json::Map::new(),
        }
    }

    async fn token(&self) -> Result<&str> {
        let token = self
            .token
            .get_or_try_init(|| acquire_token(&self.properties, self.operations.as_ref()))
            .await?;
        Ok(token.as_str())
    }
}

#[async_trait]
impl EnvironmentRepository for VaultEnvironmentRepository {
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment> {
        let token = self.token().await?;
        self.find_one_for_token(application, profile, label, token).await
    }

    fn name(&self) -> String {
        format!("vault[{}]", self.properties.backend)
    }

    fn order(&self) -> i32 {
        self.properties.order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::server::vault::ExternalRequest;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct InMemoryVault {
        secrets: HashMap<String, JsonValue>,
        reads: Mutex<Vec<(String, String)>>,
        logins: AtomicUsize,
    }

    impl InMemoryVault {
        fn with_secret(mut self, path: &str, data: JsonValue) -> Self {
            self.secrets.insert(path.to_string(), data);
            self
        }
    }

    #[async_trait]
    impl VaultOperations for Arc<InMemoryVault> {
        async fn read(&self, path: &str, token: &str) -> Result<Option<JsonValue>> {
            self.reads
                .lock()
                .unwrap()
                .push((path.to_string(), token.to_string()));
            Ok(self.secrets.get(path).cloned())
        }

        async fn login(&self, _path: &str, _body: JsonValue, _token: Option<&str>) -> Result<String> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok("s.login".to_string())
        }

        async fn fetch(&self, request: &ExternalRequest) -> Result<String> {
            Err(ConfigError::Vault(format!("unexpected request to {}", request.url)))
        }
    }

    fn repository(properties: VaultEnvironmentProperties) -> VaultEnvironmentRepository {
        VaultEnvironmentRepository::new(properties, Arc::new(InMemoryVault::default()))
    }

    fn profiles(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_find_keys() {
        let repository = repository(VaultEnvironmentProperties::default());
        assert_eq!(
            repository.find_keys("app", &profiles(&["dev", "eu"])),
            vec!["app,eu", "app,dev", "app", "application,eu", "application,dev", "application"]
        );
    }

    #[test]
    fn test_find_keys_skips_default_key_named_as_application() {
        let repository = repository(VaultEnvironmentProperties::default());
        assert_eq!(
            repository.find_keys("application", &profiles(&["dev"])),
            vec!["application,dev", "application"]
        );
    }

    #[test]
    fn test_find_keys_multiple_applications() {
        let properties = VaultEnvironmentProperties {
            profile_separator: "-".to_string(),
            ..Default::default()
        };
        let repository = repository(properties);
        assert_eq!(
            repository.find_keys("a, b", &profiles(&["x"])),
            vec!["b-x", "b", "a-x", "a", "application-x", "application"]
        );
    }

    #[test]
    fn test_secret_paths() {
        let mut properties = VaultEnvironmentProperties::default();
        assert_eq!(repository(properties.clone()).secret_path("app", Some("v1")), "secret/app");

        properties.kv_version = 2;
        properties.path_to_key = "/teams/core/".to_string();
        assert_eq!(
            repository(properties.clone()).secret_path("app", None),
            "secret/data/teams/core/app"
        );

        properties.enable_label = true;
        assert_eq!(
            repository(properties.clone()).secret_path("app", None),
            "secret/data/teams/core/app/main"
        );
        assert_eq!(
            repository(properties).secret_path("app", Some("release")),
            "secret/data/teams/core/app/release"
        );
    }

    #[tokio::test]
    async fn test_kv2_secrets_are_unwrapped_and_flattened() {
        let vault = Arc::new(
            InMemoryVault::default()
                .with_secret(
                    "secret/data/app,prod",
                    json!({"data": {"db": {"password": "p"}}, "metadata": {"version": 3}}),
                )
                .with_secret("secret/data/application", json!({"data": {"region": "eu"}})),
        );
        let properties = VaultEnvironmentProperties {
            kv_version: 2,
            ..Default::default()
        };
        let repository = VaultEnvironmentRepository::new(properties, Arc::clone(&vault));

        let environment = repository
            .find_one_for_token("app", "prod", None, "s.forwarded")
            .await
            .unwrap();

        let names: Vec<_> = environment.property_sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["vault:app,prod", "vault:application"]);
        assert_eq!(environment.property_sources[0].source["db.password"], json!("p"));
        assert!(vault.reads.lock().unwrap().iter().all(|(_, token)| token == "s.forwarded"));
        assert_eq!(vault.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_default_profile_is_scrubbed() {
        let vault = Arc::new(InMemoryVault::default());
        let repository = VaultEnvironmentRepository::new(
            VaultEnvironmentProperties::default(),
            Arc::clone(&vault),
        );

        let environment = repository
            .find_one_for_token("app", "default", None, "t")
            .await
            .unwrap();

        let paths: Vec<_> = vault.reads.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, vec!["secret/app", "secret/application"]);
        assert_eq!(environment.profiles, vec!["default"]);
    }

    #[tokio::test]
    async fn test_token_acquired_once() {
        let vault = Arc::new(InMemoryVault::default().with_secret("secret/app", json!({"k": "v"})));
        let mut properties = VaultEnvironmentProperties::default();
        properties.authentication = Some(super::super::AuthenticationMethod::AppRole);
        properties.app_role.role_id = Some("r".to_string());
        properties.app_role.secret_id = Some("s".to_string());
        let repository = VaultEnvironmentRepository::new(properties, Arc::clone(&vault));

        repository.find_one("app", "", None).await.unwrap();
        let environment = repository.find_one("app", "", None).await.unwrap();

        assert_eq!(vault.logins.load(Ordering::SeqCst), 1);
        assert_eq!(environment.property_sources[0].source["k"], json!("v"));
        assert!(vault.reads.lock().unwrap().iter().all(|(_, token)| token == "s.login"));
    }

    #[tokio::test]
    async fn test_missing_token_fails() {
        let repository = repository(VaultEnvironmentProperties::default());
        let err = repository.find_one("app", "default", None).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
    }
}
