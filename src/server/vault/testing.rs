//! Scripted Vault used by the unit tests.

use super::client::{ExternalRequest, VaultOperations};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Mutex;

/// Records logins and answers external requests by exact URL.
#[derive(Default)]
pub(crate) struct ScriptedVault {
    responses: HashMap<String, String>,
    logins: Mutex<Vec<(String, JsonValue, Option<String>)>>,
    fetches: Mutex<Vec<ExternalRequest>>,
}

impl ScriptedVault {
    pub(crate) fn respond(mut self, url: &str, body: &str) -> Self {
        self.responses.insert(url.to_string(), body.to_string());
        self
    }

    pub(crate) fn login(&self, index: usize) -> (String, JsonValue, Option<String>) {
        self.logins.lock().unwrap()[index].clone()
    }

    pub(crate) fn login_count(&self) -> usize {
        self.logins.lock().unwrap().len()
    }

    pub(crate) fn fetches(&self) -> Vec<ExternalRequest> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl VaultOperations for ScriptedVault {
    async fn read(&self, _path: &str, _token: &str) -> Result<Option<JsonValue>> {
        Ok(None)
    }

    async fn login(&self, path: &str, body: JsonValue, token: Option<&str>) -> Result<String> {
        self.logins
            .lock()
            .unwrap()
            .push((path.to_string(), body, token.map(str::to_string)));
        Ok("s.issued".to_string())
    }

    async fn fetch(&self, request: &ExternalRequest) -> Result<String> {
        self.fetches.lock().unwrap().push(request.clone());
        self.responses
            .get(&request.url)
            .cloned()
            .ok_or_else(|| ConfigError::Vault(format!("Request to '{}' returned status 404", request.url)))
    }
}
