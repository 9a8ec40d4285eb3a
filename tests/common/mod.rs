//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use confhub::client::{ConfigRequest, ConfigTransport, HttpResponse, TransportError};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Mutex;

/// Scripted answer for one URL.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
    JsonError(u16, Value),
    Refused,
}

/// In-memory config servers answering by exact URL.
///
/// Requests to a host with no route are refused; unknown paths on a known
/// host answer 404.
#[derive(Default)]
pub struct MockServers {
    routes: HashMap<String, Reply>,
    calls: Mutex<Vec<ConfigRequest>>,
}

impl MockServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, reply: Reply) -> Self {
        self.routes.insert(url.to_string(), reply);
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.to_string())
            .collect()
    }

    pub fn requests(&self) -> Vec<ConfigRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn knows_host(&self, host: &str) -> bool {
        self.routes.keys().any(|url| {
            url::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h == host))
                .unwrap_or(false)
        })
    }
}

#[async_trait]
impl ConfigTransport for MockServers {
    async fn get(&self, request: &ConfigRequest) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(request.clone());
        match self.routes.get(request.url.as_str()) {
            Some(Reply::Json(body)) => Ok(HttpResponse::ok_json(body.to_string())),
            Some(Reply::Status(status)) => Ok(HttpResponse::status(*status)),
            Some(Reply::JsonError(status, body)) => Ok(HttpResponse {
                status: *status,
                content_type: Some("application/json".to_string()),
                body: body.to_string(),
            }),
            Some(Reply::Refused) => Err(TransportError("connection refused".to_string())),
            None if self.knows_host(request.url.host_str().unwrap_or_default()) => {
                Ok(HttpResponse::status(404))
            }
            None => Err(TransportError("connection refused".to_string())),
        }
    }
}

/// A typical server answer with a profile-specific and a general source.
pub fn environment(name: &str, label: &str) -> Value {
    json!({
        "name": name,
        "profiles": ["prod"],
        "label": label,
        "version": "5f1c2a",
        "state": "s-42",
        "propertySources": [
            {
                "name": format!("git:repo/{}-prod.yml", name),
                "source": {
                    "server.port": {"origin": "app-prod.yml:2:9", "value": 443},
                    "feature.flag": true
                }
            },
            {
                "name": format!("git:repo/{}.yml", name),
                "source": {
                    "server.port": 8080,
                    "server.host": "0.0.0.0"
                }
            }
        ]
    })
}
