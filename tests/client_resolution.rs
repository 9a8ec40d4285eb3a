//! End-to-end client resolution against scripted config servers.

mod common;

use common::{MockServers, Reply, environment};
use confhub::client::{
    ClientProperties, ClientState, ConfigServerLoader, ConfigServerResource, LoadContext,
    MultipleUriStrategy, Precedence, STATE_HEADER, TOKEN_HEADER,
};
use confhub::error::{ConfigError, FetchError};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

fn properties(uris: &[&str]) -> ClientProperties {
    ClientProperties {
        name: "billing".to_string(),
        uri: uris.iter().map(|u| u.to_string()).collect(),
        ..Default::default()
    }
}

fn loader(servers: &Arc<MockServers>) -> ConfigServerLoader {
    ConfigServerLoader::builder()
        .with_shared_transport(Arc::clone(servers) as _)
        .build()
        .unwrap()
}

fn prod(properties: ClientProperties) -> ConfigServerResource {
    ConfigServerResource::new(properties, vec!["prod".to_string()])
}

#[tokio::test]
async fn test_first_success_ignores_later_uris() {
    let servers = Arc::new(
        MockServers::new()
            .route("http://a/billing/prod", Reply::Json(environment("billing", "main")))
            .route("http://b/billing/prod", Reply::Status(500)),
    );
    let mut properties = properties(&["http://a", "http://b"]);
    properties.multiple_uri_strategy = MultipleUriStrategy::Always;

    let data = loader(&servers)
        .load(prod(properties), LoadContext::new())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(data.version(), Some("5f1c2a"));
    assert_eq!(servers.urls(), vec!["http://a/billing/prod"]);
}

#[tokio::test]
async fn test_server_error_is_fatal_under_default_strategy() {
    let servers = Arc::new(
        MockServers::new()
            .route("http://a/billing/prod", Reply::Status(500))
            .route("http://b/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    let err = loader(&servers)
        .load(prod(properties(&["http://a", "http://b"])), LoadContext::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ConfigError::FailFast {
            cause: Some(FetchError::ServerError { status: 500, .. }),
            ..
        }
    ));
    assert_eq!(servers.urls(), vec!["http://a/billing/prod"]);
}

#[tokio::test]
async fn test_server_error_moves_on_under_always() {
    let servers = Arc::new(
        MockServers::new()
            .route("http://a/billing/prod", Reply::Status(500))
            .route("http://b/billing/prod", Reply::Json(environment("billing", "main"))),
    );
    let mut properties = properties(&["http://a", "http://b"]);
    properties.multiple_uri_strategy = MultipleUriStrategy::Always;

    let data = loader(&servers)
        .load(prod(properties), LoadContext::new())
        .await
        .unwrap();

    assert!(data.is_some());
    assert_eq!(
        servers.urls(),
        vec!["http://a/billing/prod", "http://b/billing/prod"]
    );
}

#[tokio::test]
async fn test_unreachable_servers_are_skipped() {
    let servers = Arc::new(
        MockServers::new().route("http://c/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    let data = loader(&servers)
        .load(
            prod(properties(&["http://a", "http://b", "http://c"])),
            LoadContext::new(),
        )
        .await
        .unwrap();

    assert!(data.is_some());
    assert_eq!(servers.urls().len(), 3);
}

#[tokio::test]
async fn test_label_fallback_across_all_uris() {
    let servers = Arc::new(
        MockServers::new()
            .route("http://a/billing/prod/main", Reply::Status(404))
            .route("http://b/billing/prod/main", Reply::Status(404))
            .route(
                "http://b/billing/prod/fallback",
                Reply::Json(environment("billing", "fallback")),
            ),
    );
    let mut properties = properties(&["http://a", "http://b"]);
    properties.label = Some("main,fallback".to_string());

    let data = loader(&servers)
        .load(prod(properties), LoadContext::new())
        .await
        .unwrap()
        .unwrap();

    assert!(data.layer("configserver:git:repo/billing.yml").is_some());
    assert_eq!(
        servers.urls(),
        vec![
            "http://a/billing/prod/main",
            "http://b/billing/prod/main",
            "http://a/billing/prod/fallback",
            "http://b/billing/prod/fallback",
        ]
    );
}

#[tokio::test]
async fn test_label_with_slash_is_one_segment() {
    let servers = Arc::new(MockServers::new().route(
        "http://a/billing/prod/feature(_)login",
        Reply::Json(environment("billing", "feature/login")),
    ));
    let mut properties = properties(&["http://a"]);
    properties.label = Some("feature/login".to_string());

    let data = loader(&servers)
        .load(prod(properties), LoadContext::new())
        .await
        .unwrap();
    assert!(data.is_some());
}

#[tokio::test]
async fn test_fail_fast_carries_json_error_body() {
    let servers = Arc::new(MockServers::new().route(
        "http://a/billing/prod",
        Reply::JsonError(503, json!({"error": "git backend down"})),
    ));
    let mut properties = properties(&["http://a"]);
    properties.fail_fast = true;

    let err = loader(&servers)
        .load(prod(properties).with_optional(true), LoadContext::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        r#"Could not locate PropertySource and the fail fast property is set, failing: {"error":"git backend down"}"#
    );
}

#[tokio::test]
async fn test_optional_resource_proceeds_without_config() {
    let servers = Arc::new(MockServers::new());

    let data = loader(&servers)
        .load(prod(properties(&["http://a"])).with_optional(true), LoadContext::new())
        .await
        .unwrap();

    assert!(data.is_none());
}

#[tokio::test]
async fn test_required_resource_fails_without_fail_fast() {
    let servers = Arc::new(MockServers::new().route("http://a/billing/prod", Reply::Status(404)));

    let err = loader(&servers)
        .load(prod(properties(&["http://a"])), LoadContext::new())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Could not locate PropertySource and the resource is not optional, failing: None of labels [] found"
    );
}

#[tokio::test]
async fn test_assembly_precedence_and_origins() {
    let servers = Arc::new(
        MockServers::new().route("http://a/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    let data = loader(&servers)
        .load(prod(properties(&["http://a"])), LoadContext::new())
        .await
        .unwrap()
        .unwrap();

    let names: Vec<_> = data.layers_by_precedence().map(|l| l.name()).collect();
    assert_eq!(
        names,
        vec![
            "configserver:git:repo/billing-prod.yml",
            "configserver:git:repo/billing.yml",
            "configClient",
        ]
    );
    assert_eq!(
        data.layer("configserver:git:repo/billing-prod.yml").unwrap().precedence(),
        Precedence::ProfileSpecific
    );

    let port = data.get("server.port").unwrap();
    assert_eq!(port.value(), &json!(443));
    let origin = port.origin().unwrap();
    assert_eq!(origin.source_name, "git:repo/billing-prod.yml");
    assert_eq!(origin.locator, json!("app-prod.yml:2:9"));
}

#[derive(Debug, Deserialize, PartialEq)]
struct Billing {
    server: Server,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Server {
    port: u16,
    host: String,
}

#[tokio::test]
async fn test_deserialize_merged_layers() {
    let servers = Arc::new(
        MockServers::new().route("http://a/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    let data = loader(&servers)
        .load(prod(properties(&["http://a"])), LoadContext::new())
        .await
        .unwrap()
        .unwrap();

    let billing: Billing = data.try_deserialize().unwrap();
    assert_eq!(
        billing,
        Billing {
            server: Server {
                port: 443,
                host: "0.0.0.0".to_string()
            }
        }
    );
}

#[tokio::test]
async fn test_state_round_trip_and_headers() {
    let servers = Arc::new(
        MockServers::new().route("http://a/billing/prod", Reply::Json(environment("billing", "main"))),
    );
    let mut properties = properties(&["http://a"]);
    properties.token = Some("t-1".to_string());
    let state = ClientState::new();
    let loader = loader(&servers);

    let data = loader
        .load(prod(properties.clone()), state.snapshot())
        .await
        .unwrap()
        .unwrap();
    state.record(&data);
    loader.load(prod(properties), state.snapshot()).await.unwrap();

    let requests = servers.requests();
    assert_eq!(requests[0].header(STATE_HEADER), None);
    assert_eq!(requests[1].header(STATE_HEADER), Some("s-42"));
    assert_eq!(requests[1].header(TOKEN_HEADER), Some("t-1"));
}

#[tokio::test]
async fn test_per_uri_credentials() {
    let servers = Arc::new(
        MockServers::new()
            .route("http://a/billing/prod", Reply::Status(404))
            .route("http://b/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    loader(&servers)
        .load(
            prod(properties(&["http://alice:one@a", "http://bob:two@b"])),
            LoadContext::new(),
        )
        .await
        .unwrap();

    let requests = servers.requests();
    // alice:one and bob:two
    assert_eq!(requests[0].header("Authorization"), Some("Basic YWxpY2U6b25l"));
    assert_eq!(requests[1].header("Authorization"), Some("Basic Ym9iOnR3bw=="));
}

#[tokio::test]
async fn test_resource_from_location() {
    let servers = Arc::new(
        MockServers::new().route("http://b/billing/prod", Reply::Json(environment("billing", "main"))),
    );

    let resource = ConfigServerResource::from_location(
        "optional:configserver:http://b",
        properties(&["http://a"]),
        vec!["prod".to_string()],
    )
    .unwrap();

    let data = loader(&servers).load(resource, LoadContext::new()).await.unwrap();
    assert!(data.is_some());
    assert_eq!(servers.urls(), vec!["http://b/billing/prod"]);
}

#[tokio::test]
async fn test_concurrent_resolutions_share_loader() {
    let servers = Arc::new(
        MockServers::new().route("http://a/billing/prod", Reply::Json(environment("billing", "main"))),
    );
    let loader = loader(&servers);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let loader = loader.clone();
            tokio::spawn(async move {
                loader
                    .load(prod(properties(&["http://a"])), LoadContext::new())
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_some());
    }
    assert_eq!(servers.urls().len(), 4);
}
