//! Example resolving configuration from a list of config servers.
//!
//! This example shows how to:
//! - Load client settings from a file and `CONFIG_CLIENT_*` variables
//! - Try several labels against several server mirrors
//! - Carry the server's state token into the next resolution
//! - Inspect layers, origins and typed configuration
//!
//! Run with: cargo run --example remote_client -- [settings.yaml]
//!
//! For instance:
//!
//! ```text
//! CONFIG_CLIENT_NAME=billing CONFIG_CLIENT_URI=http://cfg-a:8888,http://cfg-b:8888 \
//! CONFIG_CLIENT_LABEL=release,main cargo run --example remote_client
//! ```

use confhub::client::{LoadRequest, ReqwestTransport, ResolveFn, ResolveFuture};
use confhub::prelude::*;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default)]
    server: Option<ServerConfig>,
}

#[derive(Debug, Deserialize)]
struct ServerConfig {
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Remote Configuration Example ===\n");

    let settings = std::env::args().nth(1).map(PathBuf::from);
    let properties = ClientProperties::load(settings.as_deref())?;
    println!("Application: {}", properties.name);
    println!("Servers:     {}", properties.uri.join(", "));
    println!(
        "Labels:      {}\n",
        properties.label.as_deref().unwrap_or("(server default)")
    );

    // Time every resolution
    let loader = ConfigServerLoader::builder()
        .with_transport(ReqwestTransport::new(
            properties.connect_timeout(),
            properties.read_timeout(),
        )?)
        .with_interceptor(|next: ResolveFn| -> ResolveFn {
            Arc::new(move |request: LoadRequest| -> ResolveFuture {
                let next = Arc::clone(&next);
                Box::pin(async move {
                    let started = Instant::now();
                    let result = next(request).await;
                    println!("Resolution took {:?}", started.elapsed());
                    result
                })
            })
        })
        .build()?;

    let state = ClientState::new();
    let profiles: Vec<String> = confhub::environment::split_list(&properties.profile);
    let resource = ConfigServerResource::new(properties, profiles).with_optional(true);

    match loader.load(resource.clone(), state.snapshot()).await? {
        Some(data) => {
            state.record(&data);
            println!("Version: {}", data.version().unwrap_or("-"));
            println!("State:   {}\n", data.state().unwrap_or("-"));

            println!("Layers (highest priority first):");
            for layer in data.layers_by_precedence() {
                println!(
                    "  {:<50} {:?} ({} keys)",
                    layer.name(),
                    layer.precedence(),
                    layer.properties().len()
                );
            }

            if let Some(port) = data.get("server.port") {
                match port.origin() {
                    Some(origin) => println!("\nserver.port = {} from {}", port.value(), origin),
                    None => println!("\nserver.port = {}", port.value()),
                }
            }

            let config: AppConfig = data.try_deserialize()?;
            println!("Typed: {:?}", config);
        }
        None => println!("No remote configuration; continuing with local defaults"),
    }

    // The second resolution sends the state token from the first
    println!("\nResolving again with state {:?}", state.get());
    let again = loader.load(resource, state.snapshot()).await?;
    println!("Resolved: {}", again.is_some());

    Ok(())
}
