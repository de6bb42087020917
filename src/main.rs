use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use gateway::config::{self, Config};
use gateway::directory::builtin::{hash_password, StaticDirectory};
use gateway::directory::UserDirectory;
use gateway::manifest::Manifest;
use gateway::mcp::builtin::{gateway_features, CoreTools};
use gateway::mcp::features::FeatureAdapter;
use gateway::mcp::rest_crud::RestCrudTools;
use gateway::mcp::{Catalog, Initializer};
use gateway::middleware::rbac::{Principal, Role};
use gateway::models::settings::Settings;
use gateway::rest::{upstream::HttpRestRouter, NoRoutes, RestRouter};
use gateway::{api, store, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "mcp-gateway"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "gateway=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Token { command }) => {
            let state = build_state(cfg).await?;
            handle_token_command(command, &state).await
        }
        Some(cli::Commands::Settings { command }) => {
            let store = store::open(&cfg.store_url).await?;
            handle_settings_command(command, store.as_ref()).await
        }
        Some(cli::Commands::Tool { command }) => {
            let state = build_state(cfg).await?;
            let (name, enabled) = match command {
                cli::ToolCommands::Enable { name } => (name, true),
                cli::ToolCommands::Disable { name } => (name, false),
            };
            state.dispatcher.catalog().tools.toggle(&name, enabled).await?;
            println!("Tool '{}' {}.", name, if enabled { "enabled" } else { "disabled" });
            Ok(())
        }
        Some(cli::Commands::User { command }) => match command {
            cli::UserCommands::HashPassword { password } => {
                println!("{}", hash_password(&password));
                Ok(())
            }
        },
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

/// Open the store and directory, then run the one-time catalog initialization.
async fn build_state(cfg: Config) -> anyhow::Result<Arc<AppState>> {
    let store = store::open(&cfg.store_url).await?;

    tracing::info!("Loading user directory from {}...", cfg.users_file);
    let directory = StaticDirectory::load(&cfg.users_file).await?;
    if directory.is_empty() {
        if cfg.production {
            anyhow::bail!("user directory {} is empty; refusing to start in production", cfg.users_file);
        }
        tracing::warn!("user directory is empty; no one can authenticate");
    }
    let directory: Arc<dyn UserDirectory> = Arc::new(directory);

    let manifest = match &cfg.manifest_file {
        Some(path) => Some(Manifest::load(path).await?),
        None => None,
    };

    let routes: Arc<dyn RestRouter> = match &cfg.rest_upstream {
        Some(base) => {
            let specs = manifest.as_ref().map(|m| m.routes.clone()).unwrap_or_default();
            tracing::info!(upstream = %base, routes = specs.len(), "REST upstream configured");
            Arc::new(HttpRestRouter::new(base, specs, cfg.rest_token.clone())?)
        }
        None => Arc::new(NoRoutes),
    };

    let mut initializers: Vec<Arc<dyn Initializer>> = vec![
        Arc::new(CoreTools),
        Arc::new(RestCrudTools::new(routes.clone())),
        Arc::new(FeatureAdapter::new(Arc::new(gateway_features()))),
    ];
    if let Some(manifest) = manifest {
        initializers.push(Arc::new(manifest));
    }

    let catalog = Catalog::initialize(store.clone(), routes, &initializers).await?;
    Ok(Arc::new(AppState::new(cfg, store, directory, catalog)))
}

async fn run_server(cfg: Config, port: u16) -> anyhow::Result<()> {
    let state = build_state(cfg).await?;

    let app = api::app(state)
        .layer(DefaultBodyLimit::max(4 * 1024 * 1024))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(axum::middleware::from_fn(security_headers_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("MCP gateway listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

/// Middleware: injects a unique X-Request-Id into every response.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

/// Middleware: injects security headers into every response.
async fn security_headers_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();

    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    // token responses must never be cached
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.remove("Server");

    resp
}

/// Principal used for operator commands run from the CLI.
fn operator() -> Principal {
    Principal::new(0, "cli", "Operator CLI", Role::Admin)
}

async fn handle_token_command(cmd: cli::TokenCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::TokenCommands::Issue { user, ttl } => {
            let principal = state
                .tokens
                .directory()
                .find_by_login(&user)
                .await?
                .ok_or_else(|| anyhow::anyhow!("User not found: {}", user))?;
            let issued = state.tokens.issue(principal.id, ttl).await?;
            println!(
                "Token issued:\n  User:    {} ({})\n  Expires: {}s\n  Use:     Authorization: Bearer {}",
                principal.login, issued.user_id, issued.expires_in, issued.token
            );
        }
        cli::TokenCommands::List => {
            let tokens = state.tokens.list(&operator()).await?;
            if tokens.is_empty() {
                println!("No tokens found.");
            } else {
                println!("{:<34} {:<16} {:<22} {:<8}", "JTI", "USER", "EXPIRES", "REVOKED");
                for t in tokens {
                    let user = t.user.as_ref().map(|u| u.username.as_str()).unwrap_or("(deleted)");
                    let expires = t
                        .expires_at_utc()
                        .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_default();
                    println!("{:<34} {:<16} {:<22} {:<8}", t.jti, user, expires, t.revoked);
                }
            }
        }
        cli::TokenCommands::Revoke { jti } => {
            state.tokens.revoke(&jti).await?;
            println!("Token revoked.");
        }
        cli::TokenCommands::Reset => {
            state.tokens.reset().await?;
            println!("Signing secret and token registry cleared. All issued tokens are now invalid.");
        }
    }
    Ok(())
}

async fn handle_settings_command(cmd: cli::SettingsCommands, store: &dyn store::KvStore) -> anyhow::Result<()> {
    let mut settings = Settings::load(store).await?;
    match cmd {
        cli::SettingsCommands::Show => {}
        cli::SettingsCommands::Set { flag, value } => {
            settings.set_flag(&flag, value)?;
            settings.save(store).await?;
        }
    }
    for (name, value) in [
        ("enabled", settings.enabled),
        ("enable_create_tools", settings.enable_create_tools),
        ("enable_update_tools", settings.enable_update_tools),
        ("enable_delete_tools", settings.enable_delete_tools),
        ("enable_rest_api_crud_tools", settings.enable_rest_api_crud_tools),
        ("features_adapter_enabled", settings.features_adapter_enabled),
    ] {
        println!("{:<28} {}", name, value);
    }
    Ok(())
}
