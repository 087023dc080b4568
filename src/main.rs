use anyhow::{Context, Result};
use axum::{Router, middleware, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use audit_vault::{
    DatabasePool, RegistryManager,
    api::{
        RegistryApiState, SecurityMiddlewareConfig, SecurityState, auth_middleware,
        body_size_middleware, create_registry_router, logging_middleware, rate_limit_middleware,
        security_headers_middleware,
    },
    config::{VaultConfig, sanitize_for_logging},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates all security requirements
    let config = VaultConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check AUDITVAULT_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;

    info!("Starting AuditVault registry server");

    let administrator = config.administrator()?;
    let policy = config.scoring.to_policy();
    info!(
        administrator = %administrator.short(),
        audit_weight = policy.audit_weight,
        finding_weight = policy.finding_weight,
        verified_bonus = policy.verified_bonus,
        "Registry configured"
    );

    let mut manager = RegistryManager::new(administrator, policy, config.registry.event_buffer);

    if config.database.postgres_enabled {
        let log_url = if config.logging.sanitize_logs {
            sanitize_for_logging(&config.database.postgres_url)
        } else {
            config.database.postgres_url.clone()
        };
        info!(url = %log_url, "Connecting to PostgreSQL");

        let db = DatabasePool::new(
            &config.database.postgres_url,
            config.database.max_connections,
        )
        .await
        .map_err(anyhow::Error::msg)
        .context("Failed to connect to PostgreSQL")?;
        db.init_schema()
            .await
            .map_err(anyhow::Error::msg)
            .context("Failed to initialize database schema")?;

        manager = manager.with_database(Arc::new(db));
        let restored = manager.restore().await?;
        info!(entries = restored, "Journal replayed");
    } else {
        warn!("PostgreSQL disabled - registry state will not survive a restart");
    }

    spawn_event_logger(&manager);

    let security_state = SecurityState::new(SecurityMiddlewareConfig::from_config(&config));
    spawn_rate_limit_cleanup(&security_state);

    let app = Router::new()
        .nest(
            "/registry",
            create_registry_router(RegistryApiState {
                manager: manager.clone(),
                journal_page_limit: config.registry.journal_page_limit,
            }),
        )
        .route("/health", get(|| async { "OK" }))
        // Apply security middleware layers (order matters!)
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            logging_middleware,
        ))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("AuditVault registry listening on {}", bind_addr);
    info!(
        "Security middleware: Auth={}, Rate limit={}/min, Max body={}KB",
        config.security.enable_auth,
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize secure logging with sanitization
fn init_secure_logging(config: &VaultConfig) -> Result<()> {
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Secure logging initialized with data sanitization enabled");
    }

    Ok(())
}

/// Log every registry notification
fn spawn_event_logger(manager: &RegistryManager) {
    let mut events = manager.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(event = event.name(), payload = %json, "Registry event"),
                    Err(e) => warn!(event = event.name(), error = %e, "Unserializable registry event"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Periodically drop stale rate limiter entries
fn spawn_rate_limit_cleanup(state: &SecurityState) {
    let limiter = state.rate_limiter.clone();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(limiter.window());
        loop {
            interval.tick().await;
            let tracked = limiter.cleanup();
            debug!(tracked, "Rate limiter cleaned up");
        }
    });
}
