//! Warden HTTP server
//!
//! Serves the authentication routes under `/api/auth` and uploaded avatars
//! under `/uploads`.
//!
//! Environment:
//!   ACCESS_TOKEN_SECRET / REFRESH_TOKEN_SECRET - HS256 signing secrets (required)
//!   DATABASE_URL - SQLite database (default: sqlite://warden.db)
//!   REDIS_URL - Shared counter store; counts stay in-process when unset
//!   UPLOAD_DIR - Avatar directory (default: uploads)
//!   PORT - Listen port (default: 8000)

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden::{
    FailurePolicy, LockoutConfig, RateLimitConfig, RedisCounterStore, SqliteAccountRepository,
    StoreConfig, TokenConfig, Warden, WardenConfig, connect_sqlite,
};
use warden_axum::CookieConfig;
use warden_core::{
    repositories::{CounterStore, Repositories},
    storage::{DiskFileStorage, InMemoryCounterStore},
};

/// How often the in-memory counter store drops expired windows and locks
const COUNTER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "warden-server")]
#[command(about = "Authentication API with rate limiting, login lockout and token sessions")]
struct Args {
    /// Secret signing access tokens
    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    access_token_secret: String,

    /// Secret signing refresh tokens
    #[arg(long, env = "REFRESH_TOKEN_SECRET", hide_env_values = true)]
    refresh_token_secret: String,

    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value = "900")]
    access_token_ttl_secs: i64,

    #[arg(long, env = "REFRESH_TOKEN_TTL_SECS", default_value = "604800")]
    refresh_token_ttl_secs: i64,

    /// Requests per window for every route
    #[arg(long, env = "GLOBAL_RATE_LIMIT_MAX", default_value = "100")]
    global_rate_limit_max: u64,

    #[arg(long, env = "GLOBAL_RATE_LIMIT_WINDOW_SECS", default_value = "900")]
    global_rate_limit_window_secs: u64,

    /// Requests per window for login and account reads
    #[arg(long, env = "AUTH_RATE_LIMIT_MAX", default_value = "5")]
    auth_rate_limit_max: u64,

    #[arg(long, env = "AUTH_RATE_LIMIT_WINDOW_SECS", default_value = "900")]
    auth_rate_limit_window_secs: u64,

    /// Consecutive failed logins before an account is locked
    #[arg(long, env = "MAX_LOGIN_ATTEMPTS", default_value = "5")]
    max_login_attempts: u64,

    #[arg(long, env = "LOCK_TIME_SECS", default_value = "900")]
    lock_time_secs: u64,

    /// `open` or `closed`
    #[arg(long, env = "LIMITER_FAILURE_POLICY", default_value = "open")]
    limiter_failure_policy: FailurePolicy,

    /// `open` or `closed`
    #[arg(long, env = "LOCKOUT_FAILURE_POLICY", default_value = "open")]
    lockout_failure_policy: FailurePolicy,

    /// Upper bound on each counter store call
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "500")]
    store_timeout_ms: u64,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://warden.db")]
    database_url: String,

    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    upload_dir: String,

    #[arg(long, env = "PORT", default_value = "8000")]
    port: u16,

    /// Secure cross-site cookies and no error chains in responses
    #[arg(long, env = "PRODUCTION")]
    production: bool,

    /// Take client addresses from the last `X-Forwarded-For` hop
    #[arg(long, env = "TRUST_PROXY")]
    trust_proxy: bool,
}

impl Args {
    fn warden_config(&self) -> WardenConfig {
        let tokens = TokenConfig::hs256(
            self.access_token_secret.as_bytes(),
            self.refresh_token_secret.as_bytes(),
        )
        .with_access_ttl(chrono::Duration::seconds(self.access_token_ttl_secs))
        .with_refresh_ttl(chrono::Duration::seconds(self.refresh_token_ttl_secs));

        WardenConfig::new(tokens)
            .with_global_limit(
                RateLimitConfig::global()
                    .with_max_requests(self.global_rate_limit_max)
                    .with_window(Duration::from_secs(self.global_rate_limit_window_secs))
                    .with_failure_policy(self.limiter_failure_policy),
            )
            .with_auth_limit(
                RateLimitConfig::auth()
                    .with_max_requests(self.auth_rate_limit_max)
                    .with_window(Duration::from_secs(self.auth_rate_limit_window_secs))
                    .with_failure_policy(self.limiter_failure_policy),
            )
            .with_lockout(LockoutConfig {
                max_failed_attempts: self.max_login_attempts,
                lock_duration: Duration::from_secs(self.lock_time_secs),
                failure_policy: self.lockout_failure_policy,
                ..LockoutConfig::default()
            })
            .with_store(StoreConfig {
                call_timeout: Duration::from_millis(self.store_timeout_ms),
            })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = args.warden_config();

    let pool = connect_sqlite(&args.database_url)
        .await
        .with_context(|| format!("failed to open database {}", args.database_url))?;
    let accounts = SqliteAccountRepository::new(pool);
    let files = DiskFileStorage::new(&args.upload_dir, "/uploads");

    match &args.redis_url {
        Some(url) => {
            let counter = RedisCounterStore::connect(url)
                .await
                .context("failed to connect to Redis")?;
            info!("Using Redis counter store");
            serve(&args, config, Repositories::new(accounts, counter, files)).await
        }
        None => {
            warn!("REDIS_URL not set, rate limits and lockouts are counted per process");
            let counter = InMemoryCounterStore::new();
            counter.spawn_purge(COUNTER_PURGE_INTERVAL);
            serve(&args, config, Repositories::new(accounts, counter, files)).await
        }
    }
}

async fn serve<C>(
    args: &Args,
    config: WardenConfig,
    repositories: Repositories<SqliteAccountRepository, C, DiskFileStorage>,
) -> Result<()>
where
    C: CounterStore,
{
    let warden = Arc::new(Warden::new(Arc::new(repositories), config));
    warden
        .migrate()
        .await
        .context("failed to run migrations")?;

    let auth_routes = warden_axum::routes(warden)
        .with_cookie_config(CookieConfig::for_production(args.production))
        .trust_proxy(args.trust_proxy)
        .with_diagnostics(!args.production)
        .build();

    let app = Router::new()
        .nest("/api/auth", auth_routes)
        .nest_service("/uploads", ServeDir::new(&args.upload_dir))
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}
