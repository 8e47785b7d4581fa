//! # Warden Axum Integration
//!
//! Axum routes and middleware exposing the warden authentication-security
//! subsystem over HTTP.
//!
//! ## Endpoints
//!
//! | Method | Path                      | Guards                         |
//! | ------ | ------------------------- | ------------------------------ |
//! | GET    | `/health`                 | global limiter                 |
//! | POST   | `/signup`                 | global limiter                 |
//! | POST   | `/login`                  | global + auth limiter          |
//! | POST   | `/refresh-access-token`   | global limiter                 |
//! | POST   | `/logout`                 | access token                   |
//! | PATCH  | `/change-password`        | access token                   |
//! | PUT    | `/update-avatar`          | access token                   |
//! | PUT    | `/update-user-details`    | access token                   |
//! | DELETE | `/delete-user/{id}`       | access token + admin           |
//! | GET    | `/getuser`                | access token + auth limiter    |
//! | GET    | `/get-all-user`           | access token + auth limiter + admin |
//!
//! Tokens travel in the `accessToken` / `refreshToken` cookies. Protected
//! routes also accept `Authorization: Bearer <access token>`.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::{net::SocketAddr, sync::Arc};
//! use axum::Router;
//! use warden::{TokenConfig, Warden, WardenConfig};
//! use warden_axum::{routes, CookieConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let tokens = TokenConfig::hs256(b"access-secret".to_vec(), b"refresh-secret".to_vec());
//!     let warden = Arc::new(Warden::in_memory(WardenConfig::new(tokens)));
//!
//!     let auth_routes = routes(warden)
//!         .with_cookie_config(CookieConfig::development());
//!
//!     let app = Router::new().nest("/api/auth", auth_routes.build());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(
//!         listener,
//!         app.into_make_service_with_connect_info::<SocketAddr>(),
//!     )
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! Serve with `into_make_service_with_connect_info::<SocketAddr>()` so the
//! limiters can key on the peer address.

mod error;
mod extractors;
mod middleware;
mod routes;
mod types;

pub use error::{
    ApiError, ErrorBody, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET, RateLimitBody,
    Result, expose_diagnostics, status_for,
};
pub use extractors::{AccessToken, ApiJson, AuthAccount, ClientAddr};
pub use middleware::{
    RequiredRoles, auth_rate_limit, global_rate_limit, require_access_token, require_roles,
};
pub use routes::create_router;
pub use types::{
    ApiResponse, CookieConfig, CookieSameSite, HealthResponse, LoginData, RefreshData,
    RefreshRequest,
};

use std::sync::Arc;

use axum::Router;
use warden::Warden;
use warden_core::repositories::RepositoryProvider;

/// Name of the access token cookie
pub const ACCESS_COOKIE: &str = "accessToken";
/// Name of the refresh token cookie
pub const REFRESH_COOKIE: &str = "refreshToken";

/// State shared by the routes and middleware
pub struct AppState<R: RepositoryProvider> {
    pub warden: Arc<Warden<R>>,
    pub cookies: CookieConfig,
    /// Take the client address from `X-Forwarded-For`
    pub trust_proxy: bool,
}

impl<R: RepositoryProvider> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            warden: self.warden.clone(),
            cookies: self.cookies.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}

/// Create the authentication routes.
///
/// The returned router can be nested at any path (e.g. `/api/auth`).
///
/// ```rust,ignore
/// let auth_routes = warden_axum::routes(warden).build();
/// let app = Router::new().nest("/api/auth", auth_routes);
/// ```
pub fn routes<R>(warden: Arc<Warden<R>>) -> WardenRouterBuilder<R>
where
    R: RepositoryProvider + 'static,
{
    WardenRouterBuilder {
        warden,
        cookie_config: CookieConfig::default(),
        trust_proxy: false,
        diagnostics: false,
    }
}

/// Builder for configuring authentication routes
pub struct WardenRouterBuilder<R: RepositoryProvider> {
    warden: Arc<Warden<R>>,
    cookie_config: CookieConfig,
    trust_proxy: bool,
    diagnostics: bool,
}

impl<R: RepositoryProvider + 'static> WardenRouterBuilder<R> {
    /// Set custom cookie configuration
    pub fn with_cookie_config(mut self, config: CookieConfig) -> Self {
        self.cookie_config = config;
        self
    }

    /// Use the last `X-Forwarded-For` hop as the client address. Only enable
    /// behind exactly one proxy that appends to the header.
    pub fn trust_proxy(mut self, trust: bool) -> Self {
        self.trust_proxy = trust;
        self
    }

    /// Include the error chain of server errors in response bodies.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    /// Build the router with the configured options
    pub fn build(self) -> Router {
        let state = AppState {
            warden: self.warden,
            cookies: self.cookie_config,
            trust_proxy: self.trust_proxy,
        };
        create_router(state, self.diagnostics)
    }
}

impl<R: RepositoryProvider + 'static> From<WardenRouterBuilder<R>> for Router {
    fn from(builder: WardenRouterBuilder<R>) -> Self {
        builder.build()
    }
}
