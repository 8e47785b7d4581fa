use axum_extra::extract::cookie::SameSite;
use serde::{Deserialize, Serialize};
use warden_core::AccountProfile;

/// Success envelope shared by every endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

/// Body of a successful login. The refresh token travels only as a cookie.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub user: AccountProfile,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshData {
    pub access_token: String,
}

/// Optional JSON body of `/refresh-access-token` for clients without cookies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Attributes of the `accessToken` and `refreshToken` cookies
#[derive(Debug, Clone)]
pub struct CookieConfig {
    pub http_only: bool,
    pub secure: bool,
    pub same_site: CookieSameSite,
    pub path: String,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self::production()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CookieSameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl From<CookieSameSite> for SameSite {
    fn from(same_site: CookieSameSite) -> Self {
        match same_site {
            CookieSameSite::Strict => SameSite::Strict,
            CookieSameSite::Lax => SameSite::Lax,
            CookieSameSite::None => SameSite::None,
        }
    }
}

impl CookieConfig {
    /// Secure cookies usable from a cross-site frontend.
    pub fn production() -> Self {
        Self {
            http_only: true,
            secure: true,
            same_site: CookieSameSite::None,
            path: "/".to_string(),
        }
    }

    pub fn development() -> Self {
        Self {
            secure: false,
            same_site: CookieSameSite::Lax,
            ..Self::production()
        }
    }

    pub fn for_production(production: bool) -> Self {
        if production {
            Self::production()
        } else {
            Self::development()
        }
    }
}
