use std::{
    convert::Infallible,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use axum::{
    RequestPartsExt,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Request},
    http::{HeaderMap, header, request::Parts},
};
use axum_extra::extract::CookieJar;
use serde::de::DeserializeOwned;
use warden_core::{
    AccessClaims, AccountId, error::ValidationError, repositories::RepositoryProvider,
};

use crate::{AppState, error::ApiError};

/// Network address the request is charged to.
///
/// With `trust_proxy` the last `X-Forwarded-For` entry wins, the one
/// appended by the proxy in front of us. Earlier entries are client supplied
/// and ignored. Without `trust_proxy` the peer address is used. Requests with
/// neither share the unspecified address.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub IpAddr);

impl<R: RepositoryProvider> FromRequestParts<AppState<R>> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<R>,
    ) -> Result<Self, Self::Rejection> {
        if state.trust_proxy {
            if let Some(ip) = forwarded_for(&parts.headers) {
                return Ok(ClientAddr(ip));
            }
        }

        let ip = parts
            .extract::<ConnectInfo<SocketAddr>>()
            .await
            .map(|ConnectInfo(addr)| addr.ip())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

        Ok(ClientAddr(ip))
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .last()
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .and_then(|last| last.trim().parse().ok())
}

/// Access token from the `accessToken` cookie, else an `Authorization: Bearer` header.
pub struct AccessToken(pub Option<String>);

impl<S> FromRequestParts<S> for AccessToken
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(crate::ACCESS_COOKIE).filter(|c| !c.value().is_empty()) {
            return Ok(AccessToken(Some(cookie.value().to_string())));
        }

        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);

        Ok(AccessToken(bearer))
    }
}

/// Claims of the verified access token, set by
/// [`require_access_token`](crate::middleware::require_access_token).
#[derive(Debug, Clone)]
pub struct AuthAccount(pub AccessClaims);

impl AuthAccount {
    pub fn id(&self) -> AccountId {
        self.0.account_id()
    }
}

impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessClaims>()
            .cloned()
            .map(AuthAccount)
            .ok_or_else(ApiError::unauthorized)
    }
}

/// `Json` whose rejections render as the error envelope.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(request, state)
            .await
            .map_err(|rejection| ValidationError::InvalidField(rejection.body_text()))?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_takes_proxy_appended_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.9, 10.0.0.1".parse().unwrap());
        assert_eq!(forwarded_for(&headers), Some("10.0.0.1".parse().unwrap()));

        // A spoofed leading entry does not change the charged address
        headers.insert(
            "x-forwarded-for",
            "1.2.3.4, 5.6.7.8, 203.0.113.7".parse().unwrap(),
        );
        assert_eq!(
            forwarded_for(&headers),
            Some("203.0.113.7".parse().unwrap())
        );

        headers.insert("x-forwarded-for", "192.0.2.1".parse().unwrap());
        headers.append("x-forwarded-for", "192.0.2.2".parse().unwrap());
        assert_eq!(forwarded_for(&headers), Some("192.0.2.2".parse().unwrap()));

        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(forwarded_for(&headers), None);
    }
}
