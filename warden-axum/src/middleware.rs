use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use warden_core::{
    ErrorKind, Role, error::AuthorizationError, repositories::RepositoryProvider,
    services::RateLimitDecision,
};

use crate::{
    AppState,
    error::{ApiError, RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET},
    extractors::{AccessToken, AuthAccount, ClientAddr},
};

/// Verify the access token and expose its claims as [`AuthAccount`].
///
/// Every failure to authenticate renders the same generic 401.
pub async fn require_access_token<R>(
    State(state): State<AppState<R>>,
    AccessToken(token): AccessToken,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let token = token.ok_or_else(ApiError::unauthorized)?;

    let claims = match state.warden.authenticate(&token).await {
        Ok(claims) => claims,
        Err(e) if e.kind() == ErrorKind::Authentication => {
            tracing::debug!(error = %e, "Rejected access token");
            return Err(ApiError::unauthorized());
        }
        Err(e) => return Err(e.into()),
    };

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Roles allowed through [`require_roles`]
#[derive(Debug, Clone, Copy)]
pub struct RequiredRoles(pub &'static [Role]);

/// Reject accounts whose token role is not listed. Runs after
/// [`require_access_token`].
///
/// ```rust,ignore
/// router.route_layer(axum::middleware::from_fn_with_state(
///     RequiredRoles(&[Role::Admin]),
///     require_roles,
/// ))
/// ```
pub async fn require_roles(
    State(RequiredRoles(roles)): State<RequiredRoles>,
    account: AuthAccount,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !roles.contains(&account.0.role) {
        tracing::warn!(
            account_id = %account.id(),
            role = %account.0.role,
            "Role not permitted"
        );
        return Err(AuthorizationError::Forbidden(format!(
            "role {} not permitted",
            account.0.role
        ))
        .into());
    }
    Ok(next.run(request).await)
}

/// Global limiter. Keys on address plus account when a valid access token
/// is present, so clients behind one NAT do not share a budget.
pub async fn global_rate_limit<R>(
    State(state): State<AppState<R>>,
    ClientAddr(ip): ClientAddr,
    AccessToken(token): AccessToken,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let account_id = token
        .and_then(|token| state.warden.tokens().verify_access(&token).ok())
        .map(|claims| claims.account_id());

    let limiter = state.warden.global_limiter();
    let key = limiter.key_for(ip, account_id.as_ref());
    let decision = limiter.enforce(&key).await?;

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, &decision);
    Ok(response)
}

/// Strict limiter for credential endpoints, keyed on address only.
pub async fn auth_rate_limit<R>(
    State(state): State<AppState<R>>,
    ClientAddr(ip): ClientAddr,
    request: Request,
    next: Next,
) -> Result<Response, ApiError>
where
    R: RepositoryProvider,
{
    let limiter = state.warden.auth_limiter();
    let decision = limiter.enforce(&limiter.key_for(ip, None)).await?;

    let mut response = next.run(request).await;
    apply_rate_limit_headers(&mut response, &decision);
    Ok(response)
}

/// The innermost limiter's headers win.
fn apply_rate_limit_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    if headers.contains_key(RATE_LIMIT_LIMIT) {
        return;
    }
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(decision.reset_after_secs()));
}
