use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};
use warden_core::{
    Role, TokenPair,
    error::ValidationError,
    repositories::{RepositoryProvider, Upload},
    services::{Credentials, DetailsUpdate, PasswordChange, Signup},
};

use crate::{
    ACCESS_COOKIE, AppState, REFRESH_COOKIE,
    error::{ApiError, Result, expose_diagnostics},
    extractors::{ApiJson, AuthAccount},
    middleware::{
        RequiredRoles, auth_rate_limit, global_rate_limit, require_access_token, require_roles,
    },
    types::*,
};

const ADMIN_ONLY: RequiredRoles = RequiredRoles(&[Role::Admin]);

pub fn create_router<R>(state: AppState<R>, diagnostics: bool) -> Router
where
    R: RepositoryProvider + 'static,
{
    let login_routes = Router::new()
        .route("/login", post(login_handler::<R>))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit::<R>,
        ));

    let admin_routes = Router::new()
        .route("/get-all-user", get(list_users_handler::<R>))
        .route_layer(axum::middleware::from_fn_with_state(
            ADMIN_ONLY,
            require_roles,
        ));

    let admin_writes = Router::new()
        .route("/delete-user/{id}", delete(delete_user_handler::<R>))
        .route_layer(axum::middleware::from_fn_with_state(
            ADMIN_ONLY,
            require_roles,
        ));

    let limited_reads = Router::new()
        .route("/getuser", get(get_user_handler::<R>))
        .merge(admin_routes)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_rate_limit::<R>,
        ));

    let protected_routes = Router::new()
        .route("/logout", post(logout_handler::<R>))
        .route("/change-password", patch(change_password_handler::<R>))
        .route("/update-avatar", put(update_avatar_handler::<R>))
        .route("/update-user-details", put(update_details_handler::<R>))
        .merge(admin_writes)
        .merge(limited_reads)
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_access_token::<R>,
        ));

    let public_routes = Router::new()
        .route("/health", get(health_handler::<R>))
        .route("/signup", post(signup_handler::<R>))
        .route("/refresh-access-token", post(refresh_handler::<R>));

    let router = Router::new()
        .merge(public_routes)
        .merge(login_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            global_rate_limit::<R>,
        ))
        .with_state(state);

    if diagnostics {
        router.layer(axum::middleware::from_fn(expose_diagnostics))
    } else {
        router
    }
}

fn set_session_cookies<R: RepositoryProvider>(
    jar: CookieJar,
    state: &AppState<R>,
    tokens: &TokenPair,
) -> CookieJar {
    let ttl = &state.warden.config().tokens;
    jar.add(session_cookie(
        &state.cookies,
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        ttl.access_ttl.num_seconds(),
    ))
    .add(session_cookie(
        &state.cookies,
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        ttl.refresh_ttl.num_seconds(),
    ))
}

fn session_cookie(
    config: &CookieConfig,
    name: &'static str,
    value: String,
    max_age_secs: i64,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .path(config.path.clone())
        .http_only(config.http_only)
        .secure(config.secure)
        .same_site(SameSite::from(config.same_site))
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

fn clear_session_cookies(jar: CookieJar, config: &CookieConfig) -> CookieJar {
    jar.remove(Cookie::build(ACCESS_COOKIE).path(config.path.clone()))
        .remove(Cookie::build(REFRESH_COOKIE).path(config.path.clone()))
}

fn multipart_error(e: MultipartError) -> ApiError {
    ValidationError::InvalidField(e.body_text()).into()
}

async fn read_upload(field: Field<'_>) -> Result<Upload> {
    let mime_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let file_name = field.file_name().map(str::to_string);
    let bytes = field.bytes().await.map_err(multipart_error)?;

    let mut upload = Upload::new(bytes.to_vec(), mime_type);
    upload.file_name = file_name;
    Ok(upload)
}

async fn read_text(field: Field<'_>) -> Result<Option<String>> {
    Ok(Some(field.text().await.map_err(multipart_error)?))
}

async fn health_handler<R>(State(state): State<AppState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.health_check().await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

async fn signup_handler<R>(
    State(state): State<AppState<R>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let mut multipart =
        multipart.map_err(|e| ValidationError::InvalidField(e.body_text()))?;
    let mut form = Signup::default();
    let mut avatar = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "avatar" => avatar = Some(read_upload(field).await?),
            "fullName" => form.full_name = read_text(field).await?,
            "email" => form.email = read_text(field).await?,
            "mobileNumber" => form.mobile_number = read_text(field).await?,
            "bio" => form.bio = read_text(field).await?,
            "role" => form.role = read_text(field).await?,
            "password" => form.password = read_text(field).await?,
            _ => {}
        }
    }

    let profile = state.warden.signup(form, avatar).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("User registered successfully", profile)),
    ))
}

async fn login_handler<R>(
    State(state): State<AppState<R>>,
    jar: CookieJar,
    ApiJson(credentials): ApiJson<Credentials>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    // the auth limiter already ran as middleware
    let session = state.warden.login(credentials, None).await?;
    let jar = set_session_cookies(jar, &state, &session.tokens);

    Ok((
        jar,
        Json(ApiResponse::ok(
            "User logged in successfully",
            LoginData {
                user: session.account,
                access_token: session.tokens.access_token,
            },
        )),
    ))
}

async fn logout_handler<R>(
    State(state): State<AppState<R>>,
    jar: CookieJar,
    account: AuthAccount,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.logout(&account.id()).await?;
    let jar = clear_session_cookies(jar, &state.cookies);

    Ok((jar, Json(ApiResponse::message("User logged out successfully"))))
}

async fn change_password_handler<R>(
    State(state): State<AppState<R>>,
    jar: CookieJar,
    account: AuthAccount,
    ApiJson(change): ApiJson<PasswordChange>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.change_password(&account.id(), change).await?;
    let jar = clear_session_cookies(jar, &state.cookies);

    Ok((jar, Json(ApiResponse::message("Password changed successfully"))))
}

async fn update_avatar_handler<R>(
    State(state): State<AppState<R>>,
    account: AuthAccount,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let mut multipart =
        multipart.map_err(|e| ValidationError::InvalidField(e.body_text()))?;
    let mut avatar = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("avatar") {
            avatar = Some(read_upload(field).await?);
        }
    }

    let profile = state.warden.update_avatar(&account.id(), avatar).await?;
    Ok(Json(ApiResponse::ok("Avatar updated successfully", profile)))
}

async fn update_details_handler<R>(
    State(state): State<AppState<R>>,
    account: AuthAccount,
    ApiJson(update): ApiJson<DetailsUpdate>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let profile = state.warden.update_details(&account.id(), update).await?;
    Ok(Json(ApiResponse::ok(
        "User details updated successfully",
        profile,
    )))
}

async fn delete_user_handler<R>(
    State(state): State<AppState<R>>,
    account: AuthAccount,
    Path(id): Path<String>,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    state.warden.delete_account(&account.id(), &id).await?;
    Ok(Json(ApiResponse::message("User deleted successfully")))
}

async fn get_user_handler<R>(
    State(state): State<AppState<R>>,
    account: AuthAccount,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let profile = state.warden.profile(&account.id()).await?;
    Ok(Json(ApiResponse::ok(
        "User data fetched successfully",
        profile,
    )))
}

async fn list_users_handler<R>(State(state): State<AppState<R>>) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let profiles = state.warden.list_profiles().await?;
    Ok(Json(ApiResponse::ok("Users fetched successfully", profiles)))
}

async fn refresh_handler<R>(
    State(state): State<AppState<R>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse>
where
    R: RepositoryProvider,
{
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty());
    let token = match from_cookie {
        Some(token) => Some(token),
        None if body.is_empty() => None,
        None => serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| ValidationError::InvalidField(e.to_string()))?
            .refresh_token,
    };

    let session = state.warden.refresh(token.as_deref()).await?;
    let jar = set_session_cookies(jar, &state, &session.tokens);

    Ok((
        jar,
        Json(ApiResponse::ok(
            "Access token refreshed",
            RefreshData {
                access_token: session.tokens.access_token,
            },
        )),
    ))
}
