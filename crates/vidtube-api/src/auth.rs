use axum::{
    Extension, Form, Json,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use tracing::{info, warn};
use uuid::Uuid;

use vidtube_types::api::{
    AccessClaims, ApiResponse, Empty, LoginRequest, LoginResponse, RefreshRequest, TokenPair,
};

use crate::error::ApiError;
use crate::password::verify_password;
use crate::tokens::{issue_tokens, verify_refresh_token};
use crate::{AppState, db_call};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .path("/")
        .build()
}

/// Expired, empty cookie telling the client to drop `name`.
fn cleared_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    let mut cookie = session_cookie(name, String::new(), secure);
    cookie.make_removal();
    cookie
}

fn with_session(jar: CookieJar, tokens: &TokenPair, secure: bool) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, tokens.access_token.clone(), secure))
        .add(session_cookie(REFRESH_COOKIE, tokens.refresh_token.clone(), secure))
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}

/// POST /api/v1/users/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let email = normalize(req.email).ok_or_else(|| ApiError::bad_request("email is required"))?;
    let username = normalize(req.username);
    let password = req.password.unwrap_or_default();

    let user = db_call(&state, move |db| {
        db.find_user_by_email_or_username(&email, username.as_deref())
    })
    .await
    .map_err(|e| {
        warn!("login lookup failed: {:#}", e);
        ApiError::internal("Failed to look up user")
    })?
    .ok_or_else(|| ApiError::bad_request("User not found"))?;

    let hash = user.password.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::internal(format!("password check aborted: {e}")))?
        .map_err(|e| {
            warn!("stored hash for {} is unusable: {}", user.id, e);
            ApiError::internal("Failed to verify credentials")
        })?;
    if !valid {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|_| ApiError::internal("Corrupt user id"))?;
    let tokens = issue_tokens(&state, user_id).await?;

    let id = user.id.clone();
    let logged_in = db_call(&state, move |db| {
        db.get_user_by_id(&id)?
            .ok_or_else(|| anyhow::anyhow!("user {id} vanished"))?
            .sanitized()
    })
    .await
    .map_err(|e| {
        warn!("login reload failed: {:#}", e);
        ApiError::internal("login failed")
    })?;

    info!("User {} logged in", logged_in.username);

    let jar = with_session(jar, &tokens, state.secure_cookies);
    Ok((
        StatusCode::OK,
        jar,
        Json(ApiResponse::new(
            200,
            LoginResponse {
                user: logged_in,
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "User logged in successfully",
        )),
    ))
}

/// POST /api/v1/users/logout, behind `require_auth`.
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<AccessClaims>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let id = claims.sub.to_string();
    db_call(&state, move |db| db.set_refresh_token(&id, None))
        .await
        .map_err(|e| {
            warn!("logout failed for {}: {:#}", claims.sub, e);
            ApiError::internal("Failed to log out")
        })?;

    info!("User {} logged out", claims.username);

    let jar = jar
        .add(cleared_cookie(ACCESS_COOKIE, state.secure_cookies))
        .add(cleared_cookie(REFRESH_COOKIE, state.secure_cookies));
    Ok((
        StatusCode::OK,
        jar,
        Json(ApiResponse::new(200, Empty {}, "User logged out successfully")),
    ))
}

/// Token from a JSON or urlencoded `refreshToken` body field. A body that
/// does not parse counts as no token.
async fn refresh_token_from_body(request: Request) -> Option<String> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/x-www-form-urlencoded"));

    let parsed = if is_form {
        Form::<RefreshRequest>::from_request(request, &())
            .await
            .ok()
            .map(|Form(req)| req)
    } else {
        Json::<RefreshRequest>::from_request(request, &())
            .await
            .ok()
            .map(|Json(req)| req)
    };
    parsed
        .and_then(|req| req.refresh_token)
        .filter(|t| !t.is_empty())
}

/// POST /api/v1/users/refresh-token: token from the `refreshToken` cookie,
/// falling back to the request body.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
) -> Result<impl IntoResponse, ApiError> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty());

    let incoming = match from_cookie {
        Some(token) => Some(token),
        None => refresh_token_from_body(request).await,
    }
    .ok_or_else(|| ApiError::unauthorized("Refresh token is required"))?;

    let claims = verify_refresh_token(&incoming, &state.tokens.refresh_secret).map_err(|e| {
        warn!("refresh token rejected: {:#}", e);
        ApiError::unauthorized("Invalid or expired refresh token")
    })?;

    let id = claims.sub.to_string();
    let user = db_call(&state, move |db| db.get_user_by_id(&id))
        .await
        .map_err(|e| {
            warn!("refresh lookup failed: {:#}", e);
            ApiError::internal("Failed to look up user")
        })?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    // Sole revocation check: only the most recently issued token matches.
    if user.refresh_token.as_deref() != Some(incoming.as_str()) {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let tokens = issue_tokens(&state, claims.sub).await?;

    let jar = with_session(jar, &tokens, state.secure_cookies);
    Ok((
        StatusCode::OK,
        jar,
        Json(ApiResponse::new(200, tokens, "Access token refreshed successfully")),
    ))
}
