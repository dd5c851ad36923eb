use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::auth::ACCESS_COOKIE;
use crate::error::ApiError;
use crate::tokens::verify_access_token;

/// Validate the access token from the `accessToken` cookie or the
/// `Authorization: Bearer` header and attach its claims to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = jar
        .get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
        .or(from_header)
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = verify_access_token(&token, &state.tokens.access_secret)
        .map_err(|_| ApiError::unauthorized("Invalid access token"))?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
