use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::error;
use uuid::Uuid;

use vidtube_db::UserRow;
use vidtube_types::api::{AccessClaims, RefreshClaims, TokenPair};

use crate::error::ApiError;
use crate::{AppState, db_call};

/// Secrets and lifetimes for the two token kinds. Access and refresh tokens
/// are signed with different secrets so one can never pass as the other.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

pub fn create_access_token(config: &TokenConfig, user: &UserRow) -> Result<String> {
    let now = Utc::now();
    let claims = AccessClaims {
        sub: user.id.parse().context("user id is not a UUID")?,
        email: user.email.clone(),
        username: user.username.clone(),
        fullname: user.fullname.clone(),
        iat: now.timestamp() as usize,
        exp: (now + config.access_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.access_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn create_refresh_token(config: &TokenConfig, user_id: Uuid) -> Result<String> {
    let now = Utc::now();
    let claims = RefreshClaims {
        sub: user_id,
        jti: Uuid::new_v4(),
        iat: now.timestamp() as usize,
        exp: (now + config.refresh_ttl).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.refresh_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<AccessClaims> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Invalid access token")?;
    Ok(data.claims)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Result<RefreshClaims> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("Invalid refresh token")?;
    Ok(data.claims)
}

/// Mint an access/refresh pair for `user_id` and store the refresh token,
/// overwriting whatever was there. The newest pair is the only live session.
pub async fn issue_tokens(state: &AppState, user_id: Uuid) -> Result<TokenPair, ApiError> {
    let config = state.tokens.clone();
    let id = user_id.to_string();

    db_call(state, move |db| {
        let user = db
            .get_user_by_id(&id)?
            .ok_or_else(|| anyhow::anyhow!("user {} not found", id))?;

        let access_token = create_access_token(&config, &user)?;
        let refresh_token = create_refresh_token(&config, user_id)?;

        if !db.set_refresh_token(&id, Some(&refresh_token))? {
            anyhow::bail!("user {} vanished while storing refresh token", id);
        }

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    })
    .await
    .map_err(|e| {
        error!("Token issue failed: {:#}", e);
        ApiError::internal("Something went wrong while generating access and refresh tokens")
    })
}
