use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
};
use futures_util::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use vidtube_db::{NewUser, is_unique_violation};
use vidtube_media::{MediaStore, UploadedAsset};
use vidtube_types::api::ApiResponse;
use vidtube_types::models::User;

use crate::error::ApiError;
use crate::password::hash_password;
use crate::staging::{StagedFile, Staging, multipart_error};
use crate::{AppState, db_call};

/// Fields collected from the registration form. Files are already staged on
/// local disk; whatever the flow does not consume is discarded afterwards.
#[derive(Debug, Default)]
pub struct RegisterForm {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub avatar: Option<StagedFile>,
    pub cover_image: Option<StagedFile>,
}

impl RegisterForm {
    async fn read_from(&mut self, staging: &Staging, multipart: &mut Multipart) -> Result<(), ApiError> {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "fullname" | "email" | "username" | "password" => {
                    let value = field.text().await.map_err(multipart_error)?;
                    match name.as_str() {
                        "fullname" => self.fullname = Some(value),
                        "email" => self.email = Some(value),
                        "username" => self.username = Some(value),
                        _ => self.password = Some(value),
                    }
                }
                // One file per slot; extra files are skipped.
                "avatar" if self.avatar.is_none() => self.avatar = Some(staging.stage(field).await?),
                "coverImage" if self.cover_image.is_none() => {
                    self.cover_image = Some(staging.stage(field).await?)
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn discard_files(&mut self, staging: &Staging) {
        for file in [self.avatar.take(), self.cover_image.take()].into_iter().flatten() {
            staging.discard(file).await;
        }
    }
}

/// POST /api/v1/users/register: multipart form with `fullname`, `email`,
/// `username`, `password`, an `avatar` file and an optional `coverImage` file.
pub async fn register(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut form = RegisterForm::default();
    let result = match form.read_from(&state.staging, &mut multipart).await {
        Ok(()) => register_user(&state, &mut form).await,
        Err(e) => Err(e),
    };
    form.discard_files(&state.staging).await;

    let user = result?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(201, user, "User registered successfully")),
    ))
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// validate → check duplicate → require avatar → upload avatar → upload cover
/// → create record → reload sanitized. Uploaded assets are deleted again if
/// either of the last two steps fails; a record that cannot be reloaded is
/// removed as well.
pub async fn register_user(state: &AppState, form: &mut RegisterForm) -> Result<User, ApiError> {
    let (Some(fullname), Some(email), Some(username), Some(_)) = (
        required(&form.fullname),
        required(&form.email),
        required(&form.username),
        required(&form.password),
    ) else {
        return Err(ApiError::bad_request("All fields are required"));
    };
    let fullname = fullname.to_string();
    let email = email.to_lowercase();
    let username = username.to_lowercase();
    let password = form.password.clone().unwrap_or_default();

    let (e, u) = (email.clone(), username.clone());
    let existing = db_call(state, move |db| db.find_user_by_email_or_username(&e, Some(u.as_str())))
        .await
        .map_err(|e| {
            error!("Duplicate check failed: {:#}", e);
            ApiError::internal("Failed to register user")
        })?;
    if existing.is_some() {
        return Err(ApiError::Conflict(
            "User with email or username already exists".into(),
        ));
    }

    let avatar_file = form
        .avatar
        .take()
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;

    let avatar = upload_staged(state.media.as_ref(), &state.staging, avatar_file)
        .await
        .map_err(|e| {
            error!("Upload error: {:#}", e);
            ApiError::Upstream("Failed to upload one or more files".into())
        })?;

    let cover = match form.cover_image.take() {
        Some(file) => match upload_staged(state.media.as_ref(), &state.staging, file).await {
            Ok(asset) => Some(asset),
            Err(e) => {
                warn!("Cover image upload failed but continuing registration: {:#}", e);
                None
            }
        },
        None => None,
    };

    let uploaded: Vec<UploadedAsset> = std::iter::once(avatar.clone()).chain(cover.clone()).collect();

    let new_user = NewUser {
        id: Uuid::new_v4(),
        username,
        email,
        fullname,
        avatar: avatar.url,
        cover_image: cover.map(|c| c.url).unwrap_or_default(),
        password_hash: String::new(),
    };
    let id = new_user.id.to_string();

    let created = db_call(state, move |db| {
        let hashed = NewUser {
            password_hash: hash_password(&password)?,
            ..new_user
        };
        db.create_user(&hashed)
    })
    .await;

    if let Err(e) = created {
        error!("Database error: {:#}", e);
        cleanup_assets(state.media.as_ref(), &uploaded).await;
        return Err(if is_unique_violation(&e) {
            ApiError::Conflict("Username or email already exists".into())
        } else {
            ApiError::internal("Failed to register user")
        });
    }

    let reload_id = id.clone();
    let reloaded = db_call(state, move |db| {
        db.get_user_by_id(&reload_id)?
            .ok_or_else(|| anyhow::anyhow!("user {reload_id} missing after insert"))?
            .sanitized()
    })
    .await;

    match reloaded {
        Ok(user) => {
            info!("Registered user {} ({})", user.username, user.id);
            Ok(user)
        }
        Err(e) => {
            error!("Reload after create failed: {:#}", e);
            if let Err(e) = db_call(state, move |db| db.delete_user(&id)).await {
                error!("Failed to remove half-created user: {:#}", e);
            }
            cleanup_assets(state.media.as_ref(), &uploaded).await;
            Err(ApiError::internal("Failed to create user after file upload"))
        }
    }
}

/// Push a staged file to the asset store. The local copy is removed whether
/// or not the upload worked.
async fn upload_staged(
    media: &dyn MediaStore,
    staging: &Staging,
    file: StagedFile,
) -> anyhow::Result<UploadedAsset> {
    let result = media.upload(&file.path).await;
    staging.discard(file).await;
    result
}

/// Best-effort delete of every uploaded asset. Failures are only logged.
async fn cleanup_assets(media: &dyn MediaStore, assets: &[UploadedAsset]) {
    let results = join_all(assets.iter().map(|a| media.delete(&a.public_id))).await;
    for (asset, result) in assets.iter().zip(results) {
        if let Err(e) = result {
            error!("Cleanup error for {}: {:#}", asset.public_id, e);
        }
    }
}
