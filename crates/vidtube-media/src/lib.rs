//! Remote asset hosting. Handlers only see the `MediaStore` trait; the
//! Cloudinary client is the production implementation.

pub mod cloudinary;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cloudinary::{Cloudinary, CloudinaryConfig};

/// What the remote host reports back for a stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedAsset {
    pub url: String,
    pub public_id: String,
    pub bytes: u64,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Upload a local file. Fails if the file is missing or the remote rejects it.
    async fn upload(&self, path: &Path) -> Result<UploadedAsset>;

    /// Delete a stored asset by its public id. Fails unless the remote
    /// confirms the deletion.
    async fn delete(&self, public_id: &str) -> Result<()>;
}
