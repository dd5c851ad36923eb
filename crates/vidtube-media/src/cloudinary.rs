use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::{MediaStore, UploadedAsset};

const DEFAULT_API_BASE: &str = "https://api.cloudinary.com";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

/// Cloudinary client over the signed upload/destroy REST endpoints.
pub struct Cloudinary {
    client: reqwest::Client,
    config: CloudinaryConfig,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    bytes: u64,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

impl Cloudinary {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        Self::with_api_base(config, DEFAULT_API_BASE)
    }

    /// Point the client at a different API host (tests, proxies).
    pub fn with_api_base(config: CloudinaryConfig, api_base: &str) -> Result<Self> {
        if config.cloud_name.is_empty() || config.api_key.is_empty() || config.api_secret.is_empty() {
            bail!("Cloudinary configuration is incomplete");
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("vidtube/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/v1_1/{}/{}", self.api_base, self.config.cloud_name, action)
    }
}

/// Cloudinary request signature: params sorted by name, joined as
/// `k=v&k=v`, secret appended, SHA-1 hex.
pub fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStore for Cloudinary {
    async fn upload(&self, path: &Path) -> Result<UploadedAsset> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            bail!("File not found at path: {}", path.display());
        }

        info!("Uploading file: {}", path.display());
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let params = vec![
            ("overwrite", "true".to_string()),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
            ("unique_filename", "false".to_string()),
            ("use_filename", "true".to_string()),
        ];
        let signature = sign(&params, &self.config.api_secret);

        let mut form = Form::new()
            .part("file", Part::bytes(data).file_name(file_name))
            .text("api_key", self.config.api_key.clone())
            .text("signature", signature);
        for (k, v) in params {
            form = form.text(k, v);
        }

        let resp = self
            .client
            .post(self.endpoint("auto/upload"))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!("Cloudinary upload rejected ({}): {}", status, body);
            return Err(anyhow!("Cloudinary upload failed with {status}: {body}"));
        }

        let uploaded: UploadResponse = resp.json().await?;
        info!(
            "File uploaded to Cloudinary: url={} public_id={} bytes={}",
            uploaded.secure_url, uploaded.public_id, uploaded.bytes
        );

        Ok(UploadedAsset {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
            bytes: uploaded.bytes,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        if public_id.is_empty() {
            bail!("No public id provided");
        }

        info!("Deleting from Cloudinary: {}", public_id);
        let params = vec![
            ("public_id", public_id.to_string()),
            ("timestamp", chrono::Utc::now().timestamp().to_string()),
        ];
        let signature = sign(&params, &self.config.api_secret);

        let mut body: Vec<(&str, String)> = params;
        body.push(("api_key", self.config.api_key.clone()));
        body.push(("signature", signature));

        let resp = self
            .client
            .post(self.endpoint("image/destroy"))
            .form(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Cloudinary destroy failed with {status}: {text}"));
        }

        let destroyed: DestroyResponse = resp.json().await?;
        if destroyed.result != "ok" {
            bail!("Deletion failed for {}: {}", public_id, destroyed.result);
        }

        info!("Deleted from Cloudinary: {}", public_id);
        Ok(())
    }
}
