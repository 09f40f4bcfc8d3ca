//! Image resolution for image elements.
//!
//! `ImageStore` fetches and decodes everything an image element's `src` can
//! point at, so the stage and the rasterizer never deal with HTTP, files or
//! base64.
//!
//! | `src` form | Source |
//! |------------|--------|
//! | `data:image/png;base64,...` | inline bytes |
//! | `asset:<id>` | image uploaded to this store |
//! | `http://`, `https://` | downloaded with `reqwest`, cached by URL |
//! | anything else | file path |
//!
//! Which forms are accepted is set by the store's [`SourcePolicy`]. The CLI
//! trusts its templates; the HTTP service only takes inline data and
//! uploads unless remote images are switched on.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::RgbaImage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::CertforgeError;

/// A decoded image with its last access time.
#[derive(Debug, Clone)]
pub struct CachedImage {
    pub image: Arc<RgbaImage>,
    pub last_accessed: Instant,
}

impl CachedImage {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image: Arc::new(image),
            last_accessed: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Summary of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub id: String,
    pub width: u32,
    pub height: u32,
}

/// Image `src` forms a store may resolve. Data URLs and `asset:` uploads
/// are always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcePolicy {
    /// `http://` and `https://` downloads.
    pub allow_remote: bool,
    /// Paths on the local filesystem.
    pub allow_files: bool,
}

impl SourcePolicy {
    /// Every source form.
    pub const TRUSTED: Self = Self {
        allow_remote: true,
        allow_files: true,
    };
    /// Inline data and uploads only.
    pub const UPLOADS_ONLY: Self = Self {
        allow_remote: false,
        allow_files: false,
    };
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::TRUSTED
    }
}

/// Shared image cache plus uploaded assets.
pub struct ImageStore {
    http_client: reqwest::Client,
    policy: SourcePolicy,
    /// Uploaded images by asset id.
    assets: RwLock<HashMap<String, CachedImage>>,
    /// Downloaded and file images by `src`.
    cache: RwLock<HashMap<String, CachedImage>>,
}

impl ImageStore {
    pub fn new() -> Result<Self, CertforgeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("certforge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CertforgeError::Image(format!("HTTP client error: {}", e)))?;
        Ok(Self::with_client(http_client))
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            policy: SourcePolicy::default(),
            assets: RwLock::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: SourcePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> SourcePolicy {
        self.policy
    }

    /// Decode and store an upload under a fresh id.
    pub async fn add_asset(&self, bytes: &[u8]) -> Result<AssetInfo, CertforgeError> {
        let image = decode(bytes)?;
        let id = uuid::Uuid::new_v4().to_string();
        let info = AssetInfo {
            id: id.clone(),
            width: image.width(),
            height: image.height(),
        };
        self.assets.write().await.insert(id, CachedImage::new(image));
        log::info!(
            "[assets] stored {} ({}x{})",
            info.id,
            info.width,
            info.height
        );
        Ok(info)
    }

    /// Store an already decoded image under a chosen id.
    pub async fn insert_asset(&self, id: impl Into<String>, image: RgbaImage) {
        self.assets
            .write()
            .await
            .insert(id.into(), CachedImage::new(image));
    }

    pub async fn asset_count(&self) -> usize {
        self.assets.read().await.len()
    }

    /// Resolve an element `src` to pixels.
    pub async fn resolve(&self, src: &str) -> Result<Arc<RgbaImage>, CertforgeError> {
        let src = src.trim();
        if src.is_empty() {
            return Err(CertforgeError::Image("empty image source".into()));
        }

        if let Some(id) = src.strip_prefix("asset:") {
            let mut assets = self.assets.write().await;
            let entry = assets
                .get_mut(id)
                .ok_or_else(|| CertforgeError::Image(format!("unknown asset '{}'", id)))?;
            entry.touch();
            return Ok(entry.image.clone());
        }

        if src.starts_with("data:") {
            return Ok(Arc::new(decode(&decode_data_url(src)?)?));
        }

        let remote = src.starts_with("http://") || src.starts_with("https://");
        let allowed = if remote {
            self.policy.allow_remote
        } else {
            self.policy.allow_files
        };
        if !allowed {
            log::warn!("[assets] refused image source '{}'", src);
            return Err(CertforgeError::Image(format!(
                "image source '{}' is not allowed; use a data URL or an uploaded asset",
                src
            )));
        }

        {
            let mut cache = self.cache.write().await;
            if let Some(entry) = cache.get_mut(src) {
                entry.touch();
                return Ok(entry.image.clone());
            }
        }

        let bytes = if remote {
            self.download(src).await?
        } else {
            tokio::fs::read(src)
                .await
                .map_err(|e| CertforgeError::Image(format!("Failed to read {}: {}", src, e)))?
        };
        let cached = CachedImage::new(decode(&bytes)?);
        let image = cached.image.clone();
        self.cache.write().await.insert(src.to_string(), cached);
        Ok(image)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, CertforgeError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| CertforgeError::Image(format!("Failed to download {}: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(CertforgeError::Image(format!(
                "Failed to download {}: HTTP {}",
                url,
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| CertforgeError::Image(format!("Failed to read image data: {}", e)))?;
        Ok(bytes.to_vec())
    }

    /// Drop entries idle for longer than `max_idle`. Returns how many went.
    pub async fn cleanup(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for map in [&self.assets, &self.cache] {
            let mut map = map.write().await;
            let before = map.len();
            map.retain(|_, v| now.duration_since(v.last_accessed) < max_idle);
            removed += before - map.len();
        }
        removed
    }
}

/// Anything that can turn an element `src` into pixels.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, src: &str) -> Result<Arc<RgbaImage>, CertforgeError>;
}

#[async_trait]
impl ImageSource for ImageStore {
    async fn fetch(&self, src: &str) -> Result<Arc<RgbaImage>, CertforgeError> {
        self.resolve(src).await
    }
}

fn decode(bytes: &[u8]) -> Result<RgbaImage, CertforgeError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgba8())
        .map_err(|e| CertforgeError::Image(format!("Failed to decode image: {}", e)))
}

/// Extract the payload of a base64 `data:` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, CertforgeError> {
    let (meta, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| CertforgeError::Image("malformed data URL".into()))?;
    if !meta.ends_with(";base64") {
        return Err(CertforgeError::Image(
            "only base64 data URLs are supported".into(),
        ));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| CertforgeError::Image(format!("invalid base64 in data URL: {}", e)))
}
