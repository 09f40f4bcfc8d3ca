//! Server state and configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::credit::CreditGate;
use crate::error::CertforgeError;
use crate::render::{ImageStore, SourcePolicy};
use crate::render::text::FontBook;

/// Idle time after which uploaded assets and cached images are dropped.
pub const ASSET_EXPIRATION_SECS: u64 = 3600;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen_addr: String,
    pub engine: EngineConfig,
    /// Let templates reference `http(s)` images. Local file paths are
    /// never read for a request.
    pub allow_remote_images: bool,
}

impl ServerConfig {
    /// Image sources a request's template may use.
    pub fn image_policy(&self) -> SourcePolicy {
        SourcePolicy {
            allow_remote: self.allow_remote_images,
            allow_files: false,
        }
    }
}

/// Application state shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub images: Arc<ImageStore>,
    pub fonts: Arc<FontBook>,
    pub gate: Arc<dyn CreditGate>,
}

impl AppState {
    pub fn new(config: ServerConfig, gate: Arc<dyn CreditGate>) -> Result<Self, CertforgeError> {
        let fonts = FontBook::from_sources(&config.engine.render.fonts)?;
        Ok(Self {
            images: Arc::new(ImageStore::new()?.with_policy(config.image_policy())),
            fonts: Arc::new(fonts),
            gate,
            config,
        })
    }

    pub fn asset_expiration(&self) -> Duration {
        Duration::from_secs(ASSET_EXPIRATION_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::UnmeteredGate;

    fn state(allow_remote_images: bool) -> AppState {
        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            engine: EngineConfig::default(),
            allow_remote_images,
        };
        AppState::new(config, Arc::new(UnmeteredGate)).unwrap()
    }

    #[tokio::test]
    async fn test_server_store_never_reads_files() {
        let state = state(true);
        assert!(!state.images.policy().allow_files);
        let err = state.images.resolve("/etc/ssl/certs/logo.png").await.unwrap_err();
        assert!(matches!(err, CertforgeError::Image(_)));
        assert!(err.to_string().contains("not allowed"));
    }

    #[tokio::test]
    async fn test_remote_images_off_by_default_flag() {
        let state = state(false);
        assert_eq!(state.images.policy(), SourcePolicy::UPLOADS_ONLY);
        assert!(state.images.resolve("http://10.0.0.1/seal.png").await.is_err());
    }
}
