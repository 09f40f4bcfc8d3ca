//! HTTP handlers for the server.

pub mod assets;
pub mod batch;
pub mod csv;
pub mod export;
pub mod preview;

use axum::http::StatusCode;
use std::future::Future;

use crate::error::CertforgeError;

/// Status code for an engine error.
pub fn status_for(error: &CertforgeError) -> StatusCode {
    match error {
        CertforgeError::Template(_)
        | CertforgeError::Csv(_)
        | CertforgeError::Image(_)
        | CertforgeError::Json(_) => StatusCode::BAD_REQUEST,
        CertforgeError::CreditDenied { .. } => StatusCode::PAYMENT_REQUIRED,
        CertforgeError::Cancelled => StatusCode::CONFLICT,
        CertforgeError::Render(_)
        | CertforgeError::Pdf(_)
        | CertforgeError::CreditGate(_)
        | CertforgeError::Transport(_)
        | CertforgeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an engine error to the handler error tuple.
pub fn reject(error: impl Into<CertforgeError>) -> (StatusCode, String) {
    let error = error.into();
    let status = status_for(&error);
    if status.is_server_error() {
        log::warn!("[server] request failed: {}", error);
    }
    (status, error.to_string())
}

/// Run a render job on the blocking thread pool.
///
/// Rasterizing a page keeps a thread busy for a long time, so the job gets a
/// blocking thread and drives its own awaits there with the runtime handle.
pub async fn render_blocking<T, F, Fut>(job: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, CertforgeError>>,
    T: Send + 'static,
{
    let handle = tokio::runtime::Handle::current();
    tokio::task::spawn_blocking(move || handle.block_on(job()))
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Render task failed: {}", e),
            )
        })?
        .map_err(reject)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credit::CreditOperation;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_render_job_leaves_the_worker_thread() {
        let caller = std::thread::current().id();
        let worker = render_blocking(|| async { Ok::<_, CertforgeError>(std::thread::current().id()) })
            .await
            .unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_render_job_error_is_mapped() {
        let (status, body) = render_blocking(|| async {
            Err::<(), _>(CertforgeError::Template("no page".into()))
        })
        .await
        .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("no page"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&CertforgeError::Template("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&CertforgeError::CreditDenied {
                operation: CreditOperation::Export,
                cost: 1.0,
                balance: 0.0
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        let (status, body) = reject(crate::render::RenderError::Raster("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Render error: Rasterization failed: boom");
    }
}
