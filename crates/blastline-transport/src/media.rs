//! Attachment materialization: local media becomes a durable public URL
//! before the first send.
//!
//! Idempotent: a location that is already a URL is reused as-is. Upload
//! failure is campaign-fatal upstream. Local temp artifacts are deleted
//! only on the success path; a failed upload leaves them in place for
//! inspection and retry.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use blastline_core::config::MediaConfig;
use blastline_core::error::{BlastlineError, Result};
use blastline_core::types::{Attachment, AttachmentKind};
use serde::Deserialize;

use crate::MediaPayload;

/// Where uploaded bytes become a durable URL.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct UploadAccepted {
    url: String,
}

/// HTTP media store: POST the raw bytes, get `{url}` back.
pub struct HttpMediaStore {
    upload_url: String,
    client: reqwest::Client,
}

impl HttpMediaStore {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            upload_url: config.upload_url.clone(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    async fn upload(&self, local_path: &Path, filename: &str) -> Result<String> {
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| BlastlineError::Media(format!("read {}: {e}", local_path.display())))?;

        let resp = self
            .client
            .post(&self.upload_url)
            .query(&[("filename", filename)])
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlastlineError::Media(format!("upload failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(BlastlineError::Media(format!("upload rejected: {status}")));
        }

        let accepted: UploadAccepted = resp
            .json()
            .await
            .map_err(|e| BlastlineError::Media(format!("unexpected upload response: {e}")))?;
        Ok(accepted.url)
    }
}

/// Ensure the attachment is durable and carry the per-type transport
/// requirements into the payload.
pub async fn materialize(attachment: &Attachment, store: &dyn MediaStore) -> Result<MediaPayload> {
    let filename = attachment
        .filename
        .clone()
        .or_else(|| {
            Path::new(&attachment.location)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
        })
        .unwrap_or_else(|| "attachment".to_string());

    // Documents must present a filename and mime type to the transport.
    let mime_type = match attachment.kind {
        AttachmentKind::Document => Some(
            attachment
                .mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        ),
        _ => attachment.mime_type.clone(),
    };

    // Already durable: nothing to upload.
    if attachment.location.starts_with("http://") || attachment.location.starts_with("https://") {
        return Ok(MediaPayload {
            url: attachment.location.clone(),
            kind: attachment.kind,
            filename: Some(filename),
            mime_type,
        });
    }

    let local = Path::new(&attachment.location);
    if !local.exists() {
        return Err(BlastlineError::Media(format!(
            "attachment missing: {}",
            local.display()
        )));
    }

    let url = store.upload(local, &filename).await?;
    tracing::info!("📎 attachment uploaded: {} → {url}", local.display());

    // Success path only: the temp artifact is no longer needed.
    if let Err(e) = tokio::fs::remove_file(local).await {
        tracing::warn!("⚠️ could not remove temp attachment {}: {e}", local.display());
    }

    Ok(MediaPayload {
        url,
        kind: attachment.kind,
        filename: Some(filename),
        mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FakeStore {
        uploads: Mutex<Vec<String>>,
        fail: bool,
    }

    impl FakeStore {
        fn new(fail: bool) -> Self {
            Self { uploads: Mutex::new(Vec::new()), fail }
        }
    }

    #[async_trait]
    impl MediaStore for FakeStore {
        async fn upload(&self, _local_path: &Path, filename: &str) -> Result<String> {
            if self.fail {
                return Err(BlastlineError::Media("upstream down".into()));
            }
            self.uploads.lock().unwrap().push(filename.to_string());
            Ok(format!("https://cdn.example.com/{filename}"))
        }
    }

    fn temp_file(name: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("blastline-media-{name}"));
        std::fs::write(&path, b"bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_url_location_skips_upload() {
        let store = FakeStore::new(false);
        let attachment = Attachment {
            location: "https://cdn.example.com/promo.jpg".into(),
            kind: AttachmentKind::Image,
            filename: None,
            mime_type: None,
        };
        let payload = materialize(&attachment, &store).await.unwrap();
        assert_eq!(payload.url, "https://cdn.example.com/promo.jpg");
        assert_eq!(payload.filename.as_deref(), Some("promo.jpg"));
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_file_uploaded_and_removed() {
        let store = FakeStore::new(false);
        let path = temp_file("video.mp4");
        let attachment = Attachment {
            location: path.to_string_lossy().to_string(),
            kind: AttachmentKind::Video,
            filename: None,
            mime_type: Some("video/mp4".into()),
        };
        let payload = materialize(&attachment, &store).await.unwrap();
        assert_eq!(payload.url, "https://cdn.example.com/blastline-media-video.mp4");
        assert!(!path.exists(), "temp artifact removed on success");
    }

    #[tokio::test]
    async fn test_failed_upload_keeps_artifact() {
        let store = FakeStore::new(true);
        let path = temp_file("doc.pdf");
        let attachment = Attachment {
            location: path.to_string_lossy().to_string(),
            kind: AttachmentKind::Document,
            filename: Some("invoice.pdf".into()),
            mime_type: None,
        };
        assert!(materialize(&attachment, &store).await.is_err());
        assert!(path.exists(), "failure path leaves the file for retry");
        std::fs::remove_file(&path).ok();
    }

    #[tokio::test]
    async fn test_document_gets_default_mime() {
        let store = FakeStore::new(false);
        let attachment = Attachment {
            location: "https://cdn.example.com/terms.pdf".into(),
            kind: AttachmentKind::Document,
            filename: None,
            mime_type: None,
        };
        let payload = materialize(&attachment, &store).await.unwrap();
        assert_eq!(payload.mime_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(payload.filename.as_deref(), Some("terms.pdf"));
    }

    #[tokio::test]
    async fn test_missing_local_file_is_fatal() {
        let store = FakeStore::new(false);
        let attachment = Attachment {
            location: "/nonexistent/path/img.png".into(),
            kind: AttachmentKind::Image,
            filename: None,
            mime_type: None,
        };
        assert!(matches!(
            materialize(&attachment, &store).await,
            Err(BlastlineError::Media(_))
        ));
    }
}
