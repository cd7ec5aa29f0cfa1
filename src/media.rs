use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;

/// One uploaded file as it arrives from a multipart field.
pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

/// Store an image under `<prefix>/<uuid>.<ext>` and return its public URL.
pub async fn store_image(st: &AppState, prefix: &str, item: UploadItem) -> anyhow::Result<String> {
    anyhow::ensure!(!item.body.is_empty(), "empty file");
    let ext = ext_from_mime(&item.content_type).unwrap_or("bin");
    let key = format!("{}/{}.{}", prefix, Uuid::new_v4(), ext);
    let url = st
        .storage
        .upload(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("upload {}", key))?;
    Ok(url)
}

/// Best-effort removal of a previously stored object, used when an avatar
/// or cover image is replaced. Failures are logged, never surfaced.
pub async fn remove_stored(st: &AppState, url: &str) {
    let Some(key) = object_key(url) else {
        return;
    };
    if let Err(e) = st.storage.delete(key).await {
        warn!(error = %e, key, "could not delete replaced object");
    }
}

/// Map a stored URL back to its object key. Only URLs produced by
/// `store_image` qualify.
fn object_key(url: &str) -> Option<&str> {
    for prefix in ["avatars/", "covers/"] {
        if let Some(idx) = url.find(prefix) {
            return Some(&url[idx..]);
        }
    }
    None
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_mapping() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/pdf"), None);
    }

    #[test]
    fn object_key_extraction() {
        assert_eq!(
            object_key("https://cdn.fake.local/avatars/x.png"),
            Some("avatars/x.png")
        );
        assert_eq!(
            object_key("http://minio:9000/bucket/covers/y.jpg"),
            Some("covers/y.jpg")
        );
        assert_eq!(object_key("https://elsewhere.example/z.png"), None);
    }

    #[tokio::test]
    async fn store_image_returns_url_with_prefix_and_ext() {
        let state = AppState::fake();
        let url = store_image(
            &state,
            "avatars",
            UploadItem {
                body: Bytes::from_static(b"fake-png-bytes"),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap();
        assert!(url.contains("avatars/"));
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let state = AppState::fake();
        let err = store_image(
            &state,
            "avatars",
            UploadItem {
                body: Bytes::new(),
                content_type: "image/png".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("empty file"));
    }
}
