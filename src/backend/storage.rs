use reqwest::Method;
use url::Url;

use super::client::Backend;
use super::error::BackendError;

/// Bucket holding post images.
pub const IMAGE_BUCKET: &str = "post-images";
/// Bucket holding post videos.
pub const VIDEO_BUCKET: &str = "post-videos";

impl Backend {
    /// Upload `bytes` to `bucket/path` and return the stored object path.
    ///
    /// Existing objects are never overwritten; a name clash is an error.
    pub async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let url = self.object_url(&["storage", "v1", "object", bucket], path)?;
        let size = bytes.len();
        let request = self
            .upload_request(Method::POST, url)
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes);

        self.send(request).await?;
        tracing::debug!(bucket, path, size, "Uploaded object");
        Ok(path.to_string())
    }

    /// Publicly readable URL of an object in a public bucket.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url, BackendError> {
        self.object_url(&["storage", "v1", "object", "public", bucket], path)
    }

    fn object_url(&self, prefix: &[&str], path: &str) -> Result<Url, BackendError> {
        let mut url = self.base_url().clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(prefix)
            .extend(path.split('/').filter(|s| !s.is_empty()));
        Ok(url)
    }
}
