use reqwest::Method;

use super::client::Backend;
use super::error::BackendError;
use super::types::NewLike;
use crate::feed::{LikeEdges, PostId, UserId};

impl Backend {
    /// Record that `viewer` likes `post`.
    ///
    /// The store keeps at most one edge per pair; a conflict means the edge
    /// already exists, which is the state we wanted.
    pub async fn create_like(&self, post: &PostId, viewer: &UserId) -> Result<(), BackendError> {
        let url = self.rest_url("post_likes", &[])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(&NewLike {
                post_id: post,
                user_id: viewer,
            });

        match self.send(request).await {
            Ok(_) => Ok(()),
            Err(BackendError::HttpStatus { status: 409, .. }) => {
                tracing::debug!(post_id = %post, "Like edge already present");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Remove `viewer`'s like from `post`. Deleting a missing edge is not an error.
    pub async fn delete_like(&self, post: &PostId, viewer: &UserId) -> Result<(), BackendError> {
        let post_filter = format!("eq.{post}");
        let user_filter = format!("eq.{viewer}");
        let url = self.rest_url(
            "post_likes",
            &[("post_id", post_filter.as_str()), ("user_id", user_filter.as_str())],
        )?;
        self.send(self.request(Method::DELETE, url).header("Prefer", "return=minimal"))
            .await?;
        Ok(())
    }
}

impl LikeEdges for Backend {
    async fn create_like(&self, post: &PostId, viewer: &UserId) -> Result<(), BackendError> {
        Backend::create_like(self, post, viewer).await
    }

    async fn delete_like(&self, post: &PostId, viewer: &UserId) -> Result<(), BackendError> {
        Backend::delete_like(self, post, viewer).await
    }
}
