use reqwest::Method;

use super::client::Backend;
use super::error::BackendError;
use super::types::{Comment, ContentUpdate, NewComment, RawComment};
use crate::feed::{CommentId, PostId, UserId};

const COMMENT_SELECT: &str = "*,profiles(name,avatar_url,user_id)";

impl Backend {
    /// Comments on `post`, oldest first.
    pub async fn fetch_comments(&self, post: &PostId) -> Result<Vec<Comment>, BackendError> {
        let filter = format!("eq.{post}");
        let url = self.rest_url(
            "post_comments",
            &[
                ("select", COMMENT_SELECT),
                ("post_id", filter.as_str()),
                ("order", "created_at.asc"),
            ],
        )?;
        let rows: Vec<RawComment> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(rows.into_iter().map(Comment::from).collect())
    }

    pub async fn add_comment(
        &self,
        post: &PostId,
        viewer: &UserId,
        body: &str,
    ) -> Result<Comment, BackendError> {
        let url = self.rest_url("post_comments", &[("select", COMMENT_SELECT)])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(&NewComment {
                post_id: post,
                user_id: viewer,
                content: body,
            });

        let rows: Vec<RawComment> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .map(Comment::from)
            .ok_or_else(|| BackendError::HttpStatus {
                status: 500,
                message: "insert returned no row".into(),
            })
    }

    /// Replace a comment's text. `None` when no row matched.
    pub async fn update_comment(
        &self,
        id: &CommentId,
        body: &str,
    ) -> Result<Option<Comment>, BackendError> {
        let filter = format!("eq.{id}");
        let url = self.rest_url("post_comments", &[("id", filter.as_str()), ("select", COMMENT_SELECT)])?;
        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&ContentUpdate {
                content: body,
                updated_at: chrono::Utc::now(),
            });

        let rows: Vec<RawComment> = self.send_json(request).await?;
        Ok(rows.into_iter().next().map(Comment::from))
    }

    pub async fn delete_comment(&self, id: &CommentId) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        let url = self.rest_url("post_comments", &[("id", filter.as_str())])?;
        self.send(self.request(Method::DELETE, url).header("Prefer", "return=minimal"))
            .await?;
        Ok(())
    }
}
