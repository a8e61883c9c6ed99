use reqwest::Method;

use super::client::Backend;
use super::error::BackendError;
use super::types::{ContentUpdate, NewPost, RawPost};
use crate::feed::{normalize, PageRequest, Post, PostId, PostSource, UserId};

/// Post columns plus the author profile and like edges needed for normalization.
const POST_SELECT: &str = "*,profiles(name,avatar_url,user_id),post_likes(user_id)";
const NEWEST_FIRST: &str = "created_at.desc";

impl Backend {
    /// One page of the feed, newest first.
    pub async fn fetch_feed_page(
        &self,
        request: PageRequest,
        viewer: Option<&UserId>,
    ) -> Result<Vec<Post>, BackendError> {
        let offset = request.offset.to_string();
        let limit = request.limit.to_string();
        let url = self.rest_url(
            "posts",
            &[
                ("select", POST_SELECT),
                ("order", NEWEST_FIRST),
                ("offset", offset.as_str()),
                ("limit", limit.as_str()),
            ],
        )?;

        let rows: Vec<RawPost> = self.send_json(self.request(Method::GET, url)).await?;
        tracing::debug!(
            offset = request.offset,
            limit = request.limit,
            returned = rows.len(),
            "Fetched feed page"
        );
        Ok(normalize_all(rows, viewer))
    }

    /// The newest `limit` posts (home screen section).
    pub async fn fetch_recent_posts(
        &self,
        limit: usize,
        viewer: Option<&UserId>,
    ) -> Result<Vec<Post>, BackendError> {
        let limit = limit.to_string();
        let url = self.rest_url(
            "posts",
            &[("select", POST_SELECT), ("order", NEWEST_FIRST), ("limit", limit.as_str())],
        )?;
        let rows: Vec<RawPost> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(normalize_all(rows, viewer))
    }

    /// A single post, or `None` when it does not exist or is not visible.
    pub async fn fetch_post(
        &self,
        id: &PostId,
        viewer: Option<&UserId>,
    ) -> Result<Option<Post>, BackendError> {
        let filter = format!("eq.{id}");
        let url = self.rest_url("posts", &[("select", POST_SELECT), ("id", filter.as_str()), ("limit", "1")])?;
        let rows: Vec<RawPost> = self.send_json(self.request(Method::GET, url)).await?;
        Ok(rows.into_iter().next().map(|raw| normalize(raw, viewer)))
    }

    /// Insert a post and return it as stored.
    pub async fn create_post(&self, new: &NewPost) -> Result<Post, BackendError> {
        let url = self.rest_url("posts", &[("select", POST_SELECT)])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", "return=representation")
            .json(new);

        let rows: Vec<RawPost> = self.send_json(request).await?;
        let raw = rows.into_iter().next().ok_or_else(|| BackendError::HttpStatus {
            status: 500,
            message: "insert returned no row".into(),
        })?;
        tracing::info!(post_id = %raw.id, "Post created");
        Ok(normalize(raw, Some(&new.user_id)))
    }

    /// Replace the text of a post. `None` when no row matched (deleted or not the author's).
    pub async fn update_post_body(
        &self,
        id: &PostId,
        body: &str,
        viewer: Option<&UserId>,
    ) -> Result<Option<Post>, BackendError> {
        let filter = format!("eq.{id}");
        let url = self.rest_url("posts", &[("id", filter.as_str()), ("select", POST_SELECT)])?;
        let request = self
            .request(Method::PATCH, url)
            .header("Prefer", "return=representation")
            .json(&ContentUpdate {
                content: body,
                updated_at: chrono::Utc::now(),
            });

        let rows: Vec<RawPost> = self.send_json(request).await?;
        Ok(rows.into_iter().next().map(|raw| normalize(raw, viewer)))
    }

    /// Delete a post with its comments and like edges, in that order.
    pub async fn delete_post(&self, id: &PostId) -> Result<(), BackendError> {
        let filter = format!("eq.{id}");
        for (table, column) in [("post_comments", "post_id"), ("post_likes", "post_id"), ("posts", "id")] {
            let url = self.rest_url(table, &[(column, filter.as_str())])?;
            self.send(self.request(Method::DELETE, url).header("Prefer", "return=minimal"))
                .await?;
        }
        tracing::info!(post_id = %id, "Post deleted");
        Ok(())
    }
}

impl PostSource for Backend {
    async fn fetch_feed_page(
        &self,
        request: PageRequest,
        viewer: Option<&UserId>,
    ) -> Result<Vec<Post>, BackendError> {
        Backend::fetch_feed_page(self, request, viewer).await
    }
}

fn normalize_all(rows: Vec<RawPost>, viewer: Option<&UserId>) -> Vec<Post> {
    rows.into_iter().map(|raw| normalize(raw, viewer)).collect()
}
