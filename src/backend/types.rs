//! Row shapes exchanged with the data store.
//!
//! `Raw*` types mirror what the store returns and are converted once at
//! ingestion; the rest are used as-is by the client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feed::{Author, CommentId, PostId, UserId};

// ============================================================================
// Posts
// ============================================================================

/// A `posts` row with its embedded profile and like edges.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPost {
    pub id: PostId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub content: Option<String>,
    /// Legacy single-image field, still written for older readers.
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub media_urls: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes_count: Option<i64>,
    #[serde(default)]
    pub comments_count: Option<i64>,
    #[serde(default)]
    pub profiles: Option<RawProfile>,
    #[serde(default)]
    pub post_likes: Option<Vec<RawLike>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProfile {
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Only selected for the viewer's own profile.
    #[serde(default)]
    pub user_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLike {
    pub user_id: UserId,
}

/// Insert payload for a new post.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub user_id: UserId,
    pub content: String,
    pub image_url: Option<String>,
    pub media_urls: Vec<String>,
    pub video_url: Option<String>,
}

/// Like edge insert payload: at most one per (post, user).
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewLike<'a> {
    pub post_id: &'a PostId,
    pub user_id: &'a UserId,
}

// ============================================================================
// Comments
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RawComment {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub profiles: Option<RawProfile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: Author,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Comment {
    /// True when the comment was changed after it was posted.
    pub fn is_edited(&self) -> bool {
        self.updated_at.is_some_and(|u| u > self.created_at)
    }

    pub fn is_authored_by(&self, viewer: Option<&UserId>) -> bool {
        matches!((viewer, &self.author.user_id), (Some(v), Some(a)) if v == a)
    }
}

impl From<RawComment> for Comment {
    fn from(raw: RawComment) -> Self {
        Self {
            id: raw.id,
            post_id: raw.post_id,
            author: Author::from_profile(raw.profiles, raw.user_id),
            body: raw.content.unwrap_or_default(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewComment<'a> {
    pub post_id: &'a PostId,
    pub user_id: &'a UserId,
    pub content: &'a str,
}

/// Body edit payload shared by posts and comments.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ContentUpdate<'a> {
    pub content: &'a str,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Directory (homepage sections)
// ============================================================================

/// Where a banner is placed on the home screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BannerPosition {
    #[default]
    Topo,
    Intermediario,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Banner {
    pub id: serde_json::Value,
    #[serde(default)]
    pub title: Option<String>,
    pub image_url: String,
    #[serde(default)]
    pub link_url: Option<String>,
    #[serde(default)]
    pub position: BannerPosition,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Seller contact; products without one cannot be enquired about.
    #[serde(default)]
    pub whatsapp_number: Option<String>,
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupVisibility {
    #[default]
    Public,
    Private,
    #[serde(other)]
    Other,
}

/// The company a group officially belongs to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupCompany {
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// A `groups` row with its creator and owning company embedded.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: serde_json::Value,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(rename = "type", default)]
    pub visibility: GroupVisibility,
    #[serde(default)]
    pub member_count: Option<i64>,
    #[serde(default)]
    pub creator: Option<RawProfile>,
    #[serde(default)]
    pub companies: Option<GroupCompany>,
}

impl Group {
    pub fn member_count(&self) -> u64 {
        self.member_count.map_or(0, |n| n.max(0).unsigned_abs())
    }

    /// "Official group of <company>" or "Created by <name>".
    pub fn owner_label(&self) -> String {
        match &self.companies {
            Some(company) => format!("Official group of {}", company.name),
            None => {
                let creator = Author::from_profile(self.creator.clone(), None);
                format!("Created by {}", creator.display_name())
            }
        }
    }
}

fn default_true() -> bool {
    true
}
