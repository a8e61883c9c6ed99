use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{PostId, UserId};
use crate::backend::types::{RawPost, RawProfile};

/// Name shown when a post's author profile is missing or blank.
pub const ANONYMOUS_NAME: &str = "Usuário";

/// Author reference embedded in a post or comment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Author {
    pub user_id: Option<UserId>,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(ANONYMOUS_NAME)
    }

    pub(crate) fn from_profile(profile: Option<RawProfile>, fallback_user: Option<UserId>) -> Self {
        match profile {
            Some(p) => Self {
                user_id: p.user_id.or(fallback_user),
                name: non_blank(p.name),
                avatar_url: non_blank(p.avatar_url),
            },
            None => Self {
                user_id: fallback_user,
                ..Self::default()
            },
        }
    }
}

/// The like fields of a post: the slice an optimistic toggle snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LikeState {
    pub like_count: u32,
    pub viewer_has_liked: bool,
}

impl LikeState {
    /// Flip `viewer_has_liked` and move `like_count` by exactly one, never below zero.
    pub fn toggle(&mut self) {
        if self.viewer_has_liked {
            self.like_count = self.like_count.saturating_sub(1);
        } else {
            self.like_count = self.like_count.saturating_add(1);
        }
        self.viewer_has_liked = !self.viewer_has_liked;
    }
}

/// A post as the client renders it, normalized once at ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author: Author,
    pub body: String,
    /// Ordered image URLs; never contains blank entries.
    pub media: Vec<String>,
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: LikeState,
    pub comment_count: u32,
}

impl Post {
    pub fn like_count(&self) -> u32 {
        self.likes.like_count
    }

    pub fn viewer_has_liked(&self) -> bool {
        self.likes.viewer_has_liked
    }

    pub fn has_media(&self) -> bool {
        !self.media.is_empty() || self.video.is_some()
    }

    /// True when the viewer is the author (may edit or delete).
    pub fn is_authored_by(&self, viewer: Option<&UserId>) -> bool {
        matches!((viewer, &self.author.user_id), (Some(v), Some(a)) if v == a)
    }
}

/// Convert a raw data-store row into a [`Post`].
///
/// The media list prefers the multi-media field; when that has no usable
/// entry and the legacy single-image field is set, the list is that one
/// image. `like_count` and `viewer_has_liked` come from the embedded
/// like-edge list when the row carries one.
pub fn normalize(raw: RawPost, viewer: Option<&UserId>) -> Post {
    let media = normalize_media(raw.media_urls, raw.image_url);

    let likes = match raw.post_likes {
        Some(edges) => LikeState {
            like_count: clamp_count(edges.len() as i64),
            viewer_has_liked: viewer.is_some_and(|v| edges.iter().any(|e| &e.user_id == v)),
        },
        None => LikeState {
            like_count: clamp_count(raw.likes_count.unwrap_or(0)),
            viewer_has_liked: false,
        },
    };

    Post {
        id: raw.id,
        author: Author::from_profile(raw.profiles, raw.user_id),
        body: raw.content.unwrap_or_default(),
        media,
        video: non_blank(raw.video_url),
        created_at: raw.created_at,
        likes,
        comment_count: clamp_count(raw.comments_count.unwrap_or(0)),
    }
}

/// Media list normalization: multi-media entries first, legacy image as fallback.
pub fn normalize_media(media_urls: Option<Vec<Option<String>>>, image_url: Option<String>) -> Vec<String> {
    let media: Vec<String> = media_urls
        .unwrap_or_default()
        .into_iter()
        .filter_map(non_blank)
        .collect();

    if !media.is_empty() {
        return media;
    }

    non_blank(image_url).into_iter().collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

fn clamp_count(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A minimal post with the given id and like state.
    pub fn post(id: &str, like_count: u32, viewer_has_liked: bool) -> Post {
        Post {
            id: PostId::new(id),
            author: Author {
                user_id: Some(UserId::new("author")),
                name: Some("Ana".into()),
                avatar_url: None,
            },
            body: format!("post {id}"),
            media: Vec::new(),
            video: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            likes: LikeState {
                like_count,
                viewer_has_liked,
            },
            comment_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn raw(json: serde_json::Value) -> RawPost {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_legacy_image_becomes_singleton_media() {
        let post = normalize(
            raw(serde_json::json!({
                "id": 1,
                "content": "oi",
                "image_url": "https://x.supabase.co/a.jpg",
                "media_urls": [],
                "created_at": "2024-05-01T12:00:00Z"
            })),
            None,
        );
        assert_eq!(post.media, vec!["https://x.supabase.co/a.jpg".to_string()]);
        assert_eq!(post.id.as_str(), "1");
    }

    #[test]
    fn test_media_urls_win_over_legacy_image() {
        let post = normalize(
            raw(serde_json::json!({
                "id": "p",
                "image_url": "legacy.jpg",
                "media_urls": ["a.jpg", "", null, "b.jpg"],
                "created_at": "2024-05-01T12:00:00Z"
            })),
            None,
        );
        assert_eq!(post.media, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    }

    #[test]
    fn test_no_media_fields_gives_empty_list() {
        let post = normalize(
            raw(serde_json::json!({
                "id": "p",
                "created_at": "2024-05-01T12:00:00Z"
            })),
            None,
        );
        assert!(post.media.is_empty());
        assert!(post.video.is_none());
        assert_eq!(post.body, "");
    }

    #[test]
    fn test_like_fields_from_embedded_edges() {
        let row = serde_json::json!({
            "id": "p",
            "created_at": "2024-05-01T12:00:00Z",
            "likes_count": 99,
            "post_likes": [{"user_id": "u1"}, {"user_id": "u2"}]
        });
        let viewer = UserId::new("u2");

        let post = normalize(raw(row.clone()), Some(&viewer));
        assert_eq!(post.likes, LikeState { like_count: 2, viewer_has_liked: true });

        let anonymous = normalize(raw(row), None);
        assert!(!anonymous.viewer_has_liked());
    }

    #[test]
    fn test_like_count_falls_back_to_counter_and_clamps() {
        let post = normalize(
            raw(serde_json::json!({
                "id": "p",
                "created_at": "2024-05-01T12:00:00Z",
                "likes_count": -3
            })),
            None,
        );
        assert_eq!(post.like_count(), 0);
    }

    #[test]
    fn test_missing_profile_renders_placeholder_name() {
        let post = normalize(
            raw(serde_json::json!({
                "id": "p",
                "user_id": "u9",
                "created_at": "2024-05-01T12:00:00Z",
                "profiles": null
            })),
            None,
        );
        assert_eq!(post.author.display_name(), ANONYMOUS_NAME);
        assert_eq!(post.author.user_id, Some(UserId::new("u9")));
        assert!(post.is_authored_by(Some(&UserId::new("u9"))));
        assert!(!post.is_authored_by(None));
    }

    #[test]
    fn test_toggle_never_goes_below_zero() {
        let mut likes = LikeState {
            like_count: 0,
            viewer_has_liked: true,
        };
        likes.toggle();
        assert_eq!(likes, LikeState { like_count: 0, viewer_has_liked: false });
    }

    proptest! {
        #[test]
        fn prop_media_nonempty_iff_any_field_usable(
            urls in proptest::option::of(proptest::collection::vec(
                proptest::option::of(prop_oneof!["", "  ", "[a-z]{1,8}\\.jpg"]), 0..5)),
            legacy in proptest::option::of(prop_oneof!["", "[a-z]{1,8}\\.png"]),
        ) {
            let usable = |s: &Option<String>| s.as_ref().is_some_and(|s| !s.trim().is_empty());
            let any_multi = urls.as_ref().is_some_and(|v| v.iter().any(usable));
            let any_legacy = usable(&legacy);

            let media = normalize_media(urls, legacy);

            prop_assert_eq!(!media.is_empty(), any_multi || any_legacy);
            prop_assert!(media.iter().all(|m| !m.trim().is_empty()));
        }

        #[test]
        fn prop_double_toggle_restores_state(count in 0u32..1000, liked in any::<bool>()) {
            let original = LikeState { like_count: count, viewer_has_liked: liked };
            let mut likes = original;
            likes.toggle();
            let expected_delta = if liked && count == 0 { 0 } else { 1 };
            prop_assert_eq!(likes.viewer_has_liked, !liked);
            prop_assert_eq!(likes.like_count.abs_diff(count), expected_delta);
            likes.toggle();
            if count > 0 || !liked {
                prop_assert_eq!(likes, original);
            }
        }
    }
}
