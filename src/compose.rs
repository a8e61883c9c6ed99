//! Drafting and publishing new posts.
//!
//! Every limit is checked locally before anything is uploaded, so a
//! rejected draft never leaves objects behind in storage.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::backend::storage::{IMAGE_BUCKET, VIDEO_BUCKET};
use crate::backend::{Backend, NewPost};
use crate::error::ActionError;
use crate::feed::{Post, UserId};

pub const MAX_IMAGES: usize = 4;
pub const MAX_IMAGE_BYTES: u64 = 15 * 1024 * 1024; // 15MB
pub const MAX_VIDEO_BYTES: u64 = 80 * 1024 * 1024; // 80MB
pub const MAX_VIDEO_DURATION: Duration = Duration::from_secs(45);
/// Slack allowed over [`MAX_VIDEO_DURATION`] for container rounding.
const DURATION_TOLERANCE: Duration = Duration::from_secs(1);

/// A draft or text rejected before any remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Write something or attach a photo or video")]
    Empty,
    #[error("Text cannot be blank")]
    BlankText,
    #[error("At most {MAX_IMAGES} images per post")]
    TooManyImages,
    #[error("{name} exceeds 15MB")]
    ImageTooLarge { name: String },
    #[error("Video must be at most 80MB")]
    VideoTooLarge,
    #[error("Video is longer than 45 seconds")]
    VideoTooLong,
    #[error("Only one video per post")]
    MultipleVideos,
    #[error("{name}: unsupported file type ({content_type})")]
    UnsupportedType { name: String, content_type: String },
}

/// Trim `text` and refuse it when nothing is left (comments and edits).
pub fn validate_text(text: &str) -> Result<&str, ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(ValidationError::BlankText)
    } else {
        Ok(trimmed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    fn of(content_type: &str) -> Option<Self> {
        let major = content_type.split('/').next()?.trim();
        match major {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    fn bucket(self) -> &'static str {
        match self {
            MediaKind::Image => IMAGE_BUCKET,
            MediaKind::Video => VIDEO_BUCKET,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            MediaKind::Image => "img",
            MediaKind::Video => "vid",
        }
    }
}

/// A file attached to a draft.
#[derive(Clone)]
pub struct Attachment {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    /// Video length when known; unknown lengths are not checked.
    pub duration: Option<Duration>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("size", &self.bytes.len())
            .field("duration", &self.duration)
            .finish()
    }
}

impl Attachment {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Read a file from disk, deriving the content type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let content_type = content_type_for(path).to_string();
        Ok(Self::new(name, content_type, bytes))
    }

    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::of(&self.content_type)
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Content type for the common photo and video extensions.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// A post being written: text, up to four images and at most one video.
#[derive(Debug, Clone, Default)]
pub struct PostDraft {
    pub text: String,
    images: Vec<Attachment>,
    video: Option<Attachment>,
}

impl PostDraft {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn images(&self) -> &[Attachment] {
        &self.images
    }

    pub fn video(&self) -> Option<&Attachment> {
        self.video.as_ref()
    }

    /// Attach a file, checking it against the limits. A rejected file
    /// leaves the draft unchanged.
    pub fn attach(&mut self, attachment: Attachment) -> Result<(), ValidationError> {
        match check_attachment(&attachment)? {
            MediaKind::Image => {
                if self.images.len() >= MAX_IMAGES {
                    return Err(ValidationError::TooManyImages);
                }
                self.images.push(attachment);
            }
            MediaKind::Video => {
                if self.video.is_some() {
                    return Err(ValidationError::MultipleVideos);
                }
                self.video = Some(attachment);
            }
        }
        Ok(())
    }

    pub fn has_media(&self) -> bool {
        !self.images.is_empty() || self.video.is_some()
    }

    /// Check the whole draft: it needs text or media, and every attachment
    /// must be within limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() && !self.has_media() {
            return Err(ValidationError::Empty);
        }
        if self.images.len() > MAX_IMAGES {
            return Err(ValidationError::TooManyImages);
        }
        for attachment in self.images.iter().chain(self.video.as_ref()) {
            check_attachment(attachment)?;
        }
        Ok(())
    }

    /// Upload the media and insert the post.
    ///
    /// Returns the stored post, ready for the feed's prepend. Nothing is
    /// uploaded when the viewer is missing or the draft is invalid.
    pub async fn publish(self, backend: &Backend, viewer: Option<&UserId>) -> Result<Post, ActionError> {
        let viewer = viewer.ok_or(ActionError::Unauthenticated)?;
        self.validate()?;

        let mut media_urls = Vec::with_capacity(self.images.len());
        for image in self.images {
            media_urls.push(upload(backend, viewer, MediaKind::Image, image).await?);
        }
        let video_url = match self.video {
            Some(video) => Some(upload(backend, viewer, MediaKind::Video, video).await?),
            None => None,
        };

        let new_post = NewPost {
            user_id: viewer.clone(),
            content: self.text.trim().to_string(),
            image_url: media_urls.first().cloned(),
            media_urls,
            video_url,
        };
        Ok(backend.create_post(&new_post).await?)
    }
}

fn check_attachment(attachment: &Attachment) -> Result<MediaKind, ValidationError> {
    let kind = attachment
        .kind()
        .ok_or_else(|| ValidationError::UnsupportedType {
            name: attachment.name.clone(),
            content_type: attachment.content_type.clone(),
        })?;

    match kind {
        MediaKind::Image if attachment.size() > MAX_IMAGE_BYTES => {
            Err(ValidationError::ImageTooLarge {
                name: attachment.name.clone(),
            })
        }
        MediaKind::Video if attachment.size() > MAX_VIDEO_BYTES => Err(ValidationError::VideoTooLarge),
        MediaKind::Video
            if attachment
                .duration
                .is_some_and(|d| d > MAX_VIDEO_DURATION + DURATION_TOLERANCE) =>
        {
            Err(ValidationError::VideoTooLong)
        }
        kind => Ok(kind),
    }
}

async fn upload(
    backend: &Backend,
    viewer: &UserId,
    kind: MediaKind,
    attachment: Attachment,
) -> Result<String, ActionError> {
    let path = object_name(viewer, kind);
    let stored = backend
        .upload_object(kind.bucket(), &path, attachment.bytes, &attachment.content_type)
        .await?;
    Ok(backend.public_url(kind.bucket(), &stored)?.to_string())
}

/// `<user>/<unix millis>_<img|vid>_<9 random base-36 chars>`.
fn object_name(viewer: &UserId, kind: MediaKind) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{viewer}/{millis}_{}_{}", kind.tag(), random_suffix())
}

const SUFFIX_LEN: usize = 9;

fn random_suffix() -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut n = Uuid::new_v4().as_u128();
    (0..SUFFIX_LEN)
        .map(|_| {
            let c = DIGITS[(n % 36) as usize] as char;
            n /= 36;
            c
        })
        .collect()
}
