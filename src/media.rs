//! Per-post media carousel state.
//!
//! One [`Carousel`] exists per rendered post. It owns the image cursor, which
//! the inline view and the full-screen lightbox both read, and the playback
//! state of the post's video.

use std::borrow::Cow;

use crate::util::{optimize_image_url, ImageRewriter, ImageTransform, ResizeMode};

/// Requested edge length of images shown in a list.
pub const LIST_IMAGE_SIZE: u32 = 800;
/// Requested edge length of images shown on a single post.
pub const DETAIL_IMAGE_SIZE: u32 = 1200;

/// Where the carousel is embedded; decides video behavior and image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Feed or home list: the video waits for an explicit play.
    Deferred,
    /// Single-post detail: the video autoplays and loops.
    Eager,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoState {
    /// Placeholder shown; nothing is loaded yet.
    Idle,
    Playing,
}

#[derive(Debug, Clone)]
pub struct Carousel {
    images: Vec<String>,
    video: Option<String>,
    mode: PlaybackMode,
    current: usize,
    lightbox_open: bool,
    video_state: VideoState,
    visible: bool,
}

impl Carousel {
    pub fn new(images: Vec<String>, video: Option<String>, mode: PlaybackMode) -> Self {
        let video_state = match mode {
            PlaybackMode::Eager if video.is_some() => VideoState::Playing,
            _ => VideoState::Idle,
        };
        Self {
            images,
            video,
            mode,
            current: 0,
            lightbox_open: false,
            video_state,
            visible: false,
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Nothing to draw: no images and no video.
    pub fn is_renderable(&self) -> bool {
        !self.images.is_empty() || self.video.is_some()
    }

    /// Navigation only exists with two or more images.
    pub fn can_navigate(&self) -> bool {
        self.images.len() > 1
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_image(&self) -> Option<&str> {
        self.images.get(self.current).map(String::as_str)
    }

    pub fn next(&mut self) {
        if !self.images.is_empty() {
            self.current = (self.current + 1) % self.images.len();
        }
    }

    pub fn prev(&mut self) {
        if !self.images.is_empty() {
            let len = self.images.len();
            self.current = (self.current + len - 1) % len;
        }
    }

    /// `"2 / 3"`, only when there is more than one image.
    pub fn counter_label(&self) -> Option<String> {
        self.can_navigate()
            .then(|| format!("{} / {}", self.current + 1, self.images.len()))
    }

    /// Replace the image list (post edited or refetched). The cursor goes
    /// back to the first image if it no longer points inside the list.
    pub fn set_images(&mut self, images: Vec<String>) {
        self.images = images;
        if self.current >= self.images.len() {
            self.current = 0;
        }
    }

    // ========================================================================
    // Lightbox
    // ========================================================================

    /// Open the full-screen view on the current image.
    pub fn open_lightbox(&mut self) -> bool {
        if self.images.is_empty() {
            return false;
        }
        self.lightbox_open = true;
        true
    }

    pub fn close_lightbox(&mut self) {
        self.lightbox_open = false;
    }

    pub fn is_lightbox_open(&self) -> bool {
        self.lightbox_open
    }

    // ========================================================================
    // Video
    // ========================================================================

    pub fn video(&self) -> Option<&str> {
        self.video.as_deref()
    }

    pub fn video_state(&self) -> VideoState {
        self.video_state
    }

    /// Start the video (the placeholder was activated).
    pub fn play_video(&mut self) -> bool {
        if self.video.is_none() {
            return false;
        }
        self.video_state = VideoState::Playing;
        true
    }

    pub fn autoplay(&self) -> bool {
        self.mode == PlaybackMode::Eager
    }

    pub fn loops(&self) -> bool {
        self.mode == PlaybackMode::Eager
    }

    // ========================================================================
    // Lazy decode
    // ========================================================================

    /// The carousel scrolled into view. Trigger-once: it stays loaded after.
    pub fn mark_visible(&mut self) {
        self.visible = true;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Resize transform for this carousel's context.
    pub fn image_transform(&self) -> ImageTransform {
        let side = match self.mode {
            PlaybackMode::Deferred => LIST_IMAGE_SIZE,
            PlaybackMode::Eager => DETAIL_IMAGE_SIZE,
        };
        ImageTransform::square(side, ResizeMode::Contain)
    }

    /// URL to request for the current image, or `None` until the carousel
    /// has been visible once.
    pub fn image_request_url(&self, rewriter: Option<&ImageRewriter>) -> Option<Cow<'_, str>> {
        if !self.visible {
            return None;
        }
        let url = self.current_image()?;
        let transform = self.image_transform();
        Some(match rewriter {
            Some(r) => r.rewrite(url, &transform),
            None => optimize_image_url(url, &transform),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn images(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cdn.example.com/{i}.jpg")).collect()
    }

    #[test]
    fn test_prev_from_zero_wraps_to_last() {
        let mut c = Carousel::new(images(3), None, PlaybackMode::Deferred);
        c.prev();
        assert_eq!(c.current_index(), 2);
        assert_eq!(c.counter_label().as_deref(), Some("3 / 3"));
    }

    #[test]
    fn test_empty_carousel_is_inert() {
        let mut c = Carousel::new(Vec::new(), None, PlaybackMode::Deferred);
        c.next();
        c.prev();
        assert_eq!(c.current_index(), 0);
        assert!(!c.is_renderable());
        assert!(!c.open_lightbox());
        assert!(c.counter_label().is_none());
        assert!(c.current_image().is_none());
    }

    #[test]
    fn test_single_image_has_no_counter() {
        let c = Carousel::new(images(1), None, PlaybackMode::Deferred);
        assert!(c.counter_label().is_none());
        assert!(!c.can_navigate());
    }

    #[test]
    fn test_lightbox_shares_cursor() {
        let mut c = Carousel::new(images(4), None, PlaybackMode::Eager);
        c.next();
        assert!(c.open_lightbox());
        c.next();
        c.close_lightbox();
        assert_eq!(c.current_index(), 2);
        assert!(!c.is_lightbox_open());
    }

    #[test]
    fn test_video_deferred_in_lists_eager_in_detail() {
        let video = Some("https://cdn.example.com/v.mp4".to_string());

        let mut list = Carousel::new(Vec::new(), video.clone(), PlaybackMode::Deferred);
        assert_eq!(list.video_state(), VideoState::Idle);
        assert!(!list.autoplay());
        assert!(list.play_video());
        assert_eq!(list.video_state(), VideoState::Playing);

        let detail = Carousel::new(Vec::new(), video, PlaybackMode::Eager);
        assert_eq!(detail.video_state(), VideoState::Playing);
        assert!(detail.autoplay() && detail.loops());
        assert!(detail.is_renderable());
    }

    #[test]
    fn test_set_images_clamps_cursor() {
        let mut c = Carousel::new(images(3), None, PlaybackMode::Deferred);
        c.prev();
        c.set_images(images(2));
        assert_eq!(c.current_index(), 0);
    }

    #[test]
    fn test_image_not_requested_until_visible() {
        let url = "https://abc.supabase.co/storage/v1/object/public/post-images/a.jpg".to_string();
        let mut c = Carousel::new(vec![url], None, PlaybackMode::Deferred);
        assert!(c.image_request_url(None).is_none());

        c.mark_visible();
        let requested = c.image_request_url(None).unwrap();
        assert!(requested.contains("/render/image/public/"));
        assert!(requested.ends_with("width=800&height=800&quality=75&resize=contain"));
    }

    proptest! {
        #[test]
        fn prop_next_n_times_returns_to_start(n in 1usize..20, start in 0usize..20) {
            let mut c = Carousel::new(images(n), None, PlaybackMode::Deferred);
            for _ in 0..(start % n) {
                c.next();
            }
            let origin = c.current_index();
            for _ in 0..n {
                c.next();
                prop_assert!(c.current_index() < n);
            }
            prop_assert_eq!(c.current_index(), origin);
        }

        #[test]
        fn prop_prev_undoes_next(n in 1usize..20, steps in 0usize..50) {
            let mut c = Carousel::new(images(n), None, PlaybackMode::Deferred);
            for _ in 0..steps {
                c.next();
            }
            for _ in 0..steps {
                c.prev();
            }
            prop_assert_eq!(c.current_index(), 0);
        }
    }
}
