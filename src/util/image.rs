//! Rewriting storage image URLs to the on-the-fly resize endpoint.
//!
//! Public object URLs (`.../storage/v1/object/public/<bucket>/<path>`) have a
//! sibling render endpoint (`.../storage/v1/render/image/public/...`) that
//! accepts `width`, `height`, `quality` and `resize` query parameters. Other
//! URLs are passed through untouched.

use std::borrow::Cow;
use url::Url;

/// Marker identifying a hosted-project public object URL.
const HOSTED_PUBLIC_MARKER: &str = "supabase.co/storage/v1/object/public";

pub const DEFAULT_QUALITY: u8 = 75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeMode {
    #[default]
    Cover,
    Contain,
    Fill,
    /// Send no `resize` parameter.
    None,
}

impl ResizeMode {
    fn as_param(self) -> Option<&'static str> {
        match self {
            ResizeMode::Cover => Some("cover"),
            ResizeMode::Contain => Some("contain"),
            ResizeMode::Fill => Some("fill"),
            ResizeMode::None => None,
        }
    }
}

/// Requested rendition of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransform {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// 0 sends no `quality` parameter.
    pub quality: u8,
    pub resize: ResizeMode,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: DEFAULT_QUALITY,
            resize: ResizeMode::Cover,
        }
    }
}

impl ImageTransform {
    /// Square box of `side` pixels.
    pub fn square(side: u32, resize: ResizeMode) -> Self {
        Self {
            width: Some(side),
            height: Some(side),
            resize,
            ..Self::default()
        }
    }

    fn query(&self) -> Vec<String> {
        let mut params = Vec::with_capacity(4);
        if let Some(w) = self.width.filter(|w| *w > 0) {
            params.push(format!("width={w}"));
        }
        if let Some(h) = self.height.filter(|h| *h > 0) {
            params.push(format!("height={h}"));
        }
        if self.quality > 0 {
            params.push(format!("quality={}", self.quality));
        }
        if let Some(resize) = self.resize.as_param() {
            params.push(format!("resize={resize}"));
        }
        params
    }
}

/// Rewrite a hosted-project public object URL to its resize rendition.
///
/// ```
/// use redeguara::util::{optimize_image_url, ImageTransform, ResizeMode};
///
/// let url = "https://abc.supabase.co/storage/v1/object/public/post-images/u/1.jpg";
/// assert_eq!(
///     optimize_image_url(url, &ImageTransform::square(800, ResizeMode::Contain)),
///     "https://abc.supabase.co/storage/v1/render/image/public/post-images/u/1.jpg\
///      ?width=800&height=800&quality=75&resize=contain"
/// );
/// assert_eq!(optimize_image_url("https://cdn.example.com/a.jpg", &ImageTransform::default()),
///            "https://cdn.example.com/a.jpg");
/// ```
pub fn optimize_image_url<'a>(url: &'a str, transform: &ImageTransform) -> Cow<'a, str> {
    if !url.contains(HOSTED_PUBLIC_MARKER) {
        return Cow::Borrowed(url);
    }
    rewrite(url, transform)
}

/// Rewrites images served by one particular project, including
/// self-hosted or local projects whose host is not the hosted domain.
#[derive(Debug, Clone)]
pub struct ImageRewriter {
    project_prefix: String,
}

impl ImageRewriter {
    pub fn for_project(base_url: &Url) -> Self {
        let base = base_url.as_str().trim_end_matches('/');
        Self {
            project_prefix: format!("{base}/storage/v1/object/public/"),
        }
    }

    pub fn rewrite<'a>(&self, url: &'a str, transform: &ImageTransform) -> Cow<'a, str> {
        if url.starts_with(&self.project_prefix) || url.contains(HOSTED_PUBLIC_MARKER) {
            rewrite(url, transform)
        } else {
            Cow::Borrowed(url)
        }
    }
}

fn rewrite<'a>(url: &'a str, transform: &ImageTransform) -> Cow<'a, str> {
    let mut out = url.replacen("/object/public/", "/render/image/public/", 1);
    let params = transform.query();
    if !params.is_empty() {
        out.push(if out.contains('?') { '&' } else { '?' });
        out.push_str(&params.join("&"));
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC: &str = "https://abc.supabase.co/storage/v1/object/public/post-images/u/1.jpg";

    #[test]
    fn test_resize_none_omits_param() {
        let t = ImageTransform {
            width: Some(40),
            height: None,
            quality: 90,
            resize: ResizeMode::None,
        };
        assert_eq!(
            optimize_image_url(PUBLIC, &t),
            "https://abc.supabase.co/storage/v1/render/image/public/post-images/u/1.jpg?width=40&quality=90"
        );
    }

    #[test]
    fn test_existing_query_uses_ampersand() {
        let url = format!("{PUBLIC}?v=2");
        let out = optimize_image_url(&url, &ImageTransform::default());
        assert!(out.ends_with("1.jpg?v=2&quality=75&resize=cover"), "{out}");
    }

    #[test]
    fn test_foreign_urls_untouched() {
        let url = "https://example.com/storage/v1/object/public/x.jpg";
        assert!(matches!(optimize_image_url(url, &ImageTransform::default()), Cow::Borrowed(_)));
    }

    #[test]
    fn test_rewriter_handles_local_project() {
        let base = Url::parse("http://127.0.0.1:54321/").unwrap();
        let rewriter = ImageRewriter::for_project(&base);
        let url = "http://127.0.0.1:54321/storage/v1/object/public/post-images/a.png";
        assert_eq!(
            rewriter.rewrite(url, &ImageTransform::square(1200, ResizeMode::Contain)),
            "http://127.0.0.1:54321/storage/v1/render/image/public/post-images/a.png?width=1200&height=1200&quality=75&resize=contain"
        );
        assert_eq!(rewriter.rewrite("https://other/a.png", &ImageTransform::default()), "https://other/a.png");
    }
}
