//! Links and messages for sharing posts and contacting sellers.

use url::Url;

use super::text::truncate_chars;
use crate::feed::Post;

const SHARE_TEXT_CHARS: usize = 100;
const WHATSAPP_BODY_CHARS: usize = 160;
const WHATSAPP_SEND: &str = "https://api.whatsapp.com/send";
const FALLBACK_BODY: &str = "Confira esta publicação";

/// Builds shareable links relative to the public site.
#[derive(Debug, Clone)]
pub struct ShareLinks {
    site: String,
}

impl ShareLinks {
    /// `site_url` is the public origin of the web app, e.g. `https://redeguara.com.br`.
    pub fn new(site_url: &str) -> Self {
        Self {
            site: site_url.trim_end_matches('/').to_string(),
        }
    }

    /// Clean link shown to people: `<site>/post/<id>`.
    pub fn direct_url(&self, post: &Post) -> String {
        format!("{}/post/{}", self.site, post.id)
    }

    /// Link for social networks: `<site>/post-preview/<id>` carries the
    /// preview card metadata crawlers read.
    pub fn preview_url(&self, post: &Post) -> String {
        format!("{}/post-preview/{}", self.site, post.id)
    }

    /// `<author> compartilhou: <body, 100 chars>`.
    pub fn share_text(&self, post: &Post) -> String {
        let name = post.author.name.as_deref().unwrap_or("um usuário");
        format!("{name} compartilhou: {}", body_excerpt(post, SHARE_TEXT_CHARS))
    }

    /// WhatsApp send link with the author, a 160-character excerpt and the preview link.
    pub fn whatsapp_url(&self, post: &Post) -> String {
        let author = post.author.name.as_deref().unwrap_or("RedeGuara");
        let message = format!(
            "*{author}* na RedeGuara:\n\n{}\n\n{}",
            body_excerpt(post, WHATSAPP_BODY_CHARS),
            self.preview_url(post)
        );
        with_text(WHATSAPP_SEND, &message)
    }
}

/// Direct chat link to a seller about a listing. `None` when the seller
/// left no phone number.
pub fn seller_contact_url(phone: Option<&str>, listing: &str) -> Option<String> {
    let digits: String = phone?.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let message = format!(
        "Olá! Vi seu produto \"{listing}\" na RedeGuara e gostaria de mais informações."
    );
    Some(with_text(&format!("https://wa.me/{digits}"), &message))
}

fn body_excerpt(post: &Post, max_chars: usize) -> String {
    if post.body.trim().is_empty() {
        return FALLBACK_BODY.to_string();
    }
    truncate_chars(&post.body, max_chars).into_owned()
}

/// Append `?text=<message>` with the message percent-encoded.
fn with_text(base: &str, message: &str) -> String {
    match Url::parse(base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("text", message);
            url.into()
        }
        Err(_) => base.to_string(),
    }
}
