//! Home screen sections and their session cache.
//!
//! The home screen shows four independent sections. Each one is cached on
//! its own key, fetched concurrently, and may fail without affecting the
//! other three.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;

use crate::backend::{Backend, BackendError, Banner, BannerPosition, Company, Product};
use crate::cache::{CachePolicy, SessionCache};
use crate::feed::{Post, UserId};

pub const BANNERS_KEY: &str = "home_banners";
pub const POSTS_KEY: &str = "home_posts";
pub const COMPANIES_KEY: &str = "home_companies";
pub const PRODUCTS_KEY: &str = "home_products";

pub const BANNER_LIMIT: usize = 15;
pub const POST_LIMIT: usize = 20;
pub const COMPANY_LIMIT: usize = 10;
pub const PRODUCT_LIMIT: usize = 10;

/// One home section: its rows, or the error that prevented loading them.
pub type Section<T> = Result<Vec<T>, BackendError>;

#[derive(Debug)]
pub struct HomeData {
    pub banners: Section<Banner>,
    pub posts: Section<Post>,
    pub companies: Section<Company>,
    pub products: Section<Product>,
}

impl HomeData {
    /// Active banners for the top carousel.
    pub fn top_banners(&self) -> Vec<&Banner> {
        self.banners_at(BannerPosition::Topo)
    }

    /// Active banners placed between sections.
    pub fn intermediate_banners(&self) -> Vec<&Banner> {
        self.banners_at(BannerPosition::Intermediario)
    }

    fn banners_at(&self, position: BannerPosition) -> Vec<&Banner> {
        match &self.banners {
            Ok(banners) => banners
                .iter()
                .filter(|b| b.is_active && b.position == position)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Sections that failed, with their cache keys.
    pub fn failures(&self) -> Vec<(&'static str, &BackendError)> {
        let mut failed = Vec::new();
        if let Err(e) = &self.banners {
            failed.push((BANNERS_KEY, e));
        }
        if let Err(e) = &self.posts {
            failed.push((POSTS_KEY, e));
        }
        if let Err(e) = &self.companies {
            failed.push((COMPANIES_KEY, e));
        }
        if let Err(e) = &self.products {
            failed.push((PRODUCTS_KEY, e));
        }
        failed
    }
}

/// Loads [`HomeData`] through a shared [`SessionCache`].
///
/// Cloning shares the cache.
#[derive(Clone)]
pub struct HomeLoader {
    backend: Backend,
    cache: SessionCache,
    ttl: Duration,
}

impl HomeLoader {
    pub fn new(backend: Backend, cache: SessionCache, ttl: Duration) -> Self {
        Self {
            backend,
            cache,
            ttl,
        }
    }

    /// Load all four sections. `CachePolicy::Reload` refetches every one.
    pub async fn load(&self, viewer: Option<&UserId>, policy: CachePolicy) -> HomeData {
        let backend = &self.backend;
        let (banners, posts, companies, products) = tokio::join!(
            self.section(BANNERS_KEY, policy, backend.fetch_banners(BANNER_LIMIT)),
            self.section(POSTS_KEY, policy, backend.fetch_recent_posts(POST_LIMIT, viewer)),
            self.section(COMPANIES_KEY, policy, backend.fetch_companies(COMPANY_LIMIT)),
            self.section(PRODUCTS_KEY, policy, backend.fetch_products(PRODUCT_LIMIT)),
        );

        let data = HomeData {
            banners,
            posts,
            companies,
            products,
        };
        for (key, error) in data.failures() {
            tracing::warn!(section = key, error = %error, "Home section failed to load");
        }
        data
    }

    /// The cached posts carry like state, so they go stale on a new post,
    /// a like toggle or a change of viewer.
    pub fn invalidate_posts(&self) {
        self.cache.invalidate(POSTS_KEY);
    }

    async fn section<T, Fut>(&self, key: &str, policy: CachePolicy, fetch: Fut) -> Section<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Section<T>>,
    {
        self.cache
            .get_with_policy(key, self.ttl, policy, move || fetch)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn banner(position: BannerPosition, is_active: bool) -> Banner {
        Banner {
            id: json!(1),
            title: None,
            image_url: "https://cdn.example.com/b.jpg".into(),
            link_url: None,
            position,
            is_active,
        }
    }

    fn data_with_banners(banners: Vec<Banner>) -> HomeData {
        HomeData {
            banners: Ok(banners),
            posts: Ok(Vec::new()),
            companies: Ok(Vec::new()),
            products: Ok(Vec::new()),
        }
    }

    #[test]
    fn test_banners_split_by_position_and_activity() {
        let data = data_with_banners(vec![
            banner(BannerPosition::Topo, true),
            banner(BannerPosition::Topo, false),
            banner(BannerPosition::Intermediario, true),
            banner(BannerPosition::Other, true),
        ]);
        assert_eq!(data.top_banners().len(), 1);
        assert_eq!(data.intermediate_banners().len(), 1);
    }

    async fn mount_sections(server: &MockServer, products_status: u16) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_random_banners"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "image_url": "https://cdn.example.com/b.jpg", "position": "topo"}
            ])))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/rpc/get_random_companies"))
            .respond_with(ResponseTemplate::new(200).set_body_string("null"))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/products"))
            .respond_with(ResponseTemplate::new(products_status).set_body_json(json!([])))
            .mount(server)
            .await;
    }

    fn loader(uri: &str) -> HomeLoader {
        let backend = Backend::new(uri, SecretString::from("anon".to_string())).unwrap();
        HomeLoader::new(backend, SessionCache::default(), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_failed_section_does_not_block_others() {
        let server = MockServer::start().await;
        mount_sections(&server, 500).await;

        let data = loader(&server.uri()).load(None, CachePolicy::Default).await;
        assert_eq!(data.banners.as_ref().map(Vec::len).ok(), Some(1));
        assert!(data.companies.as_ref().is_ok_and(Vec::is_empty));
        assert!(data.posts.is_ok());
        assert!(data.products.is_err());
        assert_eq!(data.failures().len(), 1);
    }

    #[tokio::test]
    async fn test_second_load_is_served_from_cache() {
        let server = MockServer::start().await;
        mount_sections(&server, 200).await;
        let loader = loader(&server.uri());

        loader.load(None, CachePolicy::Default).await;
        let first = server.received_requests().await.unwrap_or_default().len();
        assert_eq!(first, 4);

        loader.load(None, CachePolicy::Default).await;
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 4);

        loader.invalidate_posts();
        loader.load(None, CachePolicy::Default).await;
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 5);

        loader.load(None, CachePolicy::Reload).await;
        assert_eq!(server.received_requests().await.unwrap_or_default().len(), 9);
    }
}
