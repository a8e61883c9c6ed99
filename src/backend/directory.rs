use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::client::Backend;
use super::error::BackendError;
use super::types::{Banner, Company, Group, Product};

impl Backend {
    /// A random selection of banners.
    pub async fn fetch_banners(&self, limit: usize) -> Result<Vec<Banner>, BackendError> {
        self.call_rpc("get_random_banners", json!({ "limit_count": limit }))
            .await
    }

    /// A random selection of directory companies.
    pub async fn fetch_companies(&self, limit: usize) -> Result<Vec<Company>, BackendError> {
        self.call_rpc("get_random_companies", json!({ "limit_count": limit }))
            .await
    }

    /// The newest approved marketplace products.
    pub async fn fetch_products(&self, limit: usize) -> Result<Vec<Product>, BackendError> {
        let limit = limit.to_string();
        let url = self.rest_url(
            "products",
            &[
                ("select", "*"),
                ("status", "eq.approved"),
                ("order", "created_at.desc"),
                ("limit", limit.as_str()),
            ],
        )?;
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Groups, newest first. A search term matches the name or description.
    pub async fn fetch_groups(&self, search: Option<&str>) -> Result<Vec<Group>, BackendError> {
        let or = search
            .map(search_filter)
            .filter(|term| !term.is_empty())
            .map(|term| format!("(name.ilike.*{term}*,description.ilike.*{term}*)"));
        let mut params = vec![
            (
                "select",
                "*,creator:profiles(name,avatar_url,user_id),companies(name,logo_url)",
            ),
            ("order", "created_at.desc"),
        ];
        if let Some(or) = &or {
            params.push(("or", or.as_str()));
        }
        let url = self.rest_url("groups", &params)?;
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Call a stored procedure returning a list. A `null` result is an empty list.
    async fn call_rpc<T: DeserializeOwned>(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.endpoint(&format!("rest/v1/rpc/{name}"))?;
        let rows: Option<Vec<T>> = self
            .send_json(self.request(Method::POST, url).json(&args))
            .await?;
        Ok(rows.unwrap_or_default())
    }
}

/// Strip characters that are syntax in an `or=(...)` filter.
fn search_filter(term: &str) -> String {
    term.chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '%' | '"' | '\\'))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_search_filter_drops_filter_syntax() {
        assert_eq!(search_filter(" feira, (livre)* "), "feira livre");
        assert_eq!(search_filter("(),*"), "");
    }

    #[tokio::test]
    async fn test_group_search_matches_name_or_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/groups"))
            .and(query_param("or", "(name.ilike.*feira*,description.ilike.*feira*)"))
            .and(query_param("order", "created_at.desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Feira do bairro", "type": "public"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = Backend::new(&server.uri(), SecretString::from("anon".to_string())).unwrap();
        let groups = backend.fetch_groups(Some(" feira ")).await.unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "Feira do bairro");
    }

    #[tokio::test]
    async fn test_blank_search_lists_everything() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let backend = Backend::new(&server.uri(), SecretString::from("anon".to_string())).unwrap();
        let groups = backend.fetch_groups(Some("  ")).await.unwrap();

        assert!(groups.is_empty());
        let requests = server.received_requests().await.unwrap();
        assert!(!requests[0].url.query().unwrap_or("").contains("or="));
    }
}
