//! Group resolver (C2, §4.2): LRU cache + on-miss fetch translating Signal's
//! opaque internal group id into the externally addressable group id.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use serde::Deserialize;

use crate::error::ResolverError;

#[derive(Debug, Deserialize)]
struct GroupDescriptor {
    internal_id: String,
    id: String,
}

pub struct GroupResolver {
    http: reqwest::Client,
    base_url: String,
    account: String,
    cache: Mutex<LruCache<String, String>>,
}

impl GroupResolver {
    pub fn new(http: reqwest::Client, gateway_base_url: String, account: String, max_cache_size: usize) -> Self {
        let capacity = NonZeroUsize::new(max_cache_size).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            http,
            base_url: gateway_base_url,
            account,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Resolves `internal_id` to the externally addressable public group id.
    ///
    /// On a cache miss, the network fetch happens outside the lock: two
    /// concurrent misses for the same id may both fetch, which is accepted
    /// (idempotent, rare — §4.2).
    pub async fn resolve(&self, internal_id: &str) -> Result<String, ResolverError> {
        if let Some(public_id) = self.cache.lock().unwrap().get(internal_id).cloned() {
            return Ok(public_id);
        }

        let url = format!("{}/v1/groups/{}", self.base_url, self.account);
        let descriptors: Vec<GroupDescriptor> = self.http.get(&url).send().await?.json().await?;

        let public_id = descriptors
            .into_iter()
            .find(|d| d.internal_id == internal_id && !d.id.is_empty())
            .map(|d| d.id)
            .ok_or_else(|| ResolverError::NotFound(internal_id.to_owned()))?;

        self.cache
            .lock()
            .unwrap()
            .put(internal_id.to_owned(), public_id.clone());

        Ok(public_id)
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer, cache_size: usize) -> GroupResolver {
        GroupResolver::new(
            reqwest::Client::new(),
            server.uri(),
            "+15550000".to_owned(),
            cache_size,
        )
    }

    #[tokio::test]
    async fn resolve_finds_matching_descriptor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/+15550000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"internal_id": "INT1", "id": "PUB1"},
                {"internal_id": "INT2", "id": "PUB2"},
            ])))
            .mount(&server)
            .await;

        let resolver = resolver(&server, 10);
        let public_id = resolver.resolve("INT1").await.unwrap();
        assert_eq!(public_id, "PUB1");
    }

    #[tokio::test]
    async fn resolve_is_cached_on_second_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/+15550000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"internal_id": "INT1", "id": "PUB1"},
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, 10);
        assert_eq!(resolver.resolve("INT1").await.unwrap(), "PUB1");
        assert_eq!(resolver.resolve("INT1").await.unwrap(), "PUB1");
        // The mock's `.expect(1)` is verified on drop of `server`; reaching
        // here without a panic confirms only one fetch occurred.
    }

    #[tokio::test]
    async fn resolve_fails_when_no_descriptor_matches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/+15550000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"internal_id": "OTHER", "id": "PUB1"},
            ])))
            .mount(&server)
            .await;

        let resolver = resolver(&server, 10);
        let err = resolver.resolve("INT1").await.unwrap_err();
        assert!(matches!(err, ResolverError::NotFound(id) if id == "INT1"));
    }

    #[tokio::test]
    async fn resolve_skips_descriptor_with_empty_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/+15550000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"internal_id": "INT1", "id": ""},
            ])))
            .mount(&server)
            .await;

        let resolver = resolver(&server, 10);
        assert!(resolver.resolve("INT1").await.is_err());
    }

    #[tokio::test]
    async fn cache_evicts_least_recently_used_on_overflow() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/groups/+15550000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"internal_id": "INT1", "id": "PUB1"},
                {"internal_id": "INT2", "id": "PUB2"},
                {"internal_id": "INT3", "id": "PUB3"},
            ])))
            .mount(&server)
            .await;

        let resolver = resolver(&server, 2);
        resolver.resolve("INT1").await.unwrap();
        resolver.resolve("INT2").await.unwrap();
        assert_eq!(resolver.cache_len(), 2);

        // Touch INT1 so INT2 becomes least-recently-used.
        resolver.resolve("INT1").await.unwrap();
        resolver.resolve("INT3").await.unwrap();

        assert_eq!(resolver.cache_len(), 2);
        assert!(resolver.cache.lock().unwrap().contains("INT1"));
        assert!(resolver.cache.lock().unwrap().contains("INT3"));
        assert!(!resolver.cache.lock().unwrap().contains("INT2"));
    }
}
