//! JWKS fetching and caching.
//!
//! Keys are cached with a TTL (default 10 minutes) and refreshed on
//! validation failure, with a minimum refresh interval so a flood of bad
//! tokens cannot turn the runtime into a DoS amplifier against the
//! authorization server.

use jsonwebtoken::jwk::JwkSet;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::error::{AuthError, AuthResult};

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    cached_at: SystemTime,
    ttl: Duration,
}

impl CachedJwks {
    fn is_valid(&self) -> bool {
        match SystemTime::now().duration_since(self.cached_at) {
            Ok(age) => age < self.ttl,
            Err(_) => false, // clock went backwards, invalidate
        }
    }
}

/// Caching JWKS client for one endpoint
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    http_client: reqwest::Client,
    cache_ttl: Duration,
    min_refresh_interval: Duration,
    last_refresh: Arc<RwLock<Option<SystemTime>>>,
}

impl JwksClient {
    /// Client with the default cache TTL (10 minutes)
    pub fn new(jwks_uri: String) -> Self {
        Self {
            jwks_uri,
            cache: Arc::new(RwLock::new(None)),
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            cache_ttl: Duration::from_secs(600),
            min_refresh_interval: Duration::from_secs(5),
            last_refresh: Arc::new(RwLock::new(None)),
        }
    }

    /// Client with a custom cache TTL
    pub fn with_ttl(jwks_uri: String, cache_ttl: Duration) -> Self {
        let mut client = Self::new(jwks_uri);
        client.cache_ttl = cache_ttl;
        client
    }

    /// The configured endpoint
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Cached JWKS, fetching when the cache is cold or stale
    pub async fn get_jwks(&self) -> AuthResult<JwkSet> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    debug!(jwks_uri = %self.jwks_uri, "using cached JWKS");
                    return Ok(cached.jwks.clone());
                }
            }
        }
        self.fetch_and_cache().await
    }

    /// Force a refresh, e.g. after a validation failure that may be a
    /// key rotation. Rate limited; falls back to the cache when called
    /// too frequently.
    pub async fn refresh(&self) -> AuthResult<JwkSet> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh {
                if let Ok(since_last) = SystemTime::now().duration_since(last) {
                    if since_last < self.min_refresh_interval {
                        warn!(
                            jwks_uri = %self.jwks_uri,
                            since_last_ms = since_last.as_millis(),
                            "JWKS refresh rate limited, using cache"
                        );
                        return self.get_jwks().await;
                    }
                }
            }
        }
        self.fetch_and_cache().await
    }

    async fn fetch_and_cache(&self) -> AuthResult<JwkSet> {
        info!(jwks_uri = %self.jwks_uri, "fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
                AuthError::upstream(format!("JWKS fetch failed: {e}"))
            })?;

        if !response.status().is_success() {
            error!(
                jwks_uri = %self.jwks_uri,
                status = %response.status(),
                "JWKS endpoint returned error status"
            );
            return Err(AuthError::upstream(format!(
                "JWKS endpoint returned status {}",
                response.status()
            )));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            error!(jwks_uri = %self.jwks_uri, error = %e, "invalid JWKS payload");
            AuthError::upstream(format!("invalid JWKS format: {e}"))
        })?;

        debug!(
            jwks_uri = %self.jwks_uri,
            key_count = jwks.keys.len(),
            "fetched JWKS"
        );

        {
            let mut cache = self.cache.write().await;
            *cache = Some(CachedJwks {
                jwks: jwks.clone(),
                cached_at: SystemTime::now(),
                ttl: self.cache_ttl,
            });
        }
        {
            let mut last_refresh = self.last_refresh.write().await;
            *last_refresh = Some(SystemTime::now());
        }

        Ok(jwks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn cache_entry_validity() {
        let cached = CachedJwks {
            jwks: JwkSet { keys: vec![] },
            cached_at: SystemTime::now(),
            ttl: Duration::from_secs(600),
        };
        assert!(cached.is_valid());

        let stale = CachedJwks {
            jwks: JwkSet { keys: vec![] },
            cached_at: SystemTime::now() - Duration::from_secs(700),
            ttl: Duration::from_secs(600),
        };
        assert!(!stale.is_valid());
    }

    #[tokio::test]
    async fn fetch_caches_and_reuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "keys": []
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = JwksClient::new(format!("{}/jwks", server.uri()));
        let first = client.get_jwks().await.unwrap();
        let second = client.get_jwks().await.unwrap();
        assert_eq!(first.keys.len(), 0);
        assert_eq!(second.keys.len(), 0);
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = JwksClient::new(format!("{}/jwks", server.uri()));
        let err = client.get_jwks().await.unwrap_err();
        assert!(matches!(err, AuthError::Upstream(_)));
    }
}
