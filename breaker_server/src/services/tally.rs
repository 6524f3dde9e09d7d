//! Breaker tally — per-handle counts kept in an external key-value HTTP store.
//!
//! Keys live at `<base>/<object path>/<handle>` and hold a plain integer.
//! Increments are read-then-write and not atomic.

use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::config::TallyConfig;
use crate::error::TallyError;

pub struct TallyStore {
    client: reqwest::Client,
    base_url: Url,
    object_path: String,
}

impl TallyStore {
    pub fn new(config: &TallyConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: config.base_url.clone(),
            object_path: config.object_path.clone(),
        })
    }

    fn key_url(&self, key: &str) -> Result<Url, TallyError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TallyError::InvalidBase)?
            .pop_if_empty()
            .extend(self.object_path.split('/').filter(|s| !s.is_empty()))
            .push(key);
        Ok(url)
    }

    /// Current count for `key`, or `None` if the store has no entry.
    pub async fn get(&self, key: &str) -> Result<Option<u64>, TallyError> {
        let resp = self.client.get(self.key_url(key)?).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = resp.error_for_status()?.text().await?;
        let trimmed = body.trim();
        trimmed
            .parse()
            .map(Some)
            .map_err(|_| TallyError::InvalidCount(trimmed.to_string()))
    }

    pub async fn put(&self, key: &str, count: u64) -> Result<(), TallyError> {
        self.client
            .put(self.key_url(key)?)
            .header("Content-Type", "text/plain")
            .body(count.to_string())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Add one to `key`, starting at 1 when absent. Returns the new count.
    pub async fn increment(&self, key: &str) -> Result<u64, TallyError> {
        let next = match self.get(key).await? {
            Some(current) => current
                .checked_add(1)
                .ok_or_else(|| TallyError::InvalidCount(current.to_string()))?,
            None => 1,
        };
        self.put(key, next).await?;
        tracing::debug!(key, count = next, "Breaker tally updated");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;

    use super::*;

    fn store(server: &MockServer, object_path: &str) -> TallyStore {
        store_with_timeout(server, object_path, Duration::from_secs(5))
    }

    fn store_with_timeout(server: &MockServer, object_path: &str, timeout: Duration) -> TallyStore {
        TallyStore::new(
            &TallyConfig {
                base_url: server.url("/riak/").parse().unwrap(),
                object_path: object_path.to_string(),
            },
            timeout,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn increments_existing_count() {
        let server = MockServer::start_async().await;
        let get = server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/breakers/alice");
                then.status(200).body("2\n");
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/riak/breakers/alice").body("3");
                then.status(204);
            })
            .await;

        let count = store(&server, "breakers").increment("alice").await.unwrap();

        assert_eq!(count, 3);
        get.assert_async().await;
        put.assert_async().await;
    }

    #[tokio::test]
    async fn missing_key_starts_at_one() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/buckets/team/keys/bobc");
                then.status(404);
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/riak/buckets/team/keys/bobc").body("1");
                then.status(200);
            })
            .await;

        let count = store(&server, "buckets/team/keys")
            .increment("bobc")
            .await
            .unwrap();

        assert_eq!(count, 1);
        put.assert_async().await;
    }

    #[tokio::test]
    async fn garbage_count_is_rejected_without_writing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/breakers/alice");
                then.status(200).body("many");
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/riak/breakers/alice");
                then.status(204);
            })
            .await;

        let err = store(&server, "breakers").increment("alice").await.unwrap_err();

        assert!(matches!(err, TallyError::InvalidCount(ref v) if v == "many"));
        put.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn server_error_surfaces() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/breakers/alice");
                then.status(500);
            })
            .await;

        let err = store(&server, "breakers").get("alice").await.unwrap_err();
        assert!(matches!(err, TallyError::Http(_)));
    }

    #[tokio::test]
    async fn saturated_count_is_rejected_without_writing() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/breakers/alice");
                then.status(200).body(u64::MAX.to_string());
            })
            .await;
        let put = server
            .mock_async(|when, then| {
                when.method(PUT).path("/riak/breakers/alice");
                then.status(204);
            })
            .await;

        let err = store(&server, "breakers").increment("alice").await.unwrap_err();

        assert!(matches!(err, TallyError::InvalidCount(ref v) if *v == u64::MAX.to_string()));
        put.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn stalled_store_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/riak/breakers/alice");
                then.status(200).delay(Duration::from_secs(5)).body("1");
            })
            .await;

        let started = std::time::Instant::now();
        let err = store_with_timeout(&server, "breakers", Duration::from_millis(200))
            .increment("alice")
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(err, TallyError::Http(ref e) if e.is_timeout()));
    }
}
