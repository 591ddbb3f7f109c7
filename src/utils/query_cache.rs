use moka::future::Cache;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

/// Best-effort result cache owned by one service instance.
///
/// Values are stored as JSON so a single cache can hold every result type
/// its service produces. Entries never expire unless a TTL is configured;
/// the service clears affected keys after each write it performs.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<String, Value>,
}

impl QueryCache {
    pub fn new(ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder();
        if let Some(ttl) = ttl {
            builder = builder.time_to_live(ttl);
        }
        Self {
            inner: builder.build(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.inner.get(key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                // A shape change between writer and reader; drop the entry.
                warn!(key, error = %e, "Discarding undecodable cache entry");
                self.inner.invalidate(key).await;
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => self.inner.insert(key.to_string(), v).await,
            Err(e) => warn!(key, error = %e, "Skipping cache write"),
        }
    }

    /// Removes one exact key.
    pub async fn clear(&self, key: &str) {
        self.inner.invalidate(key).await;
    }

    /// Removes every key starting with `prefix`.
    pub async fn clear_prefix(&self, prefix: &str) {
        let keys: Vec<_> = self
            .inner
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
            .collect();

        let futures: Vec<_> = keys.iter().map(|k| self.inner.invalidate(k.as_str())).collect();
        futures::future::join_all(futures).await;
    }
}
