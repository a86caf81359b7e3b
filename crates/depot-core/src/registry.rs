use std::collections::HashMap;

use parking_lot::Mutex;
use redis::Commands;

use crate::error::Result;

/// Key-value registry the pipeline publishes into.
///
/// Keys are namespaced hashes: `{prefix}{namespace}` → `{field: value}`.
/// Field writes are individually atomic; a generator's multi-field write
/// sequence is not transactional as a whole.
pub trait Registry: Send + Sync {
    /// Idempotent overwrite of one field.
    fn set_field(&self, namespace: &str, field: &str, value: &str) -> Result<()>;

    fn get_field(&self, namespace: &str, field: &str) -> Result<Option<String>>;

    /// Atomic counter increment, safe under concurrent callers (the
    /// serving layer bumps download counters independently of this
    /// pipeline).
    fn increment(&self, namespace: &str, field: &str, by: i64) -> Result<i64>;
}

/// Redis-backed registry. Connections are established per call — jobs do
/// not share connections and need no locking discipline beyond what the
/// server's atomic hash operations already provide.
pub struct RedisRegistry {
    client: redis::Client,
    prefix: String,
}

impl RedisRegistry {
    pub fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            prefix: prefix.into(),
        })
    }

    fn key(&self, namespace: &str) -> String {
        format!("{}{namespace}", self.prefix)
    }
}

impl Registry for RedisRegistry {
    fn set_field(&self, namespace: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.client.get_connection()?;
        let _: () = conn.hset(self.key(namespace), field, value)?;
        Ok(())
    }

    fn get_field(&self, namespace: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_connection()?;
        Ok(conn.hget(self.key(namespace), field)?)
    }

    fn increment(&self, namespace: &str, field: &str, by: i64) -> Result<i64> {
        let mut conn = self.client.get_connection()?;
        Ok(conn.hincr(self.key(namespace), field, by)?)
    }
}

/// In-process registry used by tests and single-node deployments.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Registry for MemoryRegistry {
    fn set_field(&self, namespace: &str, field: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .entry(namespace.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn get_field(&self, namespace: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .lock()
            .get(namespace)
            .and_then(|fields| fields.get(field))
            .cloned())
    }

    fn increment(&self, namespace: &str, field: &str, by: i64) -> Result<i64> {
        let mut entries = self.entries.lock();
        let fields = entries.entry(namespace.to_string()).or_default();
        let current = fields
            .get(field)
            .and_then(|raw| raw.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + by;
        fields.insert(field.to_string(), next.to_string());
        Ok(next)
    }
}
