//! Inbound header keys and outbound response metadata.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue, MetadataMap};

/// Key of the timestamp added to every outbound metadata map.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// A type-safe metadata key.
///
/// Use the constants in [`headers`] for common keys, or create custom keys
/// with [`HeaderKey::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderKey(&'static str);

impl HeaderKey {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Metadata keys callers commonly send.
pub mod headers {
    use super::HeaderKey;

    pub const AUTHORIZATION: HeaderKey = HeaderKey::new("authorization");
    pub const USER_AGENT: HeaderKey = HeaderKey::new("user-agent");
    pub const GRPC_TIMEOUT: HeaderKey = HeaderKey::new("grpc-timeout");

    pub const REQUEST_ID: HeaderKey = HeaderKey::new("x-request-id");
    pub const CORRELATION_ID: HeaderKey = HeaderKey::new("x-correlation-id");
    pub const TRACEPARENT: HeaderKey = HeaderKey::new("traceparent");

    pub const CLIENT_ID: HeaderKey = HeaderKey::new("x-client-id");
    pub const TENANT_ID: HeaderKey = HeaderKey::new("x-tenant-id");
}

/// Metadata a handler wants to send back with its response.
///
/// Handlers receive a clone; every clone writes into the same entries. The
/// wrapper reads them once the handler has settled and adds a timestamp.
#[derive(Debug, Clone, Default)]
pub struct ResponseMetadata {
    entries: Arc<Mutex<Vec<(String, String)>>>,
}

impl ResponseMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing earlier values for it.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let mut entries = self.lock();
        entries.retain(|(k, _)| *k != key);
        entries.push((key, value.into()));
    }

    /// Add another value for `key`.
    pub fn append(&self, key: impl Into<String>, value: impl Into<String>) {
        self.lock().push((key.into(), value.into()));
    }

    /// First value stored for `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, String)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Build outbound metadata from custom entries plus a `timestamp`.
///
/// Entries that are not valid ASCII metadata are dropped with a warning
/// rather than failing the response.
pub fn build_metadata<K, V>(custom: impl IntoIterator<Item = (K, V)>) -> MetadataMap
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut metadata = MetadataMap::new();

    for (key, value) in custom {
        let (key, value) = (key.as_ref(), value.as_ref());
        let parsed_key = key.parse::<AsciiMetadataKey>();
        let parsed_value = value.parse::<AsciiMetadataValue>();

        match (parsed_key, parsed_value) {
            (Ok(k), Ok(v)) => {
                metadata.append(k, v);
            }
            _ => tracing::warn!(key = %key, "dropping invalid response metadata entry"),
        }
    }

    let timestamp = chrono::Utc::now().to_rfc3339();
    match timestamp.parse::<AsciiMetadataValue>() {
        Ok(value) => {
            metadata.append(TIMESTAMP_KEY, value);
        }
        Err(_) => tracing::warn!(timestamp = %timestamp, "timestamp is not valid metadata"),
    }

    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_key_equality() {
        const A: HeaderKey = HeaderKey::new("x-test");
        const B: HeaderKey = HeaderKey::new("x-test");

        assert_eq!(A, B);
        assert_ne!(A, headers::REQUEST_ID);
        assert_eq!(headers::AUTHORIZATION.as_str(), "authorization");
    }

    #[test]
    fn response_metadata_clones_share_entries() {
        let metadata = ResponseMetadata::new();
        let handle = metadata.clone();

        handle.insert("x-cache", "miss");
        handle.insert("x-cache", "hit");
        handle.append("x-shard", "1");
        handle.append("x-shard", "2");

        assert_eq!(metadata.get("x-cache").as_deref(), Some("hit"));
        assert_eq!(
            metadata.entries(),
            vec![
                ("x-cache".to_string(), "hit".to_string()),
                ("x-shard".to_string(), "1".to_string()),
                ("x-shard".to_string(), "2".to_string()),
            ]
        );
        assert!(!metadata.is_empty());
        assert!(ResponseMetadata::new().is_empty());
    }

    #[test]
    fn build_metadata_adds_timestamp() {
        let metadata = build_metadata([("a", "1")]);

        assert_eq!(metadata.get("a").unwrap(), "1");
        let timestamp = metadata.get(TIMESTAMP_KEY).unwrap().to_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
    }

    #[test]
    fn build_metadata_twice_keeps_custom_keys() {
        let first = build_metadata([("a", "1")]);
        let second = build_metadata([("a", "1")]);

        for metadata in [first, second] {
            assert_eq!(metadata.get("a").unwrap(), "1");
            assert!(metadata.get(TIMESTAMP_KEY).is_some());
        }
    }

    #[test]
    fn build_metadata_keeps_repeated_keys() {
        let metadata = build_metadata([("x-shard", "1"), ("x-shard", "2")]);
        let values: Vec<_> = metadata
            .get_all("x-shard")
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();

        assert_eq!(values, vec!["1", "2"]);
    }

    #[test]
    fn build_metadata_skips_invalid_entries() {
        let metadata = build_metadata([("bad key", "1"), ("ok", "line\nbreak"), ("good", "yes")]);

        assert!(metadata.get("bad key").is_none());
        assert!(metadata.get("ok").is_none());
        assert_eq!(metadata.get("good").unwrap(), "yes");
        assert!(metadata.get(TIMESTAMP_KEY).is_some());
    }

    #[test]
    fn build_metadata_without_custom_entries() {
        let metadata = build_metadata(Vec::<(String, String)>::new());
        assert_eq!(metadata.len(), 1);
    }
}
