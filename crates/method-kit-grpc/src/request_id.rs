//! Request ID generation.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;

/// Random bytes per request ID; yields 24 base64url characters.
pub const DEFAULT_REQUEST_ID_BYTES: usize = 18;

/// Smallest byte count the method wrappers accept for request IDs.
pub const MIN_REQUEST_ID_BYTES: usize = 8;

/// Generate an opaque, URL-safe request ID.
pub fn generate_id() -> String {
    generate_id_with_len(DEFAULT_REQUEST_ID_BYTES)
}

/// Generate a request ID from `num_bytes` random bytes.
///
/// The result is base64url without padding, so it never contains `+`, `/`
/// or `=` and is `ceil(4 * num_bytes / 3)` characters long.
pub fn generate_id_with_len(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_length() {
        assert_eq!(generate_id().len(), 24);
    }

    #[test]
    fn custom_lengths() {
        assert_eq!(generate_id_with_len(3).len(), 4);
        assert_eq!(generate_id_with_len(4).len(), 6);
        assert_eq!(generate_id_with_len(16).len(), 22);
        assert_eq!(generate_id_with_len(0), "");
    }

    #[test]
    fn ids_are_url_safe_and_distinct() {
        let ids: HashSet<String> = (0..10_000).map(|_| generate_id()).collect();

        assert_eq!(ids.len(), 10_000);
        for id in &ids {
            assert!(
                !id.contains(['+', '/', '=']),
                "unexpected character in {}",
                id
            );
        }
    }
}
