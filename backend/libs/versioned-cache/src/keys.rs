//! Store key schema
//!
//! Counter key: `{namespace}:{prefix}:{version_key}` (plain text).
//! Entry key: hex SHA-256 of `{namespace}:{prefix}:{logical_key}`, with the
//! version number appended after a NUL separator when the entry is versioned.

use sha2::{Digest, Sha256};

/// `{namespace}:{prefix}:`
pub fn scope(namespace: &str, prefix: &str) -> String {
    format!("{}:{}:", namespace, prefix)
}

/// Key holding the version counter for `version_key`
pub fn version_counter_key(namespace: &str, prefix: &str, version_key: &str) -> String {
    let mut key = scope(namespace, prefix);
    key.push_str(version_key);
    key
}

/// Digest used as the literal store key for a cache entry
pub fn physical_key(
    namespace: &str,
    prefix: &str,
    logical_key: &str,
    version: Option<u64>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope(namespace, prefix).as_bytes());
    hasher.update(logical_key.as_bytes());
    if let Some(version) = version {
        hasher.update([0u8]);
        hasher.update(version.to_string().as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_counter_key_is_raw() {
        assert_eq!(
            version_counter_key("app", "user_list", "version_user-seyo"),
            "app:user_list:version_user-seyo"
        );
    }

    #[test]
    fn test_physical_key_is_fixed_length_hex() {
        let key = physical_key("app", "user_list", "page_1", Some(1));
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_physical_key_changes_with_version() {
        let v1 = physical_key("app", "user_list", "page_1", Some(1));
        let v2 = physical_key("app", "user_list", "page_1", Some(2));
        let unversioned = physical_key("app", "user_list", "page_1", None);
        assert_ne!(v1, v2);
        assert_ne!(v1, unversioned);
        assert_eq!(v1, physical_key("app", "user_list", "page_1", Some(1)));
    }

    #[test]
    fn test_version_does_not_bleed_into_logical_key() {
        // "k1" at version 2 and "k" at version 12 must not share a slot
        assert_ne!(
            physical_key("app", "p", "k1", Some(2)),
            physical_key("app", "p", "k", Some(12))
        );
    }

    #[test]
    fn test_physical_key_scoped_by_namespace_and_prefix() {
        let base = physical_key("app", "p", "k", None);
        assert_ne!(base, physical_key("other", "p", "k", None));
        assert_ne!(base, physical_key("app", "q", "k", None));
    }
}
