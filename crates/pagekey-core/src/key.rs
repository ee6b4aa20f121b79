//! Storage key encoding.
//!
//! A storage key is the physical slot a page occupies. Keys are derived from
//! identifiers by lowercasing and percent-encoding, so two identifiers that
//! differ only by case land in the same slot. The reconciliation sweep has to
//! account for that coincidence before it moves anything.

use std::borrow::Cow;

/// Physical storage key for `identifier`.
///
/// ```
/// use pagekey_core::key::storage_key;
///
/// assert_eq!(storage_key("MyPage"), "mypage");
/// assert_eq!(storage_key("a b/c"), "a%20b%2Fc");
/// ```
pub fn storage_key(identifier: &str) -> String {
    urlencoding::encode(&identifier.to_lowercase()).into_owned()
}

/// Identifier a storage key was derived from, as far as it can be recovered.
///
/// Case is lost in encoding, so this yields the lowercased identifier. Keys
/// that are not valid percent-encoded UTF-8 are decoded lossily.
pub fn identifier_from_key(key: &str) -> String {
    match urlencoding::decode(key) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => match urlencoding::decode_binary(key.as_bytes()) {
            Cow::Borrowed(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Cow::Owned(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        },
    }
}

/// True when two identifiers resolve to the same physical slot.
pub fn same_slot(a: &str, b: &str) -> bool {
    storage_key(a) == storage_key(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_lowercases() {
        assert_eq!(storage_key("Lab_Wallbins_L3"), "lab_wallbins_l3");
    }

    #[test]
    fn test_storage_key_encodes_reserved() {
        assert_eq!(storage_key("a/b?c"), "a%2Fb%3Fc");
        assert_eq!(storage_key("東京"), "%E6%9D%B1%E4%BA%AC");
    }

    #[test]
    fn test_identifier_from_key_decodes() {
        assert_eq!(identifier_from_key("a%20b"), "a b");
        assert_eq!(identifier_from_key("%E6%9D%B1%E4%BA%AC"), "東京");
        assert_eq!(identifier_from_key("plain"), "plain");
    }

    #[test]
    fn test_identifier_from_key_invalid_utf8_is_lossy() {
        assert_eq!(identifier_from_key("bad%FFkey"), "bad\u{FFFD}key");
    }

    #[test]
    fn test_same_slot_case_variants() {
        assert!(same_slot("MyPage", "mypage"));
        assert!(!same_slot("MyPage", "my_page"));
    }
}
