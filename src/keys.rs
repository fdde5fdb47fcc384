//! Staging-key codec.
//!
//! Two key families live under the configured prefix, both addressing the
//! same (user, problem, language) triple:
//!
//! ```text
//! {prefix}:debounce:user:{uid}:problem:{pid}:lang:{lang}   → "1", short TTL
//! {prefix}:data:problem:{pid}:lang:{lang}:user:{uid}       → code, long TTL
//! ```
//!
//! Keeping them in separate namespaces decouples the code's presence from
//! its TTL tracking: re-arming the debounce key never touches the staged
//! code, and the code survives the debounce key's expiry until it is
//! committed.
//!
//! Decoding never fails loudly. The expiry channel carries every expired key
//! in the database, so anything that does not match the grammar is simply
//! not ours.
use std::sync::LazyLock;

use regex::Regex;

static DEBOUNCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+):debounce:user:(\d+):problem:(\d+):lang:([A-Za-z0-9_]+)$").unwrap()
});

static DATA_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w+):data:problem:(\d+):lang:([A-Za-z0-9_]+):user:(\d+)$").unwrap()
});

/// One autosave stream: the triple addressing at most one live staging entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebounceKey {
    pub user_id: u64,
    pub problem_id: u64,
    pub language: String,
}

pub fn encode(prefix: &str, key: &DebounceKey) -> String {
    format!(
        "{prefix}:debounce:user:{}:problem:{}:lang:{}",
        key.user_id, key.problem_id, key.language
    )
}

/// Key under which the staged code itself is held.
pub fn data_key(prefix: &str, key: &DebounceKey) -> String {
    format!(
        "{prefix}:data:problem:{}:lang:{}:user:{}",
        key.problem_id, key.language, key.user_id
    )
}

pub fn decode(prefix: &str, raw: &str) -> Option<DebounceKey> {
    // Cheap guard before the regex: foreign namespaces sharing the store are
    // the common case on the expiry channel.
    if !raw
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with(":debounce:"))
    {
        return None;
    }

    let caps = DEBOUNCE_PATTERN.captures(raw)?;
    if &caps[1] != prefix {
        return None;
    }

    Some(DebounceKey {
        user_id: caps[2].parse().ok()?,
        problem_id: caps[3].parse().ok()?,
        language: caps[4].to_string(),
    })
}

/// Inverse of [`data_key`], used by the reconciliation sweep to recover the
/// triple from a scanned staging key.
pub fn decode_data_key(prefix: &str, raw: &str) -> Option<DebounceKey> {
    let caps = DATA_PATTERN.captures(raw)?;
    if &caps[1] != prefix {
        return None;
    }

    Some(DebounceKey {
        problem_id: caps[2].parse().ok()?,
        language: caps[3].to_string(),
        user_id: caps[4].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::{DebounceKey, data_key, decode, decode_data_key, encode};

    fn triple() -> DebounceKey {
        DebounceKey {
            user_id: 7,
            problem_id: 42,
            language: "python".into(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let key = triple();
        let raw = encode("autosave", &key);

        assert_eq!(raw, "autosave:debounce:user:7:problem:42:lang:python");
        assert_eq!(decode("autosave", &raw), Some(key));
    }

    #[test]
    fn test_data_key_roundtrip() {
        let key = triple();
        let raw = data_key("autosave", &key);

        assert_eq!(raw, "autosave:data:problem:42:lang:python:user:7");
        assert_eq!(decode_data_key("autosave", &raw), Some(key));
    }

    #[test]
    fn test_foreign_prefix_is_skipped() {
        assert_eq!(
            decode("autosave", "otherns:debounce:user:7:problem:42:lang:python"),
            None
        );
    }

    #[test]
    fn test_nonconforming_strings() {
        for raw in [
            "",
            "autosave",
            "autosave:debounce:",
            "autosave:debounce:user:x:problem:42:lang:python",
            "autosave:debounce:user:7:problem:42:lang:c++",
            "autosave:debounce:user:7:problem:42:lang:python:extra",
            "autosave:data:problem:42:lang:python:user:7",
            "autosavedebounce:user:7:problem:42:lang:python",
        ] {
            assert_eq!(decode("autosave", raw), None, "accepted {raw:?}");
        }
    }

    #[test]
    fn test_prefix_must_match_exactly() {
        // "auto" is a prefix of the namespace segment but not the namespace.
        assert_eq!(
            decode("auto", "autosave:debounce:user:7:problem:42:lang:python"),
            None
        );
    }

    #[test]
    fn test_oversized_ids_do_not_panic() {
        let raw = "autosave:debounce:user:99999999999999999999999:problem:1:lang:rust";
        assert_eq!(decode("autosave", raw), None);
    }

    #[test]
    fn test_language_variants() {
        for lang in ["python3", "cpp_17", "RUST"] {
            let key = DebounceKey {
                user_id: 1,
                problem_id: 2,
                language: lang.into(),
            };
            assert_eq!(decode("oj", &encode("oj", &key)), Some(key));
        }
    }
}
