//! Foundational low-level utilities shared across Airlock crates.
//!
//! Provides atomic file-write helpers, millisecond time utilities used by
//! expiry checks and record timestamps, and the three-valued patch type used
//! for partial updates of nullable fields.

pub mod atomic_io;
pub mod patch;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use patch::ValuePatch;
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix_ms};

#[cfg(test)]
mod tests {
    use std::fs::read_to_string;

    use super::*;

    #[test]
    fn current_unix_timestamp_ms_is_monotonic_enough() {
        let first = current_unix_timestamp_ms();
        let second = current_unix_timestamp_ms();
        assert!(second >= first);
    }

    #[test]
    fn is_expired_unix_ms_respects_none_and_bounds() {
        let now = current_unix_timestamp_ms();
        assert!(!is_expired_unix_ms(None, now));
        assert!(is_expired_unix_ms(Some(now), now));
        assert!(is_expired_unix_ms(Some(now.saturating_sub(1)), now));
        assert!(!is_expired_unix_ms(Some(now.saturating_add(1)), now));
    }

    #[test]
    fn write_text_atomic_writes_content() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("sample.txt");
        write_text_atomic(&path, "hello world").expect("write");
        let contents = read_to_string(&path).expect("read");
        assert_eq!(contents, "hello world");
    }
}
