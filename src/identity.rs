//! Record identity and timestamps.
//!
//! Identifiers are generated locally the first time a record is persisted and
//! never change afterwards. The remote source issues none, so these are the
//! only stable handles the rest of the program can hold on to.
//!
//! Timestamps are integer milliseconds since the Unix epoch.

use jiff::Timestamp;
use uuid::Uuid;

/// Returns `id` unchanged when present and non-empty, otherwise a fresh UUID v4.
pub fn id_if_absent(id: Option<String>) -> String {
    match id {
        Some(id) if !id.is_empty() => id,
        _ => Uuid::new_v4().to_string(),
    }
}

/// Returns `value` unchanged when present, otherwise the current time.
pub fn timestamp_if_absent(value: Option<i64>) -> i64 {
    value.unwrap_or_else(now_millis)
}

/// The current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> i64 {
    Timestamp::now().as_millisecond()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_id_is_kept() {
        assert_eq!(id_if_absent(Some("abc".into())), "abc");
    }

    #[test]
    fn missing_or_empty_id_is_generated() {
        let a = id_if_absent(None);
        let b = id_if_absent(Some(String::new()));

        assert!(a.parse::<Uuid>().is_ok());
        assert!(b.parse::<Uuid>().is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn existing_timestamp_is_kept() {
        assert_eq!(timestamp_if_absent(Some(42)), 42);
    }

    #[test]
    fn missing_timestamp_reads_the_clock() {
        let before = now_millis();
        let stamped = timestamp_if_absent(None);
        let after = now_millis();

        assert!(before <= stamped && stamped <= after);
    }
}
