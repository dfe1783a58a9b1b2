//! Send-time scheduling hint for the sync engine's retry backoff

/// Epoch (seconds) at which a message retried `retry_count` times should be
/// sent next: `now + 2 * retry_count`.
pub fn next_send_time(retry_count: u64, now: i64) -> i64 {
    let delay = i64::try_from(retry_count.saturating_mul(2)).unwrap_or(i64::MAX);
    now.saturating_add(delay)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_is_immediate() {
        assert_eq!(next_send_time(0, 1_700_000_000), 1_700_000_000);
    }

    #[test]
    fn test_linear_backoff() {
        assert_eq!(next_send_time(1, 100), 102);
        assert_eq!(next_send_time(5, 100), 110);
    }

    #[test]
    fn test_saturates_instead_of_overflowing() {
        assert_eq!(next_send_time(u64::MAX, 0), i64::MAX);
        assert_eq!(next_send_time(1, i64::MAX), i64::MAX);
    }
}
