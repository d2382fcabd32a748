use std::time::Duration;

use operator_relay::relay::retry::{BackoffKind, RetryPolicy};

const PACING: Duration = Duration::from_millis(500);

#[test]
fn default_policy_never_gives_up() {
    let policy = RetryPolicy::default();

    assert_eq!(policy, RetryPolicy::unlimited());
    assert!(!policy.is_exhausted(1));
    assert!(!policy.is_exhausted(u32::MAX));
}

#[test]
fn default_policy_pauses_at_pacing_interval() {
    let policy = RetryPolicy::unlimited();

    for attempts in [1, 2, 10, 1_000] {
        assert_eq!(policy.delay_after(attempts, PACING), PACING);
    }
}

#[test]
fn capped_policy_is_exhausted_at_max_attempts() {
    let policy = RetryPolicy {
        max_attempts: Some(3),
        ..RetryPolicy::unlimited()
    };

    assert!(!policy.is_exhausted(2));
    assert!(policy.is_exhausted(3));
    assert!(policy.is_exhausted(4));
}

#[test]
fn exponential_backoff_doubles_and_caps() {
    let policy = RetryPolicy {
        max_attempts: None,
        backoff: BackoffKind::Exponential,
        max_backoff: Duration::from_secs(3),
    };

    assert_eq!(policy.delay_after(1, PACING), Duration::from_millis(500));
    assert_eq!(policy.delay_after(2, PACING), Duration::from_millis(1_000));
    assert_eq!(policy.delay_after(3, PACING), Duration::from_millis(2_000));
    assert_eq!(policy.delay_after(4, PACING), Duration::from_secs(3));
    assert_eq!(policy.delay_after(u32::MAX, PACING), Duration::from_secs(3));
}

#[test]
fn exponential_backoff_never_drops_below_pacing() {
    let policy = RetryPolicy {
        max_attempts: None,
        backoff: BackoffKind::Exponential,
        max_backoff: Duration::from_millis(10),
    };

    assert_eq!(policy.delay_after(5, PACING), PACING);
}
