//! Per-action-kind retry policy (component G, phase 4), grounded in the
//! teacher's `llm/error.rs` retry-config pattern generalized to actions
//! instead of LLM calls.

use crate::actions::ActionKind;
use crate::error::{ErrorKind, RetryConfig};

/// `navigate/wait/screenshot/pdf` tolerate up to 3 attempts with jittered
/// backoff on transient errors. `click/type/evaluate/upload` retry at most
/// once, and only on driver-disconnect, since their side effects may have
/// already landed.
pub fn retry_policy(kind: ActionKind) -> RetryConfig {
    match kind {
        ActionKind::Navigate | ActionKind::Wait | ActionKind::Screenshot | ActionKind::Pdf => {
            RetryConfig::transient()
        }
        _ => RetryConfig::single_retry(),
    }
}

/// Whether `err` is worth retrying for `kind`, combining the per-kind policy
/// with the error's own retryability.
pub fn should_retry(kind: ActionKind, err: &ErrorKind, attempt: u32) -> bool {
    let policy = retry_policy(kind);
    if attempt >= policy.max_attempts {
        return false;
    }
    match kind {
        ActionKind::Navigate | ActionKind::Wait | ActionKind::Screenshot | ActionKind::Pdf => {
            err.is_retryable()
        }
        ActionKind::Click | ActionKind::Type | ActionKind::Evaluate | ActionKind::Upload => {
            matches!(err, ErrorKind::BrowserCrashed(_))
        }
        _ => false,
    }
}

pub fn backoff_delay(policy: &RetryConfig, attempt: u32) -> std::time::Duration {
    let base = policy.initial_delay.as_millis() as f64 * policy.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(policy.max_delay.as_millis() as f64);
    let jittered = if policy.jitter {
        let factor = 0.5 + rand::random::<f64>() * 0.5;
        capped * factor
    } else {
        capped
    };
    std::time::Duration::from_millis(jittered as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigate_retries_on_timeout() {
        assert!(should_retry(ActionKind::Navigate, &ErrorKind::Timeout, 0));
    }

    #[test]
    fn click_only_retries_on_browser_crash() {
        assert!(!should_retry(ActionKind::Click, &ErrorKind::Timeout, 0));
        assert!(should_retry(ActionKind::Click, &ErrorKind::BrowserCrashed("x".into()), 0));
        assert!(!should_retry(ActionKind::Click, &ErrorKind::BrowserCrashed("x".into()), 1));
    }

    #[test]
    fn backoff_never_exceeds_max_delay() {
        let policy = RetryConfig::transient();
        for attempt in 0..10 {
            assert!(backoff_delay(&policy, attempt) <= policy.max_delay);
        }
    }
}
