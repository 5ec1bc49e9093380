use futures::future::ready;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use once_cell::sync::Lazy;
use std::time::Duration;

/// user id => last TOTP time step accepted for that user.
/// Entries outlive the verification window (current step ± 1).
pub static USED_OTP_STEPS: Lazy<Cache<i64, u64>> = Lazy::new(|| {
    Cache::builder()
        .max_capacity(100_000)
        .time_to_live(Duration::from_secs(90))
        .build()
});

/// Accepts `step` only if no equal or later step was accepted for this user.
/// Check and record happen under one per-key compute, so a code is consumed at most once.
pub async fn try_consume(user_id: i64, step: u64) -> bool {
    let result = USED_OTP_STEPS
        .entry(user_id)
        .and_compute_with(|current| {
            let op = match current {
                Some(entry) if step <= *entry.value() => Op::Nop,
                _ => Op::Put(step),
            };
            ready(op)
        })
        .await;

    matches!(result, CompResult::Inserted(_) | CompResult::ReplacedWith(_))
}

/// Drop the record, e.g. after MFA is disabled.
pub async fn forget(user_id: i64) {
    USED_OTP_STEPS.invalidate(&user_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn accepted_step_cannot_be_replayed() {
        let user_id = 9_000_001;
        assert!(try_consume(user_id, 100).await);
        assert!(!try_consume(user_id, 100).await);
        assert!(!try_consume(user_id, 99).await);
        assert!(try_consume(user_id, 101).await);

        forget(user_id).await;
        assert!(try_consume(user_id, 100).await);
    }

    #[actix_web::test]
    async fn lower_step_never_replaces_a_higher_one() {
        let user_id = 9_000_002;
        assert!(try_consume(user_id, 200).await);
        assert!(!try_consume(user_id, 199).await);
        assert!(!try_consume(user_id, 200).await);
    }

    #[actix_web::test]
    async fn concurrent_consumes_of_one_code_accept_exactly_one() {
        let user_id = 9_000_003;
        let attempts = (0..16).map(|_| try_consume(user_id, 500));
        let accepted = futures::future::join_all(attempts)
            .await
            .into_iter()
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }

    #[test]
    fn concurrent_consumes_across_threads_accept_exactly_one() {
        let user_id = 9_000_004;
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(move || futures::executor::block_on(try_consume(user_id, 700))))
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }
}
