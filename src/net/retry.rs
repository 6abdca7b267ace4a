//! backoff for transient transport failures
use {
    crate::error::Result,
    std::time::Duration,
    tracing::{debug, warn},
};

/// first delay of the backoff ladder
pub const BASE_DELAY: Duration = Duration::from_secs(30);

/// total attempts before a transient error is surfaced
pub const MAX_ATTEMPTS: u32 = 6;

/// run an operation, retrying transient failures with exponential backoff
///
/// only errors classified transient (gateway timeout, service unavailable,
/// too many requests) are retried; conflicts and every other kind surface
/// immediately
pub async fn with_backoff<T, F, Fut>(what: &str, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = BASE_DELAY * 2u32.pow(attempt - 1);
                warn!(
                    what,
                    attempt,
                    delay_secs = delay.as_secs(),
                    %error,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                debug!(what, attempt, %error, "giving up");
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::error::SyncError,
        std::sync::atomic::{AtomicU32, Ordering},
        tokio::time::Instant,
    };

    #[tokio::test(start_paused = true)]
    async fn transient_504_succeeds_on_second_attempt_after_base_delay() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = with_backoff("post search", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SyncError::from_status(504, "gateway timeout".into()))
            } else {
                Ok(200)
            }
        })
        .await;

        assert_eq!(result.expect("recovered"), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn conflicts_are_never_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_backoff("tag update", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::from_status(409, "version mismatch".into()))
        })
        .await;

        assert!(result.expect_err("conflict").is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_surface_once_attempts_run_out() {
        let calls = AtomicU32::new(0);

        let result: Result<()> = with_backoff("post search", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::from_status(503, "unavailable".into()))
        })
        .await;

        assert!(result.expect_err("exhausted").is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
