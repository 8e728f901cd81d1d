use std::future::Future;
use std::time::Duration;
use tokio::task::yield_now;
use tokio::time::sleep;

/// Exponential backoff bounds. There is deliberately no attempt ceiling: the
/// loop keeps going for as long as the classifier says the failure is
/// transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }
}

/// Decision returned by a classifier for a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    /// Transient failure; sleep and try again.
    Retry,
    /// Permanent failure; surface it to the caller.
    Abort,
    /// Failure that signals a misconfiguration; surface it and treat it as
    /// unrecoverable for the whole process.
    Fatal,
}

/// Terminal result of a backoff loop that gave up.
#[derive(Debug)]
pub struct RetryAbort<E> {
    pub error: E,
    pub disposition: RetryDisposition,
    pub attempts: usize,
}

pub async fn retry_with_backoff<T, E, F, Fut, L, C>(
    config: RetryBackoff,
    mut operation: F,
    mut on_retry: L,
    mut classify_error: C,
) -> Result<T, RetryAbort<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: FnMut(usize, Duration, &E),
    C: FnMut(usize, &E) -> RetryDisposition,
{
    let mut attempt = 0;
    let mut backoff = config.initial_delay;

    loop {
        attempt += 1;

        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => match classify_error(attempt, &err) {
                RetryDisposition::Retry => {
                    on_retry(attempt, backoff, &err);
                    sleep_for(backoff).await;
                    backoff = next_backoff(backoff, config.max_delay);
                }
                disposition => {
                    return Err(RetryAbort {
                        error: err,
                        disposition,
                        attempts: attempt,
                    })
                }
            },
        }
    }
}

async fn sleep_for(delay: Duration) {
    if delay.is_zero() {
        yield_now().await;
    } else {
        sleep(delay).await;
    }
}

fn next_backoff(current: Duration, max_backoff: Duration) -> Duration {
    if current.is_zero() {
        return max_backoff.min(Duration::from_millis(1));
    }

    let mut next = current.saturating_mul(2);
    if next > max_backoff {
        next = max_backoff;
    }
    next
}
