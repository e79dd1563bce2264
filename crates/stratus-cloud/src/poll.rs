//! Fixed-interval polling helper

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Poll `f` on a fixed interval until it yields a value, an error, or the
/// optional deadline lapses.
///
/// Sleeps before the first probe, matching the service's task lifecycle
/// (a just-submitted job is never terminal immediately). `Ok(None)` means
/// the deadline expired without a value. With `deadline == None` the loop
/// runs until `f` resolves it one way or the other; callers wanting
/// external cancellation can race the returned future in `tokio::select!`
/// and simply drop it.
pub async fn poll_until<T, F, Fut>(
    interval: Duration,
    deadline: Option<Duration>,
    mut f: F,
) -> Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let started = Instant::now();
    loop {
        sleep(interval).await;
        if let Some(value) = f().await? {
            return Ok(Some(value));
        }
        if let Some(limit) = deadline {
            if started.elapsed() >= limit {
                return Ok(None);
            }
        }
    }
}
