//! Engine timing and policy configuration

use std::time::Duration;

/// What the task tracker does when the status endpoint reports no such
/// task (empty or absent body).
///
/// Two fielded revisions of the service behave differently here, so the
/// policy is configurable rather than assumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundPolicy {
    /// Treat the first empty poll as "task gone", returning no result.
    ReturnImmediately,
    /// Poll up to `attempts` additional times before giving up with no
    /// result.
    RetryThenGiveUp { attempts: u32 },
}

impl Default for NotFoundPolicy {
    fn default() -> Self {
        // The bounded retry is the safer of the two observed behaviors.
        NotFoundPolicy::RetryThenGiveUp { attempts: 4 }
    }
}

/// Timing knobs shared by the task tracker, the workflows and the
/// transfer client.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fixed delay between status polls. The service recommends 15 s and
    /// the interval is deliberately not exponential.
    pub poll_interval: Duration,

    /// Bound on the stop-wait inside terminate. The stop-wait inside
    /// resize is unbounded.
    pub stop_deadline: Duration,

    /// Bound on waiting for a captured image to become visible.
    pub image_deadline: Duration,

    /// Behavior when a polled task vanishes.
    pub not_found_policy: NotFoundPolicy,

    /// Fixed chunk size for object transfers.
    pub chunk_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            stop_deadline: Duration::from_secs(5 * 60),
            image_deadline: Duration::from_secs(5 * 60),
            not_found_policy: NotFoundPolicy::default(),
            chunk_size: 10 * 1024,
        }
    }
}
