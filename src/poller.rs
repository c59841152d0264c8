/// Bounded presence polling for asynchronously rendered page elements
use std::fmt::Display;
use std::future::Future;

use log::debug;
use serde::{Deserialize, Serialize};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u32,
    pub max_delay_ms: u32,
    pub backoff: Backoff,
}

impl PollPolicy {
    /// Delay before the next evaluation, given how many have already run.
    pub fn delay_after(&self, attempts: u32) -> u32 {
        match self.backoff {
            Backoff::Fixed => self.base_delay_ms,
            Backoff::Exponential => {
                let factor = 1u32
                    .checked_shl(attempts.saturating_sub(1))
                    .unwrap_or(u32::MAX);
                self.base_delay_ms
                    .saturating_mul(factor)
                    .min(self.max_delay_ms.max(self.base_delay_ms))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T> {
    Found(T),
    Exhausted,
}

/// Deferred continuation; the only suspension point the poller uses.
pub trait Timer {
    fn sleep(&self, ms: u32) -> impl Future<Output = ()>;
}

/// `setTimeout` wrapped in a promise
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserTimer;

impl Timer for BrowserTimer {
    fn sleep(&self, ms: u32) -> impl Future<Output = ()> {
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window()
                .map(|window| {
                    window
                        .set_timeout_with_callback_and_timeout_and_arguments_0(
                            &resolve,
                            ms.min(i32::MAX as u32) as i32,
                        )
                        .is_ok()
                })
                .unwrap_or(false);
            if !scheduled {
                let _ = resolve.call0(&JsValue::UNDEFINED);
            }
        });
        async move {
            let _ = JsFuture::from(promise).await;
        }
    }
}

/// Evaluate `probe` until it yields a value or `max_attempts` evaluations
/// have run. A probe error counts as "not yet". No sleep follows the last
/// evaluation.
pub async fn poll_until<T, E, P, Tm>(
    label: &str,
    policy: &PollPolicy,
    timer: &Tm,
    mut probe: P,
) -> PollOutcome<T>
where
    P: FnMut() -> Result<Option<T>, E>,
    E: Display,
    Tm: Timer,
{
    for attempt in 1..=policy.max_attempts {
        match probe() {
            Ok(Some(found)) => {
                debug!("{}: satisfied on attempt {}", label, attempt);
                return PollOutcome::Found(found);
            }
            Ok(None) => {}
            Err(e) => debug!("{}: probe failed on attempt {}: {}", label, attempt, e),
        }

        if attempt < policy.max_attempts {
            timer.sleep(policy.delay_after(attempt)).await;
        }
    }

    debug!("{}: exhausted after {} attempts", label, policy.max_attempts);
    PollOutcome::Exhausted
}

/// Bursts of [`poll_until`] separated by a long rest, for as long as
/// `keep_going` allows another round.
pub async fn poll_in_rounds<T, E, P, K, Tm>(
    label: &str,
    policy: &PollPolicy,
    rest_ms: u32,
    timer: &Tm,
    mut probe: P,
    mut keep_going: K,
) -> Option<T>
where
    P: FnMut() -> Result<Option<T>, E>,
    K: FnMut() -> bool,
    E: Display,
    Tm: Timer,
{
    loop {
        if let PollOutcome::Found(found) = poll_until(label, policy, timer, &mut probe).await {
            return Some(found);
        }
        if !keep_going() {
            return None;
        }
        debug!("{}: resting {}ms before the next burst", label, rest_ms);
        timer.sleep(rest_ms).await;
    }
}
