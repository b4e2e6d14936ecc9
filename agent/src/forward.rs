//! The one forwarding primitive behind every proxied entry point.
//!
//! Five exports and two observers share the same shape: bail out with a
//! fallback when the real address never resolved, run the per-call
//! observation, then call the original and hand its result back untouched.
//! Parameterizing the observation keeps that from being written out seven
//! times.

use crate::Agent;

/// `ERROR_DEVICE_NOT_CONNECTED`: the documented fallback when the real
/// entry point is unavailable.
pub const ERROR_DEVICE_NOT_CONNECTED: u32 = 1167;

/// What a proxied call does besides forwarding.
pub enum Observation<'a> {
    /// Plain pass-through.
    None,
    /// Poll the runtime control hotkeys (piggy-backed on the host's
    /// high-frequency state polling).
    ControlPoll,
    /// Hand a diagnostic payload to the capture pipeline before the call.
    Capture(&'a str),
}

/// Forward a call to `target`, or return `fallback` when `target` is the
/// unresolved sentinel (0). The observation runs before forwarding and can
/// never fail the call; no lock is held while `call` runs.
pub fn forward<R>(
    agent: &Agent,
    target: usize,
    observation: Observation<'_>,
    call: impl FnOnce(usize) -> R,
    fallback: R,
) -> R {
    if target == 0 {
        return fallback;
    }

    match observation {
        Observation::None => {}
        Observation::ControlPoll => agent.poll_control(),
        Observation::Capture(payload) => {
            if agent.capture_enabled() {
                agent.pipeline().submit(payload);
            }
        }
    }

    call(target)
}
