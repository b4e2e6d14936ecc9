//! Observer functions for the diagnostic entry points, plus the patching
//! that routes calls to them.
//!
//! The host module's import slots for `OutputDebugStringA`/`W` are swapped
//! to the observers below. Each observer captures (when enabled), then
//! forwards to the pre-patch address held in a static, never back through
//! the patched slot, which would re-enter the observer and loop forever.

use std::ffi::c_char;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{info, warn};
use padtrace_intercept::iat::find_import_slot;
use padtrace_intercept::PatchSite;

use crate::forward::{forward, Observation};
use crate::guard::ReentryGuard;
use crate::{widestr, Agent};

/// The module whose exports get observed.
const DIAGNOSTIC_MODULE: &str = "kernel32.dll";

type OutputDebugStringAFn = unsafe extern "system" fn(*const c_char);
type OutputDebugStringWFn = unsafe extern "system" fn(*const u16);

// Pre-patch slot values, stored at install time. 0 until (unless) the
// corresponding slot was successfully patched.
static ORIGINAL_A: AtomicUsize = AtomicUsize::new(0);
static ORIGINAL_W: AtomicUsize = AtomicUsize::new(0);

/// Replacement for `OutputDebugStringA`.
///
/// # Safety
/// Called by the host with the original entry point's contract.
pub unsafe extern "system" fn debug_string_a_observer(text: *const c_char) {
    let target = ORIGINAL_A.load(Ordering::Acquire);

    if let (Some(_guard), Some(agent)) = (ReentryGuard::enter(), Agent::get()) {
        let payload = widestr::narrow_to_string(text);
        forward(
            agent,
            target,
            Observation::Capture(&payload),
            |addr| {
                let f: OutputDebugStringAFn = std::mem::transmute(addr);
                f(text);
            },
            (),
        );
        return;
    }

    // Re-entered or not yet attached: forward only.
    if target != 0 {
        let f: OutputDebugStringAFn = std::mem::transmute(target);
        f(text);
    }
}

/// Replacement for `OutputDebugStringW`. The payload is normalized to
/// UTF-8 before it meets the filter or the buffer.
///
/// # Safety
/// Called by the host with the original entry point's contract.
pub unsafe extern "system" fn debug_string_w_observer(text: *const u16) {
    let target = ORIGINAL_W.load(Ordering::Acquire);

    if let (Some(_guard), Some(agent)) = (ReentryGuard::enter(), Agent::get()) {
        let payload = widestr::wide_to_string(text);
        forward(
            agent,
            target,
            Observation::Capture(&payload),
            |addr| {
                let f: OutputDebugStringWFn = std::mem::transmute(addr);
                f(text);
            },
            (),
        );
        return;
    }

    if target != 0 {
        let f: OutputDebugStringWFn = std::mem::transmute(target);
        f(text);
    }
}

/// The installed patch sites, kept for restoration at detach.
pub struct DebugCapturePatches {
    sites: Vec<PatchSite>,
}

impl DebugCapturePatches {
    /// Patch the host module's import slots for both diagnostic entry
    /// points. Per-slot failure only loses capture for that entry point;
    /// the returned set holds whatever succeeded.
    ///
    /// # Safety
    /// `host_base` must be the base of a module that stays loaded.
    pub unsafe fn install(host_base: usize) -> Self {
        let plan: [(&str, usize, &AtomicUsize); 2] = [
            (
                "OutputDebugStringA",
                debug_string_a_observer as usize,
                &ORIGINAL_A,
            ),
            (
                "OutputDebugStringW",
                debug_string_w_observer as usize,
                &ORIGINAL_W,
            ),
        ];

        let mut sites = Vec::new();
        for (symbol, observer, original) in plan {
            let Some(slot) = find_import_slot(host_base, DIAGNOSTIC_MODULE, symbol) else {
                warn!("no import slot for {}; capture unavailable for it", symbol);
                continue;
            };
            // The forwarding target must be visible before the swap lands:
            // a host thread can enter the observer the same instant the
            // slot changes, and a zero target would drop its call.
            let publish = |target| original.store(target, Ordering::Release);
            match PatchSite::install_with(slot, observer, publish) {
                Ok(site) => {
                    info!("observing {}", symbol);
                    sites.push(site);
                }
                Err(e) => {
                    warn!("failed to patch slot for {}: {}", symbol, e);
                }
            }
        }
        Self { sites }
    }

    /// Number of entry points actually being observed.
    pub fn installed(&self) -> usize {
        self.sites.len()
    }

    /// Write the original slot values back. Called at detach so no slot is
    /// left pointing into an unloaded module.
    ///
    /// # Safety
    /// The patched module must still be loaded.
    pub unsafe fn restore(&self) {
        for site in &self.sites {
            if let Err(e) = site.restore() {
                warn!("failed to restore a patched slot: {}", e);
            }
        }
    }
}
