//! Runtime control state and hotkey edge detection.
//!
//! There is no timer thread: polling piggy-backs on the host's own
//! high-frequency calls into the state-polling proxy. Key state comes
//! through the `KeySource` trait so the edge detector can be driven by a
//! fake in tests instead of real hardware.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use log::info;

pub const VK_MENU: i32 = 0x12;
pub const VK_L: i32 = 'L' as i32;
pub const VK_I: i32 = 'I' as i32;

/// Answers "is this virtual key physically down right now".
pub trait KeySource {
    fn is_pressed(&self, vk: i32) -> bool;
}

/// `GetAsyncKeyState`-backed source used in the real layer.
#[cfg(windows)]
pub struct AsyncKeyState;

#[cfg(windows)]
impl KeySource for AsyncKeyState {
    fn is_pressed(&self, vk: i32) -> bool {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
        // High bit set = currently depressed.
        (unsafe { GetAsyncKeyState(vk) } as u16) & 0x8000 != 0
    }
}

/// Edge detector for one key combination: fires once per false→true
/// transition, not once per poll while held.
#[derive(Debug)]
struct Chord {
    keys: [i32; 2],
    was_pressed: bool,
}

impl Chord {
    fn new(keys: [i32; 2]) -> Self {
        Self {
            keys,
            was_pressed: false,
        }
    }

    fn poll(&mut self, source: &dyn KeySource) -> bool {
        let down = self.keys.iter().all(|&vk| source.is_pressed(vk));
        let fired = down && !self.was_pressed;
        self.was_pressed = down;
        fired
    }
}

/// Request surfaced by a poll for the caller to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Alt+I: emit a diagnostics summary.
    DumpDiagnostics,
}

/// Process-wide control flags, alive from attach to detach.
pub struct ControlState {
    logging_enabled: AtomicBool,
    hotkeys: Mutex<Hotkeys>,
}

struct Hotkeys {
    toggle: Chord,
    dump: Chord,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlState {
    pub fn new() -> Self {
        Self {
            logging_enabled: AtomicBool::new(true),
            hotkeys: Mutex::new(Hotkeys {
                toggle: Chord::new([VK_MENU, VK_L]),
                dump: Chord::new([VK_MENU, VK_I]),
            }),
        }
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled.load(Ordering::Relaxed)
    }

    pub fn set_logging_enabled(&self, enabled: bool) {
        self.logging_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Poll both hotkeys once. Never blocks: if another thread is mid-poll
    /// the contended poll is simply skipped, and a source that errors reads
    /// as "not pressed" inside the `KeySource` impl.
    pub fn poll(&self, source: &dyn KeySource) -> Option<ControlAction> {
        let Ok(mut hotkeys) = self.hotkeys.try_lock() else {
            return None;
        };

        if hotkeys.toggle.poll(source) {
            let enabled = !self.logging_enabled.fetch_xor(true, Ordering::Relaxed);
            info!("logging {}", if enabled { "enabled" } else { "disabled" });
        }
        if hotkeys.dump.poll(source) {
            return Some(ControlAction::DumpDiagnostics);
        }
        None
    }
}
