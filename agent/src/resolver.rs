//! Resolution of the real XInput implementation.
//!
//! Loads the genuine DLL from the system directory (never by bare name,
//! which would resolve back to this proxy) and resolves the five exported
//! entry points into a read-only address table. The table is written once
//! at attach and only read afterwards, so the hot path takes no lock.

use log::{info, warn};

/// Well-known name of the real library under the system directory.
pub const LIBRARY_NAME: &str = "xinput1_3.dll";

/// Resolved addresses of the real entry points; 0 means "never resolved"
/// and the corresponding proxy permanently reports a disconnected device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XInputTargets {
    pub get_state: usize,
    pub set_state: usize,
    pub get_capabilities: usize,
    pub get_battery_information: usize,
    pub get_keystroke: usize,
}

impl XInputTargets {
    /// The three entry points every caller uses; losing any of them makes
    /// the layer useless and attach must fail.
    pub fn essential_resolved(&self) -> bool {
        self.get_state != 0 && self.set_state != 0 && self.get_capabilities != 0
    }
}

#[cfg(windows)]
pub use self::windows::resolve;

#[cfg(windows)]
mod windows {
    use super::*;

    use anyhow::{bail, Context, Result};
    use padtrace_intercept::module::{system_library_path, Library};

    /// Load the real DLL and resolve all five entry points.
    ///
    /// The returned `Library` must be kept alive as long as any resolved
    /// address may be called; dropping it unmaps the real implementation.
    pub fn resolve() -> Result<(Library, XInputTargets)> {
        let path = system_library_path(LIBRARY_NAME)
            .context("cannot determine the system directory")?;
        let library = Library::open(&path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        info!("loaded real implementation from {}", path.display());

        let lookup = |name: &str| {
            let addr = library.symbol(name).unwrap_or(0);
            if addr == 0 {
                warn!("{} not exported by {}; proxy will report no device", name, LIBRARY_NAME);
            }
            addr
        };

        let targets = XInputTargets {
            get_state: lookup("XInputGetState"),
            set_state: lookup("XInputSetState"),
            get_capabilities: lookup("XInputGetCapabilities"),
            get_battery_information: lookup("XInputGetBatteryInformation"),
            get_keystroke: lookup("XInputGetKeystroke"),
        };

        if !targets.essential_resolved() {
            bail!("essential XInput entry points missing from {}", path.display());
        }

        Ok((library, targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_has_nothing_resolved() {
        let targets = XInputTargets::default();
        assert!(!targets.essential_resolved());
        assert_eq!(targets.get_state, 0);
    }

    #[test]
    fn essential_check_requires_all_three() {
        let mut targets = XInputTargets {
            get_state: 0x1000,
            set_state: 0x2000,
            get_capabilities: 0x3000,
            ..XInputTargets::default()
        };
        assert!(targets.essential_resolved());

        targets.get_capabilities = 0;
        assert!(!targets.essential_resolved());
    }

    #[test]
    fn optional_entry_points_do_not_gate_essential_check() {
        let targets = XInputTargets {
            get_state: 1,
            set_state: 1,
            get_capabilities: 1,
            get_battery_information: 0,
            get_keystroke: 0,
        };
        assert!(targets.essential_resolved());
    }
}
