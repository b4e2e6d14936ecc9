//! padtrace agent: a transparent stand-in for `xinput1_3.dll`.
//!
//! Compiled as a cdylib and dropped next to the host executable, which
//! loads it in place of the real library. Every exported entry point
//! forwards to the genuine system DLL; on the side, the host's import
//! slots for `OutputDebugStringA`/`W` are redirected to observers that
//! capture debug text into a bounded ring before forwarding it onward.

pub mod capture;
pub mod config;
pub mod control;
pub mod forward;
pub mod guard;
pub mod logging;
pub mod resolver;
pub mod widestr;

#[cfg(windows)]
pub mod exports;
#[cfg(windows)]
pub mod observers;

use std::sync::OnceLock;

use log::info;

use crate::capture::{CapturePipeline, FilterRule};
use crate::config::Config;
use crate::control::{ControlAction, ControlState, KeySource};
use crate::resolver::XInputTargets;

/// Global layer state, set once at attach.
static AGENT: OnceLock<Agent> = OnceLock::new();

/// Everything the layer owns, built by attach and passed by reference to
/// every proxy and observer. Tests construct their own independent
/// instances instead of going through the global.
pub struct Agent {
    config: Config,
    targets: XInputTargets,
    pipeline: CapturePipeline,
    control: ControlState,
    keys: Box<dyn KeySource + Send + Sync>,
    #[cfg(windows)]
    library: std::sync::Mutex<Option<padtrace_intercept::module::Library>>,
    #[cfg(windows)]
    patches: Option<observers::DebugCapturePatches>,
}

impl Agent {
    /// Assemble a context from parts. The real layer calls this from
    /// attach with live collaborators; tests inject fakes.
    pub fn with_parts(
        config: Config,
        targets: XInputTargets,
        filter: FilterRule,
        capacity: usize,
        keys: Box<dyn KeySource + Send + Sync>,
    ) -> Self {
        Self {
            config,
            targets,
            pipeline: CapturePipeline::new(capacity, filter),
            control: ControlState::new(),
            keys,
            #[cfg(windows)]
            library: std::sync::Mutex::new(None),
            #[cfg(windows)]
            patches: None,
        }
    }

    /// The process-wide agent, if attach completed.
    pub fn get() -> Option<&'static Agent> {
        AGENT.get()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn targets(&self) -> &XInputTargets {
        &self.targets
    }

    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    pub fn control(&self) -> &ControlState {
        &self.control
    }

    /// Whether an observed payload should reach the capture pipeline
    /// right now.
    pub fn capture_enabled(&self) -> bool {
        self.config.capture_debug_output && self.control.logging_enabled()
    }

    /// One hotkey poll, piggy-backed on the host's state polling. Must
    /// never fail the calling entry point, so actions are handled inline
    /// and errors have already degraded to "not pressed" below here.
    pub fn poll_control(&self) {
        if let Some(action) = self.control.poll(self.keys.as_ref()) {
            match action {
                ControlAction::DumpDiagnostics => self.dump_diagnostics(),
            }
        }
    }

    /// Emit a capture summary through the text sink.
    pub fn dump_diagnostics(&self) {
        info!("=== padtrace diagnostics ===");
        info!("process id: {}", std::process::id());
        info!(
            "captured {} of up to {} debug lines",
            self.pipeline.len(),
            self.pipeline.capacity()
        );
        for line in self.pipeline.recent(10) {
            info!("  {}", line);
        }
    }
}

#[cfg(windows)]
impl Agent {
    /// Build the live layer: config, logging, resolver, patches.
    ///
    /// A load failure or missing essential entry point aborts the attach;
    /// everything else degrades per entry point.
    fn attach() -> anyhow::Result<Self> {
        let config = Config::load();
        logging::init(&config);

        info!("padtrace attached to process {}", std::process::id());
        info!("hotkeys: Alt+L toggle logging, Alt+I dump diagnostics");

        let (library, targets) = resolver::resolve()?;

        let filter = FilterRule::new(config.filter_messages, config.filter_pattern.clone());
        let capture_wanted = config.capture_debug_output;
        let mut agent = Self::with_parts(
            config,
            targets,
            filter,
            capture::DEFAULT_CAPACITY,
            Box::new(control::AsyncKeyState),
        );
        agent.library = std::sync::Mutex::new(Some(library));

        if capture_wanted {
            match padtrace_intercept::module::main_module_base() {
                Some(base) => {
                    let patches = unsafe { observers::DebugCapturePatches::install(base) };
                    info!("observing {} diagnostic entry point(s)", patches.installed());
                    agent.patches = Some(patches);
                }
                None => log::warn!("host module base unavailable; capture disabled"),
            }
        }

        Ok(agent)
    }

    /// Undo the interception: the import slots must not outlive us
    /// pointing at our observers, and the real library goes back to the
    /// loader once no forwarded call can be in flight.
    fn detach(&self) {
        if let Some(patches) = &self.patches {
            unsafe { patches.restore() };
        }
        drop(
            self.library
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take(),
        );
        info!(
            "padtrace detaching; captured {} debug lines",
            self.pipeline.len()
        );
    }
}

#[cfg(windows)]
mod entry {
    use super::{Agent, AGENT};
    use std::ffi::c_void;
    use windows_sys::Win32::System::SystemServices::{DLL_PROCESS_ATTACH, DLL_PROCESS_DETACH};

    #[no_mangle]
    pub unsafe extern "system" fn DllMain(
        _module: *mut c_void,
        reason: u32,
        _reserved: *mut c_void,
    ) -> i32 {
        match reason {
            DLL_PROCESS_ATTACH => match Agent::attach() {
                Ok(agent) => {
                    if AGENT.set(agent).is_err() {
                        return 0;
                    }
                    1
                }
                Err(e) => {
                    log::error!("padtrace attach failed: {:#}", e);
                    0
                }
            },
            DLL_PROCESS_DETACH => {
                if let Some(agent) = Agent::get() {
                    agent.detach();
                }
                1
            }
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::tests_support::NoKeys;

    fn test_agent(config: Config) -> Agent {
        Agent::with_parts(
            config,
            XInputTargets::default(),
            FilterRule::retain_all(),
            8,
            Box::new(NoKeys),
        )
    }

    #[test]
    fn contexts_are_independent() {
        let a = test_agent(Config::default());
        let b = test_agent(Config::default());

        a.pipeline().submit("only in a");
        assert_eq!(a.pipeline().len(), 1);
        assert!(b.pipeline().is_empty());

        a.control().set_logging_enabled(false);
        assert!(b.control().logging_enabled());
    }

    #[test]
    fn capture_enabled_tracks_config_and_control() {
        let agent = test_agent(Config::default());
        assert!(agent.capture_enabled());

        agent.control().set_logging_enabled(false);
        assert!(!agent.capture_enabled());
        agent.control().set_logging_enabled(true);

        let disabled = test_agent(Config {
            capture_debug_output: false,
            ..Config::default()
        });
        assert!(!disabled.capture_enabled());
    }

    #[test]
    fn poll_control_with_quiet_keys_changes_nothing() {
        let agent = test_agent(Config::default());
        for _ in 0..100 {
            agent.poll_control();
        }
        assert!(agent.control().logging_enabled());
        assert!(agent.pipeline().is_empty());
    }

    #[test]
    fn diagnostics_dump_handles_empty_and_full_buffers() {
        let agent = test_agent(Config::default());
        agent.dump_diagnostics();

        for i in 0..20 {
            agent.pipeline().submit(&format!("line {}", i));
        }
        agent.dump_diagnostics();
        assert_eq!(agent.pipeline().len(), 8);
    }
}
