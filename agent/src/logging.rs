//! Logging backend initialization.
//!
//! Everything in the layer logs through the `log` facade; this wires the
//! facade to a file and/or console sink per the attach-time config. A host
//! process without a console gets one allocated when console logging is on,
//! the same way the capture tooling this replaces did.

use std::fs::File;

use simplelog::{
    CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, SimpleLogger, WriteLogger,
};

use crate::config::Config;

/// Initialize the global logger. Safe to call once per process; a second
/// call (or a pre-existing logger) is a silent no-op.
pub fn init(config: &Config) {
    let mut builder = ConfigBuilder::new();
    if !config.show_timestamps {
        builder.set_time_level(LevelFilter::Off);
    }
    let format = builder.build();

    let mut sinks: Vec<Box<dyn SharedLogger>> = Vec::new();
    if config.log_to_console {
        #[cfg(windows)]
        allocate_console();
        sinks.push(SimpleLogger::new(LevelFilter::Info, format.clone()));
    }
    if config.log_to_file {
        match File::create(&config.log_file_path) {
            Ok(file) => sinks.push(WriteLogger::new(LevelFilter::Info, format.clone(), file)),
            Err(_) => {
                // Nothing is listening yet, so there is nowhere to report
                // this; console logging (if any) still works.
            }
        }
    }

    if !sinks.is_empty() {
        let _ = CombinedLogger::init(sinks);
    }
}

/// Give the host a console to print to when it was not started with one.
#[cfg(windows)]
fn allocate_console() {
    use windows_sys::Win32::System::Console::AllocConsole;
    unsafe {
        AllocConsole();
    }
}
