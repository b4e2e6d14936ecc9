//! Attach-time configuration.
//!
//! Read once from a key=value file next to the host executable, never
//! re-read. Missing file or unreadable lines fall back to defaults, so a
//! bad config can never keep the layer from attaching.

use std::path::Path;

/// Default config file name, looked up in the host's working directory.
pub const CONFIG_FILE: &str = "xinput_logger.cfg";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_to_file: bool,
    pub log_to_console: bool,
    pub show_timestamps: bool,
    /// Master switch for the debug-output capture feature.
    pub capture_debug_output: bool,
    pub filter_messages: bool,
    pub log_file_path: String,
    pub filter_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_to_file: true,
            log_to_console: true,
            show_timestamps: true,
            capture_debug_output: true,
            filter_messages: false,
            log_file_path: "game_debug_log.txt".to_string(),
            filter_pattern: String::new(),
        }
    }
}

impl Config {
    /// Load `CONFIG_FILE` from the working directory, or defaults when the
    /// file is absent.
    pub fn load() -> Self {
        Self::from_file(Path::new(CONFIG_FILE))
    }

    /// Parse a config file, starting from defaults. Unknown keys and lines
    /// without a `=` are ignored.
    pub fn from_file(path: &Path) -> Self {
        let mut config = Self::default();
        let Ok(contents) = std::fs::read_to_string(path) else {
            return config;
        };
        for line in contents.lines() {
            config.apply_line(line);
        }
        config
    }

    fn apply_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let key = key.trim();
        let value = value.trim();
        let truthy = value == "true";

        match key {
            "logToFile" => self.log_to_file = truthy,
            "logToConsole" => self.log_to_console = truthy,
            "showTimestamps" => self.show_timestamps = truthy,
            "captureOutputDebugString" => self.capture_debug_output = truthy,
            "filterMessages" => self.filter_messages = truthy,
            "logFilePath" => self.log_file_path = value.to_string(),
            "filterPattern" => self.filter_pattern = value.to_string(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::from_file(Path::new("/no/such/file.cfg"));
        assert_eq!(config, Config::default());
        assert!(config.capture_debug_output);
        assert!(!config.filter_messages);
        assert_eq!(config.log_file_path, "game_debug_log.txt");
    }

    #[test]
    fn file_overrides_defaults() {
        let file = write_config(
            "logToConsole=false\n\
             filterMessages=true\n\
             filterPattern=HUD\n\
             logFilePath=trace.log\n",
        );
        let config = Config::from_file(file.path());

        assert!(!config.log_to_console);
        assert!(config.filter_messages);
        assert_eq!(config.filter_pattern, "HUD");
        assert_eq!(config.log_file_path, "trace.log");
        // Untouched keys keep their defaults.
        assert!(config.log_to_file);
        assert!(config.show_timestamps);
    }

    #[test]
    fn junk_lines_and_unknown_keys_are_ignored() {
        let file = write_config(
            "# comment\n\
             \n\
             not a key value pair\n\
             captureETW=true\n\
             showTimestamps=false\n",
        );
        let config = Config::from_file(file.path());
        assert!(!config.show_timestamps);
        assert_eq!(config.filter_pattern, "");
    }

    #[test]
    fn non_true_values_read_as_false() {
        let file = write_config("logToFile=TRUE\nlogToConsole=1\n");
        let config = Config::from_file(file.path());
        assert!(!config.log_to_file);
        assert!(!config.log_to_console);
    }
}
