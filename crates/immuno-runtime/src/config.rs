use std::path::{Path, PathBuf};

pub const PLUGINS_DIR_ENV: &str = "IMMUNO_PLUGINS_DIR";
pub const DEFAULT_PLUGINS_DIR: &str = "plugins";

/// Where plugins are discovered and what a plugin file looks like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub plugins_dir: PathBuf,
    /// Extension of loadable libraries, without the leading dot.
    pub library_suffix: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PLUGINS_DIR)
    }
}

impl RuntimeConfig {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
            library_suffix: dynamic_library_ext().to_string(),
        }
    }

    /// Reads the plugin directory from `IMMUNO_PLUGINS_DIR`, falling back to `plugins`.
    pub fn from_env() -> Self {
        match std::env::var_os(PLUGINS_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::default(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.library_suffix = suffix.into().trim_start_matches('.').to_string();
        self
    }

    pub fn is_plugin_file(&self, path: &Path) -> bool {
        if self.library_suffix.is_empty() {
            return false;
        }
        path.extension()
            .and_then(|value| value.to_str())
            .is_some_and(|value| value.eq_ignore_ascii_case(&self.library_suffix))
    }
}

pub fn dynamic_library_ext() -> &'static str {
    match std::env::consts::OS {
        "windows" => "dll",
        "linux" => "so",
        "macos" => "dylib",
        _ => "",
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
