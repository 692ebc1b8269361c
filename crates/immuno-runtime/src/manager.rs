//! Plugin discovery, the load handshake and teardown.

use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};

use immuno_plugin_api::{
    IM_OK, IMMUNO_PLUGIN_BIND_HOST_SYMBOL, IMMUNO_PLUGIN_EXIT_SYMBOL, IMMUNO_PLUGIN_INIT_SYMBOL,
    ImPluginBindHost, ImPluginExit, ImPluginInit,
};
use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::diagnostics::{DiagnosticsSink, LogLevel};
use crate::error::{Error, Result};
use crate::host::HostBridge;
use crate::loader::{LoaderError, NativePlatform, Platform, SharedLibrary};
use crate::registry::{ModuleId, Registry};
use crate::status::InitStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Scanning,
    Ready,
    Unloading,
}

/// Progress of one library through the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateStage {
    Opened,
    HandshakeOk,
    Registered,
}

pub type BuiltinInit = Box<dyn Fn(&mut Registry) -> std::result::Result<(), String>>;
pub type BuiltinExit = Box<dyn Fn(&mut Registry)>;

/// A plugin linked into the host binary. It goes through the same handshake as a library.
pub struct BuiltinPlugin {
    name: String,
    init: BuiltinInit,
    exit: Option<BuiltinExit>,
}

impl BuiltinPlugin {
    pub fn new(
        name: impl Into<String>,
        init: impl Fn(&mut Registry) -> std::result::Result<(), String> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            init: Box::new(init),
            exit: None,
        }
    }

    /// `exit` runs at unload, after every module has been removed from the registry.
    pub fn with_exit(mut self, exit: impl Fn(&mut Registry) + 'static) -> Self {
        self.exit = Some(Box::new(exit));
        self
    }
}

impl fmt::Debug for BuiltinPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinPlugin")
            .field("name", &self.name)
            .field("exit", &self.exit.is_some())
            .finish_non_exhaustive()
    }
}

enum PluginOrigin<L> {
    Builtin {
        index: usize,
    },
    Library {
        path: PathBuf,
        library: L,
        exit: Option<ImPluginExit>,
    },
}

struct LoadedPlugin<L> {
    module: ModuleId,
    origin: PluginOrigin<L>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedPluginInfo {
    #[serde(skip)]
    pub module: ModuleId,
    pub name: String,
    pub version: String,
    pub library_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub loaded: Vec<LoadedPluginInfo>,
    /// Directory entries without the plugin suffix.
    pub skipped: Vec<PathBuf>,
}

/// Owns the registry and every loaded plugin.
///
/// Startup is all-or-nothing: the first plugin that fails to load aborts the whole startup,
/// unloads whatever was already loaded and returns the manager to [`ManagerState::Idle`].
pub struct PluginManager<P: Platform = NativePlatform> {
    config: RuntimeConfig,
    platform: P,
    state: ManagerState,
    failure: Option<InitStatus>,
    builtins: Vec<BuiltinPlugin>,
    registry: Registry,
    plugins: Vec<LoadedPlugin<P::Library>>,
    bridge: HostBridge,
}

impl PluginManager<NativePlatform> {
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_platform(config, NativePlatform)
    }

    pub fn from_env() -> Self {
        Self::new(RuntimeConfig::from_env())
    }
}

impl<P: Platform> PluginManager<P> {
    pub fn with_platform(config: RuntimeConfig, platform: P) -> Self {
        Self {
            config,
            platform,
            state: ManagerState::Idle,
            failure: None,
            builtins: Vec::new(),
            registry: Registry::new(),
            plugins: Vec::new(),
            bridge: HostBridge::new(),
        }
    }

    /// Replaces the diagnostics sink. Only meaningful before [`PluginManager::start`].
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.registry = Registry::with_sink(sink);
        self
    }

    pub fn add_builtin(&mut self, plugin: BuiltinPlugin) -> Result<()> {
        self.expect_state(ManagerState::Idle)?;
        self.builtins.push(plugin);
        Ok(())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn loaded_plugins(&self) -> Vec<LoadedPluginInfo> {
        self.plugins
            .iter()
            .map(|plugin| {
                let metadata = self.registry.metadata(plugin.module);
                LoadedPluginInfo {
                    module: plugin.module,
                    name: metadata.map(|m| m.name.clone()).unwrap_or_default(),
                    version: metadata.map(|m| m.version.clone()).unwrap_or_default(),
                    library_path: match &plugin.origin {
                        PluginOrigin::Library { path, .. } => Some(path.clone()),
                        PluginOrigin::Builtin { .. } => None,
                    },
                }
            })
            .collect()
    }

    /// Scans the plugin directory, loads every plugin and runs the persistence load phase.
    pub fn start(&mut self) -> Result<LoadReport> {
        self.expect_state(ManagerState::Idle)?;
        self.state = ManagerState::Scanning;
        self.failure = None;
        self.registry.reset_settings_status();
        tracing::info!(dir = %self.config.plugins_dir.display(), "plugin scan started");

        let skipped = match self.load_all() {
            Ok(skipped) => skipped,
            Err(error) => {
                tracing::error!(code = error.code(), "plugin startup aborted: {error}");
                self.registry.log(
                    None,
                    LogLevel::Fatal,
                    format_args!("plugin startup aborted: {error}"),
                );
                self.unload_all(false);
                self.failure = Some(error.init_status());
                self.state = ManagerState::Idle;
                return Err(error);
            }
        };

        self.registry.load_settings();
        self.state = ManagerState::Ready;
        let loaded = self.loaded_plugins();
        tracing::info!(plugins = loaded.len(), "plugin scan completed");
        Ok(LoadReport { loaded, skipped })
    }

    /// Saves every module through every store and flushes the stores. Returns the number of
    /// stores flushed.
    pub fn persist(&mut self) -> usize {
        self.registry.save_settings();
        self.registry.dump_stores()
    }

    /// Flushes pending stores, runs teardown callbacks, empties the registry, then runs exit
    /// symbols and closes every library.
    pub fn shutdown(&mut self) {
        if self.state != ManagerState::Ready {
            return;
        }
        self.state = ManagerState::Unloading;
        self.unload_all(true);
        self.state = ManagerState::Idle;
        tracing::info!("plugins unloaded");
    }

    /// Outcome of the last startup, or of registrations since then.
    pub fn init_status(&self) -> InitStatus {
        self.failure.unwrap_or_else(|| self.registry.init_status())
    }

    pub fn describe_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.registry.snapshot())?)
    }

    fn expect_state(&self, expected: ManagerState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                actual: self.state,
            })
        }
    }

    fn load_all(&mut self) -> Result<Vec<PathBuf>> {
        let (candidates, skipped) = self.scan()?;
        for index in 0..self.builtins.len() {
            self.load_builtin(index)?;
        }
        for path in candidates {
            self.load_library(&path)?;
        }
        Ok(skipped)
    }

    fn scan(&self) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let dir = &self.config.plugins_dir;
        let entries = self.platform.open_dir(dir).map_err(|error| match error {
            LoaderError::NotFound => Error::PluginDirNotFound { path: dir.clone() },
            LoaderError::Failed(details) => Error::io_at(dir, std::io::Error::other(details)),
        })?;
        let (mut candidates, skipped): (Vec<_>, Vec<_>) =
            entries.partition(|path| self.config.is_plugin_file(path));
        candidates.sort();
        for path in &skipped {
            tracing::trace!(path = %path.display(), "skipping non-plugin entry");
        }
        Ok((candidates, skipped))
    }

    fn load_builtin(&mut self, index: usize) -> Result<()> {
        let builtin = &self.builtins[index];
        let label = builtin.name.clone();
        let module = handshake(&mut self.registry, &self.bridge, &label, |_, registry| {
            (builtin.init)(registry)
        })?;
        self.plugins.push(LoadedPlugin {
            module,
            origin: PluginOrigin::Builtin { index },
        });
        tracing::info!(plugin = %label, "builtin plugin loaded");
        Ok(())
    }

    fn load_library(&mut self, path: &Path) -> Result<()> {
        let library = self
            .platform
            .open_library(path)
            .map_err(|error| Error::plugin_open(path, error))?;
        tracing::debug!(
            path = %path.display(),
            stage = ?CandidateStage::Opened,
            "plugin candidate"
        );

        let Some(init) = library.symbol(IMMUNO_PLUGIN_INIT_SYMBOL) else {
            close_library(library, path);
            return Err(Error::entry_missing(path, IMMUNO_PLUGIN_INIT_SYMBOL));
        };
        // SAFETY: the ABI declares each well-known symbol with the matching function type.
        let init = unsafe { std::mem::transmute::<*mut c_void, ImPluginInit>(init.as_ptr()) };
        let bind = library
            .symbol(IMMUNO_PLUGIN_BIND_HOST_SYMBOL)
            .map(|s| unsafe { std::mem::transmute::<*mut c_void, ImPluginBindHost>(s.as_ptr()) });
        let exit = library
            .symbol(IMMUNO_PLUGIN_EXIT_SYMBOL)
            .map(|s| unsafe { std::mem::transmute::<*mut c_void, ImPluginExit>(s.as_ptr()) });

        let label = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
        let result = handshake(&mut self.registry, &self.bridge, &label, |bridge, registry| {
            let code = bridge.enter(registry, || {
                if let Some(bind) = bind {
                    // SAFETY: the vtable outlives every plugin; see `HostBridge`.
                    unsafe { bind(bridge.vtable()) };
                }
                // SAFETY: see the transmute above.
                unsafe { init() }
            });
            if code == IM_OK {
                Ok(())
            } else {
                Err(format!("initializer returned {code}"))
            }
        });

        match result {
            Ok(module) => {
                tracing::info!(
                    path = %path.display(),
                    stage = ?CandidateStage::Registered,
                    "plugin loaded"
                );
                self.plugins.push(LoadedPlugin {
                    module,
                    origin: PluginOrigin::Library {
                        path: path.to_path_buf(),
                        library,
                        exit,
                    },
                });
                Ok(())
            }
            Err(error) => {
                close_library(library, path);
                Err(error)
            }
        }
    }

    /// Tears down every loaded plugin. `flush` dumps pending stores first.
    fn unload_all(&mut self, flush: bool) {
        if flush {
            let flushed = self.registry.dump_stores();
            tracing::debug!(flushed, "pending stores flushed");
        }
        self.registry.run_teardown();
        // Exits may free the storage that settings point into.
        self.registry.clear();
        for plugin in self.plugins.iter().rev() {
            match &plugin.origin {
                PluginOrigin::Builtin { index } => {
                    if let Some(exit) = &self.builtins[*index].exit {
                        exit(&mut self.registry);
                    }
                }
                PluginOrigin::Library {
                    exit: Some(exit), ..
                } => {
                    // SAFETY: the library stays open until the loop below closes it.
                    let exit = *exit;
                    self.bridge.enter(&mut self.registry, || unsafe { exit() });
                }
                PluginOrigin::Library { exit: None, .. } => {}
            }
        }
        for plugin in self.plugins.drain(..).rev() {
            if let PluginOrigin::Library { path, library, .. } = plugin.origin {
                close_library(library, &path);
            }
        }
    }
}

impl<P: Platform> Drop for PluginManager<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs one plugin initializer and checks that it registered exactly one module.
///
/// Anything registered by a failed handshake is discarded without running its hooks.
fn handshake(
    registry: &mut Registry,
    bridge: &HostBridge,
    label: &str,
    init: impl FnOnce(&HostBridge, &mut Registry) -> std::result::Result<(), String>,
) -> Result<ModuleId> {
    let mark = registry.mark();
    let before = registry.module_count();
    let was_out_of_memory = registry.init_status() == InitStatus::OutOfMemory;

    let outcome = init(bridge, registry).map_err(|reason| Error::init_failed(label, reason));
    let outcome = outcome.and_then(|()| {
        if !was_out_of_memory && registry.init_status() == InitStatus::OutOfMemory {
            return Err(Error::AllocationFailure {
                plugin: label.to_string(),
            });
        }
        match registry.module_count() - before {
            1 => registry
                .module_ids()
                .last()
                .copied()
                .ok_or_else(|| Error::init_failed(label, "module vanished during handshake")),
            0 => Err(Error::init_failed(label, "no module registered")),
            n => Err(Error::init_failed(
                label,
                format!("registered {n} modules, expected exactly one"),
            )),
        }
    });

    match outcome {
        Ok(module) => {
            tracing::debug!(
                plugin = label,
                stage = ?CandidateStage::HandshakeOk,
                "handshake completed"
            );
            Ok(module)
        }
        Err(error) => {
            registry.discard_since(mark);
            Err(error)
        }
    }
}

fn close_library<L: SharedLibrary>(library: L, path: &Path) {
    if let Err(error) = library.close() {
        tracing::warn!(path = %path.display(), "failed to close plugin library: {error}");
    }
}

#[cfg(test)]
#[path = "tests/manager_tests.rs"]
mod tests;
