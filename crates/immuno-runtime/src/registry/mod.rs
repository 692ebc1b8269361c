//! Modules, their settings and the setting stores, owned by one [`Registry`].

mod setting;
mod snapshot;
mod store;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{DiagnosticsSink, LogLevel, TracingSink};
use crate::list::{Cursor, OrderedList};
use crate::status::{InitStatus, StatusRecord, ValueError};

pub use setting::Setting;
pub use snapshot::{ModuleSnapshot, RegistrySnapshot, SettingSnapshot};
pub use store::{StoreDumpHook, StoreModuleHook};

use store::StoreRecord;

/// Identity a plugin hands over once at registration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}

impl Metadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettingId {
    pub(crate) module: ModuleId,
    pub(crate) slot: u32,
}

impl SettingId {
    pub fn module(&self) -> ModuleId {
        self.module
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreId(pub(crate) u32);

/// Registry size at one point in time, see [`Registry::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryMark {
    modules: usize,
    stores: usize,
}

/// Post-load or teardown reaction of one module.
pub type ModuleHook = Box<dyn FnMut(&mut Registry, ModuleId)>;

struct ModuleRecord {
    metadata: Metadata,
    settings: OrderedList<Setting>,
    cursor: Cursor,
    post_load: Option<ModuleHook>,
    teardown: Option<ModuleHook>,
}

impl fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("metadata", &self.metadata)
            .field("settings", &self.settings.len())
            .field("cursor", &self.cursor)
            .field("post_load", &self.post_load.is_some())
            .field("teardown", &self.teardown.is_some())
            .finish()
    }
}

/// Every loaded module together with its settings and stores.
pub struct Registry {
    modules: OrderedList<ModuleRecord>,
    stores: OrderedList<StoreRecord>,
    settings_status: StatusRecord,
    out_of_memory: bool,
    sink: Box<dyn DiagnosticsSink>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("modules", &self.modules)
            .field("stores", &self.stores.len())
            .field("settings_status", &self.settings_status)
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_sink(Box::new(TracingSink))
    }

    pub fn with_sink(sink: Box<dyn DiagnosticsSink>) -> Self {
        Self {
            modules: OrderedList::new(),
            stores: OrderedList::new(),
            settings_status: StatusRecord::new("setting"),
            out_of_memory: false,
            sink,
        }
    }

    pub fn sink(&self) -> &dyn DiagnosticsSink {
        self.sink.as_ref()
    }

    /// Logs on behalf of `module`, or of the runtime when the module is unknown.
    pub fn log(&self, module: Option<ModuleId>, level: LogLevel, args: fmt::Arguments<'_>) {
        let name = module
            .and_then(|id| self.metadata(id))
            .map_or("runtime", |metadata| metadata.name.as_str());
        self.sink.putf(name, level, args);
    }

    pub fn register_module(&mut self, metadata: Metadata) -> Result<ModuleId, ValueError> {
        let name = metadata.name.clone();
        let record = ModuleRecord {
            metadata,
            settings: OrderedList::new(),
            cursor: Cursor::default(),
            post_load: None,
            teardown: None,
        };
        match self.modules.append(record) {
            Ok(key) => {
                tracing::debug!(module = %name, id = key, "module registered");
                Ok(ModuleId(key))
            }
            Err(_) => {
                self.out_of_memory = true;
                self.sink.putf(
                    &name,
                    LogLevel::Error,
                    format_args!("module registration failed: out of memory"),
                );
                Err(ValueError::AllocationFailure)
            }
        }
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Registered modules in load order.
    pub fn modules(&self) -> impl Iterator<Item = (ModuleId, &Metadata)> + '_ {
        self.modules
            .iter()
            .map(|(key, record)| (ModuleId(key), &record.metadata))
    }

    pub fn module_ids(&self) -> Vec<ModuleId> {
        self.modules.keys().map(ModuleId).collect()
    }

    pub fn contains_module(&self, module: ModuleId) -> bool {
        self.modules.contains(module.0)
    }

    pub fn metadata(&self, module: ModuleId) -> Option<&Metadata> {
        self.modules.get(module.0).map(|record| &record.metadata)
    }

    pub fn find_module(&self, name: &str) -> Option<ModuleId> {
        self.modules()
            .find(|(_, metadata)| metadata.name == name)
            .map(|(id, _)| id)
    }

    /// Moves the module's setting cursor back to its first setting.
    pub fn rewind(&mut self, module: ModuleId) -> Result<(), ValueError> {
        self.module_mut(module)?.cursor.rewind();
        Ok(())
    }

    /// Setting under the module's cursor, advancing it. `None` at the end.
    pub fn read(&mut self, module: ModuleId) -> Option<SettingId> {
        let record = self.modules.get_mut(module.0)?;
        let slot = record.cursor.read(&record.settings)?;
        Some(SettingId { module, slot })
    }

    pub fn set_post_load(
        &mut self,
        module: ModuleId,
        hook: Option<ModuleHook>,
    ) -> Result<(), ValueError> {
        self.module_mut(module)?.post_load = hook;
        Ok(())
    }

    pub fn set_teardown(
        &mut self,
        module: ModuleId,
        hook: Option<ModuleHook>,
    ) -> Result<(), ValueError> {
        self.module_mut(module)?.teardown = hook;
        Ok(())
    }

    /// Outcome of every setting register/get/set since the last reset.
    pub fn settings_status(&self) -> &StatusRecord {
        &self.settings_status
    }

    pub fn reset_settings_status_last(&mut self) {
        self.settings_status.reset_last();
    }

    pub fn reset_settings_status_high(&mut self) {
        self.settings_status.reset_high();
    }

    pub fn reset_settings_status(&mut self) {
        self.settings_status.reset();
        self.out_of_memory = false;
    }

    /// Library-wide initialization status derived from every class.
    pub fn init_status(&self) -> InitStatus {
        if self.out_of_memory {
            InitStatus::OutOfMemory
        } else {
            self.settings_status.init
        }
    }

    /// Runs and drops every module's teardown callback, in load order.
    pub fn run_teardown(&mut self) {
        for module in self.module_ids() {
            let hook = self
                .modules
                .get_mut(module.0)
                .and_then(|record| record.teardown.take());
            if let Some(mut hook) = hook {
                hook(self, module);
            }
        }
    }

    pub fn mark(&self) -> RegistryMark {
        RegistryMark {
            modules: self.modules.len(),
            stores: self.stores.len(),
        }
    }

    /// Drops, without running any hook, every module and store registered after `mark`.
    pub fn discard_since(&mut self, mark: RegistryMark) {
        self.stores.truncate(mark.stores);
        self.modules.truncate(mark.modules);
    }

    /// Drops every module, setting and store. Issued ids are never reused.
    pub fn clear(&mut self) {
        self.stores.clear();
        self.modules.clear();
    }

    fn module_mut(&mut self, module: ModuleId) -> Result<&mut ModuleRecord, ValueError> {
        self.modules
            .get_mut(module.0)
            .ok_or(ValueError::InvalidHandle)
    }

    fn run_post_load(&mut self, module: ModuleId) {
        let hook = self
            .modules
            .get_mut(module.0)
            .and_then(|record| record.post_load.take());
        let Some(mut hook) = hook else {
            return;
        };
        hook(self, module);
        if let Some(record) = self.modules.get_mut(module.0)
            && record.post_load.is_none()
        {
            record.post_load = Some(hook);
        }
    }
}

#[cfg(test)]
#[path = "../tests/registry_tests.rs"]
mod tests;
