//! Setting stores and the persistence phase.

use std::fmt;

use crate::diagnostics::LogLevel;
use crate::status::ValueError;

use super::{ModuleId, Registry, StoreId};

/// Loads or saves the settings of one module.
pub type StoreModuleHook = Box<dyn FnMut(&mut Registry, StoreId, ModuleId)>;
/// Flushes the store's medium. Returns whether the flush succeeded.
pub type StoreDumpHook = Box<dyn FnMut(&mut Registry, StoreId) -> bool>;

pub(super) struct StoreRecord {
    provider: ModuleId,
    load: Option<StoreModuleHook>,
    save: Option<StoreModuleHook>,
    dump: Option<StoreDumpHook>,
    pending: bool,
}

impl fmt::Debug for StoreRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRecord")
            .field("provider", &self.provider)
            .field("load", &self.load.is_some())
            .field("save", &self.save.is_some())
            .field("dump", &self.dump.is_some())
            .field("pending", &self.pending)
            .finish()
    }
}

fn load_slot(record: &mut StoreRecord) -> &mut Option<StoreModuleHook> {
    &mut record.load
}

fn save_slot(record: &mut StoreRecord) -> &mut Option<StoreModuleHook> {
    &mut record.save
}

impl Registry {
    pub fn register_store(&mut self, provider: ModuleId) -> Result<StoreId, ValueError> {
        if !self.contains_module(provider) {
            return Err(ValueError::InvalidHandle);
        }
        let record = StoreRecord {
            provider,
            load: None,
            save: None,
            dump: None,
            pending: false,
        };
        match self.stores.append(record) {
            Ok(key) => Ok(StoreId(key)),
            Err(_) => {
                self.out_of_memory = true;
                self.log(
                    Some(provider),
                    LogLevel::Error,
                    format_args!("store registration failed: out of memory"),
                );
                Err(ValueError::AllocationFailure)
            }
        }
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.stores.keys().map(StoreId).collect()
    }

    pub fn store_provider(&self, store: StoreId) -> Option<ModuleId> {
        self.stores.get(store.0).map(|record| record.provider)
    }

    pub fn set_store_load(
        &mut self,
        store: StoreId,
        hook: Option<StoreModuleHook>,
    ) -> Result<(), ValueError> {
        self.store_mut(store)?.load = hook;
        Ok(())
    }

    pub fn set_store_save(
        &mut self,
        store: StoreId,
        hook: Option<StoreModuleHook>,
    ) -> Result<(), ValueError> {
        self.store_mut(store)?.save = hook;
        Ok(())
    }

    pub fn set_store_dump(
        &mut self,
        store: StoreId,
        hook: Option<StoreDumpHook>,
    ) -> Result<(), ValueError> {
        self.store_mut(store)?.dump = hook;
        Ok(())
    }

    /// Flags the store so the next [`Registry::dump_stores`] flushes it.
    pub fn mark_store_pending(&mut self, store: StoreId) -> Result<(), ValueError> {
        self.store_mut(store)?.pending = true;
        Ok(())
    }

    pub fn store_pending(&self, store: StoreId) -> Option<bool> {
        self.stores.get(store.0).map(|record| record.pending)
    }

    /// Applies every store's load hook to each module in load order, then fires that module's
    /// post-load callback.
    pub fn load_settings(&mut self) {
        for module in self.module_ids() {
            for store in self.store_ids() {
                self.call_module_hook(store, module, load_slot);
            }
            self.run_post_load(module);
        }
    }

    /// Hands `module` to every store's save hook and marks those stores pending.
    pub fn save_module(&mut self, module: ModuleId) {
        for store in self.store_ids() {
            if self.call_module_hook(store, module, save_slot)
                && let Some(record) = self.stores.get_mut(store.0)
            {
                record.pending = true;
            }
        }
    }

    pub fn save_settings(&mut self) {
        for module in self.module_ids() {
            self.save_module(module);
        }
    }

    /// Flushes every pending store once. Returns how many flushed successfully.
    pub fn dump_stores(&mut self) -> usize {
        let mut flushed = 0;
        for store in self.store_ids() {
            let hook = match self.stores.get_mut(store.0) {
                Some(record) if record.pending => record.dump.take(),
                _ => None,
            };
            let Some(mut hook) = hook else {
                continue;
            };
            let ok = hook(self, store);
            if let Some(record) = self.stores.get_mut(store.0) {
                if record.dump.is_none() {
                    record.dump = Some(hook);
                }
                if ok {
                    record.pending = false;
                    flushed += 1;
                } else {
                    let provider = record.provider;
                    self.log(
                        Some(provider),
                        LogLevel::Error,
                        format_args!("store {} dump failed", store.0),
                    );
                }
            }
        }
        flushed
    }

    fn store_mut(&mut self, store: StoreId) -> Result<&mut StoreRecord, ValueError> {
        self.stores
            .get_mut(store.0)
            .ok_or(ValueError::InvalidHandle)
    }

    /// Runs one hook with the store temporarily detached so it can borrow the registry.
    ///
    /// A hook replaced while it runs keeps the replacement.
    fn call_module_hook(
        &mut self,
        store: StoreId,
        module: ModuleId,
        slot: fn(&mut StoreRecord) -> &mut Option<StoreModuleHook>,
    ) -> bool {
        let Some(mut hook) = self.stores.get_mut(store.0).and_then(|record| slot(record).take())
        else {
            return false;
        };
        hook(self, store, module);
        if let Some(record) = self.stores.get_mut(store.0) {
            let current = slot(record);
            if current.is_none() {
                *current = Some(hook);
            }
        }
        true
    }
}
