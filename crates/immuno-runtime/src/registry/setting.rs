use std::ops::Deref;

use crate::diagnostics::LogLevel;
use crate::status::{Method, ValueError};
use crate::types::TypeKind;
use crate::value::Value;
use crate::variable::{Variable, VariableDecl};

use super::{ModuleId, Registry, SettingId};

/// A variable owned by one module.
#[derive(Debug)]
pub struct Setting {
    owner: ModuleId,
    variable: Variable,
}

impl Setting {
    pub fn owner(&self) -> ModuleId {
        self.owner
    }

    pub fn variable(&self) -> &Variable {
        &self.variable
    }
}

impl Deref for Setting {
    type Target = Variable;

    fn deref(&self) -> &Self::Target {
        &self.variable
    }
}

impl Registry {
    pub fn register_setting(
        &mut self,
        module: ModuleId,
        decl: VariableDecl,
    ) -> Result<SettingId, ValueError> {
        let record = self.module_mut(module)?;
        let name = decl.name.clone();
        let result = Variable::register(decl).and_then(|variable| {
            record
                .settings
                .append(Setting {
                    owner: module,
                    variable,
                })
                .map(|slot| SettingId { module, slot })
                .map_err(|_| ValueError::AllocationFailure)
        });
        self.track(Method::Register, module, &name, result)
    }

    pub fn setting(&self, id: SettingId) -> Option<&Setting> {
        self.modules.get(id.module.0)?.settings.get(id.slot)
    }

    pub fn find_setting(&self, module: ModuleId, name: &str) -> Option<SettingId> {
        let record = self.modules.get(module.0)?;
        record
            .settings
            .iter()
            .find(|(_, setting)| setting.name() == name)
            .map(|(slot, _)| SettingId { module, slot })
    }

    /// Settings of `module` in registration order, without touching its cursor.
    pub fn settings(&self, module: ModuleId) -> impl Iterator<Item = (SettingId, &Setting)> + '_ {
        self.modules
            .get(module.0)
            .into_iter()
            .flat_map(move |record| {
                record
                    .settings
                    .iter()
                    .map(move |(slot, setting)| (SettingId { module, slot }, setting))
            })
    }

    /// Element `i` converted to `kind`.
    pub fn get(&mut self, id: SettingId, i: usize, kind: TypeKind) -> Result<Value, ValueError> {
        let result = self.setting_ref(id).and_then(|s| s.get(i, kind));
        self.track_setting(Method::Get, id, result)
    }

    /// Element `i` in the setting's own kind.
    pub fn value(&mut self, id: SettingId, i: usize) -> Result<Value, ValueError> {
        let result = self.setting_ref(id).and_then(|s| s.value(i));
        self.track_setting(Method::Get, id, result)
    }

    pub fn render(&mut self, id: SettingId, i: usize) -> Result<String, ValueError> {
        let result = self.setting_ref(id).and_then(|s| s.render(i));
        self.track_setting(Method::Get, id, result)
    }

    pub fn set(
        &mut self,
        id: SettingId,
        i: usize,
        value: impl Into<Value>,
    ) -> Result<(), ValueError> {
        let value = value.into();
        let result = self.variable_mut(id).and_then(|v| v.set(i, &value));
        self.track_setting(Method::Set, id, result)
    }

    pub fn resize(&mut self, id: SettingId, max: usize) -> Result<(), ValueError> {
        let result = self.variable_mut(id).and_then(|v| v.resize(max));
        self.track_setting(Method::Set, id, result)
    }

    pub fn set_range(
        &mut self,
        id: SettingId,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Result<(), ValueError> {
        let (min, max) = (min.into(), max.into());
        let result = self.variable_mut(id).and_then(|v| v.set_range(&min, &max));
        self.track_setting(Method::Set, id, result)
    }

    pub fn set_null_permitted(&mut self, id: SettingId, permitted: bool) -> Result<(), ValueError> {
        let result = self
            .variable_mut(id)
            .and_then(|v| v.set_null_permitted(permitted));
        self.track_setting(Method::Set, id, result)
    }

    pub fn set_allow_list<I, S>(&mut self, id: SettingId, items: I) -> Result<(), ValueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter().map(Into::into).collect();
        let result = self.variable_mut(id).and_then(|v| v.set_allow_list(items));
        self.track_setting(Method::Set, id, result)
    }

    fn setting_ref(&self, id: SettingId) -> Result<&Setting, ValueError> {
        self.setting(id).ok_or(ValueError::InvalidHandle)
    }

    fn variable_mut(&mut self, id: SettingId) -> Result<&mut Variable, ValueError> {
        self.modules
            .get_mut(id.module.0)
            .and_then(|record| record.settings.get_mut(id.slot))
            .map(|setting| &mut setting.variable)
            .ok_or(ValueError::InvalidHandle)
    }

    fn track_setting<T>(
        &mut self,
        method: Method,
        id: SettingId,
        result: Result<T, ValueError>,
    ) -> Result<T, ValueError> {
        if result.is_ok() {
            self.settings_status.record(method, None);
            return result;
        }
        let name = self
            .setting(id)
            .map(|s| s.name().to_owned())
            .unwrap_or_default();
        self.track(method, id.module, &name, result)
    }

    fn track<T>(
        &mut self,
        method: Method,
        module: ModuleId,
        name: &str,
        result: Result<T, ValueError>,
    ) -> Result<T, ValueError> {
        match &result {
            Ok(_) => self.settings_status.record(method, None),
            Err(ValueError::InvalidHandle) => {}
            Err(error) => {
                self.settings_status.record(method, Some(*error));
                let level = if *error == ValueError::AllocationFailure {
                    LogLevel::Error
                } else {
                    LogLevel::Warn
                };
                self.log(
                    Some(module),
                    level,
                    format_args!("setting `{name}` {method:?} rejected: {error}"),
                );
            }
        }
        result
    }
}
