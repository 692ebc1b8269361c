use serde::Serialize;

use crate::status::StatusRecord;
use crate::value::Range;

use super::{Metadata, Registry};

/// Point-in-time view of every module and setting, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySnapshot {
    pub modules: Vec<ModuleSnapshot>,
    pub settings_status: StatusRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSnapshot {
    #[serde(flatten)]
    pub metadata: Metadata,
    pub settings: Vec<SettingSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingSnapshot {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub count: usize,
    pub max: usize,
    pub resizable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allow_list: Vec<String>,
    pub values: Vec<String>,
}

impl Registry {
    /// Reads through the variables directly, so status records are left untouched.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let modules = self
            .modules()
            .map(|(id, metadata)| ModuleSnapshot {
                metadata: metadata.clone(),
                settings: self
                    .settings(id)
                    .map(|(_, setting)| SettingSnapshot {
                        name: setting.name().to_owned(),
                        description: setting.description().to_owned(),
                        type_name: setting.descriptor().name,
                        count: setting.count(),
                        max: setting.max(),
                        resizable: setting.is_resizable(),
                        range: setting.range(),
                        allow_list: setting.allow_list().to_vec(),
                        values: (0..setting.count())
                            .filter_map(|i| setting.render(i).ok())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();
        RegistrySnapshot {
            modules,
            settings_status: self.settings_status.clone(),
        }
    }
}
