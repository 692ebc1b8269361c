use immuno_plugin_api::{ImMetadata, ImStr};

/// Identity a plugin registers once, typically as a `const`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub author: &'static str,
}

impl PluginInfo {
    pub const fn new(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            description: "",
            author: "",
        }
    }

    pub const fn description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn author(mut self, author: &'static str) -> Self {
        self.author = author;
        self
    }

    pub(crate) const fn to_raw(self) -> ImMetadata {
        ImMetadata {
            name: ImStr::from_str(self.name),
            version: ImStr::from_str(self.version),
            description: ImStr::from_str(self.description),
            author: ImStr::from_str(self.author),
        }
    }
}

/// Owned copy of a module's metadata as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
}
