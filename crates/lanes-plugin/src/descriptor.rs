// SPDX-FileCopyrightText: 2026 Lanes Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use crate::library::Library;

/// A registered plugin type and the library that provides it.
#[derive(Debug, Clone)]
pub struct PluginTypeDescriptor {
    type_name: String,
    short_name: String,
    description: Option<String>,
    library: Arc<Library>,
}

impl PluginTypeDescriptor {
    pub fn new(
        type_name: impl Into<String>,
        description: Option<String>,
        library: Arc<Library>,
    ) -> Self {
        let type_name = type_name.into();
        let short_name = short_name_of(&type_name).to_string();
        Self {
            type_name,
            short_name,
            description,
            library,
        }
    }

    /// Qualified name, e.g. `demo::Echo`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Segment after the last `::`, or after the last `.` when there is none.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }
}

pub(crate) fn short_name_of(type_name: &str) -> &str {
    if let Some((_, short)) = type_name.rsplit_once("::") {
        short
    } else if let Some((_, short)) = type_name.rsplit_once('.') {
        short
    } else {
        type_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_rules() {
        assert_eq!(short_name_of("demo::Echo"), "Echo");
        assert_eq!(short_name_of("a::b::c::Deep"), "Deep");
        assert_eq!(short_name_of("Company.Plugins.Echo"), "Echo");
        assert_eq!(short_name_of("mixed.ns::Echo"), "Echo");
        assert_eq!(short_name_of("Plain"), "Plain");
    }
}
