//! Entity type registry.
//!
//! Maps internal entity type ids (as used in corpus entity declarations)
//! to the provider's prebuilt entity recognizers. The built-in table covers
//! the common prebuilt types; `[entities.<type_id>]` config sections add
//! types or override entries, including marking a type as unsupported.

use std::collections::BTreeMap;

use crate::config::EntityOverride;
use crate::traits::{EntityCapability, EntityRegistry};

/// Built-in `(internal type id, provider name)` pairs.
const BUILTIN_TYPES: &[(&str, &str)] = &[
    ("age", "age"),
    ("datetime", "datetimeV2"),
    ("dimension", "dimension"),
    ("email", "email"),
    ("geography", "geographyV2"),
    ("keyphrase", "keyPhrase"),
    ("money", "money"),
    ("number", "number"),
    ("ordinal", "ordinalV2"),
    ("percentage", "percentage"),
    ("person", "personName"),
    ("phonenumber", "phonenumber"),
    ("temperature", "temperature"),
    ("url", "url"),
];

/// Known types with no native recognizer on the provider.
const UNSUPPORTED_TYPES: &[&str] = &["free_text", "list", "regex"];

/// Registry backed by the built-in table plus config overrides.
#[derive(Debug, Clone)]
pub struct BuiltinEntityRegistry {
    entries: BTreeMap<String, EntityCapability>,
}

impl BuiltinEntityRegistry {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        for (type_id, provider_name) in BUILTIN_TYPES {
            entries.insert(
                type_id.to_string(),
                EntityCapability {
                    provider_supported: true,
                    provider_name: provider_name.to_string(),
                },
            );
        }
        for type_id in UNSUPPORTED_TYPES {
            entries.insert(
                type_id.to_string(),
                EntityCapability {
                    provider_supported: false,
                    provider_name: type_id.to_string(),
                },
            );
        }
        Self { entries }
    }

    /// Built-in table with `[entities]` overrides applied on top.
    pub fn with_overrides(overrides: &BTreeMap<String, EntityOverride>) -> Self {
        let mut registry = Self::new();
        for (type_id, entry) in overrides {
            registry.insert(
                type_id,
                EntityCapability {
                    provider_supported: entry.provider_supported,
                    provider_name: entry
                        .provider_name
                        .clone()
                        .unwrap_or_else(|| type_id.clone()),
                },
            );
        }
        registry
    }

    pub fn insert(&mut self, type_id: &str, capability: EntityCapability) {
        self.entries.insert(type_id.to_string(), capability);
    }
}

impl Default for BuiltinEntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry for BuiltinEntityRegistry {
    fn lookup(&self, type_id: &str) -> Option<EntityCapability> {
        self.entries.get(type_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let registry = BuiltinEntityRegistry::new();
        let cap = registry.lookup("datetime").unwrap();
        assert!(cap.provider_supported);
        assert_eq!(cap.provider_name, "datetimeV2");

        assert!(!registry.lookup("free_text").unwrap().provider_supported);
        assert!(registry.lookup("spaceship").is_none());
    }

    #[test]
    fn test_overrides_add_and_disable() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "city".to_string(),
            EntityOverride {
                provider_supported: true,
                provider_name: Some("geographyV2".to_string()),
            },
        );
        overrides.insert(
            "number".to_string(),
            EntityOverride {
                provider_supported: false,
                provider_name: None,
            },
        );

        let registry = BuiltinEntityRegistry::with_overrides(&overrides);
        assert_eq!(registry.lookup("city").unwrap().provider_name, "geographyV2");
        assert!(!registry.lookup("number").unwrap().provider_supported);
        assert!(registry.lookup("datetime").unwrap().provider_supported);
    }
}
