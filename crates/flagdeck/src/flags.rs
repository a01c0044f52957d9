//! Flag declarations, section naming and the user context.
//!
//! The set of known flags is closed: it is declared in configuration and
//! fixed for the lifetime of the process. Every flag controls exactly one
//! section of the deck, named by stripping a fixed suffix off the flag key.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Suffix stripped from flag keys to name their section.
pub const DEFAULT_SECTION_SUFFIX: &str = "-section";

/// Declaration of one known flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDef {
    /// Flag key as known to the flag backend.
    pub key: String,
    /// Human-readable name used in notifications.
    pub name: String,
    /// Key code that toggles this flag from the presentation page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<u32>,
}

impl FlagDef {
    /// Create a flag declaration.
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>, hotkey: Option<u32>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            hotkey,
        }
    }
}

/// The four flags of the reference deployment.
#[must_use]
pub fn default_flags() -> Vec<FlagDef> {
    vec![
        FlagDef::new("guarded-releases-section", "Guarded Releases", Some(71)),
        FlagDef::new("experimentation-section", "Experimentation", Some(69)),
        FlagDef::new("ai-configs-section", "AI Configs", Some(65)),
        FlagDef::new("observability-section", "Observability", Some(79)),
    ]
}

/// Derive a section name from a flag key.
///
/// Keys without the suffix name a section identical to the key.
#[must_use]
pub fn section_name<'a>(key: &'a str, suffix: &str) -> &'a str {
    key.strip_suffix(suffix).unwrap_or(key)
}

/// The closed, ordered set of known flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet {
    defs: Vec<FlagDef>,
    suffix: String,
}

impl FlagSet {
    /// Create a flag set from declarations, in declaration order.
    #[must_use]
    pub fn new(defs: Vec<FlagDef>, suffix: impl Into<String>) -> Self {
        Self {
            defs,
            suffix: suffix.into(),
        }
    }

    /// Iterate over the declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &FlagDef> {
        self.defs.iter()
    }

    /// Iterate over the flag keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.defs.iter().map(|def| def.key.as_str())
    }

    /// Number of known flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no flags are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Whether `key` is a known flag.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Look up a declaration by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FlagDef> {
        self.defs.iter().find(|def| def.key == key)
    }

    /// Look up the flag bound to a hotkey code.
    #[must_use]
    pub fn by_hotkey(&self, code: u32) -> Option<&FlagDef> {
        self.defs.iter().find(|def| def.hotkey == Some(code))
    }

    /// Look up the flag controlling a section.
    #[must_use]
    pub fn for_section(&self, section: &str) -> Option<&FlagDef> {
        self.defs
            .iter()
            .find(|def| section_name(&def.key, &self.suffix) == section)
    }

    /// Section name for a flag key.
    #[must_use]
    pub fn section_of<'a>(&self, key: &'a str) -> &'a str {
        section_name(key, &self.suffix)
    }

    /// Display name for a flag key, falling back to the key itself.
    #[must_use]
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.get(key).map_or(key, |def| def.name.as_str())
    }

    /// The suffix stripped to form section names.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Identity the flag backend evaluates flags for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    /// Unique key of the user.
    pub key: String,
    /// Display name of the user.
    pub name: String,
    /// Arbitrary custom attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl UserContext {
    /// Create a user context without attributes.
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// A fresh presenter identity, unique per session.
    #[must_use]
    pub fn presenter() -> Self {
        let session = Utc::now().timestamp_millis();
        Self::new(format!("presentation-user-{session}"), "Presentation User")
            .with_attribute("role", "presenter")
            .with_attribute("session", session)
    }

    /// Add a custom attribute.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flag_set() -> FlagSet {
        FlagSet::new(default_flags(), DEFAULT_SECTION_SUFFIX)
    }

    #[test]
    fn test_section_name_strips_suffix() {
        assert_eq!(
            section_name("guarded-releases-section", "-section"),
            "guarded-releases"
        );
        assert_eq!(section_name("plain", "-section"), "plain");
    }

    #[test]
    fn test_default_flags() {
        let flags = default_flags();
        assert_eq!(flags.len(), 4);
        assert_eq!(flags[0].key, "guarded-releases-section");
        assert_eq!(flags[3].hotkey, Some(79));
    }

    #[test]
    fn test_flag_set_lookup() {
        let set = flag_set();
        assert!(set.contains("ai-configs-section"));
        assert!(!set.contains("unknown"));
        assert_eq!(set.len(), 4);
        assert_eq!(
            set.keys().collect::<Vec<_>>(),
            vec![
                "guarded-releases-section",
                "experimentation-section",
                "ai-configs-section",
                "observability-section"
            ]
        );
    }

    #[test]
    fn test_flag_set_hotkey() {
        let set = flag_set();
        assert_eq!(set.by_hotkey(69).unwrap().key, "experimentation-section");
        assert!(set.by_hotkey(1).is_none());
    }

    #[test]
    fn test_flag_set_sections() {
        let set = flag_set();
        assert_eq!(set.section_of("observability-section"), "observability");
        assert_eq!(
            set.for_section("ai-configs").unwrap().key,
            "ai-configs-section"
        );
        assert!(set.for_section("missing").is_none());
    }

    #[test]
    fn test_display_name_fallback() {
        let set = flag_set();
        assert_eq!(set.display_name("ai-configs-section"), "AI Configs");
        assert_eq!(set.display_name("mystery"), "mystery");
    }

    #[test]
    fn test_presenter_context() {
        let user = UserContext::presenter();
        assert!(user.key.starts_with("presentation-user-"));
        assert_eq!(user.name, "Presentation User");
        assert_eq!(user.attributes["role"], "presenter");
        assert!(user.attributes.contains_key("session"));
    }

    #[test]
    fn test_flag_def_deserialize_without_hotkey() {
        let def: FlagDef = serde_json::from_str(r#"{"key": "a-section", "name": "A"}"#).unwrap();
        assert_eq!(def.hotkey, None);
    }
}
