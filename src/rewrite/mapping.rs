//! Stable name to live identity mapping and the naming convention behind it.
//!
//! The host gives every module it generates during a session a name of the form
//! `<prefix>.<stable name>`, e.g. `Dynamic.Combat`. An addon compiled against that module
//! references it by its stable name `Combat`. The mapping pairs each stable name with the
//! identity the host module currently bears.

use std::{collections::BTreeMap, fmt};

use crate::metadata::identity::AssemblyIdentity;

/// Default reserved first name segment of host-generated modules.
pub const DEFAULT_DYNAMIC_PREFIX: &str = "Dynamic";

/// The stable name `name` stands in for, if it follows the convention
/// `<prefix>.<stable name>[.<anything>]`. The prefix must match the first segment exactly;
/// the second segment is the stable name, further segments are ignored.
///
/// ```rust
/// use dotboot::rewrite::stable_name;
///
/// assert_eq!(stable_name("Dynamic.Combat", "Dynamic"), Some("Combat"));
/// assert_eq!(stable_name("Dynamic.Combat.Extras", "Dynamic"), Some("Combat"));
/// assert_eq!(stable_name("Combat", "Dynamic"), None);
/// assert_eq!(stable_name("Dynamic.", "Dynamic"), None);
/// ```
#[must_use]
pub fn stable_name<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let mut segments = name.split('.');
    if segments.next()? != prefix {
        return None;
    }
    segments.next().filter(|stable| !stable.is_empty())
}

/// One mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    /// Stable name as first seen
    pub stable_name: String,
    /// Identity of the live module standing in for it
    pub identity: AssemblyIdentity,
}

/// A set of (stable name, live identity) pairs.
///
/// Stable names compare ASCII case-insensitively, as the host's loader compares simple
/// names. Iteration order is by case-folded stable name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteMapping {
    entries: BTreeMap<String, MappingEntry>,
}

impl RewriteMapping {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the mapping from the identities of the live modules.
    ///
    /// Modules that do not follow the naming convention are skipped. If two live modules
    /// stand in for the same stable name, the higher version wins; on equal versions the later
    /// one wins. Either way a warning is logged, since the host normally keeps one per name.
    pub fn from_live<'a, I>(live: I, prefix: &str) -> Self
    where
        I: IntoIterator<Item = &'a AssemblyIdentity>,
    {
        let mut mapping = RewriteMapping::new();
        for identity in live {
            let Some(stable) = stable_name(&identity.name, prefix) else {
                continue;
            };

            let replace = match mapping.get(stable) {
                Some(existing) if existing.version > identity.version => {
                    log::warn!(
                        "ignoring '{}': '{}' already stands in for '{}'",
                        identity.full_name(),
                        existing.full_name(),
                        stable
                    );
                    false
                }
                Some(existing) => {
                    log::warn!(
                        "'{}' replaces '{}' as the stand-in for '{}'",
                        identity.full_name(),
                        existing.full_name(),
                        stable
                    );
                    true
                }
                None => true,
            };

            if replace {
                mapping.insert(stable, identity.clone());
            }
        }

        mapping
    }

    /// Adds or replaces the entry for `stable_name`, returning the previous identity.
    pub fn insert(
        &mut self,
        stable_name: impl Into<String>,
        identity: AssemblyIdentity,
    ) -> Option<AssemblyIdentity> {
        let stable_name = stable_name.into();
        self.entries
            .insert(
                stable_name.to_ascii_lowercase(),
                MappingEntry {
                    stable_name,
                    identity,
                },
            )
            .map(|previous| previous.identity)
    }

    /// Live identity mapped to `stable_name`.
    #[must_use]
    pub fn get(&self, stable_name: &str) -> Option<&AssemblyIdentity> {
        self.entries
            .get(&stable_name.to_ascii_lowercase())
            .map(|entry| &entry.identity)
    }

    /// Returns `true` if `stable_name` is mapped.
    #[must_use]
    pub fn contains(&self, stable_name: &str) -> bool {
        self.get(stable_name).is_some()
    }

    /// Keeps only the entries for which `keep` returns `true`.
    pub fn retain(&mut self, mut keep: impl FnMut(&MappingEntry) -> bool) {
        self.entries.retain(|_, entry| keep(entry));
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.entries.values()
    }
}

impl<S: Into<String>> FromIterator<(S, AssemblyIdentity)> for RewriteMapping {
    fn from_iter<T: IntoIterator<Item = (S, AssemblyIdentity)>>(iter: T) -> Self {
        let mut mapping = RewriteMapping::new();
        for (stable_name, identity) in iter {
            mapping.insert(stable_name, identity);
        }
        mapping
    }
}

impl fmt::Display for RewriteMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for entry in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{} -> {}", entry.stable_name, entry.identity.full_name())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(display: &str) -> AssemblyIdentity {
        AssemblyIdentity::parse(display).unwrap()
    }

    #[test]
    fn convention() {
        assert_eq!(stable_name("Dynamic.UI", "Dynamic"), Some("UI"));
        assert_eq!(stable_name("dynamic.UI", "Dynamic"), None);
        assert_eq!(stable_name("DynamicUI", "Dynamic"), None);
        assert_eq!(stable_name("Generated.UI", "Generated"), Some("UI"));
        assert_eq!(stable_name("Dynamic..UI", "Dynamic"), None);
    }

    #[test]
    fn trailing_segments_are_ignored() {
        let extras =
            live("Dynamic.Combat.Extras, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null");
        let mapping = RewriteMapping::from_live([&extras], DEFAULT_DYNAMIC_PREFIX);

        assert_eq!(mapping.get("Combat"), Some(&extras));
        assert!(!mapping.contains("Combat.Extras"));
    }

    #[test]
    fn from_live_modules() {
        let modules = [
            live("Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null"),
            live("Dynamic.UI, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"),
            live("mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089"),
        ];
        let mapping = RewriteMapping::from_live(&modules, DEFAULT_DYNAMIC_PREFIX);

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("Combat"), Some(&modules[0]));
        assert_eq!(mapping.get("combat"), Some(&modules[0]));
        assert_eq!(mapping.get("UI"), Some(&modules[1]));
        assert!(!mapping.contains("mscorlib"));
        assert_eq!(
            mapping.to_string(),
            "Combat -> Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null, \
             UI -> Dynamic.UI, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null"
        );
    }

    #[test]
    fn duplicate_stand_ins() {
        let older = live("Dynamic.Combat, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null");
        let newer = live("Dynamic.Combat, Version=3.0.0.0, Culture=neutral, PublicKeyToken=null");
        let later = live("Dynamic.Combat, Version=3.0.0.0, Culture=de, PublicKeyToken=null");

        let mapping = RewriteMapping::from_live([&newer, &older], "Dynamic");
        assert_eq!(mapping.get("Combat"), Some(&newer));

        let mapping = RewriteMapping::from_live([&older, &newer, &later], "Dynamic");
        assert_eq!(mapping.get("Combat"), Some(&later));
    }

    #[test]
    fn collect_and_retain() {
        let mut mapping: RewriteMapping = [
            ("Combat", live("Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null")),
            ("UI", live("Dynamic.UI, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null")),
        ]
        .into_iter()
        .collect();

        mapping.retain(|entry| entry.stable_name == "UI");
        assert_eq!(mapping.len(), 1);
        assert!(mapping.contains("ui"));
        assert!(!RewriteMapping::new().contains("UI"));
        assert!(RewriteMapping::new().is_empty());
    }
}
