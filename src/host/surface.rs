//! The introspection seam between this crate and the host.
//!
//! A [`HostSurface`] answers one question: what does the host expose under a given member
//! path? The answer is a [`HostMember`], already wrapped into a typed callable. How the
//! surface finds the member (reflection, a symbol table, a plugin interface) is up to the
//! adapter; the [`crate::host::CapabilityBinder`] only checks that each member has the kind
//! it expects.

use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::LoadError,
    host::{ModuleRc, ResolutionHandler},
};

/// Enumerates the host's live modules.
pub type EnumerateFn = Arc<dyn Fn() -> Vec<ModuleRc> + Send + Sync>;

/// Loads a module from its image bytes into the host.
pub type LoadFn = Arc<dyn Fn(&[u8]) -> Result<ModuleRc, LoadError> + Send + Sync>;

/// Subscribes a handler to the host's resolution-miss event.
pub type SubscribeFn = Arc<dyn Fn(ResolutionHandler) + Send + Sync>;

/// Announces a loaded module to the host.
pub type AnnounceFn = Arc<dyn Fn(&ModuleRc) + Send + Sync>;

/// A member found on the host surface.
#[derive(Clone)]
pub enum HostMember {
    /// A callable returning a module collection
    Enumerator(EnumerateFn),
    /// A callable taking a byte stream and returning a module
    Loader(LoadFn),
    /// An event handlers can subscribe to
    Event(SubscribeFn),
    /// A callable taking a module
    Callback(AnnounceFn),
    /// A member of a kind this crate cannot bind; the string names the kind
    Other(&'static str),
}

impl HostMember {
    /// Short name of the member's kind, used in diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            HostMember::Enumerator(_) => "enumerator",
            HostMember::Loader(_) => "loader",
            HostMember::Event(_) => "event",
            HostMember::Callback(_) => "callback",
            HostMember::Other(kind) => *kind,
        }
    }
}

impl fmt::Debug for HostMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostMember({})", self.kind())
    }
}

/// Access to the host's internal members.
pub trait HostSurface: Send + Sync {
    /// Looks up the member at `path`, e.g. `Sandbox.AssemblyLibrary.All`.
    fn lookup(&self, path: &str) -> Option<HostMember>;

    /// Human readable name of the host, for diagnostics.
    fn describe(&self) -> String {
        "host".to_string()
    }
}

/// A [`HostSurface`] backed by a fixed member table.
///
/// Suits hosts that hand their members over explicitly instead of being introspected.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMap {
    name: String,
    members: HashMap<String, HostMember>,
}

impl SurfaceMap {
    /// Creates an empty surface called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        SurfaceMap {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Adds or replaces the member at `path`.
    #[must_use]
    pub fn member(mut self, path: impl Into<String>, member: HostMember) -> Self {
        self.members.insert(path.into(), member);
        self
    }

    /// Removes the member at `path`.
    pub fn remove(&mut self, path: &str) -> Option<HostMember> {
        self.members.remove(path)
    }
}

impl HostSurface for SurfaceMap {
    fn lookup(&self, path: &str) -> Option<HostMember> {
        self.members.get(path).cloned()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::HostBindings,
        error::BindError,
        host::{CapabilityBinder, ModuleHandle, Resolution},
        metadata::identity::AssemblyIdentity,
    };

    fn surface(bindings: &HostBindings) -> SurfaceMap {
        SurfaceMap::new("fixed host")
            .member(
                bindings.live_modules.as_str(),
                HostMember::Enumerator(Arc::new(|| {
                    let identity = AssemblyIdentity::parse("Dynamic.UI, Version=1.0.0.0").unwrap();
                    vec![ModuleHandle::new(identity).into_rc()]
                })),
            )
            .member(
                bindings.load_from_bytes.as_str(),
                HostMember::Loader(Arc::new(|_: &[u8]| {
                    Err(LoadError::Rejected("read-only host".to_string()))
                })),
            )
            .member(
                bindings.resolving.as_str(),
                HostMember::Event(Arc::new(|handler: ResolutionHandler| {
                    drop(handler);
                })),
            )
    }

    #[test]
    fn fixed_members() {
        let bindings = HostBindings::default();
        let map = surface(&bindings);
        assert_eq!(map.describe(), "fixed host");
        assert_eq!(map.lookup(&bindings.resolving).unwrap().kind(), "event");
        assert!(map.lookup(&bindings.announce).is_none());

        let binder = CapabilityBinder::new(Arc::new(map), bindings);
        binder.bind().unwrap();
        assert_eq!(binder.live_modules().unwrap()[0].identity().name, "Dynamic.UI");
        assert_eq!(
            binder.load_from_bytes(&[]).unwrap_err(),
            LoadError::Rejected("read-only host".to_string())
        );
        binder
            .register_resolution_fallback(Arc::new(|_: &crate::host::ResolutionRequest| {
                Resolution::Unresolved
            }))
            .unwrap();
    }

    #[test]
    fn removed_member() {
        let bindings = HostBindings::default();
        let mut map = surface(&bindings);
        assert!(map.remove(&bindings.live_modules).is_some());

        let binder = CapabilityBinder::new(Arc::new(map), bindings);
        assert!(matches!(
            binder.bind(),
            Err(BindError::MissingCapability { .. })
        ));
        assert_eq!(
            format!("{:?}", HostMember::Other("field")),
            "HostMember(field)"
        );
    }
}
