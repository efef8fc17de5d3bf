use std::{
    fmt,
    sync::{Arc, OnceLock, RwLock},
};

use strum::IntoEnumIterator;

use crate::{
    config::HostBindings,
    error::{BindError, LoadError},
    host::{
        AnnounceFn, Capability, EnumerateFn, HostMember, HostSurface, LoadFn, ModuleRc,
        Resolution, ResolutionHandler, ResolutionRequest, SubscribeFn,
    },
};

/// The function table produced by a successful bind.
struct BoundCapabilities {
    enumerate: EnumerateFn,
    load: LoadFn,
    subscribe: SubscribeFn,
    announce: Option<AnnounceFn>,
}

/// Typed access to the host's capabilities.
///
/// All lookups happen once, in [`CapabilityBinder::bind`]; the outcome, success or failure, is
/// kept for the lifetime of the binder. Every other operation fails with
/// [`BindError::NotBound`] until a bind succeeded.
///
/// The resolution hook is subscribed on the host exactly once. It forwards to the handler set
/// by [`CapabilityBinder::register_resolution_fallback`]; registering again replaces the
/// handler instead of subscribing a second time.
pub struct CapabilityBinder {
    surface: Arc<dyn HostSurface>,
    bindings: HostBindings,
    bound: OnceLock<Result<BoundCapabilities, BindError>>,
    fallback: Arc<RwLock<Option<ResolutionHandler>>>,
    subscribed: OnceLock<()>,
}

impl CapabilityBinder {
    /// Creates an unbound binder for `surface`.
    #[must_use]
    pub fn new(surface: Arc<dyn HostSurface>, bindings: HostBindings) -> Self {
        CapabilityBinder {
            surface,
            bindings,
            bound: OnceLock::new(),
            fallback: Arc::new(RwLock::new(None)),
            subscribed: OnceLock::new(),
        }
    }

    /// Looks up and validates every capability.
    ///
    /// Idempotent: the first call does the work, later calls replay its outcome. Missing
    /// optional capabilities are logged and skipped.
    ///
    /// # Errors
    /// Returns [`BindError::MissingCapability`] or [`BindError::ShapeMismatch`] for the one
    /// required capability that failed, or [`BindError::Incomplete`] if several failed.
    pub fn bind(&self) -> Result<(), BindError> {
        match self.bound.get_or_init(|| self.bind_all()) {
            Ok(_) => Ok(()),
            Err(error) => Err(error.clone()),
        }
    }

    /// Returns `true` if a bind succeeded.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self.bound.get(), Some(Ok(_)))
    }

    /// The error of a failed bind, if binding was attempted and failed.
    #[must_use]
    pub fn bind_error(&self) -> Option<&BindError> {
        self.bound.get().and_then(|outcome| outcome.as_ref().err())
    }

    /// Returns `true` if `capability` is bound and usable.
    #[must_use]
    pub fn has_capability(&self, capability: Capability) -> bool {
        match self.capabilities() {
            Ok(capabilities) => {
                capability != Capability::ModuleAnnouncement || capabilities.announce.is_some()
            }
            Err(_) => false,
        }
    }

    /// The host member paths this binder looks up.
    #[must_use]
    pub fn bindings(&self) -> &HostBindings {
        &self.bindings
    }

    /// A fresh snapshot of the host's live modules.
    ///
    /// # Errors
    /// Returns [`BindError::NotBound`] before a successful bind.
    pub fn live_modules(&self) -> Result<Vec<ModuleRc>, BindError> {
        let capabilities = self.capabilities()?;
        let modules = (capabilities.enumerate)();
        log::debug!("host reports {} live modules", modules.len());
        Ok(modules)
    }

    /// Hands `image` to the host's loader.
    ///
    /// # Errors
    /// Returns [`LoadError::Unavailable`] before a successful bind, otherwise whatever the
    /// host's loader reports.
    pub fn load_from_bytes(&self, image: &[u8]) -> Result<ModuleRc, LoadError> {
        let capabilities = self.capabilities().map_err(LoadError::Unavailable)?;
        log::debug!("handing {} bytes to the host loader", image.len());
        (capabilities.load)(image)
    }

    /// Installs `handler` as the answer to the host's resolution misses.
    ///
    /// # Errors
    /// Returns [`BindError::NotBound`] before a successful bind.
    pub fn register_resolution_fallback(&self, handler: ResolutionHandler) -> Result<(), BindError> {
        let capabilities = self.capabilities()?;

        if write_lock!(self.fallback).replace(handler).is_some() {
            log::warn!("replacing the registered resolution fallback");
        }

        self.subscribed.get_or_init(|| {
            let slot = Arc::clone(&self.fallback);
            (capabilities.subscribe)(Arc::new(move |request: &ResolutionRequest| {
                let handler = read_lock!(slot).clone();
                match handler {
                    Some(handler) => handler(request),
                    None => Resolution::Unresolved,
                }
            }));
            log::debug!("subscribed to '{}'", self.bindings.resolving);
        });

        Ok(())
    }

    /// Removes the resolution handler; misses are left to the host from then on.
    pub fn clear_resolution_fallback(&self) -> Option<ResolutionHandler> {
        write_lock!(self.fallback).take()
    }

    /// Tells the host about `module`. Returns `false` if the host has no announcement
    /// capability.
    pub fn announce(&self, module: &ModuleRc) -> bool {
        match self.capabilities() {
            Ok(BoundCapabilities {
                announce: Some(announce),
                ..
            }) => {
                announce(module);
                true
            }
            _ => {
                log::debug!(
                    "not announcing '{}', host has no announcement capability",
                    module.identity().name
                );
                false
            }
        }
    }

    fn capabilities(&self) -> Result<&BoundCapabilities, BindError> {
        match self.bound.get() {
            Some(Ok(capabilities)) => Ok(capabilities),
            _ => Err(BindError::NotBound),
        }
    }

    fn bind_all(&self) -> Result<BoundCapabilities, BindError> {
        log::debug!("binding capabilities of {}", self.surface.describe());

        let mut errors = Vec::new();
        let mut enumerate = None;
        let mut load = None;
        let mut subscribe = None;
        let mut announce = None;

        for capability in Capability::iter() {
            let member = capability.member(&self.bindings);
            match (capability, self.surface.lookup(member)) {
                (Capability::LiveModuleEnumeration, Some(HostMember::Enumerator(bound))) => {
                    enumerate = Some(bound);
                }
                (Capability::StreamLoad, Some(HostMember::Loader(bound))) => load = Some(bound),
                (Capability::ResolutionHook, Some(HostMember::Event(bound))) => {
                    subscribe = Some(bound);
                }
                (Capability::ModuleAnnouncement, Some(HostMember::Callback(bound))) => {
                    announce = Some(bound);
                }
                (capability, found) => {
                    let error = match found {
                        None => BindError::MissingCapability {
                            capability,
                            member: member.to_string(),
                        },
                        Some(other) => BindError::ShapeMismatch {
                            capability,
                            member: member.to_string(),
                            expected: capability.expected_kind(),
                            found: other.kind(),
                        },
                    };

                    if capability.is_required() {
                        log::error!("{error}");
                        errors.push(error);
                    } else {
                        log::warn!("{error}; continuing without it");
                    }
                }
            }
        }

        match (enumerate, load, subscribe) {
            (Some(enumerate), Some(load), Some(subscribe)) if errors.is_empty() => {
                log::info!("bound host capabilities of {}", self.surface.describe());
                Ok(BoundCapabilities {
                    enumerate,
                    load,
                    subscribe,
                    announce,
                })
            }
            _ if errors.len() == 1 => Err(errors.remove(0)),
            _ => Err(BindError::Incomplete(errors)),
        }
    }
}

impl fmt::Debug for CapabilityBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityBinder")
            .field("surface", &self.surface.describe())
            .field("bindings", &self.bindings)
            .field("bound", &self.is_bound())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::{
        host::ModuleHandle,
        metadata::identity::AssemblyIdentity,
        test::host::MockHost,
    };

    fn binder(host: &MockHost) -> CapabilityBinder {
        CapabilityBinder::new(Arc::new(host.clone()), HostBindings::default())
    }

    #[test]
    fn bind_complete_host() {
        let host = MockHost::new();
        host.add_live("Dynamic.Combat, Version=2.0.0.0, Culture=neutral, PublicKeyToken=null");

        let binder = binder(&host);
        assert!(matches!(binder.live_modules(), Err(BindError::NotBound)));

        binder.bind().unwrap();
        binder.bind().unwrap();
        assert!(binder.is_bound());
        assert!(binder.has_capability(Capability::ModuleAnnouncement));

        let live = binder.live_modules().unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].identity().name, "Dynamic.Combat");
    }

    #[test]
    fn missing_stream_load() {
        let host = MockHost::new().without(&HostBindings::default().load_from_bytes);
        let binder = binder(&host);

        let error = binder.bind().unwrap_err();
        assert_eq!(
            error,
            BindError::MissingCapability {
                capability: Capability::StreamLoad,
                member: "Sandbox.GameAssemblyManager.LoadContext.LoadFromStream".to_string(),
            }
        );
        assert!(error.to_string().contains("stream load"));
        assert_eq!(binder.bind().unwrap_err(), error);
        assert_eq!(binder.bind_error(), Some(&error));
        assert!(matches!(
            binder.load_from_bytes(&[]),
            Err(LoadError::Unavailable(BindError::NotBound))
        ));
    }

    #[test]
    fn several_failures() {
        let bindings = HostBindings::default();
        let host = MockHost::new()
            .without(&bindings.live_modules)
            .with_shape_drift(&bindings.resolving, "field");

        let Err(BindError::Incomplete(errors)) = binder(&host).bind() else {
            panic!("expected an incomplete bind");
        };
        assert_eq!(errors.len(), 2);
        assert!(matches!(
            &errors[1],
            BindError::ShapeMismatch {
                capability: Capability::ResolutionHook,
                expected: "event",
                found: "field",
                ..
            }
        ));
    }

    #[test]
    fn optional_announcement() {
        let host = MockHost::new().without(&HostBindings::default().announce);
        let binder = binder(&host);
        binder.bind().unwrap();
        assert!(!binder.has_capability(Capability::ModuleAnnouncement));

        let module = ModuleHandle::new(
            AssemblyIdentity::parse("Arena, Version=1.0.0.0").unwrap(),
        )
        .into_rc();
        assert!(!binder.announce(&module));
    }

    #[test]
    fn fallback_subscribed_once() {
        let host = MockHost::new();
        let binder = binder(&host);
        assert!(binder
            .register_resolution_fallback(Arc::new(|_: &ResolutionRequest| Resolution::Unresolved))
            .is_err());

        binder.bind().unwrap();
        let live = ModuleHandle::new(
            AssemblyIdentity::parse("Dynamic.UI, Version=1.0.0.0").unwrap(),
        )
        .into_rc();

        binder
            .register_resolution_fallback(Arc::new(|_: &ResolutionRequest| Resolution::Unresolved))
            .unwrap();
        let answer = Arc::clone(&live);
        binder
            .register_resolution_fallback(Arc::new(move |_: &ResolutionRequest| {
                Resolution::Resolved(Arc::clone(&answer))
            }))
            .unwrap();
        assert_eq!(host.subscriber_count(), 1);

        let request = ResolutionRequest::from_display_name("UI").unwrap();
        let resolved = host.raise_resolving(&request).into_module().unwrap();
        assert_eq!(resolved.identity().name, "Dynamic.UI");
        assert_eq!(host.state().fallback_calls.load(Ordering::SeqCst), 1);

        assert!(binder.clear_resolution_fallback().is_some());
        assert!(!host.raise_resolving(&request).is_resolved());
    }
}
