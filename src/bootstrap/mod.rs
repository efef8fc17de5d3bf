//! The boot pipeline.
//!
//! A [`Bootstrapper`] takes a [`BootRequest`] for an addon's stable name and runs it through
//! locate, probe, rewrite and load, caching the result per full assembly name:
//!
//! ```text
//! boot(request) -> locate -> probe identity -> claim slot -> live modules -> mapping
//!               -> rewrite -> host load -> loaded (announce, callback)
//! ```
//!
//! # State per identity
//!
//! A slot in [`BootstrapState`] is claimed before the pipeline starts and is either in flight
//! or loaded. A loaded slot is final: later requests for the same full name return the cached
//! module without touching the host. A failed boot removes its slot, so a later request starts
//! over. Another thread asking for an identity that is in flight waits for that boot and shares
//! its outcome; the booting thread asking again (from a host callback during the load) gets
//! [`crate::BootError::Reentrant`].
//!
//! # Resolution fallback
//!
//! [`Bootstrapper::initialize`] subscribes [`Bootstrapper::resolve`] to the host's resolution
//! misses. It answers from the live modules first, matched by simple name or by the stable
//! name behind the reserved prefix, then from the addons booted so far. It never boots
//! anything itself.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dotboot::{bootstrap::{BootRequest, Bootstrapper}, config::BootstrapConfig, host::HostSurface};
//!
//! # fn host_surface() -> Arc<dyn HostSurface> { unimplemented!() }
//! let bootstrapper = Bootstrapper::initialize(host_surface(), BootstrapConfig::default())?;
//! let module = bootstrapper.boot(BootRequest::new("Combat"))?;
//! assert!(bootstrapper.loaded(&module.identity().full_name()).is_some());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod locator;
mod request;
mod state;

pub use locator::{FileSystemLocator, Located, MemoryLocator, ModuleLocator};
pub use request::{BootRequest, BootRequestBuilder, LoadedCallback};
pub use state::{BootstrapState, LoadedEntry};

use std::{collections::HashSet, fmt, sync::Arc};

use crate::{
    config::BootstrapConfig,
    error::{BindError, BootError},
    host::{CapabilityBinder, HostSurface, ModuleRc, Resolution, ResolutionRequest},
    metadata::{identity::AssemblyIdentity, view::AssemblyView},
    rewrite::{stable_name, MetadataRewriter, ReferenceRewriter, RewriteMapping},
    Error,
};
use state::Begin;

/// Orchestrates addon boots against one host.
///
/// Owned by whoever drives the host's startup and passed to the call sites that boot addons;
/// there is no global instance.
pub struct Bootstrapper {
    binder: Arc<CapabilityBinder>,
    rewriter: Arc<dyn ReferenceRewriter>,
    locator: Arc<dyn ModuleLocator>,
    state: BootstrapState,
    config: BootstrapConfig,
}

impl Bootstrapper {
    /// Assembles a bootstrapper from its parts. Nothing is bound or subscribed yet; see
    /// [`Bootstrapper::install_fallback`].
    #[must_use]
    pub fn new(
        binder: Arc<CapabilityBinder>,
        rewriter: Arc<dyn ReferenceRewriter>,
        locator: Arc<dyn ModuleLocator>,
        config: BootstrapConfig,
    ) -> Self {
        Bootstrapper {
            binder,
            rewriter,
            locator,
            state: BootstrapState::new(),
            config,
        }
    }

    /// Binds `surface`, and returns a bootstrapper with the metadata rewriter, the filesystem
    /// locator, and the resolution fallback installed.
    ///
    /// # Errors
    /// Returns the [`BindError`] if the host does not offer every required capability.
    pub fn initialize(
        surface: Arc<dyn HostSurface>,
        config: BootstrapConfig,
    ) -> Result<Arc<Self>, BindError> {
        log::info!("initializing bootstrapper for {}", surface.describe());

        let binder = Arc::new(CapabilityBinder::new(surface, config.bindings.clone()));
        binder.bind()?;

        let bootstrapper = Arc::new(Bootstrapper::new(
            binder,
            Arc::new(MetadataRewriter::from_config(&config)),
            Arc::new(FileSystemLocator::from_config(&config)),
            config,
        ));
        bootstrapper.install_fallback()?;

        Ok(bootstrapper)
    }

    /// Binds the host if needed and subscribes [`Bootstrapper::resolve`] to its resolution
    /// misses. The subscription holds a weak reference; once the bootstrapper is dropped the
    /// fallback answers nothing.
    ///
    /// # Errors
    /// Returns the [`BindError`] if binding fails.
    pub fn install_fallback(self: &Arc<Self>) -> Result<(), BindError> {
        self.binder.bind()?;

        let bootstrapper = Arc::downgrade(self);
        self.binder
            .register_resolution_fallback(Arc::new(move |request: &ResolutionRequest| {
                match bootstrapper.upgrade() {
                    Some(bootstrapper) => bootstrapper.resolve(request),
                    None => Resolution::Unresolved,
                }
            }))
    }

    /// Boots the addon `request` names.
    ///
    /// Returns the cached module if an addon with the same full name was booted before. The
    /// request's callback runs on success only.
    ///
    /// # Errors
    /// Returns a [`BootError`] naming the step that failed. Every failure is logged.
    pub fn boot(&self, mut request: BootRequest) -> Result<ModuleRc, BootError> {
        let result = self.boot_request(&mut request);
        if let Err(error) = &result {
            log::error!("{error}");
        }
        result
    }

    fn boot_request(&self, request: &mut BootRequest) -> Result<ModuleRc, BootError> {
        request.validate()?;
        self.binder.bind().map_err(BootError::NotInitialized)?;

        let name = request.name().to_string();
        log::info!("booting '{name}'");

        let located = self
            .locator
            .locate(&name)
            .map_err(|source| BootError::Locator {
                name: name.clone(),
                source,
            })?
            .ok_or_else(|| BootError::ModuleNotFound {
                name: name.clone(),
                searched: self.locator.describe(&name),
            })?;

        let origin = located.origin();
        let view = located.open().map_err(|source| match source {
            Error::FileError(_) => BootError::Locator {
                name: name.clone(),
                source,
            },
            source => BootError::MalformedModule {
                name: name.clone(),
                source,
            },
        })?;
        let identity = view
            .identity()
            .map_err(|source| BootError::MalformedModule {
                name: name.clone(),
                source,
            })?;
        let full_name = identity.full_name();
        log::info!("found '{full_name}' at {origin}");

        match self.state.begin(&full_name) {
            Begin::Loaded(module) => {
                log::info!("'{full_name}' is already loaded");
                self.answered(request, &full_name, &module);
                Ok(module)
            }
            Begin::Wait(flight) => {
                log::info!("waiting for the concurrent boot of '{full_name}'");
                match flight.wait() {
                    Ok(module) => {
                        self.answered(request, &full_name, &module);
                        Ok(module)
                    }
                    Err(message) => Err(BootError::InFlightFailed { full_name, message }),
                }
            }
            Begin::Reentrant => Err(BootError::Reentrant { full_name }),
            Begin::Started(claim) => match self.load(&name, &full_name, &view) {
                Ok(module) => {
                    claim.loaded(LoadedEntry {
                        module: Arc::clone(&module),
                        stable_name: name,
                        markers: request
                            .lookup_marker()
                            .map(str::to_string)
                            .into_iter()
                            .collect(),
                    });
                    log::info!("loaded '{}'", module.identity());

                    self.binder.announce(&module);
                    request.fire(&module);
                    Ok(module)
                }
                Err(error) => {
                    claim.failed(error.to_string());
                    Err(error)
                }
            },
        }
    }

    /// Completes a request answered by an earlier or concurrent boot.
    fn answered(&self, request: &mut BootRequest, full_name: &str, module: &ModuleRc) {
        if let Some(marker) = request.lookup_marker() {
            self.state.add_marker(full_name, marker);
        }
        request.fire(module);
    }

    /// The claimed part of a boot: mapping, rewrite, host load.
    fn load(
        &self,
        name: &str,
        full_name: &str,
        view: &AssemblyView,
    ) -> Result<ModuleRc, BootError> {
        let live = self.binder.live_modules().map_err(BootError::NotInitialized)?;
        let prefix = &self.config.dynamic_prefix;
        let mut mapping =
            RewriteMapping::from_live(live.iter().map(|module| module.identity()), prefix);

        if self.config.restrict_mapping_to_references {
            let referenced = view
                .dependencies()
                .map_err(|source| BootError::MalformedModule {
                    name: name.to_string(),
                    source,
                })?
                .iter()
                .map(|dependency| {
                    stable_name(dependency.name(), prefix)
                        .unwrap_or(dependency.name())
                        .to_ascii_lowercase()
                })
                .collect::<HashSet<_>>();
            mapping.retain(|entry| referenced.contains(&entry.stable_name.to_ascii_lowercase()));
        }

        log::info!(
            "rewriting references of '{full_name}' against {} live stand-ins",
            mapping.len()
        );
        log::debug!("mapping: {mapping}");

        let patched = self
            .rewriter
            .rewrite(view.data(), &mapping)
            .map_err(|source| BootError::Rewrite {
                name: name.to_string(),
                full_name: full_name.to_string(),
                source,
            })?;

        self.binder
            .load_from_bytes(&patched)
            .map_err(|source| BootError::Load {
                name: name.to_string(),
                full_name: full_name.to_string(),
                source,
            })
    }

    /// Answers a resolution miss of the host's loader.
    ///
    /// A module matches if its simple name equals the wanted one, or if both stand for the same
    /// stable name once the reserved prefix is stripped. Names compare ASCII case-insensitively
    /// and versions are not compared. Live modules are consulted before booted addons; in-flight
    /// boots never match.
    pub fn resolve(&self, request: &ResolutionRequest) -> Resolution {
        log::debug!("resolving {request}");

        let prefix = &self.config.dynamic_prefix;
        let wanted = &request.wanted;
        let wanted_stable = stable_name(&wanted.name, prefix).unwrap_or(&wanted.name);
        let matches = |candidate: &AssemblyIdentity| {
            candidate.is_name_compatible(wanted)
                || stable_name(&candidate.name, prefix)
                    .unwrap_or(&candidate.name)
                    .eq_ignore_ascii_case(wanted_stable)
        };

        match self.binder.live_modules() {
            Ok(live) => {
                if let Some(module) = live.into_iter().find(|module| matches(module.identity())) {
                    log::debug!("resolved {request} with live '{}'", module.identity());
                    return Resolution::Resolved(module);
                }
            }
            Err(error) => log::warn!("cannot consult live modules for {request}: {error}"),
        }

        if let Some(entry) = self
            .state
            .loaded()
            .into_iter()
            .find(|entry| matches(entry.module.identity()))
        {
            log::debug!("resolved {request} with booted '{}'", entry.module.identity());
            return Resolution::Resolved(entry.module);
        }

        log::warn!("could not resolve {request}");
        Resolution::Unresolved
    }

    /// The addon booted with lookup marker `marker`.
    #[must_use]
    pub fn find_by_marker(&self, marker: &str) -> Option<ModuleRc> {
        self.state.find_by_marker(marker)
    }

    /// The booted addon with full name `full_name`.
    #[must_use]
    pub fn loaded(&self, full_name: &str) -> Option<ModuleRc> {
        self.state.get(full_name)
    }

    /// The load cache.
    #[must_use]
    pub fn state(&self) -> &BootstrapState {
        &self.state
    }

    /// The capability binder.
    #[must_use]
    pub fn binder(&self) -> &Arc<CapabilityBinder> {
        &self.binder
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }
}

impl fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("binder", &self.binder)
            .field("state", &self.state)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
