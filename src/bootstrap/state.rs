//! The load cache: one slot per full assembly name.
//!
//! A slot is created atomically when a boot is accepted and is either in flight or loaded.
//! Failed boots remove their slot, so the cache never holds a failure. The slot of a boot is
//! owned by a [`Claim`]; dropping an unfinished claim, including by unwinding, fails the boot.

use std::{
    fmt,
    sync::{Arc, Condvar, Mutex},
    thread::{self, ThreadId},
};

use dashmap::{mapref::entry::Entry, DashMap};

use crate::host::ModuleRc;

/// A boot in progress. Other threads asking for the same identity wait on it.
pub(crate) struct InFlight {
    owner: ThreadId,
    outcome: Mutex<Option<Result<ModuleRc, String>>>,
    done: Condvar,
}

impl InFlight {
    fn new() -> Self {
        InFlight {
            owner: thread::current().id(),
            outcome: Mutex::new(None),
            done: Condvar::new(),
        }
    }

    fn finish(&self, outcome: Result<ModuleRc, String>) {
        *lock!(self.outcome) = Some(outcome);
        self.done.notify_all();
    }

    /// Blocks until the owning boot finished, returning its module or failure message.
    pub(crate) fn wait(&self) -> Result<ModuleRc, String> {
        let guard = lock!(self.outcome);
        let guard = self
            .done
            .wait_while(guard, |outcome| outcome.is_none())
            .expect("Failed to acquire lock");

        match &*guard {
            Some(outcome) => outcome.clone(),
            None => Err("boot finished without an outcome".to_string()),
        }
    }
}

/// A successfully booted module.
#[derive(Debug, Clone)]
pub struct LoadedEntry {
    /// The module the host loaded
    pub module: ModuleRc,
    /// Stable name it was requested by
    pub stable_name: String,
    /// Lookup markers of every request answered with this module, in arrival order
    pub markers: Vec<String>,
}

enum Slot {
    InFlight(Arc<InFlight>),
    Loaded(LoadedEntry),
}

/// Ownership of an in-flight slot.
///
/// Exactly one of [`Claim::loaded`] or [`Claim::failed`] completes the boot. A claim dropped
/// without either frees the slot and fails everyone waiting on it.
pub(crate) struct Claim<'a> {
    state: &'a BootstrapState,
    full_name: String,
    flight: Arc<InFlight>,
    armed: bool,
}

impl Claim<'_> {
    #[cfg(test)]
    pub(crate) fn flight(&self) -> &Arc<InFlight> {
        &self.flight
    }

    /// Stores `entry` and wakes the waiters.
    pub(crate) fn loaded(mut self, entry: LoadedEntry) {
        self.armed = false;
        self.state.complete_loaded(&self.full_name, &self.flight, entry);
    }

    /// Frees the slot and hands `message` to the waiters.
    pub(crate) fn failed(mut self, message: String) {
        self.armed = false;
        self.state.complete_failed(&self.full_name, &self.flight, message);
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::error!("boot of '{}' panicked", self.full_name);
            self.state
                .complete_failed(&self.full_name, &self.flight, "boot panicked".to_string());
        }
    }
}

/// Outcome of [`BootstrapState::begin`].
pub(crate) enum Begin<'a> {
    /// The caller owns the boot and must complete it
    Started(Claim<'a>),
    /// Already loaded
    Loaded(ModuleRc),
    /// Another thread is booting this identity
    Wait(Arc<InFlight>),
    /// The calling thread is already booting this identity
    Reentrant,
}

/// Per-identity boot state of a [`crate::Bootstrapper`].
#[derive(Default)]
pub struct BootstrapState {
    slots: DashMap<String, Slot>,
}

impl BootstrapState {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `full_name` for a boot, or reports who already has it.
    pub(crate) fn begin(&self, full_name: &str) -> Begin<'_> {
        match self.slots.entry(full_name.to_string()) {
            Entry::Occupied(slot) => match slot.get() {
                Slot::Loaded(entry) => Begin::Loaded(Arc::clone(&entry.module)),
                Slot::InFlight(flight) if flight.owner == thread::current().id() => {
                    Begin::Reentrant
                }
                Slot::InFlight(flight) => Begin::Wait(Arc::clone(flight)),
            },
            Entry::Vacant(slot) => {
                let flight = Arc::new(InFlight::new());
                slot.insert(Slot::InFlight(Arc::clone(&flight)));
                Begin::Started(Claim {
                    state: self,
                    full_name: full_name.to_string(),
                    flight,
                    armed: true,
                })
            }
        }
    }

    /// Marks the boot of `full_name` as loaded and wakes everyone waiting on it.
    fn complete_loaded(&self, full_name: &str, flight: &InFlight, entry: LoadedEntry) {
        let module = Arc::clone(&entry.module);
        self.slots.insert(full_name.to_string(), Slot::Loaded(entry));
        flight.finish(Ok(module));
    }

    /// Drops the slot of a failed boot and wakes everyone waiting on it.
    fn complete_failed(&self, full_name: &str, flight: &Arc<InFlight>, message: String) {
        self.slots.remove_if(full_name, |_, slot| {
            matches!(slot, Slot::InFlight(current) if Arc::ptr_eq(current, flight))
        });
        flight.finish(Err(message));
    }

    /// Records another lookup marker for the loaded module `full_name`.
    pub(crate) fn add_marker(&self, full_name: &str, marker: &str) {
        if let Some(mut slot) = self.slots.get_mut(full_name) {
            if let Slot::Loaded(entry) = slot.value_mut() {
                if !entry.markers.iter().any(|known| known == marker) {
                    entry.markers.push(marker.to_string());
                }
            }
        }
    }

    /// The loaded module for `full_name`.
    #[must_use]
    pub fn get(&self, full_name: &str) -> Option<ModuleRc> {
        match self.slots.get(full_name)?.value() {
            Slot::Loaded(entry) => Some(Arc::clone(&entry.module)),
            Slot::InFlight(_) => None,
        }
    }

    /// Returns `true` while a boot for `full_name` is running.
    #[must_use]
    pub fn is_in_flight(&self, full_name: &str) -> bool {
        matches!(
            self.slots.get(full_name).as_deref(),
            Some(Slot::InFlight(_))
        )
    }

    /// Snapshot of all loaded entries.
    #[must_use]
    pub fn loaded(&self) -> Vec<LoadedEntry> {
        self.slots
            .iter()
            .filter_map(|slot| match slot.value() {
                Slot::Loaded(entry) => Some(entry.clone()),
                Slot::InFlight(_) => None,
            })
            .collect()
    }

    /// The loaded module some request carrying lookup marker `marker` was answered with.
    #[must_use]
    pub fn find_by_marker(&self, marker: &str) -> Option<ModuleRc> {
        self.slots.iter().find_map(|slot| match slot.value() {
            Slot::Loaded(entry) if entry.markers.iter().any(|known| known == marker) => {
                Some(Arc::clone(&entry.module))
            }
            _ => None,
        })
    }

    /// Number of slots, loaded or in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if nothing was booted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for BootstrapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.value(), Slot::InFlight(_)))
            .count();
        f.debug_struct("BootstrapState")
            .field("slots", &self.slots.len())
            .field("in_flight", &in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{host::ModuleHandle, metadata::identity::AssemblyIdentity};

    const ARENA: &str = "Arena, Version=1.0.0.0, Culture=neutral, PublicKeyToken=null";

    fn entry(marker: Option<&str>) -> LoadedEntry {
        LoadedEntry {
            module: ModuleHandle::new(AssemblyIdentity::parse(ARENA).unwrap()).into_rc(),
            stable_name: "Arena".to_string(),
            markers: marker.map(str::to_string).into_iter().collect(),
        }
    }

    #[test]
    fn lifecycle() {
        let state = BootstrapState::new();
        assert!(state.is_empty());

        let Begin::Started(claim) = state.begin(ARENA) else {
            panic!("expected to own the boot");
        };
        assert!(state.is_in_flight(ARENA));
        assert!(state.get(ARENA).is_none());
        assert!(matches!(state.begin(ARENA), Begin::Reentrant));

        let loaded = entry(Some("Arena.Entry"));
        let module = Arc::clone(&loaded.module);
        let flight = Arc::clone(claim.flight());
        claim.loaded(loaded);

        assert!(!state.is_in_flight(ARENA));
        assert!(Arc::ptr_eq(&state.get(ARENA).unwrap(), &module));
        assert!(Arc::ptr_eq(&flight.wait().unwrap(), &module));
        assert!(matches!(state.begin(ARENA), Begin::Loaded(found) if Arc::ptr_eq(&found, &module)));
        assert!(state.find_by_marker("Arena.Entry").is_some());
        assert!(state.find_by_marker("Other").is_none());
        state.add_marker(ARENA, "Other");
        state.add_marker(ARENA, "Other");
        assert!(state.find_by_marker("Other").is_some());
        assert_eq!(state.loaded()[0].markers, ["Arena.Entry", "Other"]);
        assert_eq!(state.loaded().len(), 1);
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn failure_frees_the_slot() {
        let state = BootstrapState::new();
        let Begin::Started(claim) = state.begin(ARENA) else {
            panic!("expected to own the boot");
        };
        let flight = Arc::clone(claim.flight());
        claim.failed("host said no".to_string());

        assert!(state.is_empty());
        assert_eq!(flight.wait().unwrap_err(), "host said no");
        assert!(matches!(state.begin(ARENA), Begin::Started(_)));
    }

    #[test]
    fn other_threads_wait() {
        let state = Arc::new(BootstrapState::new());
        let Begin::Started(claim) = state.begin(ARENA) else {
            panic!("expected to own the boot");
        };

        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || match state.begin(ARENA) {
                Begin::Wait(flight) => flight.wait().map(|module| module.identity().full_name()),
                _ => Err("expected to wait".to_string()),
            })
        };

        // slot + claim + the waiter's
        while Arc::strong_count(claim.flight()) < 3 {
            thread::yield_now();
        }
        claim.loaded(entry(None));

        assert_eq!(waiter.join().unwrap().unwrap(), ARENA);
    }

    #[test]
    fn dropped_claim_fails_the_boot() {
        let state = BootstrapState::new();
        let Begin::Started(claim) = state.begin(ARENA) else {
            panic!("expected to own the boot");
        };
        let flight = Arc::clone(claim.flight());
        drop(claim);

        assert!(state.is_empty());
        assert_eq!(flight.wait().unwrap_err(), "boot panicked");
        assert!(matches!(state.begin(ARENA), Begin::Started(_)));
    }
}
