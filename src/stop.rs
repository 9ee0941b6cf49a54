//! Stop tokens for canceling pending channel operations.
//!
//! A [StopSource] owns the stop state, [StopToken]s observe it, and
//! [StopToken::on_stop] registers callbacks to run when stop is requested.
//! Channels treat tokens as opaque; [StopToken::never] is the token that never
//! stops.

use std::sync::{Arc, Mutex};

use slab::Slab;
use static_assertions::assert_impl_all;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Registry {
    stopped: bool,
    callbacks: Slab<Callback>,
}

/// Owner side of a stop request. Clones share the same state.
pub struct StopSource {
    registry: Arc<Mutex<Registry>>,
}

/// Observer of a stop request issued through [StopSource::request_stop].
#[derive(Clone, Default)]
pub struct StopToken {
    registry: Option<Arc<Mutex<Registry>>>,
}

/// Registration of a stop callback. Dropping it deregisters the callback;
/// the drop blocks while callbacks of its source are running.
pub struct StopCallback {
    registry: Arc<Mutex<Registry>>,
    key: usize,
}

assert_impl_all!(StopSource: Send, Sync);
assert_impl_all!(StopToken: Send, Sync);
assert_impl_all!(StopCallback: Send);

impl StopSource {
    pub fn new() -> StopSource {
        StopSource { registry: Arc::new(Mutex::new(Registry::default())) }
    }

    /// Constructs a token observing this source.
    pub fn token(&self) -> StopToken {
        StopToken { registry: Some(self.registry.clone()) }
    }

    /// Requests stop and runs every registered callback on this thread.
    /// Returns false if stop was already requested.
    pub fn request_stop(&self) -> bool {
        let mut registry = self.registry.lock().unwrap();
        if registry.stopped {
            return false;
        }
        registry.stopped = true;
        // Callbacks run under the registry lock so a racing StopCallback drop
        // returns only after its callback finished.
        let callbacks = std::mem::take(&mut registry.callbacks);
        for (_, callback) in callbacks {
            callback();
        }
        true
    }
}

impl Default for StopSource {
    fn default() -> Self {
        StopSource::new()
    }
}

impl Clone for StopSource {
    fn clone(&self) -> Self {
        StopSource { registry: self.registry.clone() }
    }
}

impl StopToken {
    /// A token that never stops.
    pub fn never() -> StopToken {
        StopToken { registry: None }
    }

    /// Returns true if stop has been requested on the associated source.
    pub fn stop_requested(&self) -> bool {
        match &self.registry {
            None => false,
            Some(registry) => registry.lock().unwrap().stopped,
        }
    }

    /// Registers `f` to run exactly once when stop is requested. If stop was
    /// already requested, `f` runs in place and no registration is returned.
    ///
    /// Callbacks run on the thread calling [StopSource::request_stop] and must
    /// not use this source's registry reentrantly.
    pub fn on_stop(&self, f: impl FnOnce() + Send + 'static) -> Option<StopCallback> {
        let registry = self.registry.as_ref()?;
        let mut locked = registry.lock().unwrap();
        if locked.stopped {
            drop(locked);
            f();
            return None;
        }
        let key = locked.callbacks.insert(Box::new(f));
        Some(StopCallback { registry: registry.clone(), key })
    }
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        let mut registry = self.registry.lock().unwrap();
        let _ = registry.callbacks.try_remove(self.key);
    }
}
