//! State-change callback chain.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::State;

/// Handle returned when registering a callback, unique within one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

type Callback = Arc<dyn Fn(State) + Send + Sync>;

#[derive(Default)]
struct Chain {
    next: u64,
    calls: BTreeMap<CallId, Callback>,
}

/// Callbacks of one pin, invoked in registration order.
///
/// Cloning yields another handle onto the same chain, which is how the
/// event reader thread reaches it.
#[derive(Clone, Default)]
pub struct CallChain {
    inner: Arc<Mutex<Chain>>,
}

impl CallChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Chain> {
        // A panicking callback runs outside the lock, so poisoning only
        // means a panic elsewhere; the map itself is always consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add(&self, f: impl Fn(State) + Send + Sync + 'static) -> CallId {
        let mut chain = self.lock();
        let id = CallId(chain.next);
        chain.next += 1;
        chain.calls.insert(id, Arc::new(f));
        id
    }

    /// Unregisters a callback. Returns `false` if it was not registered.
    pub fn remove(&self, id: CallId) -> bool {
        self.lock().calls.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().calls.is_empty()
    }

    /// Invokes every registered callback once with `state`.
    ///
    /// The lock is not held while a callback runs, so callbacks may add or
    /// remove entries, including themselves. A callback removed during the
    /// dispatch is not invoked afterwards.
    pub fn dispatch(&self, state: State) {
        let ids: Vec<CallId> = self.lock().calls.keys().copied().collect();

        for id in ids {
            let call = self.lock().calls.get(&id).cloned();
            if let Some(call) = call {
                call(state);
            }
        }
    }
}

impl std::fmt::Debug for CallChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallChain").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registration_order() {
        let chain = CallChain::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = seen.clone();
            chain.add(move |s| seen.lock().unwrap().push((n, s)));
        }

        chain.dispatch(State::Active);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, State::Active), (1, State::Active), (2, State::Active)]
        );
    }

    #[test]
    fn ids_are_per_chain() {
        let a = CallChain::new();
        let b = CallChain::new();
        assert_eq!(a.add(|_| {}), b.add(|_| {}));
        assert_ne!(a.add(|_| {}), a.add(|_| {}));
    }

    #[test]
    fn remove() {
        let chain = CallChain::new();
        let id = chain.add(|_| {});
        assert!(chain.remove(id));
        assert!(!chain.remove(id));
        assert!(chain.is_empty());
    }

    #[test]
    fn remove_self_during_dispatch() {
        let chain = CallChain::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let slot = Arc::new(Mutex::new(None));

        let id = {
            let (chain2, hits, slot) = (chain.clone(), hits.clone(), slot.clone());
            chain.add(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = *slot.lock().unwrap() {
                    chain2.remove(id);
                }
            })
        };
        *slot.lock().unwrap() = Some(id);

        chain.dispatch(State::Active);
        chain.dispatch(State::Inactive);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(chain.is_empty());
    }

    #[test]
    fn removed_by_earlier_callback_is_skipped() {
        let chain = CallChain::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let victim = Arc::new(Mutex::new(None));

        {
            let (chain2, victim) = (chain.clone(), victim.clone());
            chain.add(move |_| {
                if let Some(id) = victim.lock().unwrap().take() {
                    chain2.remove(id);
                }
            });
        }
        let hits2 = hits.clone();
        let id = chain.add(move |_| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });
        *victim.lock().unwrap() = Some(id);

        chain.dispatch(State::Active);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
