//! # Transaction Manager
//!
//! Pessimistic, per-thread admission control over region handles.
//!
//! A thread that begins a transaction gains exclusive use of a set of
//! handles until it ends it. Other threads asking for any overlapping handle
//! block until all of them are released.
//!
//! ## Per-thread bookkeeping
//!
//! ```text
//!   held: ThreadId -> { LocalHandle -> count }
//!
//!   Free ──begin──> held(1) ──begin──> held(2) ──end──> held(1) ──end──> Free
//! ```
//!
//! A thread only ever waits on *other* threads, so re-entering a handle it
//! already holds just bumps its count.
//!
//! An entity whose handle changes while held keeps its lock: the count moves
//! to the new handle and open tokens release the new one.
//!
//! ## Wake-up
//!
//! Every release broadcasts on one condition variable and every waiter
//! re-checks its whole handle set. No fairness is provided beyond that: a
//! thread asking for a hot handle can be outraced repeatedly.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};

use lattice_shared::LocalHandle;
use parking_lot::{Condvar, Mutex};

/// Proof that the current thread holds a set of handles.
///
/// Must be handed back to [`TransactionManager::end`] on the same thread;
/// the token is neither `Send` nor `Sync`.
#[derive(Debug)]
#[must_use = "a transaction token must be ended or the handles stay locked"]
pub struct TransactionToken {
    handles: Vec<LocalHandle>,
    _thread_bound: PhantomData<*const ()>,
}

impl TransactionToken {
    /// Handles covered by the transaction.
    #[must_use]
    pub fn handles(&self) -> &[LocalHandle] {
        &self.handles
    }
}

/// Handles held by one thread.
#[derive(Debug, Default)]
struct ThreadHolds {
    counts: HashMap<LocalHandle, u32>,
    /// Handles moved while held, old -> new.
    moved: HashMap<LocalHandle, LocalHandle>,
}

impl ThreadHolds {
    fn contains(&self, handle: LocalHandle) -> bool {
        self.counts.contains_key(&handle)
    }

    /// Follows moves until a held handle is reached.
    fn resolve(&self, handle: LocalHandle) -> LocalHandle {
        let mut current = handle;
        for _ in 0..=self.moved.len() {
            if self.contains(current) {
                break;
            }
            match self.moved.get(&current) {
                Some(next) => current = *next,
                None => break,
            }
        }
        current
    }
}

type Ledger = HashMap<ThreadId, ThreadHolds>;

/// Per-region transaction bookkeeping.
#[derive(Debug, Default)]
pub struct TransactionManager {
    held: Mutex<Ledger>,
    released: Condvar,
}

impl TransactionManager {
    /// Creates a manager with no transactions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until no other thread holds any of `handles`, then takes them.
    ///
    /// `on_first_acquire` runs under the bookkeeping lock for each handle
    /// this thread did not already hold. Unassigned handles are ignored.
    pub fn begin(
        &self,
        handles: &[LocalHandle],
        mut on_first_acquire: impl FnMut(LocalHandle),
    ) -> TransactionToken {
        let mut wanted: Vec<LocalHandle> =
            handles.iter().copied().filter(|handle| handle.is_assigned()).collect();
        wanted.sort_unstable();
        wanted.dedup();

        let me = thread::current().id();
        let mut held = self.held.lock();
        while Self::held_by_other(&held, me, &wanted) {
            self.released.wait(&mut held);
        }

        let mine = held.entry(me).or_default();
        for handle in &wanted {
            let count = mine.counts.entry(*handle).or_insert(0);
            *count += 1;
            if *count == 1 {
                on_first_acquire(*handle);
            }
        }

        TransactionToken {
            handles: wanted,
            _thread_bound: PhantomData,
        }
    }

    /// Like [`Self::begin`], with one more handle admitted alongside the set.
    pub fn begin_with_extra(
        &self,
        handles: &[LocalHandle],
        extra: LocalHandle,
        on_first_acquire: impl FnMut(LocalHandle),
    ) -> TransactionToken {
        let mut all = Vec::with_capacity(handles.len() + 1);
        all.extend_from_slice(handles);
        all.push(extra);
        self.begin(&all, on_first_acquire)
    }

    /// Blocks until no other thread holds `handle`, without taking it.
    pub fn wait_on(&self, handle: LocalHandle) {
        let me = thread::current().id();
        let mut held = self.held.lock();
        while Self::held_by_other(&held, me, &[handle]) {
            self.released.wait(&mut held);
        }
    }

    /// Moves an entity from handle `old` to `new` without breaking exclusion.
    ///
    /// Blocks until no other thread holds either handle, then runs `swap`
    /// under the bookkeeping lock. If `swap` returns true, every count this
    /// thread holds on `old` now applies to `new`, and tokens naming `old`
    /// release `new` when they end. `swap` must not call back into the
    /// manager.
    pub fn rehome(&self, old: LocalHandle, new: LocalHandle, swap: impl FnOnce() -> bool) -> bool {
        let me = thread::current().id();
        let mut held = self.held.lock();
        let contested: Vec<LocalHandle> =
            [old, new].into_iter().filter(|handle| handle.is_assigned()).collect();
        while Self::held_by_other(&held, me, &contested) {
            self.released.wait(&mut held);
        }

        if !swap() {
            return false;
        }
        if old != new {
            if let Some(mine) = held.get_mut(&me) {
                if let Some(count) = mine.counts.remove(&old) {
                    *mine.counts.entry(new).or_insert(0) += count;
                    mine.moved.insert(old, new);
                    tracing::debug!(%old, %new, count, "held handle moved");
                }
            }
        }
        drop(held);
        self.released.notify_all();
        true
    }

    /// Releases one level of the transaction and wakes every waiter.
    ///
    /// `on_release` runs under the bookkeeping lock for each handle whose
    /// count dropped to zero. A handle moved by [`Self::rehome`] is
    /// released under its new value.
    pub fn end(&self, token: TransactionToken, mut on_release: impl FnMut(LocalHandle)) {
        let me = thread::current().id();
        let mut held = self.held.lock();

        let Some(mine) = held.get_mut(&me) else {
            tracing::error!(
                handles = ?token.handles,
                "transaction ended on a thread that holds nothing"
            );
            return;
        };
        for requested in &token.handles {
            let handle = mine.resolve(*requested);
            match mine.counts.get_mut(&handle) {
                Some(count) if *count > 1 => *count -= 1,
                Some(_) => {
                    mine.counts.remove(&handle);
                    on_release(handle);
                }
                None => {
                    tracing::warn!(%handle, "transaction ended for a handle not held here");
                }
            }
        }
        if mine.counts.is_empty() {
            held.remove(&me);
        }
        drop(held);
        self.released.notify_all();
    }

    /// True if the calling thread holds `handle`.
    #[must_use]
    pub fn holds(&self, handle: LocalHandle) -> bool {
        let me = thread::current().id();
        self.held.lock().get(&me).is_some_and(|mine| mine.contains(handle))
    }

    /// True if any thread holds `handle`.
    #[must_use]
    pub fn is_held(&self, handle: LocalHandle) -> bool {
        self.held.lock().values().any(|mine| mine.contains(handle))
    }

    /// Number of threads with an open transaction.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.held.lock().len()
    }

    fn held_by_other(held: &Ledger, me: ThreadId, wanted: &[LocalHandle]) -> bool {
        held.iter()
            .filter(|(owner, _)| **owner != me)
            .any(|(_, theirs)| wanted.iter().any(|handle| theirs.contains(*handle)))
    }
}
