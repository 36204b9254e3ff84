//! Change Bus
//!
//! The bus connects exactly one [`ReactiveStore`] to zero or more
//! subscribers, typically one [`Compiler`] per module. Two guarantees hold:
//!
//! 1. Delivery order equals mutation order (program order).
//! 2. Each patch is delivered exactly once per live subscriber.
//!
//! # Re-entrancy
//!
//! A subscriber handling a patch may itself mutate the observed store, which
//! publishes again while the bus is mid-delivery. The bus handles this with a
//! FIFO queue and a dispatching flag: a re-entrant publish only enqueues and
//! returns, and the live drain loop picks the patch up after the current
//! handler finishes. Recursion depth is therefore bounded at one frame, and
//! ordering stays program order. The outermost mutating call still observes
//! every notification before it returns.
//!
//! # Subscriber lifetime
//!
//! Subscribers are held as weak references so the bus never keeps a compiler
//! alive. Dead subscribers are skipped during delivery and pruned on the
//! next subscription change.
//!
//! [`ReactiveStore`]: crate::store::ReactiveStore
//! [`Compiler`]: crate::module::Compiler

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::store::Patch;

/// A receiver of patches from a [`ChangeBus`].
pub trait PatchSubscriber {
    /// Handle one patch. Called once per patch, in mutation order.
    fn on_patch(&mut self, patch: &Patch);
}

/// Unique identifier for a bus subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

struct BusInner {
    subscribers: Vec<(SubscriptionId, Weak<RefCell<dyn PatchSubscriber>>)>,
    queue: VecDeque<Patch>,
    dispatching: bool,
}

/// Delivers patches from one store to its subscribers.
///
/// Cloning the handle shares the underlying bus.
#[derive(Clone)]
pub struct ChangeBus {
    inner: Rc<RefCell<BusInner>>,
}

impl ChangeBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                subscribers: Vec::new(),
                queue: VecDeque::new(),
                dispatching: false,
            })),
        }
    }

    /// Register a subscriber. The bus holds only a weak reference; the
    /// caller keeps the subscriber alive.
    pub fn subscribe(&self, subscriber: &Rc<RefCell<dyn PatchSubscriber>>) -> SubscriptionId {
        let id = SubscriptionId::new();
        let mut inner = self.inner.borrow_mut();
        inner.subscribers.retain(|(_, weak)| weak.strong_count() > 0);
        inner.subscribers.push((id, Rc::downgrade(subscriber)));
        id
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.borrow_mut();
        inner
            .subscribers
            .retain(|(sid, weak)| *sid != id && weak.strong_count() > 0);
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Publish one patch.
    ///
    /// If no delivery is in progress, drains the queue inline before
    /// returning. If called re-entrantly from a subscriber, only enqueues;
    /// the outer drain loop delivers the patch in order.
    pub fn publish(&self, patch: Patch) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.queue.push_back(patch);
            if inner.dispatching {
                return;
            }
            inner.dispatching = true;
        }

        loop {
            // Take the next patch and a snapshot of the subscriber list
            // without holding the bus borrow across handler calls.
            let (patch, subscribers) = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.pop_front() {
                    Some(patch) => (patch, inner.subscribers.clone()),
                    None => {
                        inner.dispatching = false;
                        return;
                    }
                }
            };

            for (_, weak) in &subscribers {
                if let Some(subscriber) = weak.upgrade() {
                    subscriber.borrow_mut().on_patch(&patch);
                }
            }
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}
