//! Callback registry keyed by channel id.
//!
//! A channel is a sensor id for data callbacks or a meta event type for event
//! callbacks. The registry is a multiset: registering the same closure twice
//! gives two entries, two handles and two invocations per dispatch. Every
//! registration returns a unique [`CallbackId`]; removal matches on
//! `(channel, id)` and therefore removes exactly one entry, leaving other
//! registrations of the same closure in place. Removing an unknown pair is a
//! no-op.
//!
//! Callbacks may edit the registry while it dispatches through the
//! [`Subscriptions`] handle they receive. Those edits are applied once the
//! dispatch pass is over: every entry that existed when the pass started is
//! invoked exactly once, and entries added during the pass run from the next
//! dispatch on.

use alloc::vec::Vec;

/// Handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CallbackId(u32);

struct Entry<C> {
    channel: u8,
    id: CallbackId,
    callback: C,
}

pub struct Registry<C> {
    entries: Vec<Entry<C>>,
    next_id: u32,
}

impl<C> Registry<C> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn register(&mut self, channel: u8, callback: C) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.entries.push(Entry {
            channel,
            id,
            callback,
        });
        id
    }

    /// Returns `false` when no entry matched.
    pub fn unregister(&mut self, channel: u8, id: CallbackId) -> bool {
        match self
            .entries
            .iter()
            .position(|e| e.channel == channel && e.id == id)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Invokes every callback registered on `channel` in registration order
    /// and returns how many ran.
    pub fn dispatch<F>(&mut self, channel: u8, mut invoke: F) -> usize
    where
        F: FnMut(&mut C, &mut Subscriptions<C>),
    {
        let mut pending = Subscriptions {
            next_id: self.next_id,
            added: Vec::new(),
            removed: Vec::new(),
        };
        let mut invoked = 0;
        for entry in self.entries.iter_mut().filter(|e| e.channel == channel) {
            invoke(&mut entry.callback, &mut pending);
            invoked += 1;
        }
        self.apply(pending);
        invoked
    }

    fn apply(&mut self, pending: Subscriptions<C>) {
        self.next_id = pending.next_id;
        self.entries.extend(pending.added);
        for (channel, id) in pending.removed {
            self.unregister(channel, id);
        }
    }

    pub fn contains(&self, channel: u8) -> bool {
        self.entries.iter().any(|e| e.channel == channel)
    }

    pub fn count(&self, channel: u8) -> usize {
        self.entries.iter().filter(|e| e.channel == channel).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> core::fmt::Debug for Registry<C> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Registry edits requested from inside a callback. Applied after the
/// current dispatch pass.
pub struct Subscriptions<C> {
    next_id: u32,
    added: Vec<Entry<C>>,
    removed: Vec<(u8, CallbackId)>,
}

impl<C> Subscriptions<C> {
    pub fn register(&mut self, channel: u8, callback: C) -> CallbackId {
        let id = CallbackId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.added.push(Entry {
            channel,
            id,
            callback,
        });
        id
    }

    pub fn unregister(&mut self, channel: u8, id: CallbackId) {
        self.removed.push((channel, id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::rc::Rc;
    use alloc::vec;
    use core::cell::RefCell;

    type Log = Rc<RefCell<Vec<(&'static str, Vec<u8>)>>>;

    struct Cb(Box<dyn FnMut(&[u8], &mut Subscriptions<Cb>)>);

    fn recorder(log: &Log, tag: &'static str) -> Cb {
        let log = log.clone();
        Cb(Box::new(move |data, _| {
            log.borrow_mut().push((tag, data.to_vec()))
        }))
    }

    fn dispatch(registry: &mut Registry<Cb>, channel: u8, payload: &[u8]) -> usize {
        registry.dispatch(channel, |cb, subs| (cb.0)(payload, subs))
    }

    #[test]
    fn test_dispatch_passes_payload_unchanged() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register(4, recorder(&log, "acc"));

        let payload = [0x01, 0xFF, 0x00, 0x80, 0x7F, 0x10];
        assert_eq!(dispatch(&mut registry, 4, &payload), 1);
        assert_eq!(*log.borrow(), vec![("acc", payload.to_vec())]);
    }

    #[test]
    fn test_dispatch_only_reaches_matching_channel() {
        let log = Log::default();
        let mut registry = Registry::new();
        registry.register(4, recorder(&log, "acc"));
        registry.register(13, recorder(&log, "gyro"));

        dispatch(&mut registry, 13, &[1]);
        assert_eq!(*log.borrow(), vec![("gyro", vec![1])]);
        assert_eq!(dispatch(&mut registry, 22, &[2]), 0);
    }

    #[test]
    fn test_duplicate_registration_fans_out_in_order() {
        let log = Log::default();
        let mut registry = Registry::new();
        let first = registry.register(4, recorder(&log, "a"));
        let second = registry.register(4, recorder(&log, "a"));
        registry.register(4, recorder(&log, "b"));
        assert_ne!(first, second);

        assert_eq!(dispatch(&mut registry, 4, &[9]), 3);
        let tags: Vec<_> = log.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_unregister_removes_only_that_handle() {
        let log = Log::default();
        let mut registry = Registry::new();
        let first = registry.register(4, recorder(&log, "a"));
        registry.register(4, recorder(&log, "a"));

        assert!(registry.unregister(4, first));
        assert_eq!(registry.count(4), 1);
        assert_eq!(dispatch(&mut registry, 4, &[0]), 1);
    }

    #[test]
    fn test_unregister_miss_is_noop() {
        let log = Log::default();
        let mut registry = Registry::new();
        let id = registry.register(4, recorder(&log, "a"));

        // wrong channel, then unknown handle
        assert!(!registry.unregister(5, id));
        assert!(!registry.unregister(4, CallbackId(999)));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(4, id));
        assert!(!registry.unregister(4, id));
        assert!(registry.is_empty());
        assert_eq!(dispatch(&mut registry, 4, &[0]), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_callback_removing_itself_during_dispatch() {
        let log = Log::default();
        let mut registry = Registry::new();
        let slot: Rc<RefCell<Option<CallbackId>>> = Rc::default();

        let own = slot.clone();
        let seen = log.clone();
        let id = registry.register(
            4,
            Cb(Box::new(move |data, subs| {
                seen.borrow_mut().push(("once", data.to_vec()));
                if let Some(id) = *own.borrow() {
                    subs.unregister(4, id);
                }
            })),
        );
        *slot.borrow_mut() = Some(id);
        registry.register(4, recorder(&log, "after"));

        assert_eq!(dispatch(&mut registry, 4, &[1]), 2);
        assert_eq!(dispatch(&mut registry, 4, &[2]), 1);
        let tags: Vec<_> = log.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec!["once", "after", "after"]);
    }

    #[test]
    fn test_callback_registering_during_dispatch_runs_next_time() {
        let log = Log::default();
        let mut registry = Registry::new();
        let spawned = log.clone();
        let armed = Rc::new(RefCell::new(true));
        registry.register(
            4,
            Cb(Box::new(move |_, subs| {
                if armed.replace(false) {
                    subs.register(4, recorder(&spawned, "late"));
                }
            })),
        );

        assert_eq!(dispatch(&mut registry, 4, &[1]), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(dispatch(&mut registry, 4, &[2]), 2);
        assert_eq!(*log.borrow(), vec![("late", vec![2])]);
    }

    #[test]
    fn test_handles_stay_unique_across_deferred_registration() {
        let mut registry: Registry<Cb> = Registry::new();
        let made: Rc<RefCell<Vec<CallbackId>>> = Rc::default();
        let sink = made.clone();
        let outer = registry.register(
            1,
            Cb(Box::new(move |_, subs| {
                sink.borrow_mut().push(subs.register(2, Cb(Box::new(|_, _| {}))));
            })),
        );
        dispatch(&mut registry, 1, &[]);
        let direct = registry.register(3, Cb(Box::new(|_, _| {})));

        let inner = made.borrow()[0];
        assert_ne!(outer, inner);
        assert_ne!(inner, direct);
        assert_eq!(registry.len(), 3);
    }
}
