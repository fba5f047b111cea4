use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::Relaxed;

/// [`Stat`] receives notable events of an [`OrderedList`](crate::OrderedList).
///
/// Every method has an empty default body; the hook is purely observational and never changes the
/// behavior of the list.
pub trait Stat: Default + Send + Sync {
    /// An insertion completed; `success` is `false` if the key was already present.
    #[inline]
    fn on_insert(&self, success: bool) {
        let _ = success;
    }

    /// A removal completed; `success` is `false` if the key was absent.
    #[inline]
    fn on_remove(&self, success: bool) {
        let _ = success;
    }

    /// A lookup completed; `success` is `false` if the key was absent.
    #[inline]
    fn on_find(&self, success: bool) {
        let _ = success;
    }

    /// A compare-and-swap failed because another thread changed the same link.
    #[inline]
    fn on_retry(&self) {}

    /// A traversal unlinked a node that another thread had marked.
    #[inline]
    fn on_help_unlink(&self) {}

    /// A node was passed to the reclaimer.
    #[inline]
    fn on_retire(&self) {}
}

/// [`NoStat`] discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoStat;

impl Stat for NoStat {}

/// [`EventCounter`] counts every event.
///
/// # Examples
///
/// ```
/// use hpsmr::{EventCounter, Hp, OrderedList};
///
/// let list: OrderedList<u32, u32, Hp, EventCounter> = OrderedList::default();
/// assert!(list.insert(1, 1).is_ok());
/// assert!(list.insert(1, 2).is_err());
/// assert!(list.remove(&1));
///
/// assert_eq!(list.stat().insert_success(), 1);
/// assert_eq!(list.stat().insert_failed(), 1);
/// assert_eq!(list.stat().remove_success(), 1);
/// assert_eq!(list.stat().retired(), 1);
/// ```
#[derive(Debug, Default)]
pub struct EventCounter {
    insert_success: AtomicUsize,
    insert_failed: AtomicUsize,
    remove_success: AtomicUsize,
    remove_failed: AtomicUsize,
    find_success: AtomicUsize,
    find_failed: AtomicUsize,
    retries: AtomicUsize,
    help_unlinks: AtomicUsize,
    retired: AtomicUsize,
}

impl EventCounter {
    /// Returns the number of successful insertions.
    #[inline]
    pub fn insert_success(&self) -> usize {
        self.insert_success.load(Relaxed)
    }

    /// Returns the number of insertions rejected because of a present key.
    #[inline]
    pub fn insert_failed(&self) -> usize {
        self.insert_failed.load(Relaxed)
    }

    /// Returns the number of successful removals.
    #[inline]
    pub fn remove_success(&self) -> usize {
        self.remove_success.load(Relaxed)
    }

    /// Returns the number of removals of absent keys.
    #[inline]
    pub fn remove_failed(&self) -> usize {
        self.remove_failed.load(Relaxed)
    }

    /// Returns the number of lookups that found the key.
    #[inline]
    pub fn find_success(&self) -> usize {
        self.find_success.load(Relaxed)
    }

    /// Returns the number of lookups that did not find the key.
    #[inline]
    pub fn find_failed(&self) -> usize {
        self.find_failed.load(Relaxed)
    }

    /// Returns the number of failed compare-and-swap attempts.
    #[inline]
    pub fn retries(&self) -> usize {
        self.retries.load(Relaxed)
    }

    /// Returns the number of marked nodes unlinked during traversals.
    #[inline]
    pub fn help_unlinks(&self) -> usize {
        self.help_unlinks.load(Relaxed)
    }

    /// Returns the number of nodes passed to the reclaimer.
    #[inline]
    pub fn retired(&self) -> usize {
        self.retired.load(Relaxed)
    }
}

impl Stat for EventCounter {
    #[inline]
    fn on_insert(&self, success: bool) {
        if success {
            self.insert_success.fetch_add(1, Relaxed);
        } else {
            self.insert_failed.fetch_add(1, Relaxed);
        }
    }

    #[inline]
    fn on_remove(&self, success: bool) {
        if success {
            self.remove_success.fetch_add(1, Relaxed);
        } else {
            self.remove_failed.fetch_add(1, Relaxed);
        }
    }

    #[inline]
    fn on_find(&self, success: bool) {
        if success {
            self.find_success.fetch_add(1, Relaxed);
        } else {
            self.find_failed.fetch_add(1, Relaxed);
        }
    }

    #[inline]
    fn on_retry(&self) {
        self.retries.fetch_add(1, Relaxed);
    }

    #[inline]
    fn on_help_unlink(&self) {
        self.help_unlinks.fetch_add(1, Relaxed);
    }

    #[inline]
    fn on_retire(&self) {
        self.retired.fetch_add(1, Relaxed);
    }
}

/// [`Statistics`] is a snapshot of the process-wide hazard pointer engine.
///
/// The fields are read one by one without synchronization, so a snapshot taken while other
/// threads are active is only approximately consistent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Statistics {
    /// Threads currently registered.
    pub threads: usize,
    /// Thread records that are not attached to any thread.
    pub idle_records: usize,
    /// Hazard slots allocated in the process.
    pub hazard_slots: usize,
    /// Instances retired since the engine started.
    pub retired: usize,
    /// Instances disposed of since the engine started.
    pub reclaimed: usize,
    /// Instances retired and not yet disposed of.
    pub pending: usize,
    /// Scans performed.
    pub scans: usize,
    /// Scans that found retired instances but could not dispose of any of them.
    ///
    /// A growing value indicates memory pinned by a forgotten guard or a thread that never
    /// released its guards.
    pub stalled_scans: usize,
    /// Retired instances taken over from threads that exited before they could be disposed of.
    pub adopted: usize,
}

/// Process-wide event counters of the engine.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) threads: AtomicUsize,
    pub(crate) records: AtomicUsize,
    pub(crate) hazard_slots: AtomicUsize,
    pub(crate) retired: AtomicUsize,
    pub(crate) reclaimed: AtomicUsize,
    pub(crate) scans: AtomicUsize,
    pub(crate) stalled_scans: AtomicUsize,
    pub(crate) adopted: AtomicUsize,
}

impl Counters {
    pub(crate) fn snapshot(&self) -> Statistics {
        let threads = self.threads.load(Relaxed);
        let retired = self.retired.load(Relaxed);
        let reclaimed = self.reclaimed.load(Relaxed);
        Statistics {
            threads,
            idle_records: self.records.load(Relaxed).saturating_sub(threads),
            hazard_slots: self.hazard_slots.load(Relaxed),
            retired,
            reclaimed,
            pending: retired.saturating_sub(reclaimed),
            scans: self.scans.load(Relaxed),
            stalled_scans: self.stalled_scans.load(Relaxed),
            adopted: self.adopted.load(Relaxed),
        }
    }
}
