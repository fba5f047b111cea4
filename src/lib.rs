#![deny(missing_docs, warnings, clippy::all, clippy::pedantic)]
#![doc = include_str!("../README.md")]

mod config;
pub use config::Config;

mod error;
pub use error::{Error, InsertError};

mod guard;
pub use guard::Guard;

mod guard_set;
pub use guard_set::GuardSet;

mod guarded_ref;
pub use guarded_ref::GuardedRef;

mod iter;
pub use iter::Iter;

mod list;
pub use list::OrderedList;

mod marked_ptr;
pub use marked_ptr::{AtomicMarkedPtr, MarkedPtr};

mod reclaim;
pub use reclaim::{Hp, Protect, Reclaim};

mod retired;
pub use retired::Retired;

mod single_threaded;
pub use single_threaded::{LocalGuard, SingleThreaded};

mod stat;
pub use stat::{EventCounter, NoStat, Stat, Statistics};

mod collector;
mod exit_guard;

/// Installs the configuration of the process-wide hazard pointer engine.
///
/// It has to be called before any thread uses the engine.
///
/// # Errors
///
/// Returns [`Error::InvalidConfig`] if the configuration is invalid, and
/// [`Error::AlreadyConfigured`] if the engine was already configured or used.
///
/// # Examples
///
/// ```
/// use hpsmr::{configure, Config, Error, Guard};
///
/// assert!(configure(Config::default().with_hazards_per_thread(4)).is_ok());
///
/// let _guard = Guard::new();
/// assert_eq!(configure(Config::default()), Err(Error::AlreadyConfigured));
/// ```
#[inline]
pub fn configure(config: Config) -> Result<(), Error> {
    collector::configure(config)
}

/// Registers the current thread with the hazard pointer engine.
///
/// Registration happens on first use anyway; this method is useful in an environment where heap
/// memory allocation is strictly controlled, since it allocates the thread record in advance.
///
/// # Examples
///
/// ```
/// use hpsmr::{register_thread, Guard};
///
/// register_thread();
///
/// let guard = Guard::new();
/// ```
#[inline]
pub fn register_thread() {
    collector::Collector::current();
}

/// Deregisters the current thread from the hazard pointer engine.
///
/// It returns `false` if there is an active [`Guard`] in the thread. Otherwise, it scans, and then
/// leaves the remaining retired instances for other threads to dispose of. Threads are
/// deregistered automatically when they exit.
///
/// # Examples
///
/// ```
/// use hpsmr::{unregister_thread, Guard};
///
/// assert!(unregister_thread());
///
/// {
///     let guard = Guard::new();
///     assert!(!unregister_thread());
/// }
///
/// assert!(unregister_thread());
/// ```
#[inline]
#[must_use]
pub fn unregister_thread() -> bool {
    collector::Collector::detach()
}

/// Disposes of every retired instance that no hazard pointer protects.
///
/// Scans are triggered automatically as instances are retired; this method forces one.
///
/// # Examples
///
/// ```
/// use hpsmr::{scan, statistics, OrderedList};
///
/// let list: OrderedList<u32, u32> = OrderedList::new();
/// assert!(list.insert(1, 1).is_ok());
/// assert!(list.remove(&1));
///
/// scan();
/// assert!(statistics().scans > 0);
/// ```
#[inline]
pub fn scan() {
    unsafe {
        (*collector::Collector::current()).scan();
    }
}

/// Returns the statistics of the hazard pointer engine.
///
/// # Examples
///
/// ```
/// use hpsmr::{statistics, Guard};
///
/// let _guard = Guard::new();
/// let statistics = statistics();
/// assert!(statistics.threads >= 1);
/// assert!(statistics.hazard_slots >= 1);
/// ```
#[inline]
#[must_use]
pub fn statistics() -> Statistics {
    collector::statistics()
}

#[cfg(feature = "loom")]
mod maybe_std {
    pub(crate) use loom::sync::atomic::{fence, AtomicPtr, AtomicU8, AtomicUsize};
    pub(crate) use loom::thread_local;
}

#[cfg(not(feature = "loom"))]
mod maybe_std {
    pub(crate) use std::sync::atomic::{fence, AtomicPtr, AtomicU8, AtomicUsize};
    pub(crate) use std::thread_local;
}

#[cfg(test)]
mod tests;
