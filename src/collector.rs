use super::exit_guard::ExitGuard;
use super::maybe_std::fence as augmented_fence;
use super::maybe_std::thread_local as augmented_thread_local;
use super::maybe_std::AtomicPtr as AugmentedAtomicPtr;
use super::maybe_std::AtomicU8 as AugmentedAtomicU8;
use super::maybe_std::AtomicUsize as AugmentedAtomicUsize;
use super::retired::{Retired, RetiredList};
use super::stat::{Counters, Statistics};
use super::{Config, Error};
use crossbeam_utils::CachePadded;
use std::cell::{Cell, UnsafeCell};
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release, SeqCst};

/// A hazard slot; it holds the untagged address of a protected instance or null.
pub(crate) type Slot = AugmentedAtomicPtr<()>;

/// [`Collector`] is the per-thread record of the hazard pointer engine.
///
/// The record is attached to at most one thread at a time. Its hazard slots are written by the
/// owning thread only, and read by every thread that scans.
#[derive(Debug)]
#[repr(align(128))]
pub(crate) struct Collector {
    state: AugmentedAtomicU8,
    abandoned: AugmentedAtomicUsize,
    hazards: Box<CachePadded<HazardBlock>>,
    local: UnsafeCell<LocalState>,
    next_link: AugmentedAtomicPtr<Collector>,
    root: &'static CollectorRoot,
}

/// Data stored in a [`CollectorRoot`] is shared among [`Collector`] instances.
#[derive(Debug)]
pub(crate) struct CollectorRoot {
    chain_head: AugmentedAtomicPtr<Collector>,
    config: Config,
    counters: Counters,
}

/// A fixed-size array of hazard slots; blocks of a [`Collector`] form an append-only chain.
#[derive(Debug)]
struct HazardBlock {
    slots: Box<[Slot]>,
    next: AugmentedAtomicPtr<CachePadded<HazardBlock>>,
}

/// The part of a [`Collector`] only the owner thread touches.
#[derive(Debug, Default)]
struct LocalState {
    free_slots: Vec<*const Slot>,
    retired: RetiredList,
    num_guards: usize,
    scanning: bool,
}

/// [`GlobalRoot`] provides the globally accessible [`CollectorRoot`].
#[derive(Debug)]
struct GlobalRoot(AtomicPtr<CollectorRoot>);

/// [`CollectorAnchor`] helps attach and detach the thread-local [`Collector`].
struct CollectorAnchor;

impl Collector {
    /// The record is not attached to any thread.
    const FREE: u8 = 0;

    /// The record is attached to a thread, or temporarily held by a scanning thread.
    const OWNED: u8 = 1;

    /// Returns the [`Collector`] attached to the current thread, attaching one if needed.
    #[inline]
    pub(crate) fn current() -> *const Collector {
        LOCAL_COLLECTOR.with(|local_collector| {
            let mut collector_ptr = local_collector.get();
            if collector_ptr.is_null() {
                collector_ptr = COLLECTOR_ANCHOR.with(CollectorAnchor::attach);
                local_collector.set(collector_ptr);
            }
            collector_ptr
        })
    }

    /// Detaches the [`Collector`] from the current thread.
    ///
    /// Returns `false` if the thread still holds a [`Guard`](crate::Guard).
    pub(crate) fn detach() -> bool {
        LOCAL_COLLECTOR.with(|local_collector| {
            let collector_ptr = local_collector.get();
            let Some(collector) = (unsafe { collector_ptr.as_ref() }) else {
                return true;
            };
            if !collector.try_release() {
                return false;
            }
            local_collector.set(ptr::null());
            true
        })
    }

    /// Attaches a [`Collector`] of the supplied [`CollectorRoot`] to the thread.
    ///
    /// # Safety
    ///
    /// It is unsafe. Never use this method outside test code.
    ///
    /// # Panics
    ///
    /// Panics if a [`Collector`] is previously set.
    #[cfg(feature = "loom")]
    pub(crate) unsafe fn set_root(root: &'static CollectorRoot) {
        LOCAL_COLLECTOR.with(|local_collector| {
            assert!(local_collector.get().is_null());
            local_collector.set(root.attach());
        });
    }

    /// Takes a free hazard slot, growing the slot chain if every slot is in use.
    #[inline]
    pub(crate) fn acquire_slot(&self) -> *const Slot {
        let local = unsafe { self.local_mut() };
        local.num_guards += 1;
        match local.free_slots.pop() {
            Some(slot) => slot,
            None => self.grow(local),
        }
    }

    /// Clears the hazard slot and gives it back to the thread.
    #[inline]
    pub(crate) fn release_slot(&self, slot: *const Slot) {
        unsafe {
            (*slot).store(ptr::null_mut(), Release);
        }
        let local = unsafe { self.local_mut() };
        debug_assert_ne!(local.num_guards, 0);
        local.num_guards -= 1;
        local.free_slots.push(slot);
    }

    /// Returns the number of guards alive in the owner thread.
    #[inline]
    pub(crate) fn num_guards(&self) -> usize {
        unsafe { (*self.local.get()).num_guards }
    }

    /// Returns the number of retired instances buffered in the record.
    #[inline]
    pub(crate) fn num_retired(&self) -> usize {
        unsafe { (*self.local.get()).retired.len() }
    }

    /// Buffers a retired instance, and scans if the buffer has grown past the threshold.
    #[inline]
    pub(crate) fn retire(&self, retired: Retired) {
        self.root.counters.retired.fetch_add(1, Relaxed);
        let should_scan = {
            let local = unsafe { self.local_mut() };
            local.retired.push(retired);
            !local.scanning && local.retired.len() >= self.root.scan_threshold()
        };
        if should_scan {
            self.scan();
        }
    }

    /// Disposes of every retired instance that no hazard slot in the process refers to.
    ///
    /// Retired instances of detached records are adopted first.
    pub(crate) fn scan(&self) {
        let mut candidates = {
            let local = unsafe { self.local_mut() };
            if local.scanning {
                return;
            }
            local.scanning = true;
            local.retired.take()
        };
        let counters = &self.root.counters;
        counters.scans.fetch_add(1, Relaxed);
        self.adopt_abandoned(&mut candidates);

        // Every retired instance is unreachable at this point; the fence pairs with the one
        // issued after a hazard is published, therefore either the hazard is visible here, or
        // the protecting thread sees the instance unlinked when it validates.
        augmented_fence(SeqCst);
        let hazards = self.root.collect_hazards();
        let (kept, doomed) = candidates.partition(&hazards);
        if doomed.is_empty() && !kept.is_empty() {
            counters.stalled_scans.fetch_add(1, Relaxed);
        }
        unsafe { self.local_mut() }.retired.append(kept);

        // A disposer may retire other instances or panic; the remaining instances go back to
        // the retired list either way.
        let mut doomed = ExitGuard::new((self, doomed.into_iter()), |(collector, rest)| {
            let local = unsafe { collector.local_mut() };
            local.retired.extend(rest);
            local.scanning = false;
        });
        while let Some(retired) = doomed.1.next() {
            unsafe {
                retired.dispose();
            }
            counters.reclaimed.fetch_add(1, Relaxed);
        }
    }

    /// Takes over the retired instances left behind by detached records.
    fn adopt_abandoned(&self, candidates: &mut RetiredList) {
        for collector in self.root.iter() {
            if ptr::eq(collector, self) || collector.abandoned.load(Relaxed) == 0 {
                continue;
            }
            if collector
                .state
                .compare_exchange(Self::FREE, Self::OWNED, Acquire, Relaxed)
                .is_ok()
            {
                let adopted = unsafe { collector.local_mut() }.retired.take();
                self.root.counters.adopted.fetch_add(adopted.len(), Relaxed);
                collector.abandoned.store(0, Relaxed);
                collector.state.store(Self::FREE, Release);
                candidates.append(adopted);
            }
        }
    }

    /// Detaches the record from its thread unless a guard is alive.
    fn try_release(&self) -> bool {
        if self.num_guards() != 0 {
            return false;
        }
        self.scan();
        debug_assert!(self.hazards.slots.iter().all(|s| s.load(Relaxed).is_null()));

        // Whatever could not be disposed of waits for another thread to adopt it.
        self.abandoned.store(self.num_retired(), Relaxed);
        self.root.counters.threads.fetch_sub(1, Relaxed);
        self.state.store(Self::FREE, Release);
        true
    }

    /// Calls `f` with every non-null hazard of the record.
    fn for_each_hazard<F: FnMut(*mut ())>(&self, mut f: F) {
        let mut block: &HazardBlock = &self.hazards;
        loop {
            for slot in block.slots.iter() {
                let hazard = slot.load(Acquire);
                if !hazard.is_null() {
                    f(hazard);
                }
            }
            match unsafe { block.next.load(Acquire).as_ref() } {
                Some(next) => block = &**next,
                None => break,
            }
        }
    }

    /// Appends a new block of hazard slots, and returns one of them.
    fn grow(&self, local: &mut LocalState) -> *const Slot {
        let size = self.root.config.hazards_per_thread();
        let block = Box::into_raw(Box::new(CachePadded::new(HazardBlock::new(size))));
        let block_ref = unsafe { &*block };
        local
            .free_slots
            .extend(block_ref.slots.iter().skip(1).rev().map(|s| s as *const Slot));

        // Only the owner thread appends blocks.
        let mut last: &HazardBlock = &self.hazards;
        while let Some(next) = unsafe { last.next.load(Relaxed).as_ref() } {
            last = &**next;
        }
        last.next.store(block, Release);
        self.root.counters.hazard_slots.fetch_add(size, Relaxed);

        &block_ref.slots[0]
    }

    /// Allocates a new [`Collector`] owned by the calling thread, and links it to the chain.
    fn alloc(root: &'static CollectorRoot) -> *const Collector {
        let size = root.config.hazards_per_thread();
        let hazards = Box::new(CachePadded::new(HazardBlock::new(size)));
        let free_slots = hazards.slots.iter().rev().map(|s| s as *const Slot).collect();
        let boxed = Box::new(Collector {
            state: AugmentedAtomicU8::new(Self::OWNED),
            abandoned: AugmentedAtomicUsize::new(0),
            hazards,
            local: UnsafeCell::new(LocalState {
                free_slots,
                ..LocalState::default()
            }),
            next_link: AugmentedAtomicPtr::new(ptr::null_mut()),
            root,
        });
        let ptr = Box::into_raw(boxed);
        root.counters.records.fetch_add(1, Relaxed);
        root.counters.hazard_slots.fetch_add(size, Relaxed);

        let mut current = root.chain_head.load(Relaxed);
        loop {
            unsafe {
                (*ptr).next_link.store(current, Relaxed);
            }
            if let Err(actual) = root
                .chain_head
                .compare_exchange_weak(current, ptr, Release, Relaxed)
            {
                current = actual;
            } else {
                break;
            }
        }
        ptr
    }

    /// Returns the owner-thread state.
    ///
    /// # Safety
    ///
    /// The caller must own the record, and the returned reference must not overlap with another
    /// one.
    #[allow(clippy::mut_from_ref)]
    #[inline]
    unsafe fn local_mut(&self) -> &mut LocalState {
        &mut *self.local.get()
    }
}

impl CollectorRoot {
    /// Creates a new [`CollectorRoot`].
    pub(crate) fn new(config: Config) -> Self {
        Self {
            chain_head: AugmentedAtomicPtr::new(ptr::null_mut()),
            config,
            counters: Counters::default(),
        }
    }

    /// Returns the engine statistics.
    pub(crate) fn statistics(&self) -> Statistics {
        self.counters.snapshot()
    }

    /// Attaches a [`Collector`] to the calling thread; a detached one is reused if possible.
    fn attach(&'static self) -> *const Collector {
        self.counters.threads.fetch_add(1, Relaxed);
        for collector in self.iter() {
            if collector.state.load(Relaxed) == Collector::FREE
                && collector
                    .state
                    .compare_exchange(Collector::FREE, Collector::OWNED, Acquire, Relaxed)
                    .is_ok()
            {
                // Retired instances left in the record are inherited.
                collector.abandoned.store(0, Relaxed);
                return collector;
            }
        }
        Collector::alloc(self)
    }

    /// Returns the retired list length that triggers a scan.
    #[inline]
    fn scan_threshold(&self) -> usize {
        self.config
            .scan_threshold()
            .max(2 * self.counters.hazard_slots.load(Relaxed))
    }

    /// Returns a sorted snapshot of every hazard in the process.
    fn collect_hazards(&self) -> Vec<*mut ()> {
        let mut hazards = Vec::with_capacity(self.counters.hazard_slots.load(Relaxed));
        for collector in self.iter() {
            collector.for_each_hazard(|hazard| hazards.push(hazard));
        }
        hazards.sort_unstable();
        hazards.dedup();
        hazards
    }

    /// Iterates over the records; records are never removed from the chain.
    fn iter(&self) -> impl Iterator<Item = &Collector> + '_ {
        let mut current = self.chain_head.load(Acquire);
        std::iter::from_fn(move || {
            let collector = unsafe { current.cast_const().as_ref()? };
            current = collector.next_link.load(Acquire);
            Some(collector)
        })
    }
}

impl HazardBlock {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Slot::new(ptr::null_mut())).collect(),
            next: AugmentedAtomicPtr::new(ptr::null_mut()),
        }
    }
}

impl GlobalRoot {
    /// Returns the [`CollectorRoot`], creating it with the default configuration if needed.
    fn get(&self) -> &'static CollectorRoot {
        let root_ptr = self.0.load(Acquire);
        if let Some(root) = unsafe { root_ptr.cast_const().as_ref() } {
            return root;
        }
        match self.install(Config::default()) {
            Ok(root) => root,
            Err(actual) => actual,
        }
    }

    /// Installs a new [`CollectorRoot`]; returns the existing one if another thread was first.
    fn install(&self, config: Config) -> Result<&'static CollectorRoot, &'static CollectorRoot> {
        let new_root_ptr = Box::into_raw(Box::new(CollectorRoot::new(config)));
        match self
            .0
            .compare_exchange(ptr::null_mut(), new_root_ptr, AcqRel, Acquire)
        {
            Ok(_) => Ok(unsafe { &*new_root_ptr }),
            Err(actual) => {
                drop(unsafe { Box::from_raw(new_root_ptr) });
                Err(unsafe { &*actual })
            }
        }
    }
}

impl CollectorAnchor {
    #[allow(clippy::unused_self)]
    fn attach(&self) -> *const Collector {
        GLOBAL_ROOT.get().attach()
    }
}

impl Drop for CollectorAnchor {
    #[inline]
    fn drop(&mut self) {
        // A guard that outlives the thread pins its record; the record then stays attached.
        let _: bool = Collector::detach();
    }
}

/// Installs the process-wide configuration.
pub(crate) fn configure(config: Config) -> Result<(), Error> {
    config.validate()?;
    if !GLOBAL_ROOT.0.load(Acquire).is_null() {
        return Err(Error::AlreadyConfigured);
    }
    GLOBAL_ROOT
        .install(config)
        .map(|_| ())
        .map_err(|_| Error::AlreadyConfigured)
}

/// Returns the statistics of the process-wide engine.
pub(crate) fn statistics() -> Statistics {
    GLOBAL_ROOT.get().statistics()
}

augmented_thread_local! {
    static COLLECTOR_ANCHOR: CollectorAnchor = CollectorAnchor;
    static LOCAL_COLLECTOR: Cell<*const Collector> = Cell::new(ptr::null());
}

/// The global and default [`CollectorRoot`].
static GLOBAL_ROOT: GlobalRoot = GlobalRoot(AtomicPtr::new(ptr::null_mut()));
