use super::collector::{Collector, Slot};
use super::maybe_std::fence as augmented_fence;
use super::{AtomicMarkedPtr, MarkedPtr};
use std::ptr;
use std::sync::atomic::Ordering::{Acquire, Relaxed, SeqCst};

/// [`Guard`] owns one hazard pointer slot of the current thread.
///
/// A pointer published in the slot is never disposed of by any thread until the slot is cleared
/// or overwritten. A [`Guard`] is bound to the thread that created it.
///
/// # Examples
///
/// ```
/// use hpsmr::{AtomicMarkedPtr, Guard, MarkedPtr};
/// use std::sync::atomic::Ordering::Relaxed;
///
/// let link: AtomicMarkedPtr<usize> = AtomicMarkedPtr::new(MarkedPtr::new(Box::into_raw(Box::new(17)), false));
///
/// let mut guard = Guard::new();
/// let protected = guard.protect(&link);
/// assert_eq!(unsafe { protected.as_ref() }, Some(&17));
///
/// guard.release();
/// drop(unsafe { Box::from_raw(link.load(Relaxed).as_ptr()) });
/// ```
#[derive(Debug)]
pub struct Guard {
    collector_ptr: *const Collector,
    slot: *const Slot,
}

impl Guard {
    /// Creates a new [`Guard`].
    ///
    /// The current thread is registered if it has not been. The number of guards a thread can
    /// hold is not limited; hazard slots are allocated in blocks on demand.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::Guard;
    ///
    /// let guards: Vec<Guard> = (0..64).map(|_| Guard::new()).collect();
    /// assert_eq!(guards.len(), 64);
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let collector_ptr = Collector::current();
        let slot = unsafe { (*collector_ptr).acquire_slot() };
        Self { collector_ptr, slot }
    }

    /// Loads the pointer stored in `src` and protects it.
    ///
    /// The pointer is published, and then `src` is read again; the loop ends when both reads
    /// agree on the address, therefore the returned pointer was reachable from `src` at a point
    /// where the hazard was already visible to every scanning thread. The returned value carries
    /// the mark observed by the last read.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::{AtomicMarkedPtr, Guard};
    ///
    /// let link: AtomicMarkedPtr<u8> = AtomicMarkedPtr::null();
    /// let mut guard = Guard::new();
    /// assert!(guard.protect(&link).is_null());
    /// ```
    #[inline]
    pub fn protect<T>(&mut self, src: &AtomicMarkedPtr<T>) -> MarkedPtr<T> {
        let mut current = src.load(Relaxed);
        loop {
            self.publish(current.as_ptr().cast());
            let reloaded = src.load(Acquire);
            if reloaded.as_ptr() == current.as_ptr() {
                return reloaded;
            }
            current = reloaded;
        }
    }

    /// Publishes `ptr` without validation, and returns it unchanged.
    ///
    /// The caller is responsible for checking that `ptr` is still reachable after this call
    /// returns, or that `ptr` is already protected by another guard of the thread.
    #[inline]
    pub fn acquire<T>(&mut self, ptr: MarkedPtr<T>) -> MarkedPtr<T> {
        self.publish(ptr.as_ptr().cast());
        ptr
    }

    /// Clears the slot; the previously protected pointer may be disposed of afterwards.
    #[inline]
    pub fn release(&mut self) {
        unsafe {
            (*self.slot).store(ptr::null_mut(), Relaxed);
        }
    }

    /// Returns the address currently published in the slot.
    #[inline]
    #[must_use]
    pub fn protected(&self) -> *mut () {
        unsafe { (*self.slot).load(Relaxed) }
    }

    #[inline]
    fn publish(&self, addr: *mut ()) {
        unsafe {
            (*self.slot).store(addr, Relaxed);
        }
        if !addr.is_null() {
            // Pairs with the fence a scanning thread issues before reading hazard slots.
            augmented_fence(SeqCst);
        }
    }
}

impl Default for Guard {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Guard {
    #[inline]
    fn drop(&mut self) {
        unsafe {
            (*self.collector_ptr).release_slot(self.slot);
        }
    }
}
