use super::maybe_std::AtomicPtr;
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::Ordering;

/// The least significant bit of a link is the deletion mark.
const MARK_BIT: usize = 1;

/// [`MarkedPtr`] is a raw pointer with a one-bit deletion mark packed into its least significant
/// bit.
///
/// The address and the mark are always read and written together; the type never lets one of
/// them change independently inside an atomic location.
///
/// # Examples
///
/// ```
/// use hpsmr::MarkedPtr;
///
/// let value = Box::into_raw(Box::new(17_u64));
/// let ptr = MarkedPtr::new(value, false);
/// assert!(!ptr.is_marked());
///
/// let marked = ptr.with_mark(true);
/// assert!(marked.is_marked());
/// assert_eq!(marked.as_ptr(), value);
/// assert_ne!(marked, ptr);
///
/// drop(unsafe { Box::from_raw(value) });
/// ```
pub struct MarkedPtr<T> {
    raw: *mut T,
    _phantom: PhantomData<*mut T>,
}

/// [`AtomicMarkedPtr`] is an atomic link holding a [`MarkedPtr`].
///
/// # Examples
///
/// ```
/// use hpsmr::{AtomicMarkedPtr, MarkedPtr};
/// use std::sync::atomic::Ordering::{Acquire, Relaxed};
///
/// let value = Box::into_raw(Box::new(3_u32));
/// let link = AtomicMarkedPtr::new(MarkedPtr::new(value, false));
///
/// let current = link.load(Acquire);
/// assert!(link
///     .compare_exchange(current, current.with_mark(true), Acquire, Relaxed)
///     .is_ok());
/// assert!(link.load(Relaxed).is_marked());
///
/// // A stale expectation fails because the mark is part of the value.
/// assert!(link
///     .compare_exchange(current, MarkedPtr::null(), Acquire, Relaxed)
///     .is_err());
///
/// drop(unsafe { Box::from_raw(value) });
/// ```
pub struct AtomicMarkedPtr<T> {
    link: AtomicPtr<T>,
}

impl<T> MarkedPtr<T> {
    /// Creates a new [`MarkedPtr`] from an address and a mark.
    ///
    /// The address must be at least two-byte aligned.
    #[inline]
    #[must_use]
    pub fn new(ptr: *mut T, marked: bool) -> Self {
        debug_assert_eq!(ptr as usize & MARK_BIT, 0, "misaligned pointer");
        Self::from_raw((ptr as usize | usize::from(marked)) as *mut T)
    }

    /// Creates a null, unmarked [`MarkedPtr`].
    #[inline]
    #[must_use]
    pub const fn null() -> Self {
        Self::from_raw(ptr::null_mut())
    }

    /// Returns the address with the mark erased.
    #[inline]
    #[must_use]
    pub fn as_ptr(self) -> *mut T {
        (self.raw as usize & !MARK_BIT) as *mut T
    }

    /// Returns `true` if the deletion mark is set.
    #[inline]
    #[must_use]
    pub fn is_marked(self) -> bool {
        self.raw as usize & MARK_BIT != 0
    }

    /// Returns `true` if the address is null, regardless of the mark.
    #[inline]
    #[must_use]
    pub fn is_null(self) -> bool {
        self.as_ptr().is_null()
    }

    /// Returns a copy with the mark replaced.
    #[inline]
    #[must_use]
    pub fn with_mark(self, marked: bool) -> Self {
        Self::new(self.as_ptr(), marked)
    }

    /// Returns a reference to the pointed-to value.
    ///
    /// # Safety
    ///
    /// The pointed-to value must be alive for `'a`, which in practice means it is protected by a
    /// guard or owned by the caller.
    #[inline]
    #[must_use]
    pub unsafe fn as_ref<'a>(self) -> Option<&'a T> {
        self.as_ptr().as_ref()
    }

    /// Returns the packed word.
    #[inline]
    pub(crate) const fn into_raw(self) -> *mut T {
        self.raw
    }

    #[inline]
    pub(crate) const fn from_raw(raw: *mut T) -> Self {
        Self {
            raw,
            _phantom: PhantomData,
        }
    }
}

impl<T> Clone for MarkedPtr<T> {
    #[inline]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for MarkedPtr<T> {}

impl<T> Default for MarkedPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T> Eq for MarkedPtr<T> {}

impl<T> PartialEq for MarkedPtr<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> fmt::Debug for MarkedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkedPtr")
            .field("ptr", &self.as_ptr())
            .field("marked", &self.is_marked())
            .finish()
    }
}

impl<T> AtomicMarkedPtr<T> {
    /// Creates a new [`AtomicMarkedPtr`].
    #[inline]
    #[must_use]
    pub fn new(ptr: MarkedPtr<T>) -> Self {
        Self {
            link: AtomicPtr::new(ptr.into_raw()),
        }
    }

    /// Creates a null [`AtomicMarkedPtr`].
    #[inline]
    #[must_use]
    pub fn null() -> Self {
        Self::new(MarkedPtr::null())
    }

    /// Loads the current value.
    #[inline]
    #[must_use]
    pub fn load(&self, order: Ordering) -> MarkedPtr<T> {
        MarkedPtr::from_raw(self.link.load(order))
    }

    /// Stores a new value.
    #[inline]
    pub fn store(&self, ptr: MarkedPtr<T>, order: Ordering) {
        self.link.store(ptr.into_raw(), order);
    }

    /// Replaces the value if it is equal to `current`, comparing both the address and the mark.
    ///
    /// # Errors
    ///
    /// Returns the actual value if it was not equal to `current`.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: MarkedPtr<T>,
        new: MarkedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<MarkedPtr<T>, MarkedPtr<T>> {
        self.link
            .compare_exchange(current.into_raw(), new.into_raw(), success, failure)
            .map(MarkedPtr::from_raw)
            .map_err(MarkedPtr::from_raw)
    }

    /// Sets the deletion mark if the current value is exactly `current` and unmarked.
    ///
    /// Returns `true` if this call set the mark.
    #[inline]
    pub fn try_mark(&self, current: MarkedPtr<T>, success: Ordering, failure: Ordering) -> bool {
        let current = current.with_mark(false);
        self.compare_exchange(current, current.with_mark(true), success, failure)
            .is_ok()
    }
}

impl<T> Default for AtomicMarkedPtr<T> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicMarkedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicMarkedPtr")
            .field(&self.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(all(test, not(feature = "loom")))]
mod test {
    use super::*;
    use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

    #[test]
    fn mark_round_trip() {
        let value = Box::into_raw(Box::new(7_u16));
        let unmarked = MarkedPtr::new(value, false);
        let marked = unmarked.with_mark(true);
        assert_eq!(marked.as_ptr(), unmarked.as_ptr());
        assert!(marked.is_marked());
        assert!(!marked.with_mark(false).is_marked());
        assert_eq!(unsafe { marked.as_ref() }.copied(), Some(7));
        drop(unsafe { Box::from_raw(value) });
    }

    #[test]
    fn null_can_carry_a_mark() {
        let marked_null = MarkedPtr::<u8>::null().with_mark(true);
        assert!(marked_null.is_null());
        assert!(marked_null.is_marked());
        assert_ne!(marked_null, MarkedPtr::null());
    }

    #[test]
    fn stale_mark_fails_cas() {
        let value = Box::into_raw(Box::new(1_u64));
        let link = AtomicMarkedPtr::new(MarkedPtr::new(value, false));
        let observed = link.load(Acquire);
        assert!(link.try_mark(observed, AcqRel, Relaxed));
        assert!(!link.try_mark(observed, AcqRel, Relaxed));
        assert_eq!(
            link.compare_exchange(observed, MarkedPtr::null(), AcqRel, Relaxed),
            Err(observed.with_mark(true))
        );
        drop(unsafe { Box::from_raw(value) });
    }
}
