use super::reclaim::{Protect, Reclaim};
use super::{AtomicMarkedPtr, Hp, MarkedPtr};
use std::fmt;

/// [`GuardSet`] is a fixed-size array of guards for operations that protect several pointers at
/// once.
///
/// Guards in a set are addressed by index; [`GuardSet::swap`] moves a protection from one index to
/// another without publishing anything, which is how a traversal hands the current node over to
/// the predecessor position.
///
/// # Examples
///
/// ```
/// use hpsmr::{AtomicMarkedPtr, GuardSet, Hp, MarkedPtr};
/// use std::sync::atomic::Ordering::Relaxed;
///
/// let link: AtomicMarkedPtr<u32> = AtomicMarkedPtr::new(MarkedPtr::new(Box::into_raw(Box::new(3)), false));
///
/// let mut guards: GuardSet<Hp, 2> = GuardSet::new();
/// let ptr = guards.protect(1, &link);
/// guards.swap(0, 1);
/// guards.release(1);
/// assert_eq!(unsafe { ptr.as_ref() }, Some(&3));
///
/// drop(guards);
/// drop(unsafe { Box::from_raw(link.load(Relaxed).as_ptr()) });
/// ```
pub struct GuardSet<R: Reclaim = Hp, const N: usize = 3> {
    guards: [R::Guard; N],
}

impl<R: Reclaim, const N: usize> GuardSet<R, N> {
    /// Creates a new [`GuardSet`].
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            guards: std::array::from_fn(|_| R::guard()),
        }
    }

    /// Protects the pointer stored in `src` with the guard at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn protect<T>(&mut self, index: usize, src: &AtomicMarkedPtr<T>) -> MarkedPtr<T> {
        self.guards[index].protect(src)
    }

    /// Protects `ptr` with the guard at `index` without validation.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn acquire<T>(&mut self, index: usize, ptr: MarkedPtr<T>) -> MarkedPtr<T> {
        self.guards[index].acquire(ptr)
    }

    /// Clears the guard at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn release(&mut self, index: usize) {
        self.guards[index].release();
    }

    /// Clears every guard.
    #[inline]
    pub fn release_all(&mut self) {
        self.guards.iter_mut().for_each(Protect::release);
    }

    /// Exchanges the guards at `a` and `b`.
    ///
    /// # Panics
    ///
    /// Panics if `a` or `b` is out of bounds.
    #[inline]
    pub fn swap(&mut self, a: usize, b: usize) {
        self.guards.swap(a, b);
    }

    /// Returns the number of guards in the set.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        N
    }

    /// Returns `true` if the set has no guards.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<R: Reclaim, const N: usize> Default for GuardSet<R, N> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Reclaim, const N: usize> fmt::Debug for GuardSet<R, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardSet").field("len", &N).finish()
    }
}
