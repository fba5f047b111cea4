use super::collector::Collector;
use super::{AtomicMarkedPtr, Guard, MarkedPtr, Retired};

/// [`Reclaim`] is the capability interface a memory reclamation backend provides to the data
/// structures of the crate.
///
/// # Safety
///
/// An implementation must never dispose of a [`Retired`] instance while a guard of the backend
/// that was obtained through [`Protect::protect`] still refers to it.
pub unsafe trait Reclaim: 'static {
    /// The guard type of the backend.
    type Guard: Protect;

    /// Registers the current thread with the backend.
    ///
    /// Registration happens lazily anyway; calling it in advance moves the cost of allocating
    /// thread-local records out of the first operation.
    fn register_thread();

    /// Deregisters the current thread.
    ///
    /// Returns `false` if the thread still holds a guard.
    fn unregister_thread() -> bool;

    /// Returns a new guard protecting nothing.
    fn guard() -> Self::Guard;

    /// Passes an unlinked instance to the backend.
    ///
    /// # Safety
    ///
    /// The instance must be unreachable for every thread that did not protect it before it was
    /// unlinked, and it must be retired only once.
    unsafe fn retire(retired: Retired);

    /// Disposes of retired instances that are no longer protected.
    fn scan();
}

/// [`Protect`] is implemented by guards of a [`Reclaim`] backend.
pub trait Protect {
    /// Loads the pointer stored in `src` and protects it.
    fn protect<T>(&mut self, src: &AtomicMarkedPtr<T>) -> MarkedPtr<T>;

    /// Protects `ptr` without validation, and returns it unchanged.
    fn acquire<T>(&mut self, ptr: MarkedPtr<T>) -> MarkedPtr<T>;

    /// Stops protecting the pointer.
    fn release(&mut self);
}

/// [`Hp`] is the hazard pointer backend.
///
/// # Examples
///
/// ```
/// use hpsmr::{Hp, Reclaim};
///
/// Hp::register_thread();
/// {
///     let _guard = Hp::guard();
///     assert!(!Hp::unregister_thread());
/// }
/// assert!(Hp::unregister_thread());
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct Hp;

unsafe impl Reclaim for Hp {
    type Guard = Guard;

    #[inline]
    fn register_thread() {
        Collector::current();
    }

    #[inline]
    fn unregister_thread() -> bool {
        Collector::detach()
    }

    #[inline]
    fn guard() -> Guard {
        Guard::new()
    }

    #[inline]
    unsafe fn retire(retired: Retired) {
        (*Collector::current()).retire(retired);
    }

    #[inline]
    fn scan() {
        unsafe {
            (*Collector::current()).scan();
        }
    }
}

impl Protect for Guard {
    #[inline]
    fn protect<T>(&mut self, src: &AtomicMarkedPtr<T>) -> MarkedPtr<T> {
        Guard::protect(self, src)
    }

    #[inline]
    fn acquire<T>(&mut self, ptr: MarkedPtr<T>) -> MarkedPtr<T> {
        Guard::acquire(self, ptr)
    }

    #[inline]
    fn release(&mut self) {
        Guard::release(self);
    }
}
