use super::reclaim::{Protect, Reclaim};
use super::{AtomicMarkedPtr, MarkedPtr, Retired};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::atomic::Ordering::Acquire;

/// [`SingleThreaded`] is a backend for data structures that are never shared among threads.
///
/// Guards publish nothing. Retired instances are kept in a thread-local bag, and disposed of
/// once the last guard of the thread is dropped, on an explicit scan without live guards, or when
/// the thread exits. A data structure parameterized with [`SingleThreaded`] can be moved to
/// another thread, but it is never [`Sync`].
///
/// # Examples
///
/// ```
/// use hpsmr::{OrderedList, SingleThreaded};
///
/// let list: OrderedList<u32, &str, SingleThreaded> = OrderedList::new();
/// assert!(list.insert(2, "two").is_ok());
/// assert!(list.insert(1, "one").is_ok());
/// assert!(list.remove(&2));
/// assert_eq!(list.iter().map(|e| *e.key()).collect::<Vec<_>>(), vec![1]);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleThreaded {
    _marker: PhantomData<Cell<()>>,
}

/// [`LocalGuard`] is the guard of [`SingleThreaded`].
#[derive(Debug)]
pub struct LocalGuard {
    _marker: PhantomData<*const ()>,
}

/// Retired instances of the thread and the number of live guards.
#[derive(Default)]
struct LocalBag {
    retired: Vec<Retired>,
    guards: usize,
}

impl SingleThreaded {
    /// Retired instances accumulated before a scan is attempted.
    const SCAN_THRESHOLD: usize = 64;
}

unsafe impl Reclaim for SingleThreaded {
    type Guard = LocalGuard;

    #[inline]
    fn register_thread() {}

    #[inline]
    fn unregister_thread() -> bool {
        if LOCAL_BAG.with(|bag| bag.borrow().guards) != 0 {
            return false;
        }
        Self::scan();
        true
    }

    #[inline]
    fn guard() -> LocalGuard {
        LOCAL_BAG.with(|bag| bag.borrow_mut().guards += 1);
        LocalGuard {
            _marker: PhantomData,
        }
    }

    #[inline]
    unsafe fn retire(retired: Retired) {
        let mut pending = Some(retired);
        let should_scan = LOCAL_BAG
            .try_with(|bag| {
                let mut bag = bag.borrow_mut();
                bag.retired.extend(pending.take());
                bag.guards == 0 && bag.retired.len() >= Self::SCAN_THRESHOLD
            })
            .unwrap_or(false);
        if let Some(retired) = pending {
            // The bag is gone as the thread is exiting; nothing can refer to the instance.
            retired.dispose();
        }
        if should_scan {
            Self::scan();
        }
    }

    fn scan() {
        loop {
            let retired = LOCAL_BAG.with(|bag| {
                let mut bag = bag.borrow_mut();
                if bag.guards == 0 {
                    std::mem::take(&mut bag.retired)
                } else {
                    Vec::new()
                }
            });
            if retired.is_empty() {
                break;
            }
            // The bag is not borrowed while disposers run; they may retire more instances.
            retired
                .into_iter()
                .for_each(|r| unsafe { r.dispose() });
        }
    }
}

impl Protect for LocalGuard {
    #[inline]
    fn protect<T>(&mut self, src: &AtomicMarkedPtr<T>) -> MarkedPtr<T> {
        src.load(Acquire)
    }

    #[inline]
    fn acquire<T>(&mut self, ptr: MarkedPtr<T>) -> MarkedPtr<T> {
        ptr
    }

    #[inline]
    fn release(&mut self) {}
}

impl Drop for LocalGuard {
    #[inline]
    fn drop(&mut self) {
        let should_scan = LOCAL_BAG
            .try_with(|bag| {
                let mut bag = bag.borrow_mut();
                bag.guards -= 1;
                bag.guards == 0 && bag.retired.len() >= SingleThreaded::SCAN_THRESHOLD
            })
            .unwrap_or(false);
        if should_scan {
            SingleThreaded::scan();
        }
    }
}

impl Drop for LocalBag {
    fn drop(&mut self) {
        std::mem::take(&mut self.retired)
            .into_iter()
            .for_each(|r| unsafe { r.dispose() });
    }
}

thread_local! {
    static LOCAL_BAG: RefCell<LocalBag> = RefCell::default();
}
