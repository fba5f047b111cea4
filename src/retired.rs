use std::fmt;
use std::ptr::NonNull;

/// [`Retired`] is a type-erased record of an instance that was unlinked from a data structure and
/// is waiting to be disposed of.
///
/// A [`Retired`] carries the address that hazard pointers are compared against and the disposer
/// that will eventually release the instance.
///
/// # Examples
///
/// ```
/// use hpsmr::{Hp, Reclaim, Retired};
///
/// let boxed = Box::new(String::from("unlinked"));
/// let retired = Retired::from_box(boxed);
///
/// // Nothing else can reach the `String`, therefore retiring it is safe.
/// unsafe { Hp::retire(retired) };
/// Hp::scan();
/// ```
pub struct Retired {
    ptr: NonNull<()>,
    dispose: unsafe fn(NonNull<()>),
}

/// [`RetiredList`] is the unordered per-thread buffer of [`Retired`] records.
#[derive(Debug, Default)]
pub(crate) struct RetiredList {
    entries: Vec<Retired>,
}

impl Retired {
    /// Creates a new [`Retired`] from an address and its disposer.
    ///
    /// # Safety
    ///
    /// `dispose` must be safe to call exactly once with `ptr` from any thread at any point after
    /// no hazard pointer refers to `ptr`.
    #[inline]
    pub unsafe fn new(ptr: NonNull<()>, dispose: unsafe fn(NonNull<()>)) -> Self {
        Self { ptr, dispose }
    }

    /// Creates a new [`Retired`] that drops the supplied [`Box`] when it is disposed of.
    #[inline]
    #[must_use]
    pub fn from_box<T: 'static>(boxed: Box<T>) -> Self {
        unsafe fn drop_box<T>(ptr: NonNull<()>) {
            drop(Box::from_raw(ptr.cast::<T>().as_ptr()));
        }
        let ptr = NonNull::from(Box::leak(boxed)).cast::<()>();
        Self {
            ptr,
            dispose: drop_box::<T>,
        }
    }

    /// Returns the address that hazard pointers are compared against.
    #[inline]
    #[must_use]
    pub fn addr(&self) -> *mut () {
        self.ptr.as_ptr()
    }

    /// Disposes of the instance.
    ///
    /// # Safety
    ///
    /// No thread may access the instance afterwards.
    #[inline]
    pub(crate) unsafe fn dispose(self) {
        (self.dispose)(self.ptr);
    }
}

impl fmt::Debug for Retired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retired").field("ptr", &self.ptr).finish()
    }
}

// The instance behind a `Retired` is only ever disposed of once, by whichever thread reclaims it.
unsafe impl Send for Retired {}

impl RetiredList {
    #[inline]
    pub(crate) fn push(&mut self, retired: Retired) {
        self.entries.push(retired);
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Moves every entry out of `self`.
    #[inline]
    pub(crate) fn take(&mut self) -> RetiredList {
        RetiredList {
            entries: std::mem::take(&mut self.entries),
        }
    }

    #[inline]
    pub(crate) fn append(&mut self, other: RetiredList) {
        if self.entries.is_empty() {
            self.entries = other.entries;
        } else {
            self.entries.extend(other.entries);
        }
    }

    /// Splits the list into entries that are still protected and those that can be disposed of.
    ///
    /// `hazards` must be sorted.
    pub(crate) fn partition(self, hazards: &[*mut ()]) -> (RetiredList, Vec<Retired>) {
        let (kept, doomed): (Vec<Retired>, Vec<Retired>) = self
            .entries
            .into_iter()
            .partition(|r| hazards.binary_search(&r.addr()).is_ok());
        (RetiredList { entries: kept }, doomed)
    }
}

impl IntoIterator for RetiredList {
    type Item = Retired;
    type IntoIter = std::vec::IntoIter<Retired>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Extend<Retired> for RetiredList {
    #[inline]
    fn extend<I: IntoIterator<Item = Retired>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}
