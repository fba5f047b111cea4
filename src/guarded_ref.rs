use super::list::Node;
use super::reclaim::Reclaim;
use super::Hp;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

/// [`GuardedRef`] is a reference to an entry of an [`OrderedList`](crate::OrderedList) that keeps
/// the entry from being reclaimed.
///
/// The entry may be removed from the list while the [`GuardedRef`] is alive; it stays readable
/// until the [`GuardedRef`] is dropped. Holding one for a long time pins memory.
pub struct GuardedRef<'l, K, V, R: Reclaim = Hp> {
    _guard: R::Guard,
    node: NonNull<Node<K, V>>,
    _phantom: PhantomData<&'l Node<K, V>>,
}

impl<'l, K, V, R: Reclaim> GuardedRef<'l, K, V, R> {
    /// Creates a new [`GuardedRef`].
    ///
    /// # Safety
    ///
    /// `guard` must protect `node`, and `node` must not be null.
    #[inline]
    pub(crate) unsafe fn new(guard: R::Guard, node: *mut Node<K, V>) -> Self {
        Self {
            _guard: guard,
            node: NonNull::new_unchecked(node),
            _phantom: PhantomData,
        }
    }

    /// Returns a reference to the key.
    #[inline]
    #[must_use]
    pub fn key(&self) -> &K {
        unsafe { &self.node.as_ref().key }
    }

    /// Returns a reference to the value.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &V {
        unsafe { &self.node.as_ref().value }
    }
}

impl<'l, K, V, R: Reclaim> Deref for GuardedRef<'l, K, V, R> {
    type Target = V;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.value()
    }
}

impl<'l, K: fmt::Debug, V: fmt::Debug, R: Reclaim> fmt::Debug for GuardedRef<'l, K, V, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedRef")
            .field("key", self.key())
            .field("value", self.value())
            .finish()
    }
}
