use super::list::{Cursor, Node};
use super::reclaim::{Protect, Reclaim};
use super::stat::Stat;
use super::{GuardedRef, MarkedPtr, OrderedList};
use std::fmt;
use std::iter::FusedIterator;
use std::mem::swap;

/// [`Iter`] traverses an [`OrderedList`] in key order.
///
/// The node last yielded stays protected; if it is found removed when the iterator advances, the
/// traversal continues from the first entry whose key is greater than the last yielded key.
pub struct Iter<'l, K: 'static, V: 'static, R: Reclaim, S: Stat> {
    list: &'l OrderedList<K, V, R, S>,
    cursor: Cursor<K, V, R>,
    current: MarkedPtr<Node<K, V>>,
    hold: R::Guard,
    ahead: R::Guard,
    started: bool,
}

impl<'l, K: 'static, V: 'static, R: Reclaim, S: Stat> Iter<'l, K, V, R, S> {
    pub(crate) fn new(list: &'l OrderedList<K, V, R, S>) -> Self {
        Self {
            list,
            cursor: Cursor::new(),
            current: MarkedPtr::null(),
            hold: R::guard(),
            ahead: R::guard(),
            started: false,
        }
    }
}

impl<'l, K: 'static + Ord, V: 'static, R: Reclaim, S: Stat> Iterator for Iter<'l, K, V, R, S> {
    type Item = GuardedRef<'l, K, V, R>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = if self.started {
            let current = unsafe { self.current.as_ref()? };
            let next = self.ahead.protect(&current.next);
            if next.is_marked() {
                // `current` was removed; `hold` keeps its key readable for the search.
                let candidate = if self.list.search(&current.key, &mut self.cursor) {
                    self.cursor.next
                } else {
                    self.cursor.cur
                };
                self.ahead.acquire(candidate)
            } else {
                next
            }
        } else {
            self.started = true;
            self.ahead.protect(self.list.head())
        };
        swap(&mut self.hold, &mut self.ahead);
        self.current = next.with_mark(false);

        if self.current.is_null() {
            return None;
        }
        let mut guard = R::guard();
        guard.acquire(self.current);
        Some(unsafe { GuardedRef::new(guard, self.current.as_ptr()) })
    }
}

impl<'l, K: 'static + Ord, V: 'static, R: Reclaim, S: Stat> FusedIterator
    for Iter<'l, K, V, R, S>
{
}

impl<'l, K: 'static, V: 'static, R: Reclaim, S: Stat> fmt::Debug for Iter<'l, K, V, R, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("current", &self.current)
            .field("started", &self.started)
            .finish()
    }
}
