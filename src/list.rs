use super::reclaim::{Protect, Reclaim};
use super::stat::{NoStat, Stat};
use super::{AtomicMarkedPtr, Error, GuardSet, GuardedRef, Hp, InsertError, Iter, MarkedPtr, Retired};
use crossbeam_utils::Backoff;
use std::alloc::{alloc, Layout};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};

/// [`OrderedList`] is a lock-free singly-linked list of key-value pairs sorted by key.
///
/// Deletion is split into two steps: the link of the removed node is marked first, which is the
/// point at which the entry ceases to exist, and then the node is unlinked, either by the
/// removing thread or by any other thread that runs into it. Unlinked nodes are handed to the
/// reclamation backend `R`; no thread ever dereferences a node after it is disposed of.
///
/// `S` receives notable events, see [`Stat`].
///
/// # Examples
///
/// ```
/// use hpsmr::OrderedList;
/// use std::sync::Arc;
/// use std::thread;
///
/// let list: Arc<OrderedList<u64, u64>> = Arc::default();
/// let threads: Vec<_> = (0..4_u64)
///     .map(|t| {
///         let list = list.clone();
///         thread::spawn(move || {
///             for k in (t * 16)..((t + 1) * 16) {
///                 assert!(list.insert(k, k * 2).is_ok());
///             }
///         })
///     })
///     .collect();
/// threads.into_iter().for_each(|t| t.join().unwrap());
///
/// assert_eq!(list.len(), 64);
/// assert_eq!(list.get(&5).map(|e| *e), Some(10));
/// assert!(list.iter().map(|e| *e.key()).eq(0..64));
/// ```
pub struct OrderedList<K: 'static, V: 'static, R: Reclaim = Hp, S: Stat = NoStat> {
    head: AtomicMarkedPtr<Node<K, V>>,
    len: AtomicUsize,
    stat: S,
    dispose: Option<fn(K, V)>,
    _phantom: PhantomData<(Box<Node<K, V>>, R)>,
}

/// A list node; it is owned by the list while reachable, and by the backend after it is unlinked.
pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) next: AtomicMarkedPtr<Node<K, V>>,
    dispose: Option<fn(K, V)>,
}

/// The result of a search: `prev` points to `cur`, and `cur` points to `next`.
///
/// Guards in the set protect, in that order, the node owning `prev`, `cur`, and `next`.
pub(crate) struct Cursor<K, V, R: Reclaim> {
    guards: GuardSet<R, 3>,
    prev: *const AtomicMarkedPtr<Node<K, V>>,
    pub(crate) cur: MarkedPtr<Node<K, V>>,
    pub(crate) next: MarkedPtr<Node<K, V>>,
}

/// Guard indexes of a [`Cursor`].
const PRED: usize = 0;
const CUR: usize = 1;
const NEXT: usize = 2;

impl<K: 'static, V: 'static, R: Reclaim, S: Stat> OrderedList<K, V, R, S> {
    /// Creates an empty [`OrderedList`].
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u8, ()> = OrderedList::new();
    /// assert!(list.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            head: AtomicMarkedPtr::null(),
            len: AtomicUsize::new(0),
            stat: S::default(),
            dispose: None,
            _phantom: PhantomData,
        }
    }

    /// Creates an empty [`OrderedList`] that passes every key-value pair to `dispose` when the
    /// node holding it is finally reclaimed.
    ///
    /// The disposer runs in whichever thread reclaims the node.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    /// use std::sync::atomic::AtomicUsize;
    /// use std::sync::atomic::Ordering::Relaxed;
    ///
    /// static DISPOSED: AtomicUsize = AtomicUsize::new(0);
    ///
    /// let list: OrderedList<u8, u8> = OrderedList::with_disposer(|_, _| {
    ///     DISPOSED.fetch_add(1, Relaxed);
    /// });
    /// assert!(list.insert(1, 1).is_ok());
    /// drop(list);
    /// assert_eq!(DISPOSED.load(Relaxed), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn with_disposer(dispose: fn(K, V)) -> Self {
        Self {
            head: AtomicMarkedPtr::null(),
            len: AtomicUsize::new(0),
            stat: S::default(),
            dispose: Some(dispose),
            _phantom: PhantomData,
        }
    }

    /// Returns the number of entries.
    ///
    /// The value is exact only if no other thread is modifying the list.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }

    /// Returns `true` if the list has no entries.
    ///
    /// Nodes that are removed but not unlinked yet do not count; they are unlinked on the way.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u8, u8> = OrderedList::new();
    /// assert!(list.is_empty());
    /// assert!(list.insert(1, 1).is_ok());
    /// assert!(!list.is_empty());
    /// assert!(list.remove(&1));
    /// assert!(list.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        let mut cursor = Cursor::new();
        self.locate(&mut cursor, |_| Ordering::Greater);
        cursor.cur.is_null()
    }

    /// Returns a reference to the statistics hook.
    #[inline]
    pub fn stat(&self) -> &S {
        &self.stat
    }

    /// Checks the structure of the list.
    ///
    /// Exclusive access guarantees that no operation is in flight, therefore every link must be
    /// unmarked and keys must be strictly increasing. Returns the number of entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptedLink`] at the first link that violates the invariants.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let mut list: OrderedList<u8, u8> = OrderedList::new();
    /// assert!(list.insert(3, 0).is_ok());
    /// assert!(list.insert(1, 0).is_ok());
    /// assert_eq!(list.validate(), Ok(2));
    /// ```
    pub fn validate(&mut self) -> Result<usize, Error>
    where
        K: Ord,
    {
        let mut position = 0;
        let mut prev_key: Option<&K> = None;
        let mut current = self.head.load(Acquire);
        if current.is_marked() {
            return Err(Error::CorruptedLink {
                position,
                reason: "the head is marked",
            });
        }
        while let Some(node) = unsafe { current.as_ref() } {
            if prev_key.map_or(false, |k| k >= &node.key) {
                return Err(Error::CorruptedLink {
                    position,
                    reason: "keys are not strictly increasing",
                });
            }
            current = node.next.load(Acquire);
            if current.is_marked() {
                return Err(Error::CorruptedLink {
                    position,
                    reason: "a removed node is still linked",
                });
            }
            prev_key = Some(&node.key);
            position += 1;
        }
        if position != self.len() {
            return Err(Error::CorruptedLink {
                position,
                reason: "the entry count does not match the number of nodes",
            });
        }
        Ok(position)
    }

    #[inline]
    pub(crate) fn head(&self) -> &AtomicMarkedPtr<Node<K, V>> {
        &self.head
    }

    /// Finds the first live node for which `compare` does not return [`Ordering::Less`].
    ///
    /// Marked nodes met on the way are unlinked and retired. Returns `true` if `compare`
    /// returned [`Ordering::Equal`] for the node.
    fn locate<F>(&self, cursor: &mut Cursor<K, V, R>, mut compare: F) -> bool
    where
        F: FnMut(&K) -> Ordering,
    {
        let backoff = Backoff::new();
        'restart: loop {
            let mut prev: *const AtomicMarkedPtr<Node<K, V>> = &self.head;
            let mut cur = cursor.guards.protect(CUR, &self.head);
            loop {
                let Some(cur_node) = (unsafe { cur.as_ref() }) else {
                    cursor.set(prev, cur, MarkedPtr::null());
                    return false;
                };
                let next = cursor.guards.protect(NEXT, &cur_node.next);

                // `cur` must still be linked to `prev`; otherwise `next` may be unreachable.
                if unsafe { (*prev).load(Acquire) } != cur {
                    self.stat.on_retry();
                    backoff.spin();
                    continue 'restart;
                }

                if next.is_marked() {
                    let succ = next.with_mark(false);
                    match unsafe { (*prev).compare_exchange(cur, succ, AcqRel, Acquire) } {
                        Ok(_) => {
                            self.stat.on_help_unlink();
                            self.retire(cur);
                            cursor.guards.swap(CUR, NEXT);
                            cur = succ;
                        }
                        Err(_) => {
                            self.stat.on_retry();
                            backoff.spin();
                            continue 'restart;
                        }
                    }
                    continue;
                }

                match compare(&cur_node.key) {
                    Ordering::Less => {
                        prev = &cur_node.next;
                        cursor.guards.swap(PRED, CUR);
                        cursor.guards.swap(CUR, NEXT);
                        cur = next;
                    }
                    Ordering::Equal => {
                        cursor.set(prev, cur, next);
                        return true;
                    }
                    Ordering::Greater => {
                        cursor.set(prev, cur, next);
                        return false;
                    }
                }
            }
        }
    }

    /// Hands an unlinked node over to the backend.
    fn retire(&self, node: MarkedPtr<Node<K, V>>) {
        self.stat.on_retire();
        unsafe {
            R::retire(Node::retired(node.as_ptr()));
        }
    }
}

impl<K: 'static + Ord, V: 'static, R: Reclaim, S: Stat> OrderedList<K, V, R, S> {
    /// Inserts a key-value pair.
    ///
    /// # Errors
    ///
    /// Returns [`InsertError::Occupied`] if the key is present, and [`InsertError::AllocFailed`]
    /// if memory for a node could not be allocated; both give the key and the value back.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::{InsertError, OrderedList};
    ///
    /// let list: OrderedList<u32, &str> = OrderedList::new();
    /// assert!(list.insert(11, "a").is_ok());
    /// assert_eq!(list.insert(11, "b").unwrap_err().into_inner(), (11, "b"));
    /// ```
    pub fn insert(&self, key: K, value: V) -> Result<(), InsertError<K, V>> {
        let node = self.alloc_node(key, value)?;
        let mut cursor = Cursor::new();
        if self.link(node, &mut cursor) {
            self.stat.on_insert(true);
            Ok(())
        } else {
            self.stat.on_insert(false);
            let (key, value) = unsafe { Node::into_inner(node) };
            Err(InsertError::Occupied { key, value })
        }
    }

    /// Returns the entry of the key, inserting the supplied pair if the key is absent.
    ///
    /// The returned flag is `true` if the pair was inserted; otherwise the pair is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`InsertError::AllocFailed`] if memory for a node could not be allocated.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u8, u8> = OrderedList::new();
    /// let (entry, inserted) = list.get_or_insert(1, 10).unwrap();
    /// assert!(inserted);
    /// assert_eq!(*entry, 10);
    ///
    /// let (entry, inserted) = list.get_or_insert(1, 20).unwrap();
    /// assert!(!inserted);
    /// assert_eq!(*entry, 10);
    /// ```
    pub fn get_or_insert(
        &self,
        key: K,
        value: V,
    ) -> Result<(GuardedRef<'_, K, V, R>, bool), InsertError<K, V>> {
        let node = self.alloc_node(key, value)?;
        let mut guard = R::guard();

        // The node cannot be retired before it is linked; protecting it in advance keeps it
        // readable afterwards.
        guard.acquire(MarkedPtr::new(node, false));
        let mut cursor = Cursor::new();
        if self.link(node, &mut cursor) {
            self.stat.on_insert(true);
            return Ok((unsafe { GuardedRef::new(guard, node) }, true));
        }
        self.stat.on_insert(false);
        drop(unsafe { Node::into_inner(node) });

        // `link` returned with the existing node protected by the cursor.
        guard.acquire(cursor.cur);
        Ok((unsafe { GuardedRef::new(guard, cursor.cur.as_ptr()) }, false))
    }

    /// Removes the key.
    ///
    /// Returns `false` if the key was absent; removing the same key twice is harmless.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u32, u32> = OrderedList::new();
    /// assert!(list.insert(1, 1).is_ok());
    /// assert!(list.remove(&1));
    /// assert!(!list.remove(&1));
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.remove_if(key, |_, _| true)
    }

    /// Removes the key if `condition` returns `true` for the entry.
    ///
    /// `condition` may be called more than once if the entry is concurrently replaced.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u32, u32> = OrderedList::new();
    /// assert!(list.insert(1, 7).is_ok());
    /// assert!(!list.remove_if(&1, |_, v| *v == 8));
    /// assert!(list.remove_if(&1, |_, v| *v == 7));
    /// ```
    #[inline]
    pub fn remove_if<Q, F>(&self, key: &Q, condition: F) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        F: FnMut(&K, &V) -> bool,
    {
        let mut cursor = Cursor::new();
        let removed = self.erase(key, &mut cursor, condition, None).is_some();
        self.stat.on_remove(removed);
        removed
    }

    /// Removes the key and returns the removed entry.
    ///
    /// The entry stays readable until the returned [`GuardedRef`] is dropped.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u32, String> = OrderedList::new();
    /// assert!(list.insert(1, String::from("one")).is_ok());
    ///
    /// let removed = list.extract(&1).unwrap();
    /// assert_eq!(removed.value(), "one");
    /// assert!(!list.contains(&1));
    /// ```
    pub fn extract<Q>(&self, key: &Q) -> Option<GuardedRef<'_, K, V, R>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cursor = Cursor::new();
        let mut guard = R::guard();
        let removed = self.erase(key, &mut cursor, |_, _| true, Some(&mut guard));
        self.stat.on_remove(removed.is_some());
        removed.map(|ptr| unsafe { GuardedRef::new(guard, ptr.as_ptr()) })
    }

    /// Removes every entry.
    ///
    /// Entries inserted concurrently may survive.
    pub fn clear(&self) {
        let mut guard = R::guard();
        loop {
            let first = guard.protect(&self.head);
            let Some(node) = (unsafe { first.as_ref() }) else {
                break;
            };
            let mut cursor = Cursor::new();
            self.erase(&node.key, &mut cursor, |k, _| ptr::eq(k, &node.key), None);
        }
    }

    /// Returns an iterator over entries in key order.
    ///
    /// The iterator is not a snapshot: entries inserted or removed concurrently may or may not
    /// be observed, but keys are always yielded in strictly increasing order.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<i32, char> = OrderedList::new();
    /// assert!(list.insert(2, 'b').is_ok());
    /// assert!(list.insert(1, 'a').is_ok());
    ///
    /// let entries: Vec<(i32, char)> = list.iter().map(|e| (*e.key(), *e.value())).collect();
    /// assert_eq!(entries, vec![(1, 'a'), (2, 'b')]);
    /// ```
    #[inline]
    pub fn iter(&self) -> Iter<'_, K, V, R, S> {
        Iter::new(self)
    }

    /// Returns `true` if the key is present.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<String, ()> = OrderedList::new();
    /// assert!(list.insert(String::from("k"), ()).is_ok());
    /// assert!(list.contains("k"));
    /// ```
    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cursor = Cursor::new();
        let found = self.search(key, &mut cursor);
        self.stat.on_find(found);
        found
    }

    /// Returns the entry of the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use hpsmr::OrderedList;
    ///
    /// let list: OrderedList<u32, u32> = OrderedList::new();
    /// assert!(list.insert(1, 10).is_ok());
    /// assert_eq!(list.get(&1).map(|e| *e.value()), Some(10));
    /// assert!(list.get(&2).is_none());
    /// ```
    pub fn get<Q>(&self, key: &Q) -> Option<GuardedRef<'_, K, V, R>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cursor = Cursor::new();
        let found = self.search(key, &mut cursor);
        self.stat.on_find(found);
        if !found {
            return None;
        }
        let mut guard = R::guard();
        guard.acquire(cursor.cur);
        Some(unsafe { GuardedRef::new(guard, cursor.cur.as_ptr()) })
    }

    /// Finds the first node whose key is not less than `key`.
    ///
    /// Marked nodes met on the way are unlinked and retired. Returns `true` if the key of the
    /// node equals `key`.
    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q, cursor: &mut Cursor<K, V, R>) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.locate(cursor, |k| <K as Borrow<Q>>::borrow(k).cmp(key))
    }

    /// Links a new node unless its key is present; the key is re-checked on every retry.
    fn link(&self, node: *mut Node<K, V>, cursor: &mut Cursor<K, V, R>) -> bool {
        let backoff = Backoff::new();
        let new = MarkedPtr::new(node, false);
        loop {
            let key = unsafe { &(*node).key };
            if self.search(key, cursor) {
                return false;
            }
            debug_assert!(unsafe { cursor.cur.as_ref() }.map_or(true, |n| &n.key > key));
            unsafe {
                (*node).next.store(cursor.cur, Relaxed);
            }

            // Counted ahead of the CAS; a remover may mark the node right after it is linked.
            self.len.fetch_add(1, Relaxed);
            if unsafe { (*cursor.prev).compare_exchange(cursor.cur, new, AcqRel, Acquire) }
                .is_ok()
            {
                return true;
            }
            self.len.fetch_sub(1, Relaxed);
            self.stat.on_retry();
            backoff.spin();
        }
    }

    /// Marks and unlinks the node of the key if `condition` holds.
    ///
    /// Returns the removed node; if `keep` is supplied, it protects the node.
    fn erase<Q, F>(
        &self,
        key: &Q,
        cursor: &mut Cursor<K, V, R>,
        mut condition: F,
        mut keep: Option<&mut R::Guard>,
    ) -> Option<MarkedPtr<Node<K, V>>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
        F: FnMut(&K, &V) -> bool,
    {
        let backoff = Backoff::new();
        loop {
            if !self.search(key, cursor) {
                return None;
            }
            let cur = cursor.cur;
            let next = cursor.next;
            let cur_node = unsafe { cur.as_ref()? };
            if !condition(&cur_node.key, &cur_node.value) {
                return None;
            }
            if let Some(guard) = keep.as_mut() {
                guard.acquire(cur);
            }

            // Marking the link is the point at which the entry is removed.
            if !cur_node.next.try_mark(next, AcqRel, Relaxed) {
                self.stat.on_retry();
                backoff.spin();
                continue;
            }
            self.len.fetch_sub(1, Relaxed);

            if unsafe { (*cursor.prev).compare_exchange(cur, next, AcqRel, Relaxed) }.is_ok() {
                self.retire(cur);
            } else {
                // Another thread changed the predecessor; a search unlinks the node.
                self.search(key, cursor);
            }
            return Some(cur);
        }
    }

    fn alloc_node(&self, key: K, value: V) -> Result<*mut Node<K, V>, InsertError<K, V>> {
        let layout = Layout::new::<Node<K, V>>();
        let ptr = unsafe { alloc(layout) }.cast::<Node<K, V>>();
        if ptr.is_null() {
            return Err(InsertError::AllocFailed { key, value });
        }
        unsafe {
            ptr.write(Node {
                key,
                value,
                next: AtomicMarkedPtr::null(),
                dispose: self.dispose,
            });
        }
        Ok(ptr)
    }
}

impl<K, V> Node<K, V> {
    /// Returns a [`Retired`] that disposes of the node.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a node allocated by the list.
    unsafe fn retired(ptr: *mut Self) -> Retired {
        Retired::new(NonNull::new_unchecked(ptr.cast()), Self::dispose_raw)
    }

    /// Frees the node and returns the key and the value without calling the disposer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a node allocated by the list that no other thread can reach.
    unsafe fn into_inner(ptr: *mut Self) -> (K, V) {
        let Node { key, value, .. } = *Box::from_raw(ptr);
        (key, value)
    }

    /// Frees the node, passing the key and the value to the disposer if there is one.
    unsafe fn dispose_raw(ptr: NonNull<()>) {
        let Node {
            key,
            value,
            dispose,
            ..
        } = *Box::from_raw(ptr.cast::<Self>().as_ptr());
        if let Some(dispose) = dispose {
            dispose(key, value);
        }
    }
}

impl<K, V, R: Reclaim> Cursor<K, V, R> {
    pub(crate) fn new() -> Self {
        Self {
            guards: GuardSet::new(),
            prev: ptr::null(),
            cur: MarkedPtr::null(),
            next: MarkedPtr::null(),
        }
    }

    #[inline]
    fn set(
        &mut self,
        prev: *const AtomicMarkedPtr<Node<K, V>>,
        cur: MarkedPtr<Node<K, V>>,
        next: MarkedPtr<Node<K, V>>,
    ) {
        self.prev = prev;
        self.cur = cur;
        self.next = next;
    }
}

impl<K: 'static, V: 'static, R: Reclaim, S: Stat> Default for OrderedList<K, V, R, S> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K: 'static, V: 'static, R: Reclaim, S: Stat> Drop for OrderedList<K, V, R, S> {
    fn drop(&mut self) {
        let mut current = self.head.load(Acquire);
        while !current.is_null() {
            let node = current.as_ptr();
            current = unsafe { (*node).next.load(Acquire) };
            unsafe {
                Node::<K, V>::dispose_raw(NonNull::new_unchecked(node.cast()));
            }
        }
    }
}

impl<K: 'static + fmt::Debug + Ord, V: 'static + fmt::Debug, R: Reclaim, S: Stat> fmt::Debug
    for OrderedList<K, V, R, S>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.iter() {
            map.entry(entry.key(), entry.value());
        }
        map.finish()
    }
}

unsafe impl<K: 'static + Send, V: 'static + Send, R: Reclaim + Send, S: Stat> Send
    for OrderedList<K, V, R, S>
{
}

unsafe impl<K: 'static + Send + Sync, V: 'static + Send + Sync, R: Reclaim + Sync, S: Stat> Sync
    for OrderedList<K, V, R, S>
{
}
