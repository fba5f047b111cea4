use hpsmr::{
    scan, statistics, unregister_thread, AtomicMarkedPtr, EventCounter, Guard, Hp, MarkedPtr,
    OrderedList, Reclaim, Retired,
};
use std::sync::atomic::AtomicIsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed};
use std::sync::Arc;
use std::thread::{self, yield_now};

struct R(&'static AtomicIsize);
impl Drop for R {
    fn drop(&mut self) {
        self.0.fetch_add(1, Relaxed);
    }
}

#[test]
fn protect_and_retire() {
    static DROP_CNT: AtomicIsize = AtomicIsize::new(0);

    let link = AtomicMarkedPtr::new(MarkedPtr::new(Box::into_raw(Box::new(R(&DROP_CNT))), false));

    let mut guard = Guard::new();

    // `p` stays valid while `guard` publishes it.
    let p = guard.protect(&link);

    let unlinked = link.load(Acquire);
    link.store(MarkedPtr::null(), Relaxed);
    unsafe { Hp::retire(Retired::from_box(Box::from_raw(unlinked.as_ptr()))) };
    scan();
    assert_eq!(DROP_CNT.load(Relaxed), 0);

    // It is possible to read the retired instance.
    assert!(unsafe { p.as_ref() }.is_some());

    // Dropping the guard lets the next scan dispose of it.
    drop(guard);

    while DROP_CNT.load(Relaxed) != 1 {
        scan();
        yield_now();
    }
}

#[test]
fn ordered_list() {
    let list: Arc<OrderedList<u64, String>> = Arc::default();

    thread::scope(|s| {
        for t in 0..4_u64 {
            let list = list.clone();
            s.spawn(move || {
                for k in 0..64 {
                    let _: Result<_, _> = list.insert(k * 4 + t, format!("{t}:{k}"));
                }
                for k in (0..64).step_by(2) {
                    assert!(list.remove(&(k * 4 + t)));
                }
                // The thread hands over whatever it could not reclaim.
                assert!(unregister_thread());
            });
        }
    });

    assert_eq!(list.len(), 128);

    // A `GuardedRef` keeps the entry readable even if it is removed meanwhile.
    let entry = list.get(&5).unwrap();
    assert!(list.remove(&5));
    assert_eq!(entry.value(), "1:1");
    drop(entry);

    let keys: Vec<u64> = list.iter().map(|e| *e.key()).take(3).collect();
    assert_eq!(keys, vec![4, 6, 7]);

    scan();
    assert!(statistics().reclaimed >= 1);
}

#[test]
fn event_counter() {
    let list: OrderedList<u8, u8, Hp, EventCounter> = OrderedList::new();
    assert!(list.insert(1, 1).is_ok());
    assert!(list.insert(1, 1).is_err());
    assert!(list.remove(&1));
    assert!(!list.remove(&1));

    let stat = list.stat();
    assert_eq!(stat.insert_success(), 1);
    assert_eq!(stat.insert_failed(), 1);
    assert_eq!(stat.remove_success(), 1);
    assert_eq!(stat.remove_failed(), 1);
}
