use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::{Arc, Mutex};

use loom::model::Builder;
use loom::sync::atomic::{AtomicBool, AtomicUsize};
use loom::thread::spawn;

use crate::collector::{Collector, CollectorRoot};
use crate::{scan, AtomicMarkedPtr, Config, Guard, Hp, MarkedPtr, OrderedList, Reclaim, Retired};

struct A(Arc<AtomicBool>);
impl Drop for A {
    fn drop(&mut self) {
        self.0.store(true, Relaxed);
    }
}

static SERIALIZER: Mutex<()> = Mutex::new(());

fn attach_new_root() -> &'static CollectorRoot {
    let root: &'static CollectorRoot = Box::leak(Box::new(CollectorRoot::new(Config::default())));
    unsafe { Collector::set_root(root) };
    root
}

#[test]
fn hp_protect_retire() {
    let _guard = SERIALIZER.lock().unwrap();
    loom::model(|| {
        let root = attach_new_root();
        let dropped = Arc::new(AtomicBool::new(false));
        let link = Arc::new(AtomicMarkedPtr::new(MarkedPtr::new(
            Box::into_raw(Box::new(A(dropped.clone()))),
            false,
        )));

        let reader = {
            let link = link.clone();
            spawn(move || {
                unsafe { Collector::set_root(root) };
                let mut guard = Guard::new();
                let ptr = guard.protect(&link);
                if let Some(a) = unsafe { ptr.as_ref() } {
                    assert!(!a.0.load(Relaxed));
                }
                drop(guard);
            })
        };

        let unlinked = link.load(Acquire);
        link.store(MarkedPtr::null(), Release);
        unsafe { Hp::retire(Retired::from_box(Box::from_raw(unlinked.as_ptr()))) };
        scan();

        assert!(reader.join().is_ok());
        scan();
        assert!(dropped.load(Relaxed));
        assert_eq!(root.statistics().pending, 0);
    });
}

#[test]
fn hp_scan_adopts() {
    let _guard = SERIALIZER.lock().unwrap();
    loom::model(|| {
        let root = attach_new_root();
        let dropped = Arc::new(AtomicBool::new(false));
        let link = Arc::new(AtomicMarkedPtr::new(MarkedPtr::new(
            Box::into_raw(Box::new(A(dropped.clone()))),
            false,
        )));
        let mut guard = Guard::new();
        assert!(!guard.protect(&link).is_null());

        let retirer = {
            let link = link.clone();
            spawn(move || {
                unsafe { Collector::set_root(root) };
                let unlinked = link.load(Acquire);
                link.store(MarkedPtr::null(), Relaxed);
                unsafe { Hp::retire(Retired::from_box(Box::from_raw(unlinked.as_ptr()))) };
                assert!(Hp::unregister_thread());
            })
        };
        assert!(!dropped.load(Relaxed));
        assert!(retirer.join().is_ok());
        assert!(!dropped.load(Relaxed));

        drop(guard);
        scan();
        assert!(dropped.load(Relaxed));
        assert_eq!(root.statistics().adopted, 1);
    });
}

#[test]
fn list_insert_remove() {
    let _guard = SERIALIZER.lock().unwrap();
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(|| {
        let root = attach_new_root();
        let removed = Arc::new(AtomicUsize::new(0));
        let list: Arc<OrderedList<usize, usize>> = Arc::default();
        assert!(list.insert(1, 1).is_ok());
        assert!(list.insert(3, 3).is_ok());

        let remover = {
            let list = list.clone();
            let removed = removed.clone();
            spawn(move || {
                unsafe { Collector::set_root(root) };
                if list.remove(&1) {
                    removed.fetch_add(1, Relaxed);
                }
            })
        };
        assert!(list.insert(2, 2).is_ok());
        if list.remove(&1) {
            removed.fetch_add(1, Relaxed);
        }
        assert!(remover.join().is_ok());

        assert_eq!(removed.load(Relaxed), 1);
        let keys: Vec<usize> = list.iter().map(|e| *e.key()).collect();
        assert_eq!(keys, vec![2, 3]);
        assert_eq!(list.len(), 2);
    });
}
