use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use hpsmr::{scan, AtomicMarkedPtr, Guard, GuardSet, MarkedPtr, OrderedList, SingleThreaded};

fn guard_single(c: &mut Criterion) {
    c.bench_function("HP: guard", |b| {
        b.iter(|| {
            let _guard = Guard::new();
        })
    });
}

fn guard_protect(c: &mut Criterion) {
    let link = AtomicMarkedPtr::new(MarkedPtr::new(Box::into_raw(Box::new(17_usize)), false));
    let mut guard = Guard::new();
    c.bench_function("HP: protect", |b| {
        b.iter(|| {
            guard.protect(&link);
        })
    });
    guard.release();
    drop(unsafe { Box::from_raw(link.load(std::sync::atomic::Ordering::Relaxed).as_ptr()) });
}

fn guard_set(c: &mut Criterion) {
    c.bench_function("HP: guard set", |b| {
        b.iter(|| {
            let _guards: GuardSet = GuardSet::new();
        })
    });
}

fn list_insert_remove(c: &mut Criterion) {
    let list: OrderedList<usize, usize> = (0..64).fold(OrderedList::new(), |list, k| {
        let _: Result<_, _> = list.insert(k * 2, k);
        list
    });
    c.bench_function("HP: list insert remove", |b| {
        b.iter(|| {
            let _: Result<_, _> = list.insert(63, 63);
            list.remove(&63);
        })
    });
    scan();
}

fn list_get(c: &mut Criterion) {
    let list: OrderedList<usize, usize> = OrderedList::new();
    for k in 0..64 {
        let _: Result<_, _> = list.insert(k, k);
    }
    c.bench_function("HP: list get", |b| {
        b.iter(|| {
            assert!(list.get(&48).is_some());
        })
    });
}

fn single_threaded_list(c: &mut Criterion) {
    c.bench_function("HP: single threaded list", |b| {
        b.iter_batched(
            OrderedList::<usize, usize, SingleThreaded>::new,
            |list| {
                for k in (0..64).rev() {
                    let _: Result<_, _> = list.insert(k, k);
                }
                list
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    hp,
    guard_single,
    guard_protect,
    guard_set,
    list_insert_remove,
    list_get,
    single_threaded_list
);
criterion_main!(hp);
