use ecds_list::{List, ListItem, Queue};
use ecds_object::{Header, MemoryManager, Object, Ref, TypeUid};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const CHIP_TYPE: TypeUid = TypeUid::new(0x0000_0300);

struct Chip {
    header: Header,
    disposed: Arc<AtomicUsize>,
}

impl Object for Chip {
    fn header(&self) -> &Header {
        &self.header
    }

    fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

fn chip(mgr: &MemoryManager, name: &str, disposed: &Arc<AtomicUsize>) -> Ref<Chip> {
    let disposed = Arc::clone(disposed);
    mgr.create(Some(name), CHIP_TYPE, |header| Chip { header, disposed })
        .expect("create chip")
}

#[test]
fn concurrent_add_and_drop_keep_indices_consistent() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 250;

    let _ = env_logger::builder().is_test(true).try_init();
    let mgr = MemoryManager::new("list-threads");
    let disposed = Arc::new(AtomicUsize::new(0));
    let list: Ref<List<Chip>> = List::new(&mgr, Some("shared")).expect("list");

    let workers: Vec<_> = (0..THREADS)
        .map(|worker| {
            let list = list.clone();
            let mgr = mgr.clone();
            let disposed = Arc::clone(&disposed);
            thread::spawn(move || {
                let mut kept = Vec::new();
                for n in 0..PER_THREAD {
                    let object = chip(&mgr, &format!("chip-{worker}-{n}"), &disposed);
                    let item = list.add_item(&object);
                    if n % 2 == 0 {
                        item.drop_item();
                    } else {
                        kept.push(item);
                    }
                }
                kept
            })
        })
        .collect();
    let kept: Vec<ListItem<Chip>> = workers
        .into_iter()
        .flat_map(|worker| worker.join().expect("worker thread"))
        .collect();

    assert_eq!(list.len(), THREADS * PER_THREAD / 2);
    assert_eq!(disposed.load(Ordering::SeqCst), THREADS * PER_THREAD / 2);
    for (position, item) in list.items().iter().enumerate() {
        assert_eq!(item.index(), Some(position));
    }
    assert!(kept.iter().all(|item| list.contains(item)));

    drop(kept);
    list.clear();
    assert!(list.is_empty());
    assert_eq!(disposed.load(Ordering::SeqCst), THREADS * PER_THREAD);
}

#[test]
fn items_move_between_lists_without_loss() {
    const ITEMS: usize = 200;
    const ROUNDS: usize = 20;

    let _ = env_logger::builder().is_test(true).try_init();
    let mgr = MemoryManager::new("list-threads");
    let disposed = Arc::new(AtomicUsize::new(0));
    let left: Ref<List<Chip>> = List::new(&mgr, Some("left")).expect("list");
    let right: Ref<List<Chip>> = List::new(&mgr, Some("right")).expect("list");
    let items: Vec<ListItem<Chip>> = (0..ITEMS)
        .map(|n| left.add_item(&chip(&mgr, &format!("chip-{n}"), &disposed)))
        .collect();

    let movers: Vec<_> = [right.clone(), left.clone()]
        .into_iter()
        .map(|to| {
            let items = items.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    for item in &items {
                        item.drop_item();
                        let _ = to.take_item(item);
                    }
                }
            })
        })
        .collect();
    for mover in movers {
        mover.join().expect("mover thread");
    }

    assert_eq!(left.len() + right.len(), ITEMS);
    assert!(items
        .iter()
        .all(|item| left.contains(item) != right.contains(item)));
    assert_eq!(disposed.load(Ordering::SeqCst), 0);
}

#[test]
fn queue_hands_each_payload_to_one_consumer() {
    const PRODUCED: usize = 2_000;
    const CONSUMERS: usize = 3;

    let _ = env_logger::builder().is_test(true).try_init();
    let mgr = MemoryManager::new("list-threads");
    let disposed = Arc::new(AtomicUsize::new(0));
    let queue: Ref<Queue<Chip>> = Queue::new(&mgr, Some("work")).expect("queue");
    for n in 0..PRODUCED {
        queue.enqueue(&chip(&mgr, &format!("job-{n}"), &disposed));
    }

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = queue.clone();
            thread::spawn(move || {
                let mut names = Vec::new();
                while let Some(job) = queue.dequeue() {
                    names.push(job.name());
                }
                names
            })
        })
        .collect();
    let mut names: Vec<String> = consumers
        .into_iter()
        .flat_map(|consumer| consumer.join().expect("consumer thread"))
        .collect();
    names.sort();
    names.dedup();

    assert_eq!(names.len(), PRODUCED);
    assert!(queue.is_empty());
    assert_eq!(disposed.load(Ordering::SeqCst), PRODUCED);
}
