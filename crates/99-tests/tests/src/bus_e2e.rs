use crossbeam_channel::{unbounded, Sender};
use ecds_bus::{Dispatcher, DispatcherConfig, DispatcherPhase, Message, Service, ShutdownPolicy};
use ecds_object::{MemoryManager, Object, Ref};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Payload layout: poster index, then a little-endian sequence number.
fn encode(poster: u8, seq: u32) -> Vec<u8> {
    let mut bytes = vec![poster];
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes
}

fn decode(bytes: &[u8]) -> (u8, u32) {
    let mut seq = [0u8; 4];
    seq.copy_from_slice(&bytes[1..5]);
    (bytes[0], u32::from_le_bytes(seq))
}

fn recorder(mgr: &MemoryManager, name: &str, event_id: u32, tx: &Sender<(String, Vec<u8>)>) -> Ref<Service> {
    let service = Service::new(mgr, Some(name)).expect("create service");
    let tx = tx.clone();
    let label = name.to_owned();
    service.add_handler(event_id, move |_, _, data| {
        let _ = tx.send((label.clone(), data.into_vec()));
    });
    service
}

#[test]
fn concurrent_posters_deliver_exactly_once() {
    const POSTERS: u8 = 2;
    const PER_POSTER: u32 = 1_000;
    const EVENT: u32 = 42;

    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let bus = Dispatcher::construct(&mgr, Some("bus-e2e"), DispatcherConfig::default())
        .expect("dispatcher");
    let (tx, rx) = unbounded();
    for name in ["left", "right"] {
        let service = recorder(&mgr, name, EVENT, &tx);
        bus.subscribe(EVENT, &service).expect("subscribe");
    }

    let posters: Vec<_> = (0..POSTERS)
        .map(|poster| {
            let handle = bus.handle();
            let mgr = mgr.clone();
            thread::spawn(move || {
                for seq in 0..PER_POSTER {
                    let message =
                        Message::new(&mgr, EVENT, None, &encode(poster, seq)).expect("message");
                    handle.post(message).expect("post");
                }
            })
        })
        .collect();
    for poster in posters {
        poster.join().expect("poster thread");
    }
    assert!(bus.wait_idle(WAIT));

    let mut seen: HashMap<(String, u8), Vec<u32>> = HashMap::new();
    for (service, bytes) in rx.try_iter() {
        let (poster, seq) = decode(&bytes);
        seen.entry((service, poster)).or_default().push(seq);
    }
    assert_eq!(seen.len(), 2 * POSTERS as usize);
    let expected: Vec<u32> = (0..PER_POSTER).collect();
    for ((service, poster), seqs) in &seen {
        assert_eq!(seqs, &expected, "{service} saw poster {poster} out of order");
    }

    let metrics = bus.metrics();
    assert_eq!(metrics.posted, u64::from(POSTERS) * u64::from(PER_POSTER));
    assert_eq!(metrics.delivered, 2 * metrics.posted);
    assert_eq!(bus.queued(), 0);
}

#[test]
fn subscribers_run_in_subscription_order_per_message() {
    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let bus = Dispatcher::construct(&mgr, None, DispatcherConfig::default()).expect("dispatcher");
    let (tx, rx) = unbounded();
    let s1 = recorder(&mgr, "s1", 7, &tx);
    let s2 = recorder(&mgr, "s2", 7, &tx);
    bus.subscribe(7, &s1).expect("subscribe");
    bus.subscribe(7, &s2).expect("subscribe");

    for seq in 0..20u32 {
        bus.post(Message::new(&mgr, 7, None, &encode(0, seq)).expect("message"))
            .expect("post");
    }
    assert!(bus.wait_idle(WAIT));

    let order: Vec<(String, u32)> = rx
        .try_iter()
        .map(|(name, bytes)| (name, decode(&bytes).1))
        .collect();
    let expected: Vec<(String, u32)> = (0..20u32)
        .flat_map(|seq| [("s1".to_owned(), seq), ("s2".to_owned(), seq)])
        .collect();
    assert_eq!(order, expected);
}

#[test]
fn unrouted_event_creates_empty_entry() {
    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let bus = Dispatcher::construct(&mgr, None, DispatcherConfig::default()).expect("dispatcher");

    bus.post(Message::new(&mgr, 99, None, b"nobody").expect("message"))
        .expect("post");
    assert!(bus.wait_idle(WAIT));
    assert!(bus.has_subscription(99));
    assert!(bus.subscribers(99).is_empty());
    assert_eq!(bus.metrics().unrouted, 1);
    assert_eq!(bus.metrics().delivered, 0);
}

#[test]
fn idle_shutdown_joins_promptly() {
    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let bus = Dispatcher::construct(&mgr, None, DispatcherConfig::default()).expect("dispatcher");
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    bus.handle().shutdown();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bus.phase(), DispatcherPhase::Stopped);
}

#[test]
fn drain_policy_delivers_backlog_across_threads() {
    const EVENT: u32 = 3;
    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let config = DispatcherConfig::default().shutdown_policy(ShutdownPolicy::Drain);
    let bus = Dispatcher::construct(&mgr, None, config).expect("dispatcher");
    let gate = Arc::new(Mutex::new(()));
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let service = Service::new(&mgr, Some("slow")).expect("service");
    {
        let gate = Arc::clone(&gate);
        let delivered = Arc::clone(&delivered);
        service.add_handler(EVENT, move |_, _, data| {
            let _open = gate.lock();
            delivered.lock().push(decode(data.as_bytes()).1);
        });
    }
    bus.subscribe(EVENT, &service).expect("subscribe");

    let closed = gate.lock();
    for seq in 0..100u32 {
        bus.post(Message::new(&mgr, EVENT, None, &encode(0, seq)).expect("message"))
            .expect("post");
    }
    let stopper = {
        let handle = bus.handle();
        thread::spawn(move || handle.shutdown())
    };
    while bus.phase() == DispatcherPhase::Running {
        thread::yield_now();
    }
    drop(closed);
    stopper.join().expect("stopper thread");

    assert_eq!(bus.phase(), DispatcherPhase::Stopped);
    assert_eq!(*delivered.lock(), (0..100u32).collect::<Vec<_>>());
    assert_eq!(bus.metrics().dropped_on_shutdown, 0);
}

#[test]
fn handlers_chain_through_the_bus() {
    const PING: u32 = 1;
    const PONG: u32 = 2;
    const ROUNDS: u8 = 10;

    init_logger();
    let mgr = MemoryManager::new("bus-e2e");
    let bus = Dispatcher::construct(&mgr, None, DispatcherConfig::default()).expect("dispatcher");
    let (tx, rx) = unbounded();

    let ping = Service::new(&mgr, Some("ping")).expect("service");
    let pong = Service::new(&mgr, Some("pong")).expect("service");
    for (service, listens, replies) in [(&ping, PONG, PING), (&pong, PING, PONG)] {
        let tx = tx.clone();
        service.add_handler(listens, move |dispatcher, message, data| {
            let hops = data.as_bytes()[0];
            let _ = tx.send((message.event_id(), hops));
            if hops < ROUNDS {
                let mgr = message.header().manager().expect("bound message");
                let reply = Message::new(&mgr, replies, None, &[hops + 1]).expect("reply");
                dispatcher.post(reply).expect("repost");
            }
        });
    }
    bus.subscribe(PING, &pong).expect("subscribe");
    bus.subscribe(PONG, &ping).expect("subscribe");

    bus.post(Message::new(&mgr, PING, None, &[0]).expect("message"))
        .expect("post");
    assert!(bus.wait_idle(WAIT));

    let hops: Vec<(u32, u8)> = rx.try_iter().collect();
    assert_eq!(hops.len(), usize::from(ROUNDS) + 1);
    for (index, (event, hop)) in hops.iter().enumerate() {
        assert_eq!(usize::from(*hop), index);
        assert_eq!(*event, if index % 2 == 0 { PING } else { PONG });
    }
}
