use crossbeam_channel::{unbounded, Sender};
use ecds_bus::{Service, ShutdownPolicy};
use ecds_object::{Header, MemoryManager, Object, ObjectResult, Ref, TypeUid};
use ecds_runtime::{
    register_test_class, Module, Runtime, RuntimeConfig, RuntimeResult, StaticModuleLoader,
    TEST_CLASS_NAME,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(10);
const TICK: u32 = 0x0000_0500;

/// Module that subscribes a counting service to [`TICK`] when registered.
struct TickModule {
    header: Header,
    ticks: Sender<u32>,
}

impl Object for TickModule {
    fn header(&self) -> &Header {
        &self.header
    }
}

impl Module for TickModule {
    fn register(&self, runtime: &Runtime) -> RuntimeResult<()> {
        let service = Service::new(runtime.manager(), Some("tick-counter"))?;
        let ticks = self.ticks.clone();
        service.add_handler(TICK, move |_, _, data| {
            let _ = ticks.send(u32::from(data.as_bytes()[0]));
        });
        runtime.attach(TICK, &service)
    }
}

fn tick_loader(ticks: Sender<u32>) -> Arc<StaticModuleLoader> {
    let loader = Arc::new(StaticModuleLoader::new());
    loader.register("modules/tick", move |manager: &MemoryManager| -> ObjectResult<Ref<dyn Module>> {
        let ticks = ticks.clone();
        let module = manager.create(Some("tick-module"), TypeUid::MODULE, |header| TickModule {
            header,
            ticks,
        })?;
        Ok(module.cast(|m| m as Arc<dyn Module>))
    });
    loader
}

#[test]
fn module_services_receive_posts_from_many_threads() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, rx) = unbounded();
    let runtime = Arc::new(
        Runtime::with_loader(RuntimeConfig::default(), tick_loader(tx)).expect("runtime"),
    );
    runtime.load_module("modules/tick").expect("load module");

    let posters: Vec<_> = (0..4u8)
        .map(|poster| {
            let runtime = Arc::clone(&runtime);
            thread::spawn(move || {
                for _ in 0..50 {
                    runtime.post_event(TICK, None, &[poster]).expect("post");
                }
            })
        })
        .collect();
    for poster in posters {
        poster.join().expect("poster thread");
    }
    assert!(runtime.flush(WAIT));

    let mut per_poster = [0usize; 4];
    for poster in rx.try_iter() {
        per_poster[poster as usize] += 1;
    }
    assert_eq!(per_poster, [50; 4]);
    runtime.shutdown();
}

#[test]
fn drain_shutdown_delivers_everything_posted() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (tx, rx) = unbounded();
    let config = RuntimeConfig::default().shutdown_policy(ShutdownPolicy::Drain);
    let runtime = Runtime::with_loader(config, tick_loader(tx)).expect("runtime");
    runtime.load_module("modules/tick").expect("load module");

    for n in 0..100u8 {
        runtime.post_event(TICK, None, &[n]).expect("post");
    }
    runtime.shutdown();

    let seen: Vec<u32> = rx.try_iter().collect();
    assert_eq!(seen, (0..100u32).collect::<Vec<_>>());
    assert_eq!(runtime.manager().live_objects(), 0);
}

#[test]
fn sender_travels_with_the_message() {
    let _ = env_logger::builder().is_test(true).try_init();
    let runtime = Runtime::new(RuntimeConfig::default()).expect("runtime");
    register_test_class(runtime.classes()).expect("register");
    let origin = runtime
        .construct(TEST_CLASS_NAME, Some("origin"))
        .expect("construct");

    let (tx, rx) = unbounded();
    let service = Service::new(runtime.manager(), Some("sender-check")).expect("service");
    service.add_handler(TICK, move |_, message, _| {
        let _ = tx.send(message.sender().map(|sender| sender.name()));
    });
    runtime.attach(TICK, &service).expect("attach");

    runtime
        .post_event(TICK, Some(&origin), b"")
        .expect("post");
    assert!(runtime.flush(WAIT));
    assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![Some("origin".to_owned())]);
    assert_eq!(origin.refcount(), Some(1));
}
