use active_messenger::active_messaging::prelude::*;

use parking_lot::Mutex;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const MAX_PES: usize = 8;

static HITS: [AtomicUsize; MAX_PES] = [
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
    AtomicUsize::new(0),
];
static FROM: [AtomicUsize; MAX_PES] = [
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
    AtomicUsize::new(usize::MAX),
];
static FUNCTOR_SUM: AtomicUsize = AtomicUsize::new(0);

#[AmData(Debug, Clone)]
struct Hello {
    origin: usize,
    greeting: String,
}

#[active_fn]
fn hello(am: &ActiveMessenger, msg: Hello) {
    assert_eq!(msg.greeting, "hi");
    assert_eq!(am.current_from_node(), Some(msg.origin));
    HITS[am.my_pe()].fetch_add(1, Ordering::SeqCst);
    FROM[am.my_pe()].store(msg.origin, Ordering::SeqCst);
}

#[AmRaw(Debug)]
struct Query {
    x: u64,
}

#[active_fn]
fn square(am: &ActiveMessenger, msg: Query) {
    am.send_callback(msg.x * msg.x);
}

#[derive(Default)]
struct Accumulate;

#[am_functor]
impl ActiveFunctor<u64> for Accumulate {
    fn call(&self, _am: &ActiveMessenger, val: u64) {
        FUNCTOR_SUM.fetch_add(val as usize, Ordering::SeqCst);
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn world(num_pes: usize) -> Vec<ActiveMessenger> {
    init_tracing();
    let fabric = InProcFabric::new(num_pes);
    (0..num_pes)
        .map(|pe| {
            MessengerBuilder::new()
                .with_inproc_fabric(fabric.clone(), pe)
                .build()
        })
        .collect()
}

fn drive(pes: &[ActiveMessenger], done: impl Fn() -> bool) {
    let start = Instant::now();
    while !done() {
        for am in pes {
            am.progress();
        }
        assert!(
            start.elapsed() < Duration::from_secs(30),
            "messages were not delivered in time"
        );
    }
}

fn quiesce(pes: &[ActiveMessenger]) {
    while pes.iter().map(|am| am.progress()).sum::<usize>() > 0 {}
}

fn reset() {
    for (hits, from) in HITS.iter().zip(FROM.iter()) {
        hits.store(0, Ordering::SeqCst);
        from.store(usize::MAX, Ordering::SeqCst);
    }
}

macro_rules! broadcast_test {
    ($num_pes:expr, $root:expr) => {
        paste::paste! {
            #[test]
            #[serial]
            fn [<broadcast_ $num_pes _pes_from_ $root>]() {
                reset();
                let pes = world($num_pes);
                pes[$root].broadcast_msg::<Hello, hello>(Hello {
                    origin: $root,
                    greeting: "hi".to_owned(),
                });
                drive(&pes, || {
                    (0..$num_pes)
                        .filter(|pe| *pe != $root)
                        .all(|pe| HITS[pe].load(Ordering::SeqCst) > 0)
                });
                quiesce(&pes);
                for pe in 0..$num_pes {
                    let expected = if pe == $root { 0 } else { 1 };
                    assert_eq!(HITS[pe].load(Ordering::SeqCst), expected, "pe {}", pe);
                    if pe != $root {
                        assert_eq!(FROM[pe].load(Ordering::SeqCst), $root);
                    }
                }
            }
        }
    };
}

broadcast_test!(1, 0);
broadcast_test!(2, 0);
broadcast_test!(3, 2);
broadcast_test!(5, 1);
broadcast_test!(8, 0);
broadcast_test!(8, 5);

#[test]
#[serial]
fn point_to_point_reaches_only_the_destination() {
    reset();
    let pes = world(4);
    pes[3].send_msg::<Hello, hello>(
        1,
        Hello {
            origin: 3,
            greeting: "hi".to_owned(),
        },
    );
    drive(&pes, || HITS[1].load(Ordering::SeqCst) == 1);
    quiesce(&pes);
    let hits = HITS.iter().map(|h| h.load(Ordering::SeqCst)).collect::<Vec<_>>();
    assert_eq!(&hits[..4], &[0, 1, 0, 0]);
}

#[test]
fn delivery_is_fifo_per_pair() {
    let pes = world(2);
    let order = Arc::new(Mutex::new(Vec::new()));
    // collective registrations made in the same order agree on their ids
    let ids = pes
        .iter()
        .map(|am| {
            let order = order.clone();
            am.register_active_handler(
                handler_fn(move |_: &ActiveMessenger, val: u32| order.lock().push(val)),
                NO_TAG,
            )
        })
        .collect::<Vec<_>>();
    assert_eq!(ids[0], ids[1]);
    assert!(ids[0].is_collective());

    for i in 0..100u32 {
        pes[0].send_msg_han(1, ids[0], i, NO_TAG, None);
    }
    drive(&pes, || order.lock().len() == 100);
    assert_eq!(*order.lock(), (0..100).collect::<Vec<_>>());
}

#[test]
fn replies_come_back_through_the_callback_handler() {
    let pes = world(3);
    let reply = Arc::new(Mutex::new(None));
    let cloned = reply.clone();
    pes[0].send_data_callback::<Query, square, u64>(2, Query { x: 12 }, move |am, val| {
        *cloned.lock() = Some((am.my_pe(), val));
    });
    drive(&pes, || reply.lock().is_some());
    assert_eq!(*reply.lock(), Some((0, 144)));
}

#[test]
fn large_messages_cross_the_data_channel() {
    init_tracing();
    let fabric = InProcFabric::new(2);
    let pes = (0..2)
        .map(|pe| {
            MessengerBuilder::new()
                .with_inproc_fabric(fabric.clone(), pe)
                .with_eager_size(128)
                .build()
        })
        .collect::<Vec<_>>();
    let sum = Arc::new(Mutex::new(None));
    let mut ids = Vec::new();
    for am in &pes {
        let sum = sum.clone();
        ids.push(am.register_active_handler(
            handler_fn(move |_: &ActiveMessenger, vals: Vec<u64>| {
                *sum.lock() = Some((vals.len(), vals.iter().sum::<u64>()))
            }),
            NO_TAG,
        ));
    }
    pes[0].send_msg_han(1, ids[0], (0..10_000u64).collect::<Vec<_>>(), NO_TAG, None);
    assert_eq!(pes[0].num_sends(), 2);
    drive(&pes, || sum.lock().is_some());
    assert_eq!(*sum.lock(), Some((10_000, (0..10_000u64).sum())));
    assert!(pes.iter().all(|am| am.is_local_term()));
}

#[test]
fn early_messages_wait_for_collective_registration() {
    let pes = world(2);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let han = pes[0].register_active_handler(handler_fn(|_: &ActiveMessenger, _: u16| {}), NO_TAG);

    pes[0].send_msg_han(1, han, 77u16, NO_TAG, None);
    drive(&pes, || !pes[1].is_local_term());
    assert!(seen.lock().is_empty());

    let cloned = seen.clone();
    let late = pes[1].register_active_handler(
        handler_fn(move |am: &ActiveMessenger, val: u16| {
            cloned.lock().push((am.my_pe(), am.current_from_node(), val))
        }),
        NO_TAG,
    );
    assert_eq!(late, han);
    assert_eq!(*seen.lock(), vec![(1, Some(0), 77)]);
    assert!(pes[1].is_local_term());
}

#[test]
#[serial]
fn functors_are_resolved_on_every_pe() {
    FUNCTOR_SUM.store(0, Ordering::SeqCst);
    let pes = world(3);
    pes[0].send_msg_functor::<Accumulate, u64>(1, 5);
    pes[0].send_msg_functor::<Accumulate, u64>(2, 6);
    pes[1].broadcast_msg_functor::<Accumulate, u64>(100);
    drive(&pes, || FUNCTOR_SUM.load(Ordering::SeqCst) == 211);
    quiesce(&pes);
    assert_eq!(FUNCTOR_SUM.load(Ordering::SeqCst), 211);
}

#[test]
#[should_panic(expected = "transport failure")]
fn sending_outside_the_fabric_is_fatal() {
    let pes = world(2);
    pes[0].send_msg::<Query, square>(2, Query { x: 1 });
}

#[test]
#[should_panic(expected = "can never be registered here")]
fn handlers_owned_by_another_pe_are_not_buffered() {
    let pes = world(2);
    let han = pes[0].register_handler(|_: &ActiveMessenger, _: u32| {});
    assert_eq!(han.node(), 0);
    pes[0].send_msg_han(1, han, 5u32, NO_TAG, None);
    drive(&pes, || false);
}
