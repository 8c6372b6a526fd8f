use active_messenger::active_messaging::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

static RECEIVED: AtomicUsize = AtomicUsize::new(0);

#[AmRaw(Debug)]
struct Wrapper<T> {
    inner: T,
    count: u64,
}

#[AmData(Debug, Clone)]
struct Labeled<T> {
    label: String,
    item: T,
}

#[AmData(Debug, Clone, PartialEq)]
enum Command {
    Start { at: u64 },
    Stop,
}

#[active_fn]
fn on_wrapper(msg: Wrapper<u64>) {
    assert_eq!(msg.inner * msg.count, 12);
    RECEIVED.fetch_add(1, Ordering::SeqCst);
}

#[active_fn]
fn on_labeled(msg: Labeled<Vec<u8>>) {
    assert_eq!(msg.label, "bytes");
    assert_eq!(msg.item, vec![1, 2, 3]);
    RECEIVED.fetch_add(1, Ordering::SeqCst);
}

#[active_fn]
pub fn on_command(_am: &ActiveMessenger, msg: Command) {
    assert!(msg == Command::Start { at: 3 } || msg == Command::Stop);
    RECEIVED.fetch_add(1, Ordering::SeqCst);
}

fn main() {
    assert_eq!(strategy_of::<Wrapper<u64>>(), StrategyKind::RawBytes);
    assert_eq!(strategy_of::<Labeled<Vec<u8>>>(), StrategyKind::Reflective);
    assert_eq!(strategy_of::<Command>(), StrategyKind::Reflective);

    let am = MessengerBuilder::new().with_lamellae(Backend::Local).build();
    am.send_msg::<Wrapper<u64>, on_wrapper>(0, Wrapper { inner: 4, count: 3 });
    am.send_msg::<Labeled<Vec<u8>>, on_labeled>(
        0,
        Labeled {
            label: "bytes".to_owned(),
            item: vec![1, 2, 3],
        },
    );
    am.send_msg::<Command, on_command>(0, Command::Start { at: 3 });
    am.send_msg::<Command, on_command>(0, Command::Stop);
    am.progress();
    assert_eq!(RECEIVED.load(Ordering::SeqCst), 4);

    // handlers stay ordinary functions
    on_wrapper(Wrapper { inner: 6, count: 2 });
    assert_eq!(RECEIVED.load(Ordering::SeqCst), 5);
}
