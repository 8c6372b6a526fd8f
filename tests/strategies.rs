use active_messenger::active_messaging::prelude::*;

use parking_lot::Mutex;
use std::sync::Arc;

#[AmRaw(Debug, PartialEq)]
struct Pair {
    a: i32,
    // keeps `b` aligned without implicit padding
    flags: u32,
    b: f64,
}

#[AmData(Debug, Clone, PartialEq)]
struct Note {
    author: usize,
    text: String,
}

#[AmRaw(Debug, PartialEq)]
struct Shape {
    rows: u32,
    cols: u32,
}

#[AmParserdes(Debug, PartialEq)]
struct Matrix {
    shape: Shape,
    values: Vec<f64>,
}

impl Parserdes for Matrix {
    type Header = Shape;
    type Body = Vec<f64>;
    fn split(self) -> (Shape, Vec<f64>) {
        (self.shape, self.values)
    }
    fn join(shape: Shape, values: Vec<f64>) -> Matrix {
        Matrix { shape, values }
    }
}

static NOTES: std::sync::Mutex<Vec<Note>> = std::sync::Mutex::new(Vec::new());
static MATRICES: std::sync::Mutex<Vec<Matrix>> = std::sync::Mutex::new(Vec::new());

#[active_fn]
fn take_pair(_msg: Pair) {}

#[active_fn]
fn take_note(msg: Note) {
    NOTES.lock().unwrap().push(msg);
}

#[active_fn]
fn take_matrix(_am: &ActiveMessenger, msg: Matrix) {
    MATRICES.lock().unwrap().push(msg);
}

fn local() -> ActiveMessenger {
    MessengerBuilder::new().with_lamellae(Backend::Local).build()
}

#[test]
fn strategy_is_picked_by_type() {
    assert_eq!(strategy_of::<Pair>(), StrategyKind::RawBytes);
    assert_eq!(strategy_of::<Note>(), StrategyKind::Reflective);
    assert_eq!(strategy_of::<Matrix>(), StrategyKind::Parserdes);
    assert_eq!(std::mem::size_of::<Pair>(), 16);
}

#[test]
fn raw_bytes_match_memory_layout() {
    let am = local();
    let seen = Arc::new(Mutex::new(None));
    let cloned = seen.clone();
    let han = am.register_new_handler(
        Arc::new(move |_: &ActiveMessenger, msg: ActiveMsg| {
            assert!(!msg.is_local());
            *cloned.lock() = msg.bytes().map(|b| b.to_vec());
            assert_eq!(msg.take::<Pair>(), Pair { a: 42, flags: 7, b: 3.5 });
        }),
        NO_TAG,
    );

    am.send_msg_han(am.my_pe(), han, Pair { a: 42, flags: 7, b: 3.5 }, NO_TAG, None);
    assert_eq!(am.progress(), 1);

    let bytes = seen.lock().take().expect("handler did not run");
    assert_eq!(bytes.len(), std::mem::size_of::<Pair>());
    assert_eq!(&bytes[0..4], &42i32.to_ne_bytes());
    assert_eq!(&bytes[4..8], &7u32.to_ne_bytes());
    assert_eq!(&bytes[8..16], &3.5f64.to_ne_bytes());
}

#[test]
fn same_strategy_for_every_send_style() {
    let am = local();
    let stats = am.stats();

    am.send_msg::<Pair, take_pair>(0, Pair { a: 1, flags: 0, b: 1.0 });
    let han = am.register_handler(|_: &ActiveMessenger, _: Pair| {});
    am.send_msg_han(0, han, Pair { a: 2, flags: 0, b: 2.0 }, NO_TAG, None);
    am.broadcast_msg::<Pair, take_pair>(Pair { a: 3, flags: 0, b: 3.0 });
    assert_eq!(stats.count(StrategyKind::RawBytes), 3);
    assert_eq!(stats.count(StrategyKind::Reflective), 0);

    let note = Note {
        author: 0,
        text: "reflective".to_owned(),
    };
    am.send_msg::<Note, take_note>(0, note.clone());
    let han = am.register_handler(|_: &ActiveMessenger, _: Note| {});
    am.send_msg_han(0, han, note, NO_TAG, None);
    assert_eq!(stats.count(StrategyKind::Reflective), 2);
    assert_eq!(stats.count(StrategyKind::RawBytes), 3);
    assert_eq!(stats.count(StrategyKind::Parserdes), 0);

    am.progress();
}

#[test]
fn reflective_and_parserdes_messages_arrive_intact() {
    let am = local();
    let note = Note {
        author: 7,
        text: "a note".to_owned(),
    };
    am.send_msg::<Note, take_note>(0, note.clone());
    let matrix = Matrix {
        shape: Shape { rows: 2, cols: 2 },
        values: vec![1.0, 2.0, 3.0, 4.0],
    };
    am.send_msg::<Matrix, take_matrix>(0, matrix);
    assert_eq!(am.progress(), 2);

    assert!(NOTES.lock().unwrap().contains(&note));
    let matrices = MATRICES.lock().unwrap();
    assert!(matrices.iter().any(|m| m.shape == Shape { rows: 2, cols: 2 }
        && m.values == vec![1.0, 2.0, 3.0, 4.0]));
    assert_eq!(am.stats().count(StrategyKind::Parserdes), 1);
}

#[test]
fn large_reflective_messages_use_the_data_channel() {
    let am = MessengerBuilder::new()
        .with_lamellae(Backend::Local)
        .with_eager_size(64)
        .build();
    let total = Arc::new(Mutex::new(0u64));
    let cloned = total.clone();
    let han = am.register_handler(move |_: &ActiveMessenger, vals: Vec<u64>| {
        *cloned.lock() = vals.iter().sum()
    });

    am.send_msg_han(0, han, (0..1000u64).collect::<Vec<_>>(), NO_TAG, None);
    // one put for the payload and one envelope
    assert_eq!(am.num_sends(), 2);
    assert_eq!(am.progress(), 1);
    assert_eq!(*total.lock(), (0..1000u64).sum::<u64>());

    am.send_msg_han(0, han, vec![1u64, 2, 3], NO_TAG, None);
    assert_eq!(am.num_sends(), 3);
    am.progress();
    assert_eq!(*total.lock(), 6);
}

#[test]
#[should_panic(expected = "tagged + serialized send not supported")]
fn tagged_reflective_send_is_fatal() {
    let am = local();
    am.send_msg_tagged::<Note, take_note>(
        0,
        Note {
            author: 0,
            text: String::new(),
        },
        3,
        None,
    );
}

#[test]
#[should_panic(expected = "tagged + serialized send not supported")]
fn tagged_parserdes_send_is_fatal() {
    let am = local();
    let han = am.register_new_handler(handler_fn(|_: &ActiveMessenger, _: Matrix| {}), 3);
    am.send_msg_han(
        0,
        han,
        Matrix {
            shape: Shape { rows: 0, cols: 0 },
            values: vec![],
        },
        3,
        None,
    );
}

#[test]
#[should_panic(expected = "tagged + serialized send not supported")]
fn tagged_reflective_broadcast_is_fatal() {
    let am = local();
    let han = am.register_handler(|_: &ActiveMessenger, _: String| {});
    am.broadcast_msg_han(han, "hello".to_owned(), 1, None);
}
