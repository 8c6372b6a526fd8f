use active_messenger::active_messaging::prelude::*;

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static AUTO_TAGS: std::sync::Mutex<Vec<Tag>> = std::sync::Mutex::new(Vec::new());

#[active_fn]
fn record_tag(am: &ActiveMessenger, msg: u32) {
    let env = am.current_envelope().expect("running inside a handler");
    assert_eq!(env.tag(), am.current_tag());
    AUTO_TAGS.lock().unwrap().push(msg as Tag * 1000 + am.current_tag());
}

fn local() -> ActiveMessenger {
    MessengerBuilder::new().with_lamellae(Backend::Local).build()
}

fn recorder(seen: &Arc<Mutex<Vec<(Tag, bool)>>>) -> ActiveClosureFn {
    let seen = seen.clone();
    Arc::new(move |am: &ActiveMessenger, _msg: ActiveMsg| {
        let env = am.current_envelope().expect("running inside a handler");
        seen.lock().push((env.tag(), env.is_tagged()));
    })
}

#[test]
fn tag_reaches_the_envelope() {
    let am = local();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let han = am.register_new_handler(recorder(&seen), 7);
    am.swap_handler_fn(han, recorder(&seen), NO_TAG);

    am.send_msg_han(am.my_pe(), han, 1u32, 7, None);
    am.send_msg_han(am.my_pe(), han, 1u32, NO_TAG, None);
    assert_eq!(am.progress(), 2);
    assert_eq!(*seen.lock(), vec![(7, true), (NO_TAG, false)]);
    assert_eq!(am.current_tag(), NO_TAG);
    assert!(am.current_envelope().is_none());
}

#[test]
fn tagged_sends_to_typed_handlers() {
    let am = local();
    am.send_msg_tagged::<u32, record_tag>(0, 3, 9, None);
    am.send_msg::<u32, record_tag>(0, 4);
    assert_eq!(am.progress(), 2);
    let tags = AUTO_TAGS.lock().unwrap();
    assert!(tags.contains(&3009));
    assert!(tags.contains(&(4000 + NO_TAG)));
}

#[test]
fn action_runs_after_the_send() {
    let am = local();
    let sent = Arc::new(AtomicBool::new(false));
    let cloned = sent.clone();
    let han = am.register_handler(|_: &ActiveMessenger, _: u64| {});
    am.send_msg_han(
        0,
        han,
        1u64,
        NO_TAG,
        Some(Box::new(move || cloned.store(true, Ordering::SeqCst))),
    );
    assert!(sent.load(Ordering::SeqCst));
    assert_eq!(am.num_sends(), 1);
    am.progress();
}

#[test]
fn epoch_is_stamped_while_set() {
    let am = local();
    let epochs = Arc::new(Mutex::new(Vec::new()));
    let cloned = epochs.clone();
    let han = am.register_new_handler(
        Arc::new(move |am: &ActiveMessenger, _: ActiveMsg| {
            let env = am.current_envelope().expect("running inside a handler");
            cloned.lock().push(env.epoch());
        }),
        NO_TAG,
    );
    am.set_epoch(3);
    am.send_msg_han(0, han, 0u8, NO_TAG, None);
    am.clear_epoch();
    am.send_msg_han(0, han, 0u8, NO_TAG, None);
    am.progress();
    assert_eq!(*epochs.lock(), vec![Some(3), None]);
}

#[test]
fn prepared_envelopes_are_sent_as_is() {
    let am = local();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let han = am.register_new_handler(recorder(&seen), 5);

    let mut env = Envelope::new();
    env.set_dest(am.my_pe());
    env.set_handler(han);
    env.set_tag(5);
    env.set_group(2);
    am.send_msg_env(env, 8u16, None);
    assert_eq!(am.progress(), 1);
    assert_eq!(*seen.lock(), vec![(5, true)]);
}

#[test]
#[should_panic(expected = "invalid tag")]
fn negative_tags_are_rejected() {
    let am = local();
    let han = am.register_handler(|_: &ActiveMessenger, _: u32| {});
    am.send_msg_han(0, han, 1u32, -5, None);
}

#[test]
fn progress_until_stops_once_done() {
    let am = local();
    let hits = Arc::new(Mutex::new(0));
    let cloned = hits.clone();
    let han = am.register_handler(move |_: &ActiveMessenger, _: u32| *cloned.lock() += 1);
    for i in 0..3u32 {
        am.send_msg_han(0, han, i, NO_TAG, None);
    }
    am.progress_until(|| *hits.lock() == 3);
    assert_eq!(*hits.lock(), 3);
    assert!(am.is_local_term());
}
