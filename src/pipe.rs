//! Pipes and callbacks: serializable endpoints that can be handed to another node and later
//! triggered with a message.
//!
//! A [Callback] is created [Unbound][Callback::unbound] or bound to exactly one listener
//! variant: a handler on a given node, a broadcast handler, an anonymous closure on the creating
//! node, or an element (or the whole) of a virtual collection. Triggering a callback whose target
//! lives on the current node calls the target directly, without encoding the message or touching
//! the transport.
//!
//! # Examples
//!```
//! use active_messenger::active_messaging::prelude::*;
//!
//! let am = MessengerBuilder::new().build();
//! let cb = am.make_callback_anon::<u64>(false, |am, val| {
//!     println!("pe {} received {val}", am.my_pe());
//! });
//! cb.trigger(&am, 10);
//!```
pub(crate) mod callback;
pub use callback::Callback;
pub(crate) mod pipe_id;
pub use pipe_id::PipeId;

mod manager;
pub(crate) use manager::PipeManager;
