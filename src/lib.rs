//! A typed active-message engine for distributed runtimes.
//!
//! A process on each node (processing element, "pe") of a parallel job invokes functions on any
//! other node by sending a message addressed to a handler. There is no reply channel built into a
//! send; answers are sent back as further active messages, usually through a [Callback].
//!
//! Each message type statically selects how it is carried ([StrategyKind]):
//! - raw bytes for plain-old-data types ([AmRaw]),
//! - reflective serialization through serde and bincode ([AmData]),
//! - a raw header followed by a serialized body ([AmParserdes]).
//!
//! The same strategy is used whether the destination handler is named by type, by [HandlerId],
//! or by functor, and for both point to point sends and broadcasts.
//!
//! Messages move between nodes through a Lamellae backend: `Local` for a single pe, and `InProc`
//! to run several pes inside one process.
//!
//! EXAMPLES
//! --------
//!
//! # Constructing a messenger
//! ```
//! use active_messenger::{Backend, MessengerBuilder};
//! fn main(){
//!     let am = MessengerBuilder::new()
//!         .with_lamellae( Default::default() ) //set by the AM_BACKEND env var, "local" if unset
//!         //.with_lamellae( Backend::InProc ) //explicitly run several pes inside this process
//!         .build();
//! }
//! ```
//!
//! # Sending a message
//! ```
//! use active_messenger::active_messaging::prelude::*;
//!
//! #[AmData(Debug, Clone)]
//! struct HelloWorld {
//!     my_pe: usize,
//!     note: String,
//! }
//!
//! #[active_fn]
//! fn hello(am: &ActiveMessenger, msg: HelloWorld) {
//!     println!("Hello pe {} of {}, I'm pe {}: {}", am.my_pe(), am.num_pes(), msg.my_pe, msg.note);
//! }
//!
//! fn main(){
//!     let am = MessengerBuilder::new().build();
//!     let msg = HelloWorld { my_pe: am.my_pe(), note: "hi".to_owned() };
//!     for pe in 0..am.num_pes() {
//!         am.send_msg::<HelloWorld, hello>(pe, msg.clone());
//!     }
//!     am.progress();
//! }
//! ```

#[macro_use]
extern crate lazy_static;
#[doc(hidden)]
pub extern crate serde;
#[doc(hidden)]
pub use serde::*;

#[doc(hidden)]
pub extern crate tracing;

pub mod active_messaging;
pub use active_messaging::{
    Action, ActiveClosureFn, ActiveFn, ActiveFunctor, ActiveMsg, Envelope, EventId, HandlerId,
    Message, Registry, StrategyKind, Tag, NO_TAG,
};
mod env_var;
pub use env_var::{config, Config};
mod lamellae;
pub use lamellae::{Backend, InProcFabric, TransportError};
mod messenger;
pub use messenger::{ActiveMessenger, MessengerBuilder};
pub mod pipe;
pub use pipe::{Callback, PipeId};
mod warnings;

extern crate active_messenger_impl;

/// This macro is used to setup the attributed type so that it is sent with reflective serialization.
///
/// Typically you will use this macro in place of `#[derive()]`, as it will manage deriving both the
/// traits that are provided as well as `serde::Serialize` and `serde::Deserialize`, and it implements
/// [Message] selecting the reflective strategy.
///
/// All members of the data structure must themselves be serializable.
/// Messages of this kind cannot be sent with a tag.
pub use active_messenger_impl::AmData;

/// This macro is used to setup a plain-old-data type so it is sent as raw bytes.
///
/// The struct is made `#[repr(C)]` (unless it already carries a `repr`), derives `Clone` and `Copy`
/// along with any provided traits, and every field is checked at compile time to be raw copyable
/// itself. This is the only kind of message that can be sent with a tag.
pub use active_messenger_impl::AmRaw;

/// This macro marks a type implementing [Parserdes][active_messaging::Parserdes] as a message sent
/// as a raw header followed by a serialized body.
///
/// The macro derives the provided traits and implements [Message]; the header/body split itself is
/// written by hand through the `Parserdes` trait.
pub use active_messenger_impl::AmParserdes;

/// This macro turns a function into an active message handler.
///
/// The function takes the message by value, optionally preceded by the messenger:
/// `fn handler(msg: M)` or `fn handler(am: &ActiveMessenger, msg: M)`.
/// The handler is registered when the program starts and is named by type in sends,
/// e.g. `am.send_msg::<M, handler>(pe, msg)`. Every node assigns it the same [HandlerId].
pub use active_messenger_impl::active_fn;

/// This macro registers an implementation of [ActiveFunctor] for a type, so it can be used with
/// [send_msg_functor][ActiveMessenger::send_msg_functor] and friends.
pub use active_messenger_impl::am_functor;

#[doc(hidden)]
pub use inventory;

#[doc(hidden)]
pub use bincode;

#[doc(hidden)]
pub fn serialize<T: ?Sized>(obj: &T) -> Result<Vec<u8>, anyhow::Error>
where
    T: serde::Serialize,
{
    Ok(bincode::serialize(obj)?)
}

#[doc(hidden)]
pub fn serialized_size<T: ?Sized>(obj: &T) -> usize
where
    T: serde::Serialize,
{
    match bincode::serialized_size(obj) {
        Ok(size) => size as usize,
        Err(e) => panic!("unable to compute serialized size: {e}"),
    }
}

#[doc(hidden)]
pub fn serialize_into<T: ?Sized>(buf: &mut [u8], obj: &T) -> Result<(), anyhow::Error>
where
    T: serde::Serialize,
{
    bincode::serialize_into(buf, obj)?;
    Ok(())
}

#[doc(hidden)]
pub fn deserialize<'a, T>(bytes: &'a [u8]) -> Result<T, anyhow::Error>
where
    T: serde::Deserialize<'a>,
{
    Ok(bincode::deserialize(bytes)?)
}
