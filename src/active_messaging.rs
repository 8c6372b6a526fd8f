//! Active messages: typed payloads addressed to a handler on some node.
//!
//! A message is any type implementing [Message]; the type decides (statically) how it is put on
//! the wire. A handler is either
//! - an *auto* handler: a function annotated with [active_fn][crate::active_fn] or a functor
//!   annotated with [am_functor][crate::am_functor], registered at link time and given the same
//!   id on every node,
//! - or a closure registered at runtime through
//!   [register_new_handler][crate::ActiveMessenger::register_new_handler], owned by the
//!   registering node.
//!
//! # Examples
//!```
//! use active_messenger::active_messaging::prelude::*;
//!
//! #[AmData(Debug, Clone)]
//! struct Hello {
//!     from: usize,
//! }
//!
//! #[active_fn]
//! fn hello(am: &ActiveMessenger, msg: Hello) {
//!     println!("node {} says hello to node {}", msg.from, am.my_pe());
//! }
//!
//! let am = MessengerBuilder::new().build();
//! am.send_msg::<Hello, hello>(0, Hello { from: am.my_pe() });
//! am.progress();
//!```
use crate::messenger::ActiveMessenger;

use std::any::Any;
use std::sync::Arc;

pub(crate) mod envelope;
pub use envelope::{
    Envelope, EpochType, GroupType, Tag, DEFAULT_GROUP, NO_EPOCH, NO_TAG,
};
pub(crate) mod handler;
pub use handler::{HandlerId, NodeType, MAX_NODE, UNINITIALIZED_DESTINATION};
pub(crate) mod registry;
#[doc(hidden)]
pub use registry::RegisteredHandler;
pub use registry::{Registry, RegistryError, RegistryResult, HANDLER_ID_BASE};
pub(crate) mod serialization;
pub use serialization::{
    strategy_of, Message, Parserdes, ParserdesStrategy, RawBytesStrategy, RawMessage,
    ReflectiveStrategy, RouterStats, Strategy, StrategyKind,
};

pub mod prelude;

/// Identifier returned by every send, unique per messenger
pub type EventId = u64;

/// Continuation run exactly once, after the local send has been issued
pub type Action = Box<dyn FnOnce() + Send>;

/// The type-erased closure stored in the [Registry]
pub type ActiveClosureFn = Arc<dyn Fn(&ActiveMessenger, ActiveMsg) + Send + Sync>;

#[doc(hidden)]
pub type ExecFn = fn(&ActiveMessenger, ActiveMsg);

/// Payload handed to a handler closure.
///
/// Messages arriving from the transport hold their encoded bytes; messages delivered through a
/// local short circuit hold the original value and are never encoded.
pub struct ActiveMsg {
    body: MsgBody,
}

enum MsgBody {
    Bytes(Vec<u8>),
    Local(Box<dyn Any + Send>),
}

impl std::fmt::Debug for ActiveMsg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.body {
            MsgBody::Bytes(bytes) => write!(f, "ActiveMsg::Bytes({} bytes)", bytes.len()),
            MsgBody::Local(_) => write!(f, "ActiveMsg::Local"),
        }
    }
}

impl ActiveMsg {
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> ActiveMsg {
        ActiveMsg {
            body: MsgBody::Bytes(bytes),
        }
    }

    pub(crate) fn local<M: Message>(msg: M) -> ActiveMsg {
        ActiveMsg {
            body: MsgBody::Local(Box::new(msg)),
        }
    }

    /// true if this message was delivered without going through the transport
    pub fn is_local(&self) -> bool {
        matches!(self.body, MsgBody::Local(_))
    }

    /// the encoded bytes, `None` for locally delivered messages
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            MsgBody::Bytes(bytes) => Some(bytes),
            MsgBody::Local(_) => None,
        }
    }

    pub fn try_take<M: Message>(self) -> Result<M, anyhow::Error> {
        match self.body {
            MsgBody::Local(msg) => match msg.downcast::<M>() {
                Ok(msg) => Ok(*msg),
                Err(_) => Err(anyhow::anyhow!(
                    "local message is not a {}",
                    std::any::type_name::<M>()
                )),
            },
            MsgBody::Bytes(bytes) => <M::Strategy as Strategy<M>>::decode(&bytes),
        }
    }

    /// Recover the typed message, decoding it with `M`'s strategy if needed.
    /// A type mismatch is fatal.
    pub fn take<M: Message>(self) -> M {
        match self.try_take() {
            Ok(msg) => msg,
            Err(e) => panic!(
                "unable to deliver message as {}: {e}",
                std::any::type_name::<M>()
            ),
        }
    }
}

/// Wrap a typed closure so it can be stored in the [Registry]
pub fn handler_fn<M, F>(func: F) -> ActiveClosureFn
where
    M: Message,
    F: Fn(&ActiveMessenger, M) + Send + Sync + 'static,
{
    Arc::new(move |am: &ActiveMessenger, msg: ActiveMsg| func(am, msg.take::<M>()))
}

/// A statically known handler function for message type `M`.
///
/// Implemented by the [active_fn][crate::active_fn] attribute, which also registers it with the
/// runtime so every node resolves it to the same [HandlerId].
pub trait ActiveFn<M: Message>: 'static {
    #[doc(hidden)]
    const NAME: &'static str;
    fn call(am: &ActiveMessenger, msg: M);
}

/// A handler object for message type `M`, instantiated through `Default` on each delivery.
///
/// Register implementations with the [am_functor][crate::am_functor] attribute.
pub trait ActiveFunctor<M: Message>: Default + 'static {
    fn call(&self, am: &ActiveMessenger, msg: M);
}

#[doc(hidden)]
pub trait RegisteredFunctor<M: Message>: ActiveFunctor<M> {
    const NAME: &'static str;
}

#[doc(hidden)]
pub fn exec_functor<M: Message, F: ActiveFunctor<M>>(am: &ActiveMessenger, msg: ActiveMsg) {
    F::default().call(am, msg.take::<M>())
}

/// Collaborator that knows how to reach elements of a virtual collection.
///
/// The messenger does not implement collections itself; proxy callbacks are forwarded to
/// whatever dispatcher was installed with
/// [with_collection_dispatch][crate::MessengerBuilder::with_collection_dispatch].
pub trait CollectionDispatch: Send + Sync {
    fn send_to_element(
        &self,
        am: &ActiveMessenger,
        proxy: u64,
        element: u64,
        han: HandlerId,
        msg: ActiveMsg,
    );
    fn broadcast_to_collection(&self, am: &ActiveMessenger, proxy: u64, han: HandlerId, msg: ActiveMsg);
}
