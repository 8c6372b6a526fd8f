use super::PipeId;
use crate::active_messaging::envelope::{Envelope, NO_TAG};
use crate::active_messaging::registry::auto_handler_id;
use crate::active_messaging::{
    handler_fn, ActiveFn, ActiveMsg, HandlerId, Message, NodeType, RegisteredFunctor, Strategy,
};
use crate::messenger::ActiveMessenger;

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum CallbackTarget {
    Unbound,
    Send { node: NodeType, han: HandlerId },
    Bcast { han: HandlerId },
    Anon { node: NodeType },
    ProxySend { proxy: u64, element: u64, han: HandlerId },
    ProxyBcast { proxy: u64, han: HandlerId },
}

/// A serializable endpoint that accepts messages of type `M`.
///
/// Callbacks can be embedded in other messages and triggered from any node.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Callback<M> {
    pipe: PipeId,
    target: CallbackTarget,
    #[serde(skip)]
    _msg: PhantomData<fn(M)>,
}

impl<M> Clone for Callback<M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Callback<M> {}

impl<M> PartialEq for Callback<M> {
    fn eq(&self, other: &Self) -> bool {
        self.pipe == other.pipe && self.target == other.target
    }
}

impl<M> std::fmt::Debug for Callback<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("pipe", &self.pipe)
            .field("target", &self.target)
            .field("msg", &std::any::type_name::<M>())
            .finish()
    }
}

impl<M> Default for Callback<M> {
    fn default() -> Self {
        Callback::unbound()
    }
}

impl<M> Callback<M> {
    /// A callback not yet attached to any listener, triggering it is fatal
    pub fn unbound() -> Callback<M> {
        Callback {
            pipe: PipeId::UNINITIALIZED,
            target: CallbackTarget::Unbound,
            _msg: PhantomData,
        }
    }

    fn bound(pipe: PipeId, target: CallbackTarget) -> Callback<M> {
        Callback {
            pipe,
            target,
            _msg: PhantomData,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.target != CallbackTarget::Unbound
    }

    pub fn pipe(&self) -> PipeId {
        self.pipe
    }

    /// The node a triggered message is delivered to, `None` for broadcast and collection targets
    pub fn node(&self) -> Option<NodeType> {
        match self.target {
            CallbackTarget::Send { node, .. } | CallbackTarget::Anon { node } => Some(node),
            _ => None,
        }
    }
}

impl<M: Message> Callback<M> {
    /// Deliver `msg` to the bound listener.
    ///
    /// When the listener lives on the current node it runs immediately, in this call, on `msg`
    /// itself: nothing is encoded and nothing is sent.
    pub fn trigger(&self, am: &ActiveMessenger, msg: M) {
        am.trigger_callback(self.pipe, self.target, msg)
    }
}

impl ActiveMessenger {
    fn local_env(&self, han: HandlerId) -> Envelope {
        let mut env = Envelope::new();
        env.set_dest(self.my_pe);
        env.set_handler(han);
        env
    }

    pub(crate) fn trigger_callback<M: Message>(&self, pipe: PipeId, target: CallbackTarget, msg: M) {
        // a repeated single-shot Anon trigger is caught where its listener lives
        match target {
            CallbackTarget::Unbound => {
                panic!("triggered a callback that is not bound to any listener")
            }
            CallbackTarget::Send { node, han } => {
                if node == self.my_pe {
                    self.deliver(self.local_env(han), self.my_pe, ActiveMsg::local(msg));
                } else {
                    self.send_msg_han(node, han, msg, NO_TAG, None);
                }
            }
            CallbackTarget::Bcast { han } => {
                self.broadcast_msg_han(han, msg, NO_TAG, None);
            }
            CallbackTarget::Anon { node } => {
                let mut env = self.local_env(HandlerId::UNINITIALIZED);
                env.set_pipe(pipe);
                if node == self.my_pe {
                    self.deliver(env, self.my_pe, ActiveMsg::local(msg));
                } else {
                    env.set_dest(node);
                    <M::Strategy as Strategy<M>>::send_msg(self, env, msg, None);
                }
            }
            CallbackTarget::ProxySend {
                proxy,
                element,
                han,
            } => match &self.collection_dispatch {
                Some(dispatch) => {
                    dispatch.send_to_element(self, proxy, element, han, ActiveMsg::local(msg))
                }
                None => panic!("proxy callback triggered without a collection dispatcher installed"),
            },
            CallbackTarget::ProxyBcast { proxy, han } => match &self.collection_dispatch {
                Some(dispatch) => {
                    dispatch.broadcast_to_collection(self, proxy, han, ActiveMsg::local(msg))
                }
                None => panic!("proxy callback triggered without a collection dispatcher installed"),
            },
        }
    }

    /// Callback delivering to the auto handler `F` on `node`
    pub fn make_callback_send<M: Message, F: ActiveFn<M>>(
        &self,
        node: NodeType,
        persist: bool,
    ) -> Callback<M> {
        self.make_callback_send_han(node, auto_handler_id(F::NAME), persist)
    }

    pub fn make_callback_functor_send<F: RegisteredFunctor<M>, M: Message>(
        &self,
        node: NodeType,
        persist: bool,
    ) -> Callback<M> {
        self.make_callback_send_han(node, auto_handler_id(F::NAME), persist)
    }

    /// Callback delivering to the closure registered as `han` on `node`
    pub fn make_callback_send_han<M: Message>(
        &self,
        node: NodeType,
        han: HandlerId,
        persist: bool,
    ) -> Callback<M> {
        let pipe = self.make_pipe_id(persist, false);
        Callback::bound(pipe, CallbackTarget::Send { node, han })
    }

    /// Callback broadcasting to the auto handler `F`, the triggering node is excluded
    pub fn make_callback_bcast<M: Message, F: ActiveFn<M>>(&self, persist: bool) -> Callback<M> {
        self.make_callback_bcast_han(auto_handler_id(F::NAME), persist)
    }

    pub fn make_callback_bcast_han<M: Message>(&self, han: HandlerId, persist: bool) -> Callback<M> {
        let pipe = self.make_pipe_id(persist, false);
        Callback::bound(pipe, CallbackTarget::Bcast { han })
    }

    /// Callback running `func` on this node whenever (or, without `persist`, the first time) it is triggered
    pub fn make_callback_anon<M: Message>(
        &self,
        persist: bool,
        func: impl Fn(&ActiveMessenger, M) + Send + Sync + 'static,
    ) -> Callback<M> {
        let mut pipes = self.pipes.lock();
        let pipe = pipes.make_pipe_id(persist, true);
        pipes.add_listener(pipe, handler_fn(func));
        Callback::bound(
            pipe,
            CallbackTarget::Anon { node: self.my_pe },
        )
    }

    /// Callback delivering to `element` of the collection `proxy` through the installed dispatcher
    pub fn make_callback_proxy_send<M: Message>(
        &self,
        proxy: u64,
        element: u64,
        han: HandlerId,
        persist: bool,
    ) -> Callback<M> {
        let pipe = self.make_pipe_id(persist, false);
        Callback::bound(
            pipe,
            CallbackTarget::ProxySend {
                proxy,
                element,
                han,
            },
        )
    }

    pub fn make_callback_proxy_bcast<M: Message>(
        &self,
        proxy: u64,
        han: HandlerId,
        persist: bool,
    ) -> Callback<M> {
        let pipe = self.make_pipe_id(persist, false);
        Callback::bound(pipe, CallbackTarget::ProxyBcast { proxy, han })
    }
}
