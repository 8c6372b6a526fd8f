use crate::active_messaging::envelope::{write_msg, Envelope, EpochType, Tag, NO_EPOCH, NO_TAG};
use crate::active_messaging::registry::{auto_handler_id, AUTO_HANDLERS, AUTO_HANDLER_IDS};
use crate::active_messaging::*;
use crate::lamellae::{create_lamellae, Backend, InProcFabric, Lamellae, LamellaeAM, LamellaeComm, LamellaeInit};
use crate::pipe::{PipeId, PipeManager};
use crate::warnings::RuntimeWarning;
use crate::config;

use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

mod delivery;
use delivery::{DataHeader, HandlerContext, PendingData, PendingMsg};

/// The per-node entry point for sending and receiving active messages.
///
/// Every send fills exactly one [Envelope], routes the message through the strategy its type
/// selects, and hands the encoded bytes to the transport. Sends never block; incoming messages are
/// executed when [progress][ActiveMessenger::progress] is called.
///
/// # Examples
///```
/// use active_messenger::active_messaging::prelude::*;
///
/// #[AmRaw(Debug)]
/// struct Ping {
///     round: u32,
/// }
///
/// #[active_fn]
/// fn ping(am: &ActiveMessenger, msg: Ping) {
///     println!("pe {} got round {}", am.my_pe(), msg.round);
/// }
///
/// let am = MessengerBuilder::new().build();
/// am.send_msg::<Ping, ping>(0, Ping { round: 1 });
/// am.progress();
///```
pub struct ActiveMessenger {
    pub(crate) my_pe: usize,
    pub(crate) num_pes: usize,
    pub(crate) lamellae: Arc<Lamellae>,
    pub(crate) registry: Mutex<Registry>,
    pub(crate) pipes: Mutex<PipeManager>,
    pub(crate) collection_dispatch: Option<Arc<dyn CollectionDispatch>>,
    context: Mutex<Vec<HandlerContext>>,
    pending: Mutex<IndexMap<(HandlerId, Tag), Vec<PendingMsg>>>,
    pending_data: Mutex<Vec<PendingData>>,
    stats: RouterStats,
    next_event: AtomicU64,
    next_data_tag: AtomicU64,
    epoch: AtomicU64,
    eager_size: usize,
}

impl std::fmt::Debug for ActiveMessenger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveMessenger")
            .field("my_pe", &self.my_pe)
            .field("num_pes", &self.num_pes)
            .field("lamellae", &self.lamellae)
            .field("stats", &self.stats)
            .finish()
    }
}

impl ActiveMessenger {
    pub fn my_pe(&self) -> usize {
        self.my_pe
    }

    pub fn num_pes(&self) -> usize {
        self.num_pes
    }

    pub fn backend(&self) -> Backend {
        self.lamellae.backend()
    }

    /// Number of transport level sends issued by this pe (messages and data channel puts)
    pub fn num_sends(&self) -> usize {
        self.lamellae.num_sends()
    }

    #[allow(non_snake_case)]
    pub fn MB_sent(&self) -> f64 {
        self.lamellae.MB_sent()
    }

    /// How many sends went through each serialization strategy
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// serialized messages above this size use the data channel
    pub fn eager_size(&self) -> usize {
        self.eager_size
    }

    /// Stamp every subsequently filled envelope with `epoch`
    pub fn set_epoch(&self, epoch: EpochType) {
        self.epoch.store(epoch, Ordering::SeqCst);
    }

    pub fn clear_epoch(&self) {
        self.epoch.store(NO_EPOCH, Ordering::SeqCst);
    }

    fn fill_envelope(&self, dest: NodeType, han: HandlerId, tag: Tag) -> Envelope {
        if tag < 0 && tag != NO_TAG {
            panic!("{}", RegistryError::InvalidTag(tag));
        }
        let mut env = Envelope::new();
        env.set_dest(dest);
        env.set_handler(han);
        if tag != NO_TAG {
            env.set_tag(tag);
        }
        let epoch = self.epoch.load(Ordering::SeqCst);
        if epoch != NO_EPOCH {
            env.set_epoch(epoch);
        }
        env
    }

    //------------------------ typed function sends ------------------------//

    /// Send `msg` to `dest`, to be handled by the auto handler `F`
    pub fn send_msg<M: Message, F: ActiveFn<M>>(&self, dest: NodeType, msg: M) -> EventId {
        self.send_msg_tagged::<M, F>(dest, msg, NO_TAG, None)
    }

    /// Send `msg` to `dest` with an optional tag and a continuation run once the send is issued.
    ///
    /// Tags are only valid for raw byte messages, a tagged send of a serialized message is fatal.
    #[tracing::instrument(skip_all)]
    pub fn send_msg_tagged<M: Message, F: ActiveFn<M>>(
        &self,
        dest: NodeType,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let env = self.fill_envelope(dest, auto_handler_id(F::NAME), tag);
        <M::Strategy as Strategy<M>>::send_msg(self, env, msg, action)
    }

    /// Broadcast `msg` to every other pe, handled by the auto handler `F`.
    /// The broadcasting pe itself does not run the handler.
    pub fn broadcast_msg<M: Message, F: ActiveFn<M>>(&self, msg: M) -> EventId {
        self.broadcast_msg_tagged::<M, F>(msg, NO_TAG, None)
    }

    #[tracing::instrument(skip_all)]
    pub fn broadcast_msg_tagged<M: Message, F: ActiveFn<M>>(
        &self,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let mut env = self.fill_envelope(self.my_pe, auto_handler_id(F::NAME), tag);
        env.set_broadcast();
        <M::Strategy as Strategy<M>>::broadcast_msg(self, env, msg, action)
    }

    //------------------------ functor sends ------------------------//

    pub fn send_msg_functor<F: RegisteredFunctor<M>, M: Message>(
        &self,
        dest: NodeType,
        msg: M,
    ) -> EventId {
        self.send_msg_functor_tagged::<F, M>(dest, msg, NO_TAG, None)
    }

    #[tracing::instrument(skip_all)]
    pub fn send_msg_functor_tagged<F: RegisteredFunctor<M>, M: Message>(
        &self,
        dest: NodeType,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let env = self.fill_envelope(dest, auto_handler_id(F::NAME), tag);
        <M::Strategy as Strategy<M>>::send_msg(self, env, msg, action)
    }

    #[tracing::instrument(skip_all)]
    pub fn broadcast_msg_functor<F: RegisteredFunctor<M>, M: Message>(&self, msg: M) -> EventId {
        let mut env = self.fill_envelope(self.my_pe, auto_handler_id(F::NAME), NO_TAG);
        env.set_broadcast();
        <M::Strategy as Strategy<M>>::broadcast_msg(self, env, msg, None)
    }

    //------------------------ explicit handler sends ------------------------//

    /// Send `msg` to `dest`, handled by the closure registered as `han` (and `tag`) on `dest`
    #[tracing::instrument(skip_all)]
    pub fn send_msg_han<M: Message>(
        &self,
        dest: NodeType,
        han: HandlerId,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let env = self.fill_envelope(dest, han, tag);
        <M::Strategy as Strategy<M>>::send_msg(self, env, msg, action)
    }

    /// Send `msg` to the node that owns `han`.
    ///
    /// Auto and collective handlers have no owning node, sending to them this way is fatal.
    pub fn send_msg_to_handler<M: Message>(
        &self,
        han: HandlerId,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let dest = han.node();
        if dest == UNINITIALIZED_DESTINATION {
            panic!(
                "Destination must be known in handler {:?} to send without an explicit destination",
                han
            );
        }
        self.send_msg_han(dest, han, msg, tag, action)
    }

    #[tracing::instrument(skip_all)]
    pub fn broadcast_msg_han<M: Message>(
        &self,
        han: HandlerId,
        msg: M,
        tag: Tag,
        action: Option<Action>,
    ) -> EventId {
        let mut env = self.fill_envelope(self.my_pe, han, tag);
        env.set_broadcast();
        <M::Strategy as Strategy<M>>::broadcast_msg(self, env, msg, action)
    }

    /// Send with a caller prepared envelope (termination control, epochs, groups).
    /// The envelope's broadcast bit selects broadcast, otherwise its destination is used.
    pub fn send_msg_env<M: Message>(
        &self,
        mut env: Envelope,
        msg: M,
        action: Option<Action>,
    ) -> EventId {
        if env.is_broadcast() {
            env.set_dest(self.my_pe);
            <M::Strategy as Strategy<M>>::broadcast_msg(self, env, msg, action)
        } else {
            if env.dest() == UNINITIALIZED_DESTINATION {
                panic!("envelope {:?} has no destination", env);
            }
            <M::Strategy as Strategy<M>>::send_msg(self, env, msg, action)
        }
    }

    //------------------------ callbacks ------------------------//

    /// Send `msg` to `dest` with a one-shot reply handler attached.
    ///
    /// The handler `F` on `dest` answers with [send_callback][ActiveMessenger::send_callback]; the
    /// reply runs `on_reply` here and then unregisters itself.
    #[tracing::instrument(skip_all)]
    pub fn send_data_callback<M, F, R>(
        &self,
        dest: NodeType,
        msg: M,
        on_reply: impl FnOnce(&ActiveMessenger, R) + Send + 'static,
    ) -> EventId
    where
        M: Message,
        F: ActiveFn<M>,
        R: Message,
    {
        let on_reply = Mutex::new(Some(on_reply));
        let cb: ActiveClosureFn = Arc::new(move |am: &ActiveMessenger, reply: ActiveMsg| {
            let on_reply = on_reply.lock().take();
            if let Some(on_reply) = on_reply {
                on_reply(am, reply.take::<R>());
            }
            if let Some(han) = am.current_handler() {
                am.unregister_handler_fn(han, NO_TAG);
            }
        });
        let cb_han = self.register_new_handler(cb, NO_TAG);
        let mut env = self.fill_envelope(dest, auto_handler_id(F::NAME), NO_TAG);
        env.set_callback(cb_han);
        <M::Strategy as Strategy<M>>::send_msg(self, env, msg, None)
    }

    /// Reply to the callback attached to the message currently being handled
    pub fn send_callback<M: Message>(&self, msg: M) -> EventId {
        match self.current_callback() {
            Some(cb) => self.send_msg_to_handler(cb, msg, NO_TAG, None),
            None => panic!("send_callback called outside of a handler that received a callback"),
        }
    }

    //------------------------ low level ------------------------//

    fn next_event(&self) -> EventId {
        self.next_event.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn trace_msg(&self, what: &str, env: &Envelope, len: usize) {
        if !env.is_term() || config().print_term_msgs {
            tracing::debug!("[{}] {} {:?} ({} bytes)", self.my_pe, what, env, len);
        }
    }

    pub(crate) fn transport_send(&self, dest: NodeType, buf: Vec<u8>) {
        if let Err(e) = self.lamellae.send_msg_sized(dest, buf) {
            panic!("[{}] transport failure: {e}", self.my_pe);
        }
    }

    /// The single primitive every send funnels into: `[envelope][payload]` on the wire.
    /// `action` runs once the bytes have been handed to the transport.
    pub(crate) fn send_msg_sized(
        &self,
        env: Envelope,
        payload: Vec<u8>,
        action: Option<Action>,
    ) -> EventId {
        let event = self.next_event();
        self.trace_msg("send", &env, payload.len());
        let buf = match write_msg(&env, &payload) {
            Ok(buf) => buf,
            Err(e) => panic!("unable to serialize envelope {:?}: {e}", env),
        };
        if env.is_broadcast() {
            self.forward_broadcast(env.dest(), &buf);
        } else {
            self.transport_send(env.dest(), buf);
        }
        if let Some(action) = action {
            action();
        }
        event
    }

    /// Large serialized sends: the payload goes on the data channel first, followed by a small
    /// envelope telling the receiver which data tag to pull.
    pub(crate) fn send_data_msg(
        &self,
        mut env: Envelope,
        payload: Vec<u8>,
        action: Option<Action>,
    ) -> EventId {
        let data_tag = self.next_data_tag.fetch_add(1, Ordering::Relaxed);
        let header = DataHeader {
            data_tag,
            len: payload.len(),
        };
        if let Err(e) = self.lamellae.put_data(env.dest(), data_tag, payload) {
            panic!("[{}] transport failure: {e}", self.my_pe);
        }
        let header = match crate::serialize(&header) {
            Ok(header) => header,
            Err(e) => panic!("unable to serialize data header: {e}"),
        };
        env.set_data(true);
        self.send_msg_sized(env, header, action)
    }

    //------------------------ registration ------------------------//

    /// Register `func` under a new id owned by this pe; messages already buffered for it are delivered
    pub fn register_new_handler(&self, func: ActiveClosureFn, tag: Tag) -> HandlerId {
        let han = self.registry.lock().register_new_handler(func, tag, false);
        self.deliver_pending(han, tag);
        han
    }

    /// Typed convenience over [register_new_handler][ActiveMessenger::register_new_handler]
    pub fn register_handler<M: Message>(
        &self,
        func: impl Fn(&ActiveMessenger, M) + Send + Sync + 'static,
    ) -> HandlerId {
        self.register_new_handler(handler_fn(func), NO_TAG)
    }

    /// Register a collective handler, every pe must register its collective handlers in the same order
    pub fn register_active_handler(&self, func: ActiveClosureFn, tag: Tag) -> HandlerId {
        let han = self.registry.lock().register_active_handler(func, tag);
        self.deliver_pending(han, tag);
        han
    }

    pub fn unregister_handler_fn(&self, han: HandlerId, tag: Tag) {
        self.registry.lock().unregister_handler_fn(han, tag);
    }

    /// Replace the closure of an already issued id, then deliver anything buffered for it
    pub fn swap_handler_fn(&self, han: HandlerId, func: ActiveClosureFn, tag: Tag) {
        self.registry.lock().swap_handler(han, func, tag);
        self.deliver_pending(han, tag);
    }

    /// Run `trigger` after each invocation of `han`
    pub fn set_handler_trigger(&self, han: HandlerId, trigger: impl Fn(HandlerId) + Send + Sync + 'static) {
        self.registry.lock().save_trigger(han, Arc::new(trigger));
    }

    /// Allocate a pipe id on this pe
    pub fn make_pipe_id(&self, persist: bool, send_back: bool) -> PipeId {
        self.pipes.lock().make_pipe_id(persist, send_back)
    }
}

impl Drop for ActiveMessenger {
    fn drop(&mut self) {
        let pending = self.pending.lock();
        let cnt = pending.values().map(|msgs| msgs.len()).sum::<usize>();
        if cnt > 0 {
            let handlers = pending.keys().map(|(han, _)| *han).collect();
            RuntimeWarning::PendingMessages(cnt, handlers).print();
        }
    }
}

/// An implementation of ActiveMessenger builder pattern
///
/// # Examples
///
///```
/// use active_messenger::{MessengerBuilder, Backend};
///
/// let am = MessengerBuilder::new()
///                 .with_lamellae(Backend::Local)
///                 .with_eager_size(1024)
///                 .build();
///```
pub struct MessengerBuilder {
    primary_lamellae: Backend,
    fabric: Option<(Arc<InProcFabric>, usize)>,
    eager_size: usize,
    collection_dispatch: Option<Arc<dyn CollectionDispatch>>,
    warnings: Option<bool>,
}

impl std::fmt::Debug for MessengerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessengerBuilder")
            .field("primary_lamellae", &self.primary_lamellae)
            .field("fabric", &self.fabric)
            .field("eager_size", &self.eager_size)
            .finish()
    }
}

impl MessengerBuilder {
    /// Construct a new messenger builder, defaults come from the `AM_` environment variables
    #[tracing::instrument(skip_all)]
    pub fn new() -> MessengerBuilder {
        MessengerBuilder {
            primary_lamellae: Default::default(),
            fabric: None,
            eager_size: config().eager_size,
            collection_dispatch: None,
            warnings: None,
        }
    }

    /// Specify the lamellae backend to use
    #[tracing::instrument(skip_all)]
    pub fn with_lamellae(mut self, lamellae: Backend) -> MessengerBuilder {
        self.primary_lamellae = lamellae;
        self
    }

    /// Join an existing in-process fabric as `pe` (implies [Backend::InProc])
    #[tracing::instrument(skip_all)]
    pub fn with_inproc_fabric(mut self, fabric: Arc<InProcFabric>, pe: usize) -> MessengerBuilder {
        self.primary_lamellae = Backend::InProc;
        self.fabric = Some((fabric, pe));
        self
    }

    /// Serialized messages larger than `size` bytes go through the data channel
    pub fn with_eager_size(mut self, size: usize) -> MessengerBuilder {
        self.eager_size = size;
        self
    }

    pub fn with_collection_dispatch(
        mut self,
        dispatch: Arc<dyn CollectionDispatch>,
    ) -> MessengerBuilder {
        self.collection_dispatch = Some(dispatch);
        self
    }

    /// Globally enable or disable runtime warnings
    pub fn with_runtime_warnings(mut self, enabled: bool) -> MessengerBuilder {
        self.warnings = Some(enabled);
        self
    }

    /// Instantiate an ActiveMessenger
    #[tracing::instrument(skip_all)]
    pub fn build(self) -> ActiveMessenger {
        match self.warnings {
            Some(true) => RuntimeWarning::enable_warnings(),
            Some(false) => RuntimeWarning::disable_warnings(),
            None => {}
        }
        // auto handler ids are fixed before any message can be sent or received
        lazy_static::initialize(&AUTO_HANDLER_IDS);
        lazy_static::initialize(&AUTO_HANDLERS);

        let mut lamellae_builder = create_lamellae(self.primary_lamellae, self.fabric);
        let (my_pe, num_pes) = lamellae_builder.init_fabric();
        let lamellae = lamellae_builder.init_lamellae();
        debug_assert_eq!((lamellae.my_pe(), lamellae.num_pes()), (my_pe, num_pes));
        tracing::trace!(
            "pe {} of {} using {:?}, {} auto handlers",
            my_pe,
            num_pes,
            lamellae.backend(),
            AUTO_HANDLER_IDS.len()
        );
        ActiveMessenger {
            my_pe,
            num_pes,
            lamellae,
            registry: Mutex::new(Registry::new(my_pe)),
            pipes: Mutex::new(PipeManager::new(my_pe)),
            collection_dispatch: self.collection_dispatch,
            context: Mutex::new(Vec::new()),
            pending: Mutex::new(IndexMap::new()),
            pending_data: Mutex::new(Vec::new()),
            stats: RouterStats::default(),
            next_event: AtomicU64::new(0),
            next_data_tag: AtomicU64::new(0),
            epoch: AtomicU64::new(NO_EPOCH),
            eager_size: self.eager_size,
        }
    }
}

impl Default for MessengerBuilder {
    fn default() -> Self {
        MessengerBuilder::new()
    }
}
