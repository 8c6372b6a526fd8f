pub use crate::active_messaging::{
    handler_fn, strategy_of, Action, ActiveClosureFn, ActiveFn, ActiveFunctor, ActiveMsg,
    CollectionDispatch, Envelope, EventId, HandlerId, Message, NodeType, Parserdes, RawMessage,
    StrategyKind, Tag, NO_TAG,
};
pub use crate::{active_fn, am_functor, AmData, AmParserdes, AmRaw};

pub use crate::inventory;
pub use crate::lamellae::{Backend, InProcFabric};
pub use crate::messenger::{ActiveMessenger, MessengerBuilder};
pub use crate::pipe::{Callback, PipeId};
