use super::PipeId;
use crate::active_messaging::{ActiveClosureFn, NodeType};

use std::collections::HashMap;

const PIPE_ID_BASE: u64 = 1;

/// Per-node pipe bookkeeping: id allocation and anonymous listeners.
///
/// A single-shot listener is removed when it fires, so the table only holds listeners that are
/// still waiting.
pub(crate) struct PipeManager {
    my_pe: NodeType,
    next_ident: u64,
    listeners: HashMap<PipeId, ActiveClosureFn>,
}

impl PipeManager {
    pub(crate) fn new(my_pe: NodeType) -> PipeManager {
        PipeManager {
            my_pe,
            next_ident: PIPE_ID_BASE,
            listeners: HashMap::new(),
        }
    }

    pub(crate) fn make_pipe_id(&mut self, persist: bool, send_back: bool) -> PipeId {
        let ident = self.next_ident;
        self.next_ident += 1;
        PipeId::new(ident, self.my_pe, persist, send_back)
    }

    pub(crate) fn add_listener(&mut self, pipe: PipeId, listener: ActiveClosureFn) {
        self.listeners.insert(pipe, listener);
    }

    /// the listener for `pipe`; non-persistent listeners are removed on retrieval
    pub(crate) fn take_listener(&mut self, pipe: PipeId) -> Option<ActiveClosureFn> {
        if pipe.is_persist() {
            self.listeners.get(&pipe).cloned()
        } else {
            self.listeners.remove(&pipe)
        }
    }
}
