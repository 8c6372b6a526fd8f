use super::ActiveMessenger;
use crate::active_messaging::envelope::{read_msg, Envelope, Tag, NO_TAG};
use crate::active_messaging::{ActiveClosureFn, ActiveMsg, HandlerId, NodeType};
use crate::lamellae::LamellaeAM;
use crate::pipe::PipeId;
use crate::warnings::RuntimeWarning;

use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub(super) struct DataHeader {
    pub(super) data_tag: u64,
    pub(super) len: usize,
}

pub(super) struct HandlerContext {
    env: Envelope,
    from: NodeType,
}

pub(super) struct PendingMsg {
    env: Envelope,
    from: NodeType,
    msg: ActiveMsg,
}

pub(super) struct PendingData {
    env: Envelope,
    from: NodeType,
    header: DataHeader,
}

/// Children of `me` in the binary spanning tree rooted at `root`
pub(crate) fn tree_children(
    root: NodeType,
    me: NodeType,
    num_pes: usize,
) -> impl Iterator<Item = NodeType> {
    let rel = (me + num_pes - root) % num_pes;
    [rel * 2 + 1, rel * 2 + 2]
        .into_iter()
        .filter(move |child| *child < num_pes)
        .map(move |child| (child + root) % num_pes)
}

impl ActiveMessenger {
    pub(crate) fn forward_broadcast(&self, root: NodeType, buf: &[u8]) {
        for child in tree_children(root, self.my_pe, self.num_pes) {
            self.transport_send(child, buf.to_vec());
        }
    }

    /// Poll the transport once and execute every message that has arrived.
    /// Returns the number of handler (and listener) invocations performed.
    pub fn progress(&self) -> usize {
        let mut delivered = self.retry_pending_data();
        for (src, buf) in self.lamellae.recv_msgs() {
            delivered += self.process_msg(src, buf);
        }
        delivered
    }

    /// Call [progress][ActiveMessenger::progress] until `done` returns true
    pub fn progress_until(&self, mut done: impl FnMut() -> bool) {
        let start = Instant::now();
        let mut warned = false;
        while !done() {
            if self.progress() == 0 {
                std::thread::yield_now();
            }
            if !warned && start.elapsed().as_secs_f64() > crate::config().deadlock_timeout {
                RuntimeWarning::ProgressTimeout(start.elapsed().as_secs_f64()).print();
                warned = true;
            }
        }
    }

    /// true when nothing is buffered locally waiting on a handler registration or a data transfer
    pub fn is_local_term(&self) -> bool {
        self.pending.lock().is_empty() && self.pending_data.lock().is_empty()
    }

    fn process_msg(&self, src: NodeType, buf: Vec<u8>) -> usize {
        let (mut env, payload) = match read_msg(&buf) {
            Ok(msg) => msg,
            Err(e) => panic!("[{}] malformed message from pe {src}: {e}", self.my_pe),
        };
        if env.is_broadcast() {
            self.forward_broadcast(env.dest(), &buf);
        }
        self.trace_msg("recv", &env, payload.len());
        let from = if env.is_broadcast() { env.dest() } else { src };
        if env.is_data() {
            let header: DataHeader = match crate::deserialize(payload) {
                Ok(header) => header,
                Err(e) => panic!("[{}] malformed data header from pe {src}: {e}", self.my_pe),
            };
            env.set_data(false);
            return match self.lamellae.take_data(src, header.data_tag) {
                Some(data) => {
                    self.check_data_len(&header, &data);
                    self.deliver(env, from, ActiveMsg::from_bytes(data))
                }
                None => {
                    self.pending_data
                        .lock()
                        .push(PendingData { env, from, header });
                    0
                }
            };
        }
        self.deliver(env, from, ActiveMsg::from_bytes(payload.to_vec()))
    }

    fn retry_pending_data(&self) -> usize {
        let waiting = std::mem::take(&mut *self.pending_data.lock());
        let mut delivered = 0;
        for pending in waiting {
            match self.lamellae.take_data(pending.from, pending.header.data_tag) {
                Some(data) => {
                    self.check_data_len(&pending.header, &data);
                    delivered += self.deliver(pending.env, pending.from, ActiveMsg::from_bytes(data))
                }
                None => self.pending_data.lock().push(pending),
            }
        }
        delivered
    }

    fn check_data_len(&self, header: &DataHeader, data: &[u8]) {
        if data.len() != header.len {
            panic!(
                "[{}] data transfer {} expected {} bytes, received {}",
                self.my_pe,
                header.data_tag,
                header.len,
                data.len()
            );
        }
    }

    /// Execute `msg` locally as if it had arrived from `from` under `env`.
    /// Messages for handlers that may still be registered here (collective ones, or ones owned by
    /// this pe) are buffered until they are, any other miss is fatal.
    pub(crate) fn deliver(&self, env: Envelope, from: NodeType, msg: ActiveMsg) -> usize {
        if let Some(pipe) = env.pipe() {
            return self.deliver_to_listener(pipe, env, from, msg);
        }
        let han = env.handler();
        let tag = env.tag();
        let found = self.registry.lock().try_get_handler(han, tag);
        match found {
            Ok(func) => {
                self.run_handler(func, env, from, msg);
                1
            }
            Err(e) => {
                if han.is_auto() {
                    panic!("[{}] {e}", self.my_pe);
                }
                if !han.is_collective() && han.node() != self.my_pe {
                    panic!(
                        "[{}] {e}, it is owned by pe {} and can never be registered here",
                        self.my_pe,
                        han.node()
                    );
                }
                tracing::trace!("[{}] buffering message for {:?} tag {}", self.my_pe, han, tag);
                self.pending
                    .lock()
                    .entry((han, tag))
                    .or_insert_with(Vec::new)
                    .push(PendingMsg { env, from, msg });
                0
            }
        }
    }

    fn deliver_to_listener(&self, pipe: PipeId, env: Envelope, from: NodeType, msg: ActiveMsg) -> usize {
        let listener = self.pipes.lock().take_listener(pipe);
        match listener {
            Some(func) => {
                self.run_handler(func, env, from, msg);
                1
            }
            None if !pipe.is_persist() => {
                // already consumed by an earlier trigger
                RuntimeWarning::CallbackReuse(pipe).print();
                0
            }
            None => panic!("[{}] no listener attached to pipe {:?}", self.my_pe, pipe),
        }
    }

    fn run_handler(&self, func: ActiveClosureFn, env: Envelope, from: NodeType, msg: ActiveMsg) {
        self.context.lock().push(HandlerContext { env, from });
        func(self, msg);
        self.context.lock().pop();
        let trigger = self.registry.lock().get_trigger(env.handler());
        if let Some(trigger) = trigger {
            trigger(env.handler());
        }
    }

    pub(super) fn deliver_pending(&self, han: HandlerId, tag: Tag) {
        let waiting = self.pending.lock().shift_remove(&(han, tag));
        if let Some(waiting) = waiting {
            tracing::trace!(
                "[{}] delivering {} buffered messages for {:?}",
                self.my_pe,
                waiting.len(),
                han
            );
            for pending in waiting {
                self.deliver(pending.env, pending.from, pending.msg);
            }
        }
    }

    //------------------------ handler context ------------------------//

    /// The envelope of the message currently being handled on this pe
    pub fn current_envelope(&self) -> Option<Envelope> {
        self.context.lock().last().map(|ctx| ctx.env)
    }

    pub fn current_handler(&self) -> Option<HandlerId> {
        self.current_envelope().map(|env| env.handler())
    }

    /// The reply handler attached to the message currently being handled, if any
    pub fn current_callback(&self) -> Option<HandlerId> {
        self.current_envelope().and_then(|env| env.callback())
    }

    /// The sender of the current message (the root for broadcasts)
    pub fn current_from_node(&self) -> Option<NodeType> {
        self.context.lock().last().map(|ctx| ctx.from)
    }

    pub fn current_tag(&self) -> Tag {
        self.current_envelope()
            .map(|env| env.tag())
            .unwrap_or(NO_TAG)
    }
}

#[cfg(test)]
mod tests {
    use super::{tree_children, DataHeader};
    use crate::active_messaging::envelope::Envelope;
    use crate::lamellae::LamellaeAM;
    use crate::{ActiveMessenger, MessengerBuilder};

    #[test]
    #[should_panic(expected = "expected 10 bytes, received 3")]
    fn landed_data_is_length_checked() {
        let am = MessengerBuilder::new().build();
        let han = am.register_handler(|_: &ActiveMessenger, _: Vec<u8>| {});
        am.lamellae.put_data(0, 99, vec![0u8; 3]).unwrap();
        let header = crate::serialize(&DataHeader {
            data_tag: 99,
            len: 10,
        })
        .unwrap();
        let mut env = Envelope::new();
        env.set_dest(0);
        env.set_handler(han);
        env.set_data(true);
        am.send_msg_sized(env, header, None);
        am.progress();
    }

    #[test]
    fn spanning_tree_reaches_everyone_once() {
        for num_pes in 1..12 {
            for root in 0..num_pes {
                let mut seen = vec![0; num_pes];
                let mut frontier = vec![root];
                while let Some(pe) = frontier.pop() {
                    for child in tree_children(root, pe, num_pes) {
                        seen[child] += 1;
                        frontier.push(child);
                    }
                }
                for (pe, cnt) in seen.iter().enumerate() {
                    let expected = if pe == root { 0 } else { 1 };
                    assert_eq!(*cnt, expected, "num_pes {num_pes} root {root} pe {pe}");
                }
            }
        }
    }
}
