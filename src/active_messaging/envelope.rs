use crate::active_messaging::handler::{HandlerId, NodeType, UNINITIALIZED_DESTINATION};
use crate::pipe::PipeId;

use serde::{Deserialize, Serialize};

/// User supplied discriminator for handler lookup, negative values are reserved
pub type Tag = i32;
/// The "untagged" sentinel, never a valid user tag
pub const NO_TAG: Tag = -1;

/// Opaque termination-detection token carried by envelopes
pub type EpochType = u64;
pub const NO_EPOCH: EpochType = EpochType::MAX;

pub type GroupType = u64;
pub const DEFAULT_GROUP: GroupType = 0;

lazy_static! {
    pub(crate) static ref ENVELOPE_LEN: usize =
        crate::serialized_size::<Envelope>(&Envelope::new());
}

#[derive(Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub(crate) struct EnvelopeType(u16);

impl EnvelopeType {
    const TERM: u16 = 1 << 0;
    const BROADCAST: u16 = 1 << 1;
    const EPOCH: u16 = 1 << 2;
    const TAG: u16 = 1 << 3;
    const CALLBACK: u16 = 1 << 4;
    const PIPE: u16 = 1 << 5;
    const DATA: u16 = 1 << 6;

    fn set(&mut self, bit: u16, on: bool) {
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }
}

impl std::fmt::Debug for EnvelopeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (EnvelopeType::TERM, "term"),
            (EnvelopeType::BROADCAST, "bcast"),
            (EnvelopeType::EPOCH, "epoch"),
            (EnvelopeType::TAG, "tag"),
            (EnvelopeType::CALLBACK, "callback"),
            (EnvelopeType::PIPE, "pipe"),
            (EnvelopeType::DATA, "data"),
        ];
        let set = names
            .iter()
            .filter(|(bit, _)| self.has(*bit))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>();
        write!(f, "[{}]", set.join("|"))
    }
}

/// The fixed-size header carried by every active message.
///
/// `dest` is the receiving node for point to point sends; for broadcasts it is the root
/// the fan out started from. Fields whose type bit is unset are ignored on delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    kind: EnvelopeType,
    dest: NodeType,
    han: HandlerId,
    epoch: EpochType,
    tag: Tag,
    group: GroupType,
    callback: HandlerId,
    pipe: PipeId,
}

impl Default for Envelope {
    fn default() -> Envelope {
        Envelope::new()
    }
}

impl Envelope {
    pub fn new() -> Envelope {
        Envelope {
            kind: EnvelopeType::default(),
            dest: UNINITIALIZED_DESTINATION,
            han: HandlerId::UNINITIALIZED,
            epoch: NO_EPOCH,
            tag: NO_TAG,
            group: DEFAULT_GROUP,
            callback: HandlerId::UNINITIALIZED,
            pipe: PipeId::UNINITIALIZED,
        }
    }

    /// An envelope for termination control traffic
    pub fn term() -> Envelope {
        let mut env = Envelope::new();
        env.set_term();
        env
    }

    pub fn set_dest(&mut self, dest: NodeType) {
        self.dest = dest;
    }

    pub fn set_handler(&mut self, han: HandlerId) {
        self.han = han;
    }

    /// Sets the tag bit, `NO_TAG` clears it
    pub fn set_tag(&mut self, tag: Tag) {
        self.kind.set(EnvelopeType::TAG, tag != NO_TAG);
        self.tag = tag;
    }

    pub fn set_broadcast(&mut self) {
        self.kind.set(EnvelopeType::BROADCAST, true);
    }

    pub fn set_term(&mut self) {
        self.kind.set(EnvelopeType::TERM, true);
    }

    pub fn set_epoch(&mut self, epoch: EpochType) {
        self.kind.set(EnvelopeType::EPOCH, epoch != NO_EPOCH);
        self.epoch = epoch;
    }

    pub fn set_group(&mut self, group: GroupType) {
        self.group = group;
    }

    pub fn set_callback(&mut self, callback: HandlerId) {
        self.kind
            .set(EnvelopeType::CALLBACK, !callback.is_uninitialized());
        self.callback = callback;
    }

    pub(crate) fn set_pipe(&mut self, pipe: PipeId) {
        self.kind.set(EnvelopeType::PIPE, true);
        self.pipe = pipe;
    }

    pub(crate) fn set_data(&mut self, on: bool) {
        self.kind.set(EnvelopeType::DATA, on);
    }

    pub fn dest(&self) -> NodeType {
        self.dest
    }

    pub fn handler(&self) -> HandlerId {
        self.han
    }

    /// the tag carried by this envelope, `NO_TAG` when untagged
    pub fn tag(&self) -> Tag {
        if self.is_tagged() {
            self.tag
        } else {
            NO_TAG
        }
    }

    pub fn epoch(&self) -> Option<EpochType> {
        self.kind.has(EnvelopeType::EPOCH).then_some(self.epoch)
    }

    pub fn group(&self) -> GroupType {
        self.group
    }

    pub fn callback(&self) -> Option<HandlerId> {
        self.kind
            .has(EnvelopeType::CALLBACK)
            .then_some(self.callback)
    }

    pub(crate) fn pipe(&self) -> Option<PipeId> {
        self.kind.has(EnvelopeType::PIPE).then_some(self.pipe)
    }

    pub fn is_term(&self) -> bool {
        self.kind.has(EnvelopeType::TERM)
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind.has(EnvelopeType::BROADCAST)
    }

    pub fn is_tagged(&self) -> bool {
        self.kind.has(EnvelopeType::TAG)
    }

    pub(crate) fn is_data(&self) -> bool {
        self.kind.has(EnvelopeType::DATA)
    }
}

/// Lays out `[envelope][payload]` into a single transport buffer
pub(crate) fn write_msg(env: &Envelope, payload: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let mut buf = vec![0u8; *ENVELOPE_LEN + payload.len()];
    crate::serialize_into(&mut buf[..*ENVELOPE_LEN], env)?;
    buf[*ENVELOPE_LEN..].copy_from_slice(payload);
    Ok(buf)
}

pub(crate) fn read_msg(buf: &[u8]) -> Result<(Envelope, &[u8]), anyhow::Error> {
    if buf.len() < *ENVELOPE_LEN {
        anyhow::bail!(
            "message of {} bytes is shorter than an envelope ({} bytes)",
            buf.len(),
            *ENVELOPE_LEN
        );
    }
    let env: Envelope = crate::deserialize(&buf[..*ENVELOPE_LEN])?;
    Ok((env, &buf[*ENVELOPE_LEN..]))
}
