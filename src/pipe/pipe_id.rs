use crate::active_messaging::{NodeType, UNINITIALIZED_DESTINATION};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// packed layout (least significant first): [persist:1][send_back:1][node:20][ident:42]
const NODE_SHIFT: u32 = 2;
const NODE_BITS: u32 = 20;
const IDENT_SHIFT: u32 = NODE_SHIFT + NODE_BITS;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;
const IDENT_MASK: u64 = (1 << (64 - IDENT_SHIFT)) - 1;

/// Identity of a pipe: the node that created it, a per-node counter, and its delivery flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId {
    node: NodeType,
    ident: u64,
    persist: bool,
    send_back: bool,
}

impl PipeId {
    pub const UNINITIALIZED: PipeId = PipeId {
        node: UNINITIALIZED_DESTINATION,
        ident: IDENT_MASK,
        persist: true,
        send_back: true,
    };

    pub(crate) fn new(ident: u64, node: NodeType, persist: bool, send_back: bool) -> PipeId {
        PipeId {
            node,
            ident: ident & IDENT_MASK,
            persist,
            send_back,
        }
    }

    pub fn node(&self) -> NodeType {
        self.node
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }

    /// persistent pipes may be triggered any number of times
    pub fn is_persist(&self) -> bool {
        self.persist
    }

    pub fn is_send_back(&self) -> bool {
        self.send_back
    }

    pub fn pack(&self) -> u64 {
        let node = if self.node == UNINITIALIZED_DESTINATION {
            NODE_MASK
        } else {
            self.node as u64 & NODE_MASK
        };
        (self.persist as u64)
            | ((self.send_back as u64) << 1)
            | (node << NODE_SHIFT)
            | ((self.ident & IDENT_MASK) << IDENT_SHIFT)
    }

    pub fn unpack(bits: u64) -> PipeId {
        let node = (bits >> NODE_SHIFT) & NODE_MASK;
        PipeId {
            node: if node == NODE_MASK {
                UNINITIALIZED_DESTINATION
            } else {
                node as NodeType
            },
            ident: (bits >> IDENT_SHIFT) & IDENT_MASK,
            persist: bits & 1 != 0,
            send_back: bits & 2 != 0,
        }
    }
}

impl std::fmt::Debug for PipeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if *self == PipeId::UNINITIALIZED {
            return write!(f, "PipeId(uninitialized)");
        }
        write!(
            f,
            "PipeId(node: {}, id: {}, persist: {}, send_back: {})",
            self.node, self.ident, self.persist, self.send_back
        )
    }
}

impl Serialize for PipeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.pack())
    }
}

impl<'de> Deserialize<'de> for PipeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<PipeId, D::Error> {
        Ok(PipeId::unpack(u64::deserialize(deserializer)?))
    }
}
