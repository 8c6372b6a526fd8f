use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Rank index of a node (processing element) in the job
pub type NodeType = usize;

/// Sentinel node meaning "no owning node", used by auto and collective handlers
pub const UNINITIALIZED_DESTINATION: NodeType = NodeType::MAX;

pub(crate) type HandlerIdent = u64;

// packed layout (least significant first): [flags:4][node:20][ident:40]
const FLAG_BITS: u32 = 4;
const NODE_BITS: u32 = 20;
const IDENT_BITS: u32 = 40;
const FLAG_MASK: u64 = (1 << FLAG_BITS) - 1;
const NODE_MASK: u64 = (1 << NODE_BITS) - 1;
const IDENT_MASK: u64 = (1 << IDENT_BITS) - 1;

/// largest node index representable in a packed [HandlerId]
pub const MAX_NODE: NodeType = (NODE_MASK - 1) as NodeType;

const AUTO: u8 = 0b0001;
const FUNCTOR: u8 = 0b0010;
const MEMBER: u8 = 0b0100;
const COLLECTIVE: u8 = 0b1000;

/// Name of a handler: the node that owns it, a per-node identifier, and the kind flags.
///
/// The owning node can always be read straight out of the id, which is what allows
/// [send_msg_to_handler][crate::ActiveMessenger::send_msg_to_handler] to route without a lookup.
/// Auto and collective handlers exist on every node and carry [UNINITIALIZED_DESTINATION].
///
/// The struct is only packed into a single `u64` when it crosses the wire.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId {
    node: NodeType,
    ident: HandlerIdent,
    flags: u8,
}

impl HandlerId {
    pub const UNINITIALIZED: HandlerId = HandlerId {
        node: UNINITIALIZED_DESTINATION,
        ident: IDENT_MASK,
        flags: 0,
    };

    pub(crate) fn registered(ident: HandlerIdent, node: NodeType) -> HandlerId {
        assert!(
            node <= MAX_NODE,
            "node {node} cannot be encoded in a handler id (max {MAX_NODE})"
        );
        HandlerId {
            node,
            ident: ident & IDENT_MASK,
            flags: 0,
        }
    }

    pub(crate) fn collective(ident: HandlerIdent) -> HandlerId {
        HandlerId {
            node: UNINITIALIZED_DESTINATION,
            ident: ident & IDENT_MASK,
            flags: COLLECTIVE,
        }
    }

    pub(crate) fn auto(ident: HandlerIdent, is_functor: bool) -> HandlerId {
        HandlerId {
            node: UNINITIALIZED_DESTINATION,
            ident: ident & IDENT_MASK,
            flags: if is_functor { AUTO | FUNCTOR } else { AUTO },
        }
    }

    /// the node this handler was registered on, or [UNINITIALIZED_DESTINATION] when it has no owner
    pub fn node(&self) -> NodeType {
        self.node
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }

    pub fn is_auto(&self) -> bool {
        self.flags & AUTO != 0
    }

    pub fn is_functor(&self) -> bool {
        self.flags & FUNCTOR != 0
    }

    pub fn is_member(&self) -> bool {
        self.flags & MEMBER != 0
    }

    pub fn is_collective(&self) -> bool {
        self.flags & COLLECTIVE != 0
    }

    pub fn is_uninitialized(&self) -> bool {
        *self == HandlerId::UNINITIALIZED
    }

    pub fn pack(&self) -> u64 {
        let node = if self.node == UNINITIALIZED_DESTINATION {
            NODE_MASK
        } else {
            self.node as u64 & NODE_MASK
        };
        (self.flags as u64 & FLAG_MASK)
            | (node << FLAG_BITS)
            | ((self.ident & IDENT_MASK) << (FLAG_BITS + NODE_BITS))
    }

    pub fn unpack(bits: u64) -> HandlerId {
        let node = (bits >> FLAG_BITS) & NODE_MASK;
        HandlerId {
            node: if node == NODE_MASK {
                UNINITIALIZED_DESTINATION
            } else {
                node as NodeType
            },
            ident: (bits >> (FLAG_BITS + NODE_BITS)) & IDENT_MASK,
            flags: (bits & FLAG_MASK) as u8,
        }
    }
}

impl std::fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_uninitialized() {
            return write!(f, "HandlerId(uninitialized)");
        }
        write!(f, "HandlerId(")?;
        if self.node == UNINITIALIZED_DESTINATION {
            write!(f, "node: -, ")?;
        } else {
            write!(f, "node: {}, ", self.node)?;
        }
        write!(f, "id: {}", self.ident)?;
        for (flag, name) in [
            (AUTO, "auto"),
            (FUNCTOR, "functor"),
            (MEMBER, "member"),
            (COLLECTIVE, "collective"),
        ] {
            if self.flags & flag != 0 {
                write!(f, ", {name}")?;
            }
        }
        write!(f, ")")
    }
}

impl Serialize for HandlerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.pack())
    }
}

impl<'de> Deserialize<'de> for HandlerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<HandlerId, D::Error> {
        Ok(HandlerId::unpack(u64::deserialize(deserializer)?))
    }
}

impl Default for HandlerId {
    fn default() -> HandlerId {
        HandlerId::UNINITIALIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_keeps_owner_node() {
        let han = HandlerId::registered(17, 42);
        let bits = han.pack();
        assert_eq!(HandlerId::unpack(bits), han);
        assert_eq!(HandlerId::unpack(bits).node(), 42);
        assert!(!han.is_auto());
    }

    #[test]
    fn sentinel_nodes_survive_the_wire() {
        let auto = HandlerId::auto(3, true);
        let unpacked = HandlerId::unpack(auto.pack());
        assert_eq!(unpacked.node(), UNINITIALIZED_DESTINATION);
        assert!(unpacked.is_auto() && unpacked.is_functor());

        let col = HandlerId::collective(9);
        assert!(HandlerId::unpack(col.pack()).is_collective());
        assert!(HandlerId::unpack(HandlerId::UNINITIALIZED.pack()).is_uninitialized());
    }

    #[test]
    fn largest_node_fits() {
        let han = HandlerId {
            node: MAX_NODE,
            ident: 1,
            flags: MEMBER,
        };
        let unpacked = HandlerId::unpack(han.pack());
        assert_eq!(unpacked.node(), MAX_NODE);
        assert!(unpacked.is_member());
    }

    #[test]
    #[should_panic(expected = "cannot be encoded")]
    fn oversized_node_is_rejected() {
        HandlerId::registered(1, MAX_NODE + 1);
    }
}
