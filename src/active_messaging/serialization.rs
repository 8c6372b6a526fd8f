//! Static selection of how a message type travels over the wire.
//!
//! Every [Message] names exactly one [Strategy] through its associated type, so the choice
//! between raw bytes, reflective serialization, and custom header/body packing is made at
//! compile time and is the same for every send style (typed function, explicit handler id,
//! functor) and for both unicast and broadcast.
use crate::active_messaging::envelope::Envelope;
use crate::active_messaging::{Action, EventId};
use crate::messenger::ActiveMessenger;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The closed set of transport strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// `size_of::<M>()` bytes copied verbatim
    RawBytes,
    /// serde traversal through bincode
    Reflective,
    /// raw header, embedded length, serialized body
    Parserdes,
}

/// A type that can be carried by an active message.
///
/// Usually implemented through one of the attribute macros: [AmRaw][crate::AmRaw],
/// [AmData][crate::AmData] or [AmParserdes][crate::AmParserdes].
pub trait Message: Send + Sized + 'static {
    type Strategy: Strategy<Self>;
}

/// Marker for plain-old-data messages that may be copied byte for byte.
///
/// # Safety
/// Implementors must be `#[repr(C)]` (or otherwise have a layout identical on every rank),
/// contain no pointers or references, and be valid for any byte pattern produced by copying a
/// value of the same type.
///
/// Encoding views the whole value as `size_of::<Self>()` bytes. Types with padding (for
/// example `{ a: i32, b: f64 }` under `repr(C)`) therefore expose their padding bytes, which
/// Rust treats as uninitialized memory. That is a known limitation of the raw strategy: lay such
/// types out without implicit padding (add explicit filler fields, or order fields by
/// alignment) when fully defined behaviour matters, or use [AmData][crate::AmData] instead.
pub unsafe trait RawMessage: Copy + Send + 'static {}

/// Messages with a fixed-size raw header followed by a variable-size serialized body
pub trait Parserdes: Send + Sized + 'static {
    type Header: RawMessage;
    type Body: Serialize + DeserializeOwned;
    fn split(self) -> (Self::Header, Self::Body);
    fn join(header: Self::Header, body: Self::Body) -> Self;
}

mod private {
    pub trait Sealed {}
}

/// Encode/decode and dispatch rules for one [StrategyKind]
pub trait Strategy<M>: private::Sealed {
    const KIND: StrategyKind;

    fn encode(msg: M) -> Result<Vec<u8>, anyhow::Error>;

    fn decode(bytes: &[u8]) -> Result<M, anyhow::Error>;

    #[doc(hidden)]
    fn send_msg(am: &ActiveMessenger, env: Envelope, msg: M, action: Option<Action>) -> EventId;

    #[doc(hidden)]
    fn broadcast_msg(
        am: &ActiveMessenger,
        env: Envelope,
        msg: M,
        action: Option<Action>,
    ) -> EventId;
}

pub struct RawBytesStrategy;
pub struct ReflectiveStrategy;
pub struct ParserdesStrategy;

impl private::Sealed for RawBytesStrategy {}
impl private::Sealed for ReflectiveStrategy {}
impl private::Sealed for ParserdesStrategy {}

/// Number of sends routed through each strategy on one messenger
#[derive(Debug, Default)]
pub struct RouterStats {
    raw: AtomicUsize,
    reflective: AtomicUsize,
    parserdes: AtomicUsize,
}

impl RouterStats {
    pub(crate) fn record(&self, kind: StrategyKind) {
        self.counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    fn counter(&self, kind: StrategyKind) -> &AtomicUsize {
        match kind {
            StrategyKind::RawBytes => &self.raw,
            StrategyKind::Reflective => &self.reflective,
            StrategyKind::Parserdes => &self.parserdes,
        }
    }

    pub fn count(&self, kind: StrategyKind) -> usize {
        self.counter(kind).load(Ordering::Relaxed)
    }
}

fn reject_tag<M>(env: &Envelope, kind: StrategyKind) {
    if env.is_tagged() {
        panic!(
            "tagged + serialized send not supported: message {} uses the {:?} strategy (tag {})",
            std::any::type_name::<M>(),
            kind,
            env.tag()
        );
    }
}

fn encode_or_abort<M, S: Strategy<M>>(msg: M) -> Vec<u8> {
    match S::encode(msg) {
        Ok(bytes) => bytes,
        Err(e) => panic!(
            "failed to encode {} with the {:?} strategy: {e}",
            std::any::type_name::<M>(),
            S::KIND
        ),
    }
}

fn raw_to_bytes<T: RawMessage>(val: &T, buf: &mut Vec<u8>) {
    // SAFETY: RawMessage guarantees T is plain data that can be viewed as bytes, padding bytes
    // are read as they are (see the RawMessage docs)
    let bytes = unsafe {
        std::slice::from_raw_parts(val as *const T as *const u8, std::mem::size_of::<T>())
    };
    buf.extend_from_slice(bytes);
}

fn raw_from_bytes<T: RawMessage>(bytes: &[u8]) -> Result<T, anyhow::Error> {
    if bytes.len() < std::mem::size_of::<T>() {
        anyhow::bail!(
            "expected {} bytes for {}, found {}",
            std::mem::size_of::<T>(),
            std::any::type_name::<T>(),
            bytes.len()
        );
    }
    // SAFETY: length checked above, RawMessage types are valid for any copied byte pattern
    Ok(unsafe { std::ptr::read_unaligned(bytes.as_ptr() as *const T) })
}

impl<M: RawMessage> Strategy<M> for RawBytesStrategy {
    const KIND: StrategyKind = StrategyKind::RawBytes;

    fn encode(msg: M) -> Result<Vec<u8>, anyhow::Error> {
        let mut buf = Vec::with_capacity(std::mem::size_of::<M>());
        raw_to_bytes(&msg, &mut buf);
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<M, anyhow::Error> {
        if bytes.len() != std::mem::size_of::<M>() {
            anyhow::bail!(
                "raw message {} is {} bytes, received {}",
                std::any::type_name::<M>(),
                std::mem::size_of::<M>(),
                bytes.len()
            );
        }
        raw_from_bytes(bytes)
    }

    fn send_msg(am: &ActiveMessenger, env: Envelope, msg: M, action: Option<Action>) -> EventId {
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        am.send_msg_sized(env, bytes, action)
    }

    fn broadcast_msg(
        am: &ActiveMessenger,
        env: Envelope,
        msg: M,
        action: Option<Action>,
    ) -> EventId {
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        am.send_msg_sized(env, bytes, action)
    }
}

impl<M> Strategy<M> for ReflectiveStrategy
where
    M: Serialize + DeserializeOwned + Send + 'static,
{
    const KIND: StrategyKind = StrategyKind::Reflective;

    fn encode(msg: M) -> Result<Vec<u8>, anyhow::Error> {
        crate::serialize(&msg)
    }

    fn decode(bytes: &[u8]) -> Result<M, anyhow::Error> {
        crate::deserialize(bytes)
    }

    fn send_msg(am: &ActiveMessenger, env: Envelope, msg: M, action: Option<Action>) -> EventId {
        reject_tag::<M>(&env, <Self as Strategy<M>>::KIND);
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        if bytes.len() > am.eager_size() {
            am.send_data_msg(env, bytes, action)
        } else {
            am.send_msg_sized(env, bytes, action)
        }
    }

    // broadcasts always carry the payload inline
    fn broadcast_msg(
        am: &ActiveMessenger,
        env: Envelope,
        msg: M,
        action: Option<Action>,
    ) -> EventId {
        reject_tag::<M>(&env, <Self as Strategy<M>>::KIND);
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        am.send_msg_sized(env, bytes, action)
    }
}

const BODY_LEN_BYTES: usize = std::mem::size_of::<u64>();

impl<M: Parserdes> Strategy<M> for ParserdesStrategy {
    const KIND: StrategyKind = StrategyKind::Parserdes;

    // [header raw][body len: u64 le][body]
    fn encode(msg: M) -> Result<Vec<u8>, anyhow::Error> {
        let (header, body) = msg.split();
        let body = crate::serialize(&body)?;
        let mut buf =
            Vec::with_capacity(std::mem::size_of::<M::Header>() + BODY_LEN_BYTES + body.len());
        raw_to_bytes(&header, &mut buf);
        buf.extend_from_slice(&(body.len() as u64).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<M, anyhow::Error> {
        let header_len = std::mem::size_of::<M::Header>();
        if bytes.len() < header_len + BODY_LEN_BYTES {
            anyhow::bail!(
                "parserdes message {} truncated at {} bytes",
                std::any::type_name::<M>(),
                bytes.len()
            );
        }
        let header: M::Header = raw_from_bytes(&bytes[..header_len])?;
        let mut len = [0u8; BODY_LEN_BYTES];
        len.copy_from_slice(&bytes[header_len..header_len + BODY_LEN_BYTES]);
        let len = u64::from_le_bytes(len) as usize;
        let body_start = header_len + BODY_LEN_BYTES;
        if bytes.len() - body_start != len {
            anyhow::bail!(
                "parserdes body length mismatch: header says {} bytes, found {}",
                len,
                bytes.len() - body_start
            );
        }
        let body: M::Body = crate::deserialize(&bytes[body_start..])?;
        Ok(M::join(header, body))
    }

    fn send_msg(am: &ActiveMessenger, env: Envelope, msg: M, action: Option<Action>) -> EventId {
        reject_tag::<M>(&env, <Self as Strategy<M>>::KIND);
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        am.send_msg_sized(env, bytes, action)
    }

    fn broadcast_msg(
        am: &ActiveMessenger,
        env: Envelope,
        msg: M,
        action: Option<Action>,
    ) -> EventId {
        reject_tag::<M>(&env, <Self as Strategy<M>>::KIND);
        am.stats().record(<Self as Strategy<M>>::KIND);
        let bytes = encode_or_abort::<M, Self>(msg);
        am.send_msg_sized(env, bytes, action)
    }
}

/// The strategy a message type is routed through
pub fn strategy_of<M: Message>() -> StrategyKind {
    <M::Strategy as Strategy<M>>::KIND
}

macro_rules! impl_raw_message {
    ($($t:ty),*) => {
        $(
            unsafe impl RawMessage for $t {}
            impl Message for $t {
                type Strategy = RawBytesStrategy;
            }
        )*
    };
}

impl_raw_message!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, ());

unsafe impl<T: RawMessage, const N: usize> RawMessage for [T; N] {}
impl<T: RawMessage, const N: usize> Message for [T; N] {
    type Strategy = RawBytesStrategy;
}

impl Message for String {
    type Strategy = ReflectiveStrategy;
}

impl<T: Serialize + DeserializeOwned + Send + 'static> Message for Vec<T> {
    type Strategy = ReflectiveStrategy;
}

impl Message for serde_bytes::ByteBuf {
    type Strategy = ReflectiveStrategy;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq)]
    #[repr(C)]
    struct Header {
        kind: u32,
        scale: f32,
    }
    unsafe impl RawMessage for Header {}

    #[derive(Debug, PartialEq)]
    struct Packed {
        header: Header,
        names: Vec<String>,
    }

    impl Parserdes for Packed {
        type Header = Header;
        type Body = Vec<String>;
        fn split(self) -> (Header, Vec<String>) {
            (self.header, self.names)
        }
        fn join(header: Header, names: Vec<String>) -> Packed {
            Packed { header, names }
        }
    }

    impl Message for Packed {
        type Strategy = ParserdesStrategy;
    }

    #[test]
    fn parserdes_layout_embeds_body_length() {
        let msg = Packed {
            header: Header {
                kind: 7,
                scale: 0.5,
            },
            names: vec!["a".to_owned(), "bc".to_owned()],
        };
        let bytes = <ParserdesStrategy as Strategy<Packed>>::encode(msg).unwrap();
        let header_len = std::mem::size_of::<Header>();
        assert_eq!(&bytes[..4], &7u32.to_ne_bytes());
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[header_len..header_len + 8]);
        assert_eq!(u64::from_le_bytes(len) as usize, bytes.len() - header_len - 8);

        let back = <ParserdesStrategy as Strategy<Packed>>::decode(&bytes).unwrap();
        assert_eq!(back.header.kind, 7);
        assert_eq!(back.names, vec!["a", "bc"]);
        assert!(<ParserdesStrategy as Strategy<Packed>>::decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn raw_decode_checks_length() {
        assert!(<RawBytesStrategy as Strategy<u64>>::decode(&[0u8; 7]).is_err());
        let bytes = <RawBytesStrategy as Strategy<u64>>::encode(0xdead_beef_u64).unwrap();
        assert_eq!(bytes, 0xdead_beef_u64.to_ne_bytes());
    }

    #[test]
    fn builtin_strategies() {
        assert_eq!(strategy_of::<u32>(), StrategyKind::RawBytes);
        assert_eq!(strategy_of::<[f64; 4]>(), StrategyKind::RawBytes);
        assert_eq!(strategy_of::<String>(), StrategyKind::Reflective);
        assert_eq!(strategy_of::<Vec<u8>>(), StrategyKind::Reflective);
        assert_eq!(strategy_of::<Packed>(), StrategyKind::Parserdes);
    }
}
