use crate::config;
use std::sync::Arc;

use enum_dispatch::enum_dispatch;

pub(crate) mod error;
pub use error::TransportError;
pub(crate) use error::TransportResult;

pub(crate) mod local_lamellae;
use local_lamellae::{Local, LocalBuilder};

pub(crate) mod inproc_lamellae;
pub use inproc_lamellae::InProcFabric;
use inproc_lamellae::{InProc, InProcBuilder};

/// The list of available lamellae backends, used to specify how messages are transfered between PEs
#[derive(
    serde::Serialize, serde::Deserialize, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Clone, Copy,
)]
pub enum Backend {
    /// The Local backend -- a single PE, every message loops back to itself
    Local,
    /// The InProc backend -- several PEs living in one process, connected by channels
    InProc,
}

impl Default for Backend {
    fn default() -> Self {
        match config().backend.as_str() {
            "inproc" => Backend::InProc,
            _ => Backend::Local,
        }
    }
}

#[enum_dispatch(LamellaeInit)]
pub(crate) enum LamellaeBuilder {
    LocalBuilder,
    InProcBuilder,
}

#[enum_dispatch]
pub(crate) trait LamellaeInit {
    fn init_fabric(&mut self) -> (usize, usize); //(my_pe,num_pes)
    fn init_lamellae(&mut self) -> Arc<Lamellae>;
}

#[enum_dispatch(LamellaeComm, LamellaeAM)]
#[derive(Debug)]
pub(crate) enum Lamellae {
    Local,
    InProc,
}

#[enum_dispatch]
pub(crate) trait LamellaeComm: LamellaeAM {
    fn my_pe(&self) -> usize;
    fn num_pes(&self) -> usize;
    fn backend(&self) -> Backend;
    #[allow(non_snake_case)]
    fn MB_sent(&self) -> f64;
    /// number of transport level sends (messages and data puts) issued so far
    fn num_sends(&self) -> usize;
}

#[enum_dispatch]
pub(crate) trait LamellaeAM: Send + Sync {
    /// place `data` on the wire towards `dest`, delivery order per (src, dest) pair is FIFO
    fn send_msg_sized(&self, dest: usize, data: Vec<u8>) -> TransportResult<()>;
    /// drain every message that has arrived so far as (src, data) pairs
    fn recv_msgs(&self) -> Vec<(usize, Vec<u8>)>;
    /// stage a payload on the data channel, retrievable once by `dest` with `take_data`
    fn put_data(&self, dest: usize, tag: u64, data: Vec<u8>) -> TransportResult<()>;
    fn take_data(&self, src: usize, tag: u64) -> Option<Vec<u8>>;
}

pub(crate) fn create_lamellae(
    backend: Backend,
    fabric: Option<(Arc<InProcFabric>, usize)>,
) -> LamellaeBuilder {
    match backend {
        Backend::Local => LamellaeBuilder::LocalBuilder(LocalBuilder::new()),
        Backend::InProc => {
            let (fabric, pe) = match fabric {
                Some(fabric) => fabric,
                None => (InProcFabric::new(config().inproc_pes), 0),
            };
            LamellaeBuilder::InProcBuilder(InProcBuilder::new(fabric, pe))
        }
    }
}
