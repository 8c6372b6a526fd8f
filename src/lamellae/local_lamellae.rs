use super::{
    Backend, Lamellae, LamellaeAM, LamellaeComm, LamellaeInit, TransportError, TransportResult,
};

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) struct LocalBuilder {}

impl LocalBuilder {
    pub(crate) fn new() -> LocalBuilder {
        LocalBuilder {}
    }
}

impl LamellaeInit for LocalBuilder {
    fn init_fabric(&mut self) -> (usize, usize) {
        (0, 1)
    }
    fn init_lamellae(&mut self) -> Arc<Lamellae> {
        Arc::new(Lamellae::Local(Local::new()))
    }
}

pub(crate) struct Local {
    inbox: Mutex<VecDeque<Vec<u8>>>,
    data: Mutex<HashMap<u64, Vec<u8>>>,
    sends: AtomicUsize,
    bytes_sent: AtomicUsize,
}

impl std::fmt::Debug for Local {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Local")
    }
}

impl Local {
    pub(crate) fn new() -> Local {
        Local {
            inbox: Mutex::new(VecDeque::new()),
            data: Mutex::new(HashMap::new()),
            sends: AtomicUsize::new(0),
            bytes_sent: AtomicUsize::new(0),
        }
    }

    fn check_dest(&self, dest: usize) -> TransportResult<()> {
        if dest != 0 {
            return Err(TransportError::InvalidDestination { dest, num_pes: 1 });
        }
        Ok(())
    }

    fn count(&self, len: usize) {
        self.sends.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
    }
}

impl LamellaeComm for Local {
    fn my_pe(&self) -> usize {
        0
    }
    fn num_pes(&self) -> usize {
        1
    }
    fn backend(&self) -> Backend {
        Backend::Local
    }
    #[allow(non_snake_case)]
    fn MB_sent(&self) -> f64 {
        self.bytes_sent.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
    fn num_sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

impl LamellaeAM for Local {
    fn send_msg_sized(&self, dest: usize, data: Vec<u8>) -> TransportResult<()> {
        self.check_dest(dest)?;
        self.count(data.len());
        self.inbox.lock().push_back(data);
        Ok(())
    }

    fn recv_msgs(&self) -> Vec<(usize, Vec<u8>)> {
        self.inbox.lock().drain(..).map(|data| (0, data)).collect()
    }

    fn put_data(&self, dest: usize, tag: u64, data: Vec<u8>) -> TransportResult<()> {
        self.check_dest(dest)?;
        self.count(data.len());
        self.data.lock().insert(tag, data);
        Ok(())
    }

    fn take_data(&self, _src: usize, tag: u64) -> Option<Vec<u8>> {
        self.data.lock().remove(&tag)
    }
}
