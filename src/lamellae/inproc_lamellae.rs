use super::{
    Backend, Lamellae, LamellaeAM, LamellaeComm, LamellaeInit, TransportError, TransportResult,
};

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A set of PEs living in the same process, connected through unbounded channels.
///
/// Each PE builds its own messenger on a shared fabric:
///```
/// use active_messenger::{Backend, InProcFabric, MessengerBuilder};
///
/// let fabric = InProcFabric::new(4);
/// let handles = (0..4)
///     .map(|pe| {
///         let fabric = fabric.clone();
///         std::thread::spawn(move || {
///             let am = MessengerBuilder::new().with_inproc_fabric(fabric, pe).build();
///             assert_eq!(am.num_pes(), 4);
///         })
///     })
///     .collect::<Vec<_>>();
/// for h in handles {
///     h.join().unwrap();
/// }
///```
pub struct InProcFabric {
    num_pes: usize,
    queues: Vec<(Sender<(usize, Vec<u8>)>, Receiver<(usize, Vec<u8>)>)>,
    data: Mutex<HashMap<(usize, usize, u64), Vec<u8>>>, //(dest, src, tag)
}

impl std::fmt::Debug for InProcFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InProcFabric({} pes)", self.num_pes)
    }
}

impl InProcFabric {
    pub fn new(num_pes: usize) -> Arc<InProcFabric> {
        assert!(num_pes > 0, "an in-process fabric needs at least one pe");
        Arc::new(InProcFabric {
            num_pes,
            queues: (0..num_pes).map(|_| unbounded()).collect(),
            data: Mutex::new(HashMap::new()),
        })
    }

    pub fn num_pes(&self) -> usize {
        self.num_pes
    }
}

pub(crate) struct InProcBuilder {
    my_pe: usize,
    fabric: Arc<InProcFabric>,
}

impl InProcBuilder {
    pub(crate) fn new(fabric: Arc<InProcFabric>, my_pe: usize) -> InProcBuilder {
        assert!(
            my_pe < fabric.num_pes,
            "pe {} is not part of a fabric of {} pes",
            my_pe,
            fabric.num_pes
        );
        InProcBuilder { my_pe, fabric }
    }
}

impl LamellaeInit for InProcBuilder {
    fn init_fabric(&mut self) -> (usize, usize) {
        (self.my_pe, self.fabric.num_pes)
    }
    fn init_lamellae(&mut self) -> Arc<Lamellae> {
        Arc::new(Lamellae::InProc(InProc {
            my_pe: self.my_pe,
            fabric: self.fabric.clone(),
            sends: AtomicUsize::new(0),
            bytes_sent: AtomicUsize::new(0),
        }))
    }
}

pub(crate) struct InProc {
    my_pe: usize,
    fabric: Arc<InProcFabric>,
    sends: AtomicUsize,
    bytes_sent: AtomicUsize,
}

impl std::fmt::Debug for InProc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InProc(pe {} of {})", self.my_pe, self.fabric.num_pes)
    }
}

impl InProc {
    fn check_dest(&self, dest: usize) -> TransportResult<()> {
        if dest >= self.fabric.num_pes {
            return Err(TransportError::InvalidDestination {
                dest,
                num_pes: self.fabric.num_pes,
            });
        }
        Ok(())
    }

    fn count(&self, len: usize) {
        self.sends.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(len, Ordering::Relaxed);
    }
}

impl LamellaeComm for InProc {
    fn my_pe(&self) -> usize {
        self.my_pe
    }
    fn num_pes(&self) -> usize {
        self.fabric.num_pes
    }
    fn backend(&self) -> Backend {
        Backend::InProc
    }
    #[allow(non_snake_case)]
    fn MB_sent(&self) -> f64 {
        self.bytes_sent.load(Ordering::SeqCst) as f64 / 1_000_000.0
    }
    fn num_sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

impl LamellaeAM for InProc {
    fn send_msg_sized(&self, dest: usize, data: Vec<u8>) -> TransportResult<()> {
        self.check_dest(dest)?;
        self.count(data.len());
        self.fabric.queues[dest]
            .0
            .send((self.my_pe, data))
            .map_err(|_| TransportError::Disconnected(dest))
    }

    fn recv_msgs(&self) -> Vec<(usize, Vec<u8>)> {
        self.fabric.queues[self.my_pe].1.try_iter().collect()
    }

    fn put_data(&self, dest: usize, tag: u64, data: Vec<u8>) -> TransportResult<()> {
        self.check_dest(dest)?;
        self.count(data.len());
        self.fabric
            .data
            .lock()
            .insert((dest, self.my_pe, tag), data);
        Ok(())
    }

    fn take_data(&self, src: usize, tag: u64) -> Option<Vec<u8>> {
        self.fabric.data.lock().remove(&(self.my_pe, src, tag))
    }
}
