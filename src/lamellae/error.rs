#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    InvalidDestination { dest: usize, num_pes: usize },
    Disconnected(usize),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::InvalidDestination { dest, num_pes } => {
                write!(f, "destination pe {} does not exist (num_pes: {})", dest, num_pes)
            }
            TransportError::Disconnected(pe) => {
                write!(f, "pe {} is no longer reachable", pe)
            }
        }
    }
}

impl std::error::Error for TransportError {}

pub(crate) type TransportResult<T> = Result<T, TransportError>;
