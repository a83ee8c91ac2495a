use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("buffer overrun: slot {0} reported ready before the previous half was released")]
    Overrun(usize),

    #[error("failed to arm the sampling transfer: {0}")]
    AcquisitionStart(String),

    #[error("packet serial counter wrapped around")]
    SerialWraparound,

    #[error("cipher backend failure: {0}")]
    CryptoBackend(String),

    #[error("mel triangle {index} spans bins {offset}..{end}, outside the {limit}-bin spectrum")]
    FilterOutOfRange {
        index: usize,
        offset: usize,
        end: usize,
        limit: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("packet authentication tag mismatch")]
    TagMismatch,

    #[error("radio send failed: {0}")]
    RadioSend(String),

    #[error("pipeline halted by a previous fatal error")]
    Halted,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
