use crate::envelope::EnvelopeError;
use sgy_consensus::ApplyError;
use sgy_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("storage: {0}")]
    Storage(#[from] LedgerError),

    #[error("crypto: {0}")]
    Crypto(#[from] sgy_crypto::CryptoError),

    #[error("no block stored at height {0}")]
    MissingBlock(i64),

    #[error("operation requires an attached database")]
    NoDatabase,

    #[error("transaction rejected: {0}")]
    TxRejected(&'static str),

    #[error("{0}")]
    Protocol(String),
}
