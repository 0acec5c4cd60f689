use thiserror::Error;

/// Reasons the ledger refuses a candidate block or reports a damaged chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The candidate was built against a block that is no longer the tip.
    #[error("candidate links to {found}, but the tip hash is {expected}")]
    LinkageMismatch { expected: String, found: String },

    /// The digest lacks the zero prefix or does not match the block content.
    #[error("invalid proof for block {index}")]
    InvalidProof { index: u64 },

    /// A sealed block's stored hash no longer matches its content.
    #[error("stored hash of block {index} does not match its content")]
    CorruptedBlock { index: u64 },

    #[error("block {index} does not link to its predecessor")]
    BrokenLink { index: u64 },

    #[error("block {index} is out of sequence")]
    IndexGap { index: u64 },

    #[error("genesis block is malformed")]
    InvalidGenesis,

    #[error("nonce space exhausted without meeting the difficulty")]
    NonceSpaceExhausted,

    #[error("ledger lock poisoned")]
    Poisoned,
}
