use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod shared;

pub use chain::{ChainSnapshot, Ledger, LedgerConfig, MineOutcome, MiningMode};
pub use error::LedgerError;
pub use shared::SharedLedger;

/// Hex-encoded SHA-256 digest.
pub type Hash = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender: String,
    pub recipient: String,
    pub amount: u64,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>, amount: u64) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            amount,
        }
    }

    fn write_canonical(&self, out: &mut String) {
        out.push_str("{\"amount\":");
        out.push_str(&self.amount.to_string());
        out.push_str(",\"recipient\":");
        push_json_str(out, &self.recipient);
        out.push_str(",\"sender\":");
        push_json_str(out, &self.sender);
        out.push('}');
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    pub timestamp: u64,
    pub previous_hash: Hash,
    pub nonce: u64,
    /// Set by the ledger once the block is accepted onto the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash>,
}

impl Block {
    /// Unsealed block stamped with the current time and nonce 0.
    pub fn candidate(index: u64, previous_hash: Hash, transactions: Vec<Transaction>) -> Self {
        Self {
            index,
            transactions,
            timestamp: unix_now(),
            previous_hash,
            nonce: 0,
            hash: None,
        }
    }

    /// Index 0, no transactions, sentinel linkage. Not yet sealed.
    pub fn genesis() -> Self {
        Self::candidate(0, constants::GENESIS_PREVIOUS_HASH.to_string(), vec![])
    }

    pub fn is_sealed(&self) -> bool {
        self.hash.is_some()
    }

    /// Digest of the block content at its current nonce. Excludes `hash`.
    pub fn compute_hash(&self) -> Hash {
        self.digest_at(self.nonce)
    }

    /// Digest of the block content as if `nonce` were stored in it.
    pub fn digest_at(&self, nonce: u64) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_encoding(nonce).as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Compact JSON with keys written in sorted order:
    /// `index`, `nonce`, `previous_hash`, `timestamp`, `transactions`.
    /// Transactions are encoded as `amount`, `recipient`, `sender`.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        self.canonical_encoding(self.nonce).into_bytes()
    }

    fn canonical_encoding(&self, nonce: u64) -> String {
        let mut out = String::with_capacity(128 + self.transactions.len() * 64);
        out.push_str("{\"index\":");
        out.push_str(&self.index.to_string());
        out.push_str(",\"nonce\":");
        out.push_str(&nonce.to_string());
        out.push_str(",\"previous_hash\":");
        push_json_str(&mut out, &self.previous_hash);
        out.push_str(",\"timestamp\":");
        out.push_str(&self.timestamp.to_string());
        out.push_str(",\"transactions\":[");
        for (i, tx) in self.transactions.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            tx.write_canonical(&mut out);
        }
        out.push_str("]}");
        out
    }
}

fn push_json_str(out: &mut String, s: &str) {
    // `Value`'s Display escapes exactly as serde_json does and cannot fail.
    out.push_str(&serde_json::Value::from(s).to_string());
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

pub mod pow {
    use super::{Block, Hash};

    /// True when the first `difficulty` characters of `digest` are all `'0'`.
    pub fn meets_difficulty(digest: &str, difficulty: usize) -> bool {
        digest.len() >= difficulty && digest.bytes().take(difficulty).all(|b| b == b'0')
    }

    pub fn count_leading_zero_hex(digest: &str) -> usize {
        digest.bytes().take_while(|b| *b == b'0').count()
    }

    /// Increment the nonce from its current value until the block digest
    /// meets `difficulty`. The winning nonce is left in `block.nonce`.
    ///
    /// Returns `None` only if the nonce space runs out.
    pub fn search(block: &mut Block, difficulty: usize) -> Option<Hash> {
        loop {
            let digest = block.compute_hash();
            if meets_difficulty(&digest, difficulty) {
                return Some(digest);
            }
            block.nonce = block.nonce.checked_add(1)?;
        }
    }
}
