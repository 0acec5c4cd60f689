use crate::{
    constants::{DEFAULT_DIFFICULTY, GENESIS_PREVIOUS_HASH},
    mine::search_parallel,
    pow, Block, Hash, LedgerError, Transaction,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How the nonce search is run when mining.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MiningMode {
    /// Single-threaded, on the calling thread.
    #[default]
    Sequential,
    /// Spread across the rayon thread pool.
    Parallel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Leading zero hex characters a block digest must carry.
    pub difficulty: usize,
    pub mining: MiningMode,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: DEFAULT_DIFFICULTY,
            mining: MiningMode::Sequential,
        }
    }
}

/// Result of a call to [`Ledger::mine`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum MineOutcome {
    Mined { index: u64, nonce: u64, hash: Hash },
    /// The pending pool was empty; nothing changed.
    NothingToMine,
}

/// Read-only view of the chain as served to clients.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub length: usize,
    pub chain: Vec<Block>,
}

/// In-memory chain of sealed blocks plus the pool of pending transactions.
///
/// The chain is never empty: construction seals a genesis block, and blocks
/// are only ever appended through [`Ledger::add_block`].
#[derive(Clone, Debug)]
pub struct Ledger {
    chain: Vec<Block>,
    pending: Vec<Transaction>,
    config: LedgerConfig,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::with_config(LedgerConfig::default())
    }
}

impl Ledger {
    pub fn new(difficulty: usize) -> Self {
        Self::with_config(LedgerConfig {
            difficulty,
            ..LedgerConfig::default()
        })
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let mut ledger = Self {
            chain: Vec::new(),
            pending: Vec::new(),
            config,
        };
        ledger.construct_genesis();
        ledger
    }

    /// Genesis is sealed with its plain digest; no proof-of-work is done, so
    /// its hash need not meet the difficulty.
    fn construct_genesis(&mut self) {
        let mut genesis = Block::genesis();
        let hash = genesis.compute_hash();
        info!(%hash, "genesis block sealed");
        genesis.hash = Some(hash);
        self.chain.push(genesis);
    }

    pub fn difficulty(&self) -> usize {
        self.config.difficulty
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn pending(&self) -> &[Transaction] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Always false: genesis is present from construction.
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.chain.get(i))
    }

    /// The tip of the chain.
    pub fn last_block(&self) -> &Block {
        // Construction pushes genesis and nothing ever pops.
        &self.chain[self.chain.len() - 1]
    }

    fn tip_hash(&self) -> &str {
        self.last_block().hash.as_deref().unwrap_or_default()
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            length: self.chain.len(),
            chain: self.chain.clone(),
        }
    }

    /// Append a transaction to the pending pool. Returns the index of the
    /// block that will include it.
    pub fn submit(&mut self, tx: Transaction) -> u64 {
        debug!(sender = %tx.sender, recipient = %tx.recipient, amount = tx.amount, "transaction queued");
        self.pending.push(tx);
        self.last_block().index + 1
    }

    pub fn submit_transaction(
        &mut self,
        sender: impl Into<String>,
        recipient: impl Into<String>,
        amount: u64,
    ) -> u64 {
        self.submit(Transaction::new(sender, recipient, amount))
    }

    /// Search for a nonce that makes the candidate's digest meet the
    /// difficulty. The winning nonce is left in `candidate.nonce`.
    ///
    /// Blocks until a nonce is found; returns `None` only if the nonce space
    /// is exhausted.
    pub fn proof_of_work(&self, candidate: &mut Block) -> Option<Hash> {
        match self.config.mining {
            MiningMode::Sequential => pow::search(candidate, self.config.difficulty),
            MiningMode::Parallel => search_parallel(candidate, self.config.difficulty),
        }
    }

    /// The digest must carry the zero prefix and equal a fresh digest of the
    /// block as it stands now.
    pub fn is_valid_proof(&self, block: &Block, digest: &str) -> bool {
        pow::meets_difficulty(digest, self.config.difficulty) && digest == block.compute_hash()
    }

    /// Seal `candidate` with `proof` and append it. This is the only way the
    /// chain grows past genesis. On error the chain is left untouched.
    pub fn add_block(&mut self, mut candidate: Block, proof: Hash) -> Result<u64, LedgerError> {
        let tip_hash = self.tip_hash();
        if candidate.previous_hash != tip_hash {
            warn!(
                index = candidate.index,
                tip = %tip_hash,
                previous_hash = %candidate.previous_hash,
                "rejected stale candidate"
            );
            return Err(LedgerError::LinkageMismatch {
                expected: tip_hash.to_string(),
                found: candidate.previous_hash,
            });
        }
        let expected_index = self.last_block().index + 1;
        if candidate.index != expected_index {
            warn!(index = candidate.index, expected_index, "rejected out-of-sequence candidate");
            return Err(LedgerError::IndexGap {
                index: candidate.index,
            });
        }
        if !self.is_valid_proof(&candidate, &proof) {
            warn!(index = candidate.index, %proof, "rejected invalid proof");
            return Err(LedgerError::InvalidProof {
                index: candidate.index,
            });
        }

        let index = candidate.index;
        candidate.hash = Some(proof);
        self.chain.push(candidate);
        Ok(index)
    }

    /// Package every pending transaction into a new block, mine it and
    /// append it. The pool is cleared only once the block is accepted.
    pub fn mine(&mut self) -> Result<MineOutcome, LedgerError> {
        if self.pending.is_empty() {
            debug!("nothing to mine");
            return Ok(MineOutcome::NothingToMine);
        }

        let tip = self.last_block();
        let mut candidate = Block::candidate(
            tip.index + 1,
            self.tip_hash().to_string(),
            self.pending.clone(),
        );

        let proof = self
            .proof_of_work(&mut candidate)
            .ok_or(LedgerError::NonceSpaceExhausted)?;
        let nonce = candidate.nonce;
        let tx_count = candidate.transactions.len();

        let index = self.add_block(candidate, proof.clone())?;
        self.pending.clear();

        info!(index, nonce, hash = %proof, tx_count, "mined block");
        Ok(MineOutcome::Mined {
            index,
            nonce,
            hash: proof,
        })
    }

    /// Walk the whole chain recomputing digests and checking linkage.
    pub fn validate_chain(&self) -> Result<(), LedgerError> {
        validate_blocks(&self.chain, self.config.difficulty)
    }
}

/// Integrity sweep over an ordered run of sealed blocks starting at genesis.
///
/// Every stored hash must match the recomputed digest, every block after
/// genesis must link to its predecessor, follow its index and meet
/// `difficulty`.
pub fn validate_blocks(blocks: &[Block], difficulty: usize) -> Result<(), LedgerError> {
    let genesis = blocks.first().ok_or(LedgerError::InvalidGenesis)?;
    if genesis.index != 0 || genesis.previous_hash != GENESIS_PREVIOUS_HASH {
        return Err(LedgerError::InvalidGenesis);
    }
    check_stored_hash(genesis)?;

    for pair in blocks.windows(2) {
        let (prev, current) = (&pair[0], &pair[1]);
        let stored = check_stored_hash(current)?;
        if Some(current.previous_hash.as_str()) != prev.hash.as_deref() {
            return Err(LedgerError::BrokenLink {
                index: current.index,
            });
        }
        if current.index != prev.index + 1 {
            return Err(LedgerError::IndexGap {
                index: current.index,
            });
        }
        if !pow::meets_difficulty(stored, difficulty) {
            return Err(LedgerError::InvalidProof {
                index: current.index,
            });
        }
    }
    Ok(())
}

fn check_stored_hash(block: &Block) -> Result<&str, LedgerError> {
    match block.hash.as_deref() {
        Some(stored) if stored == block.compute_hash() => Ok(stored),
        _ => Err(LedgerError::CorruptedBlock { index: block.index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice_to_bob(amount: u64) -> Transaction {
        Transaction::new("alice", "bob", amount)
    }

    #[test]
    fn genesis_exists_after_construction() {
        let ledger = Ledger::new(2);
        assert_eq!(ledger.len(), 1);
        let genesis = ledger.last_block();
        assert_eq!(genesis.index, 0);
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis.previous_hash, "0");
        assert_eq!(genesis.nonce, 0);
        assert_eq!(genesis.hash.as_deref(), Some(genesis.compute_hash().as_str()));
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn genesis_bypasses_difficulty() {
        // 64 zeros is unreachable, yet construction must still complete.
        let ledger = Ledger::new(64);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.validate_chain().is_ok());
    }

    #[test]
    fn submit_queues_transactions_in_order() {
        let mut ledger = Ledger::new(1);
        assert_eq!(ledger.submit(alice_to_bob(1)), 1);
        assert_eq!(ledger.submit_transaction("bob", "carol", 2), 1);
        assert_eq!(ledger.pending(), &[alice_to_bob(1), Transaction::new("bob", "carol", 2)]);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn mine_with_empty_pool_is_a_no_op() {
        let mut ledger = Ledger::new(2);
        let before = ledger.chain().to_vec();
        assert_eq!(ledger.mine(), Ok(MineOutcome::NothingToMine));
        assert_eq!(ledger.chain(), before.as_slice());
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn mine_appends_linked_block_and_clears_pool() {
        let mut ledger = Ledger::new(2);
        let prior_tip = ledger.last_block().hash.clone();
        let txs = vec![alice_to_bob(1), alice_to_bob(2), Transaction::new("carol", "dave", 3)];
        for tx in &txs {
            ledger.submit(tx.clone());
        }

        let outcome = ledger.mine().unwrap();
        let MineOutcome::Mined { index, nonce, hash } = outcome else {
            panic!("expected a mined block");
        };
        assert_eq!(index, 1);
        assert_eq!(ledger.len(), 2);
        assert!(ledger.pending().is_empty());

        let block = ledger.last_block();
        assert_eq!(block.previous_hash, prior_tip.unwrap());
        assert_eq!(block.transactions, txs);
        assert_eq!(block.nonce, nonce);
        assert_eq!(block.hash.as_deref(), Some(hash.as_str()));
        assert!(hash.starts_with("00"));
        assert!(ledger.validate_chain().is_ok());
    }

    #[test]
    fn proof_of_work_result_reproduces() {
        let ledger = Ledger::new(3);
        let mut candidate = Block::candidate(1, ledger.tip_hash().to_string(), vec![alice_to_bob(9)]);
        let digest = ledger.proof_of_work(&mut candidate).unwrap();
        assert!(digest.starts_with("000"));
        assert_eq!(digest, candidate.compute_hash());
        assert!(ledger.is_valid_proof(&candidate, &digest));
    }

    #[test]
    fn proof_of_work_with_zero_difficulty_keeps_nonce() {
        let ledger = Ledger::new(0);
        let mut candidate = Block::candidate(1, ledger.tip_hash().to_string(), vec![]);
        let digest = ledger.proof_of_work(&mut candidate).unwrap();
        assert_eq!(candidate.nonce, 0);
        assert_eq!(digest, candidate.compute_hash());
    }

    #[test]
    fn parallel_mode_mines_valid_blocks() {
        let mut ledger = Ledger::with_config(LedgerConfig {
            difficulty: 2,
            mining: MiningMode::Parallel,
        });
        ledger.submit(alice_to_bob(5));
        assert!(matches!(ledger.mine(), Ok(MineOutcome::Mined { index: 1, .. })));
        ledger.submit(alice_to_bob(6));
        assert!(matches!(ledger.mine(), Ok(MineOutcome::Mined { index: 2, .. })));
        assert!(ledger.validate_chain().is_ok());
    }

    #[test]
    fn add_block_rejects_stale_tip() {
        let mut ledger = Ledger::new(1);
        let stale_tip = ledger.tip_hash().to_string();
        ledger.submit(alice_to_bob(1));
        ledger.mine().unwrap();

        let mut candidate = Block::candidate(1, stale_tip, vec![alice_to_bob(2)]);
        let proof = ledger.proof_of_work(&mut candidate).unwrap();
        let err = ledger.add_block(candidate, proof).unwrap_err();
        assert!(matches!(err, LedgerError::LinkageMismatch { .. }));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn add_block_rejects_out_of_sequence_index() {
        let mut ledger = Ledger::new(1);
        let mut candidate = Block::candidate(42, ledger.tip_hash().to_string(), vec![alice_to_bob(1)]);
        let proof = ledger.proof_of_work(&mut candidate).unwrap();
        assert!(ledger.is_valid_proof(&candidate, &proof));

        assert_eq!(
            ledger.add_block(candidate, proof),
            Err(LedgerError::IndexGap { index: 42 })
        );
        assert_eq!(ledger.len(), 1);
        assert!(ledger.validate_chain().is_ok());
    }

    #[test]
    fn add_block_rejects_tampered_candidate() {
        let mut ledger = Ledger::new(2);
        let mut candidate = Block::candidate(1, ledger.tip_hash().to_string(), vec![alice_to_bob(10)]);
        let proof = ledger.proof_of_work(&mut candidate).unwrap();
        candidate.transactions[0].amount = 11;

        assert!(!ledger.is_valid_proof(&candidate, &proof));
        assert_eq!(
            ledger.add_block(candidate, proof),
            Err(LedgerError::InvalidProof { index: 1 })
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn add_block_rejects_digest_without_prefix() {
        let mut ledger = Ledger::new(2);
        let mut candidate = Block::candidate(1, ledger.tip_hash().to_string(), vec![alice_to_bob(1)]);
        // Find a nonce whose digest matches content but lacks the prefix.
        while pow::meets_difficulty(&candidate.compute_hash(), 2) {
            candidate.nonce += 1;
        }
        let digest = candidate.compute_hash();
        assert!(!ledger.is_valid_proof(&candidate, &digest));
        assert!(ledger.add_block(candidate, digest).is_err());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn add_block_accepts_valid_candidate() {
        let mut ledger = Ledger::new(1);
        let mut candidate = Block::candidate(1, ledger.tip_hash().to_string(), vec![alice_to_bob(1)]);
        let proof = ledger.proof_of_work(&mut candidate).unwrap();
        assert_eq!(ledger.add_block(candidate, proof.clone()), Ok(1));
        assert_eq!(ledger.last_block().hash, Some(proof));
        // add_block does not touch the pending pool.
        assert!(ledger.pending().is_empty());
    }

    #[test]
    fn validate_chain_detects_tampering() {
        let mut ledger = Ledger::new(1);
        for amount in 1..=3 {
            ledger.submit(alice_to_bob(amount));
            ledger.mine().unwrap();
        }
        assert!(ledger.validate_chain().is_ok());

        let mut blocks = ledger.chain().to_vec();
        blocks[2].transactions[0].amount = 99;
        assert_eq!(
            validate_blocks(&blocks, 1),
            Err(LedgerError::CorruptedBlock { index: 2 })
        );

        // Re-sealing the tampered block breaks the link from its successor.
        let mut resealed = blocks[2].clone();
        pow::search(&mut resealed, 1).unwrap();
        resealed.hash = Some(resealed.compute_hash());
        blocks[2] = resealed;
        assert_eq!(
            validate_blocks(&blocks, 1),
            Err(LedgerError::BrokenLink { index: 3 })
        );
    }

    #[test]
    fn validate_chain_detects_bad_genesis_and_gaps() {
        assert_eq!(validate_blocks(&[], 0), Err(LedgerError::InvalidGenesis));

        let mut ledger = Ledger::new(0);
        ledger.submit(alice_to_bob(1));
        ledger.mine().unwrap();
        let mut blocks = ledger.chain().to_vec();
        blocks[1].index = 5;
        blocks[1].hash = Some(blocks[1].compute_hash());
        assert_eq!(validate_blocks(&blocks, 0), Err(LedgerError::IndexGap { index: 5 }));

        let mut genesis = ledger.chain()[0].clone();
        genesis.previous_hash = "1".into();
        assert_eq!(validate_blocks(&[genesis], 0), Err(LedgerError::InvalidGenesis));
    }

    #[test]
    fn snapshot_serializes_length_and_blocks() {
        let mut ledger = Ledger::new(1);
        ledger.submit(alice_to_bob(7));
        ledger.mine().unwrap();
        let json = serde_json::to_value(ledger.snapshot()).unwrap();
        assert_eq!(json["length"], 2);
        let block = json["chain"][1].as_object().unwrap();
        let mut keys: Vec<_> = block.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            ["hash", "index", "nonce", "previous_hash", "timestamp", "transactions"]
        );
    }
}
