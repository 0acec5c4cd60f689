use crate::{pow::meets_difficulty, Block, Hash};
use rayon::prelude::*;
use tracing::debug;

/// Searches nonces in parallel, starting at `block.nonce`, until the digest
/// carries `difficulty` leading zero hex characters.
///
/// Any qualifying nonce may win, not necessarily the smallest. On success the
/// winning nonce is written back into `block` and its digest returned.
pub fn search_parallel(block: &mut Block, difficulty: usize) -> Option<Hash> {
    // The template is shared read-only across workers; only the nonce varies.
    let template: &Block = block;
    let found = (template.nonce..=u64::MAX)
        .into_par_iter()
        .find_any(|nonce| meets_difficulty(&template.digest_at(*nonce), difficulty))?;

    block.nonce = found;
    let digest = block.compute_hash();
    debug!(index = block.index, nonce = found, %digest, "parallel search finished");
    Some(digest)
}
