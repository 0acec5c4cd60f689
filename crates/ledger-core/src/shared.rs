use crate::{ChainSnapshot, Ledger, LedgerError, MineOutcome, Transaction};
use std::sync::{Arc, Mutex, MutexGuard};

/// A [`Ledger`] behind a mutex, cheap to clone and share between threads.
///
/// Every operation holds the lock for its whole duration, so a mine (read
/// tip, search, append) can never interleave with a submit or another mine.
#[derive(Clone, Debug)]
pub struct SharedLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl SharedLedger {
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Ledger>, LedgerError> {
        self.inner.lock().map_err(|_| LedgerError::Poisoned)
    }

    pub fn submit(&self, tx: Transaction) -> Result<u64, LedgerError> {
        Ok(self.lock()?.submit(tx))
    }

    /// Blocks the calling thread for the whole proof-of-work search.
    pub fn mine(&self) -> Result<MineOutcome, LedgerError> {
        self.lock()?.mine()
    }

    pub fn snapshot(&self) -> Result<ChainSnapshot, LedgerError> {
        Ok(self.lock()?.snapshot())
    }

    pub fn pending(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.lock()?.pending().to_vec())
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        self.lock()?.validate_chain()
    }

    /// Run `f` with exclusive access to the ledger.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> Result<R, LedgerError> {
        Ok(f(&mut *self.lock()?))
    }
}

impl From<Ledger> for SharedLedger {
    fn from(ledger: Ledger) -> Self {
        Self::new(ledger)
    }
}
