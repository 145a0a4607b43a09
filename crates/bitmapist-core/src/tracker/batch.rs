//! Transactions: grouping writes into one atomic dispatch.
//!
//! While a transaction is open every write (marks, unique marks, combines)
//! is queued on the tracker instead of being sent. Commit sends the queue
//! as one atomic unit in enqueue order.

use std::future::Future;

use tracing::{debug, warn};

use super::Tracker;
use crate::error::{BitmapistError, BitmapistResult};
use crate::traits::StoreCommand;

/// Queue of the open transaction.
#[derive(Debug, Default)]
pub(super) struct Pipeline {
    /// Bumped on every `begin`; identifies the open transaction.
    generation: u64,
    /// Queued commands; `None` when idle.
    queue: Option<Vec<StoreCommand>>,
}

impl Tracker {
    /// Open a transaction.
    pub fn begin(&self) -> BitmapistResult<()> {
        self.open_transaction().map(|_| ())
    }

    /// Send every queued command as one atomic unit and close the
    /// transaction.
    ///
    /// The tracker is idle afterwards even when the dispatch fails.
    pub async fn commit(&self) -> BitmapistResult<()> {
        let commands = self.take_queue(None);
        self.send_queue(commands).await
    }

    /// Discard the queued commands and close the transaction.
    ///
    /// Does nothing when no transaction is open.
    pub fn abort(&self) {
        log_discarded(self.take_queue(None));
    }

    /// Whether a transaction is open.
    pub fn is_transaction_open(&self) -> bool {
        self.lock_pipeline().queue.is_some()
    }

    /// Open a transaction closed by the returned guard.
    ///
    /// Dropping the guard without [`TransactionGuard::commit`] aborts. The
    /// guard only ever closes the transaction it opened.
    pub fn begin_scoped(&self) -> BitmapistResult<TransactionGuard<'_>> {
        let generation = self.open_transaction()?;
        Ok(TransactionGuard {
            tracker: self,
            generation,
            open: true,
        })
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` succeeds. When `f` fails, or the returned future is
    /// dropped before completion, the queued writes are discarded.
    pub async fn transaction<'a, F, Fut, T>(&'a self, f: F) -> BitmapistResult<T>
    where
        F: FnOnce(&'a Tracker) -> Fut,
        Fut: Future<Output = BitmapistResult<T>>,
    {
        let guard = self.begin_scoped()?;
        let value = f(self).await?;
        guard.commit().await?;
        Ok(value)
    }

    /// Queue `commands` if a transaction is open. Hands them back otherwise.
    pub(super) fn enqueue(&self, commands: Vec<StoreCommand>) -> Option<Vec<StoreCommand>> {
        match self.lock_pipeline().queue.as_mut() {
            Some(queue) => {
                queue.extend(commands);
                None
            }
            None => Some(commands),
        }
    }

    fn open_transaction(&self) -> BitmapistResult<u64> {
        let mut pipeline = self.lock_pipeline();
        if pipeline.queue.is_some() {
            return Err(BitmapistError::AlreadyOpenTransaction);
        }
        pipeline.generation = pipeline.generation.wrapping_add(1);
        pipeline.queue = Some(Vec::new());
        debug!(generation = pipeline.generation, "Transaction opened");
        Ok(pipeline.generation)
    }

    /// Close the open transaction, or only transaction `generation` when
    /// given.
    fn take_queue(&self, generation: Option<u64>) -> Option<Vec<StoreCommand>> {
        let mut pipeline = self.lock_pipeline();
        if generation.is_some_and(|g| g != pipeline.generation) {
            return None;
        }
        pipeline.queue.take()
    }

    async fn send_queue(&self, commands: Option<Vec<StoreCommand>>) -> BitmapistResult<()> {
        let commands = commands.ok_or(BitmapistError::NoOpenTransaction)?;
        debug!(commands = commands.len(), "Committing transaction");
        if commands.is_empty() {
            return Ok(());
        }
        self.store.execute(commands).await
    }

    fn lock_pipeline(&self) -> std::sync::MutexGuard<'_, Pipeline> {
        self.pipeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn log_discarded(commands: Option<Vec<StoreCommand>>) {
    if let Some(commands) = commands {
        debug!(discarded = commands.len(), "Transaction aborted");
    }
}

/// Open transaction that aborts on drop unless committed.
#[must_use = "dropping the guard aborts the transaction"]
pub struct TransactionGuard<'a> {
    tracker: &'a Tracker,
    generation: u64,
    open: bool,
}

impl TransactionGuard<'_> {
    /// Commit the transaction.
    ///
    /// Fails with [`BitmapistError::NoOpenTransaction`] when the transaction
    /// was already closed through the tracker.
    pub async fn commit(mut self) -> BitmapistResult<()> {
        self.open = false;
        let commands = self.tracker.take_queue(Some(self.generation));
        self.tracker.send_queue(commands).await
    }

    /// Discard the queued writes.
    pub fn abort(mut self) {
        self.open = false;
        log_discarded(self.tracker.take_queue(Some(self.generation)));
    }

    /// Number of commands queued so far.
    pub fn pending(&self) -> usize {
        let pipeline = self.tracker.lock_pipeline();
        if pipeline.generation != self.generation {
            return 0;
        }
        pipeline.queue.as_ref().map_or(0, Vec::len)
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        let Some(commands) = self.tracker.take_queue(Some(self.generation)) else {
            return;
        };
        if !commands.is_empty() {
            warn!(discarded = commands.len(), "Transaction dropped without commit");
        }
        log_discarded(Some(commands));
    }
}
