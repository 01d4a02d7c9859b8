//! No-op [`TransactionManager`].
//!
//! [`NullTransactionManager`] hands out transactions whose commit and rollback
//! succeed without side effects. For operations with no persistent state, and
//! for tests.

use async_trait::async_trait;

use crate::traits::{Transaction, TransactionManager};

#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransactionManager;

#[async_trait]
impl TransactionManager for NullTransactionManager {
    async fn begin(&self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(NullTransaction))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransaction;

#[async_trait]
impl Transaction for NullTransaction {
    async fn commit(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
