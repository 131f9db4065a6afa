//! Temporary reassignment of the pool admin role.
//!
//! Privileged batch calls go through helper contracts that must hold the pool admin role
//! while they run. The role is handed back afterwards on every exit path.

use crate::client::ChainClient;
use crate::contracts::AddressesProvider;
use crate::errors::DeployError;
use alloy::primitives::Address;
use std::future::Future;

/// The pool admin role, lent to `holder` until [`PoolAdminLease::release`] hands it back.
#[derive(Debug)]
#[must_use = "a lease that is never released leaves the pool admin role with the holder"]
pub struct PoolAdminLease {
    holder: Address,
    restore_to: Address,
    released: bool,
}

impl PoolAdminLease {
    pub async fn acquire<C: ChainClient>(
        provider: &AddressesProvider<'_, C>,
        holder: Address,
        restore_to: Address,
    ) -> eyre::Result<Self> {
        let tx = provider.set_pool_admin(holder).await?;
        tracing::info!(%holder, tx_hash = %tx.tx_hash, "pool admin lent");
        Ok(Self {
            holder,
            restore_to,
            released: false,
        })
    }

    pub const fn holder(&self) -> Address {
        self.holder
    }

    pub async fn release<C: ChainClient>(
        mut self,
        provider: &AddressesProvider<'_, C>,
    ) -> eyre::Result<()> {
        let tx = provider.set_pool_admin(self.restore_to).await?;
        self.released = true;
        tracing::info!(restore_to = %self.restore_to, tx_hash = %tx.tx_hash, "pool admin restored");
        Ok(())
    }
}

impl Drop for PoolAdminLease {
    fn drop(&mut self) {
        if !self.released {
            tracing::error!(
                holder = %self.holder,
                restore_to = %self.restore_to,
                "pool admin was not restored; {} still holds the role, call setPoolAdmin({}) manually",
                self.holder,
                self.restore_to
            );
        }
    }
}

/// Lend the pool admin role to `holder`, run `op`, then give the role to `restore_to`
/// regardless of how `op` ended.
///
/// When `op` fails and the restore fails too, the returned report carries both: the
/// operation's error wrapped in [`DeployError::AdminRestoreFailed`].
pub async fn with_pool_admin<C, T, F, Fut>(
    provider: &AddressesProvider<'_, C>,
    holder: Address,
    restore_to: Address,
    op: F,
) -> eyre::Result<T>
where
    C: ChainClient,
    F: FnOnce() -> Fut,
    Fut: Future<Output = eyre::Result<T>>,
{
    let lease = PoolAdminLease::acquire(provider, holder, restore_to).await?;
    tracing::debug!(holder = %lease.holder(), "running with lent pool admin");
    let outcome = op().await;
    let restored = lease.release(provider).await;

    match (outcome, restored) {
        (Ok(v), Ok(())) => Ok(v),
        (Err(e), Ok(())) => Err(e),
        (Ok(_), Err(restore_err)) => {
            Err(restore_err.wrap_err(DeployError::AdminRestoreFailed { holder, restore_to }))
        }
        (Err(e), Err(restore_err)) => {
            tracing::error!(error = %format!("{restore_err:#}"), "pool admin restore failed");
            Err(e.wrap_err(DeployError::AdminRestoreFailed { holder, restore_to }))
        }
    }
}

/// Fail unless `expected` currently holds the pool admin role.
pub async fn ensure_pool_admin<C: ChainClient>(
    provider: &AddressesProvider<'_, C>,
    expected: Address,
) -> eyre::Result<()> {
    let actual = provider.pool_admin().await?;
    if actual != expected {
        return Err(DeployError::PoolAdminMismatch { expected, actual }.into());
    }
    Ok(())
}
