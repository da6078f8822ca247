/*!
 * Transaction helper
 *
 * Runs a closure inside a database transaction: commit on `Ok`, rollback on
 * `Err`. The closure's own error type is returned unchanged so typed
 * domain errors survive the transaction boundary.
 */

use metrics::counter;
use sea_orm::{ConnectionTrait, DatabaseTransaction, DbErr, TransactionError, TransactionTrait};
use std::future::Future;
use std::pin::Pin;
use tracing::debug;

/// Type alias for boxed future used in transactions
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Execute a function within a database transaction
///
/// ```rust,ignore
/// let order = with_transaction(&db, |txn| {
///     Box::pin(async move {
///         let order = OrderRepository::claim_draft(txn, id).await?;
///         consume(txn, &order).await?;
///         Ok(order)
///     })
/// })
/// .await?;
/// ```
pub async fn with_transaction<C, F, T, E>(db: &C, f: F) -> Result<T, E>
where
    C: TransactionTrait + ConnectionTrait,
    F: for<'a> FnOnce(&'a DatabaseTransaction) -> BoxFuture<'a, Result<T, E>> + Send,
    T: Send,
    E: std::error::Error + From<DbErr> + Send,
{
    let result = db.transaction::<F, T, E>(f).await;

    match &result {
        Ok(_) => counter!("comanda.db.transaction.committed", 1),
        Err(_) => {
            counter!("comanda.db.transaction.rolled_back", 1);
            debug!("Transaction rolled back");
        }
    }

    result.map_err(|e| match e {
        TransactionError::Connection(db_err) => E::from(db_err),
        TransactionError::Transaction(err) => err,
    })
}
