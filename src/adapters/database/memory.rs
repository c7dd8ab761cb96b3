use crate::{
    domain::Transaction,
    ports::database::{check_batch, DatabasePort, Error},
};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone, Debug, Default)]
pub struct MemoryDatabase {
    transactions: Arc<Mutex<Vec<Transaction>>>,
}

#[async_trait::async_trait]
impl DatabasePort for MemoryDatabase {
    async fn transactions_by_partner(&self, partner: &str) -> Result<Vec<Transaction>, Error> {
        let transactions = self
            .transactions
            .lock()?
            .iter()
            .filter(|transaction| transaction.partner == partner)
            .cloned()
            .collect();

        Ok(transactions)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>, Error> {
        Ok(self.transactions.lock()?.clone())
    }

    async fn append_transactions(
        &self,
        batch: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, Error> {
        let mut transactions = self.transactions.lock()?;
        // Return an error if this would make any balance negative
        check_batch(&transactions, &batch)?;
        transactions.extend(batch.iter().cloned());

        Ok(batch)
    }
}

/// Erased [`PoisonError`]
///
/// `PoisonError` keeps the `MutexGuard` internally, which is not send. Thus we erase the error
/// and only keep the string representation instead.
#[derive(Debug, thiserror::Error)]
#[error("poison error: {0}")]
pub struct ErasedPoisonError(String);

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Self::Adapter(Box::new(ErasedPoisonError(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use speculoos::prelude::*;

    fn tx(partner: &str, points: i64) -> Transaction {
        Transaction::new(partner, points, Utc::now() - Duration::hours(1))
    }

    #[tokio::test]
    async fn test_append_retrieve() {
        let database = MemoryDatabase::default();
        let res = database.append_transaction(tx("DANNON", 5)).await;
        assert_that!(res)
            .is_ok()
            .matches(|stored| stored.partner == "DANNON" && stored.points == 5);

        database.append_transaction(tx("UNILEVER", 7)).await.unwrap();

        // Retrieving by partner only returns that partner's transactions
        let res = database.transactions_by_partner("DANNON").await;
        assert_that!(res)
            .is_ok()
            .matches(|transactions| transactions.len() == 1 && transactions[0].points == 5);

        let res = database.all_transactions().await;
        assert_that!(res).is_ok().has_length(2);
    }

    #[tokio::test]
    async fn test_insertion_order() {
        let database = MemoryDatabase::default();
        database
            .append_transactions(vec![tx("A", 1), tx("B", 2), tx("A", 3)])
            .await
            .unwrap();

        let points: Vec<i64> = database
            .all_transactions()
            .await
            .unwrap()
            .iter()
            .map(|transaction| transaction.points)
            .collect();
        assert_that!(points).is_equal_to(vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_negative_balance_empty() {
        let database = MemoryDatabase::default();
        let res = database.append_transaction(tx("DANNON", -5)).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NegativeBalance { .. }));
    }

    #[tokio::test]
    async fn test_negative_balance_exists() {
        let database = MemoryDatabase::default();
        let res = database.append_transaction(tx("DANNON", 5)).await;
        assert_that!(res).is_ok();
        // Removing the current number of points is OK
        let res = database.append_transaction(tx("DANNON", -5)).await;
        assert_that!(res).is_ok();
        // This would cause the balance to go to -1
        let res = database.append_transaction(tx("DANNON", -1)).await;
        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::NegativeBalance { current_points: 0, delta_points: -1, .. })
        });
    }

    #[tokio::test]
    async fn test_balance_overflow() {
        let database = MemoryDatabase::default();
        database.append_transaction(tx("A", i64::MAX)).await.unwrap();

        // One more point does not fit
        let res = database.append_transaction(tx("A", 1)).await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::BalanceOverflow { partner } if partner == "A"));

        // Neither does a batch whose own sum overflows
        let res = database
            .append_transactions(vec![tx("B", i64::MAX), tx("B", i64::MAX)])
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::BalanceOverflow { partner } if partner == "B"));

        let res = database.all_transactions().await;
        assert_that!(res).is_ok().has_length(1);
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let database = MemoryDatabase::default();
        database
            .append_transactions(vec![tx("A", 10), tx("B", 10)])
            .await
            .unwrap();

        // B cannot cover its debit, so A's debit must not be written either
        let res = database
            .append_transactions(vec![tx("A", -10), tx("B", -11)])
            .await;
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::NegativeBalance { partner, .. } if partner == "B"));

        let res = database.all_transactions().await;
        assert_that!(res).is_ok().has_length(2);
    }

    #[tokio::test]
    async fn test_concurrent_debits_cannot_overdraw() {
        let database = MemoryDatabase::default();
        database.append_transaction(tx("X", 30)).await.unwrap();

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let database = database.clone();
                tokio::spawn(async move { database.append_transaction(tx("X", -10)).await })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                accepted += 1;
            }
        }

        assert_that!(accepted).is_equal_to(3);
        let balance: i64 = database
            .transactions_by_partner("X")
            .await
            .unwrap()
            .iter()
            .map(|transaction| transaction.points)
            .sum();
        assert_that!(balance).is_equal_to(0);
    }
}
