use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use chrono::Utc;
use tower::Service;
use tracing::{debug, info, warn};

use crate::{
    domain::{validation, Transaction, TransactionInput},
    ports::database::{self, DatabasePort},
};

use super::{DomainLogic, Error};

pub struct CreateTransactionRequest {
    pub transaction: TransactionInput,
}

#[derive(Debug, PartialEq, Eq)]
pub struct CreateTransactionResponse {
    /// Transaction as stored in the ledger
    pub transaction: Transaction,
}

impl<D> Service<CreateTransactionRequest> for DomainLogic<D>
where
    D: DatabasePort + Send + Sync + 'static,
{
    type Response = CreateTransactionResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: CreateTransactionRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            // Structural checks never need the store
            let transaction = validation::parse_candidate(&req.transaction, Utc::now())
                .map_err(|err| {
                    warn!(error = %err, "rejected transaction");
                    err
                })?;

            if transaction.is_debit() {
                let existing = database
                    .transactions_by_partner(&transaction.partner)
                    .await?;
                debug!(
                    partner = %transaction.partner,
                    count = existing.len(),
                    "fetched partner transactions"
                );
                validation::check_balance(&transaction, &existing).map_err(|err| {
                    warn!(error = %err, "rejected transaction");
                    err
                })?;
            }

            // The store re-checks the balance under its own lock, which catches concurrent debits
            // that passed the check above.
            let stored = match database.append_transaction(transaction.clone()).await {
                Ok(stored) => stored,
                Err(database::Error::NegativeBalance { current_points, .. }) => {
                    warn!(partner = %transaction.partner, "concurrent debit overdrew balance");
                    return Err(Error::InsufficientBalance {
                        transaction,
                        current_points,
                    });
                }
                Err(database::Error::BalanceOverflow { partner }) => {
                    warn!(%partner, "balance out of range");
                    return Err(Error::InvalidRequest(
                        format!("points take the balance of {partner} out of range").into(),
                    ));
                }
                Err(err) => return Err(err.into()),
            };

            info!(
                partner = %stored.partner,
                points = stored.points,
                time = %stored.time,
                "transaction posted"
            );
            Ok(CreateTransactionResponse { transaction: stored })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{adapters::database::memory::MemoryDatabase, ports::database::MockDatabasePort};
    use chrono::Duration;
    use rstest::*;
    use speculoos::prelude::*;
    use std::sync::Arc;
    use tower::{BoxError, ServiceExt};

    fn request(partner: &str, points: i64, time: chrono::DateTime<Utc>) -> CreateTransactionRequest {
        CreateTransactionRequest {
            transaction: TransactionInput::new(partner, points, &time.to_rfc3339()),
        }
    }

    #[fixture]
    fn database() -> MemoryDatabase {
        MemoryDatabase::default()
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_credit(database: MemoryDatabase) -> Result<(), BoxError> {
        // GIVEN an empty ledger
        let domain = DomainLogic::new(Arc::new(database.clone()));
        let time = Utc::now() - Duration::minutes(5);

        // WHEN posting a credit
        let res = domain.oneshot(request("DANNON", 300, time)).await;

        // THEN it is stored
        assert_that!(res)
            .is_ok()
            .matches(|res| res.transaction.partner == "DANNON" && res.transaction.points == 300);
        assert_that!(database.all_transactions().await?).has_length(1);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_overdraw(database: MemoryDatabase) -> Result<(), BoxError> {
        // GIVEN partner X with a balance of 30
        let time = Utc::now() - Duration::hours(2);
        database
            .append_transaction(Transaction::new("X", 30, time))
            .await?;
        let domain = DomainLogic::new(Arc::new(database.clone()));

        // WHEN debiting 50 points
        let res = domain.oneshot(request("X", -50, time)).await;

        // THEN it is rejected and the balance is unchanged
        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::InsufficientBalance { current_points: 30, transaction } if transaction.points == -50)
        });
        let balance: i64 = database
            .transactions_by_partner("X")
            .await?
            .iter()
            .map(|transaction| transaction.points)
            .sum();
        assert_that!(balance).is_equal_to(30);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_debit_within_balance(database: MemoryDatabase) -> Result<(), BoxError> {
        let time = Utc::now() - Duration::hours(2);
        database
            .append_transaction(Transaction::new("X", 30, time))
            .await?;
        let domain = DomainLogic::new(Arc::new(database.clone()));

        let res = domain.oneshot(request("X", -30, time)).await;

        assert_that!(res).is_ok();
        assert_that!(database.all_transactions().await?).has_length(2);

        Ok(())
    }

    #[rstest]
    #[tokio::test]
    async fn test_call_credit_overflow(database: MemoryDatabase) -> Result<(), BoxError> {
        // GIVEN partner A holding the largest representable balance
        let domain = DomainLogic::new(Arc::new(database.clone()));
        let time = Utc::now() - Duration::minutes(5);
        domain
            .clone()
            .oneshot(request("A", i64::MAX, time))
            .await?;

        // WHEN crediting one more point
        let res = domain.oneshot(request("A", 1, time)).await;

        // THEN it is rejected and nothing is written
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidRequest(_)));
        assert_that!(database.all_transactions().await?).has_length(1);

        Ok(())
    }

    #[tokio::test]
    async fn test_call_future_time_skips_store() -> Result<(), BoxError> {
        // GIVEN a database that must not be called
        let mut database = MockDatabasePort::new();
        database.expect_transactions_by_partner().times(0);
        database.expect_append_transaction().times(0);
        database.expect_append_transactions().times(0);
        let domain = DomainLogic::new(Arc::new(database));

        // WHEN posting a transaction one hour in the future
        let res = domain
            .oneshot(request("DANNON", 100, Utc::now() + Duration::hours(1)))
            .await;

        // THEN it is rejected as an invalid request
        assert_that!(res)
            .is_err()
            .matches(|err| matches!(err, Error::InvalidRequest(_)));

        Ok(())
    }

    #[tokio::test]
    async fn test_call_store_race() -> Result<(), BoxError> {
        // GIVEN a store whose balance changes between the check and the write
        let time = Utc::now() - Duration::hours(1);
        let mut database = MockDatabasePort::new();
        database
            .expect_transactions_by_partner()
            .times(1)
            .returning(move |_| Ok(vec![Transaction::new("X", 30, time)]));
        database
            .expect_append_transaction()
            .times(1)
            .returning(|_| {
                Err(crate::ports::database::Error::NegativeBalance {
                    partner: "X".to_string(),
                    current_points: 10,
                    delta_points: -20,
                })
            });
        let domain = DomainLogic::new(Arc::new(database));

        let res = domain.oneshot(request("X", -20, time)).await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::InsufficientBalance { current_points: 10, .. })
        });

        Ok(())
    }

    #[tokio::test]
    async fn test_call_store_failure() -> Result<(), BoxError> {
        let mut database = MockDatabasePort::new();
        database
            .expect_append_transaction()
            .times(1)
            .returning(|_| Err(crate::ports::database::Error::Adapter("disk full".into())));
        let domain = DomainLogic::new(Arc::new(database));

        let res = domain
            .oneshot(request("X", 20, Utc::now() - Duration::hours(1)))
            .await;

        assert_that!(res).is_err().matches(|err| {
            matches!(err, Error::Database(_)) && err.to_string().contains("disk full")
        });

        Ok(())
    }
}
