use crate::domain::{balances, Overflow, Transaction};

/// Durable store of ledger transactions
///
/// Every read returns transactions in the order they were appended. Spend allocation relies on
/// this to break ties between transactions with the same time.
#[mockall::automock]
#[async_trait::async_trait]
pub trait DatabasePort {
    /// All transactions for a single partner
    async fn transactions_by_partner(&self, partner: &str) -> Result<Vec<Transaction>, Error>;

    /// All transactions in the ledger
    async fn all_transactions(&self) -> Result<Vec<Transaction>, Error>;

    /// Append a batch of transactions atomically
    ///
    /// The write is conditional: if any partner's balance would become negative once the batch is
    /// applied, nothing is written and [`Error::NegativeBalance`] is returned.
    async fn append_transactions(
        &self,
        transactions: Vec<Transaction>,
    ) -> Result<Vec<Transaction>, Error>;

    async fn append_transaction(&self, transaction: Transaction) -> Result<Transaction, Error> {
        let mut stored = self.append_transactions(vec![transaction]).await?;
        stored
            .pop()
            .ok_or_else(|| Error::Adapter("append returned no transaction".into()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Trying to remove too many points from a partner
    ///
    /// This would result in a negative balance, which is not supported.
    #[error("partner {partner} would go negative: {delta_points} from {current_points}")]
    NegativeBalance {
        partner: String,
        current_points: i64,
        delta_points: i64,
    },

    /// A partner's balance would no longer fit in the points type
    #[error("balance of partner {partner} is out of range")]
    BalanceOverflow { partner: String },

    /// Concrete adapter errors
    ///
    /// This could represent any errors from a concrete adapter that is not part of the domain
    /// model, such as I/O, serialization, or permission errors.
    #[error("adapter error: {0}")]
    Adapter(Box<dyn std::error::Error + Send + Sync>),
}

/// Check that applying `batch` on top of `existing` keeps every partner at or above zero
///
/// Shared by the adapters, which call it while holding their write lock.
pub(crate) fn check_batch(existing: &[Transaction], batch: &[Transaction]) -> Result<(), Error> {
    let current = balances(existing)?;
    let deltas = balances(batch)?;

    for (partner, delta_points) in deltas {
        let current_points = current.get(&partner).copied().unwrap_or(0);
        match current_points.checked_add(delta_points) {
            None => return Err(Error::BalanceOverflow { partner }),
            Some(points) if points < 0 => {
                return Err(Error::NegativeBalance {
                    partner,
                    current_points,
                    delta_points,
                })
            }
            Some(_) => {}
        }
    }

    Ok(())
}

impl From<Overflow> for Error {
    fn from(err: Overflow) -> Self {
        Self::BalanceOverflow {
            partner: err.partner,
        }
    }
}
