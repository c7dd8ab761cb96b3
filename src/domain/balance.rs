use std::collections::BTreeMap;

use super::Transaction;

/// Current balance per partner
///
/// Recomputed from the full set of transactions whenever it is needed; never stored.
pub type Balances = BTreeMap<String, i64>;

/// A partner's points no longer fit in an `i64`
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("balance of {partner} is out of range")]
pub struct Overflow {
    pub partner: String,
}

/// Sum the points of every transaction per partner
pub fn balances<'a, I>(transactions: I) -> Result<Balances, Overflow>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .try_fold(Balances::new(), |mut balances, transaction| {
            let balance = balances.entry(transaction.partner.clone()).or_insert(0);
            *balance = balance
                .checked_add(transaction.points)
                .ok_or_else(|| Overflow {
                    partner: transaction.partner.clone(),
                })?;
            Ok(balances)
        })
}

/// Current balance of a single partner
///
/// Transactions for other partners are ignored, so this can be given either the partner's own
/// transactions or the whole ledger.
pub fn balance_of<'a, I>(partner: &str, transactions: I) -> Result<i64, Overflow>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    transactions
        .into_iter()
        .filter(|transaction| transaction.partner == partner)
        .try_fold(0i64, |balance, transaction| balance.checked_add(transaction.points))
        .ok_or_else(|| Overflow {
            partner: partner.to_string(),
        })
}
