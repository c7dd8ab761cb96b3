use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{balances, Balances, Overflow, Transaction};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The requested amount is larger than all spendable balances combined
    ///
    /// Nothing is allocated in that case.
    #[error("requested amount exceeds total available balance: {requested} requested, {available} available")]
    InsufficientTotal { requested: i64, available: i64 },

    #[error(transparent)]
    Overflow(#[from] Overflow),
}

/// Points taken from one partner to satisfy a spend request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerSpend {
    pub partner: String,
    /// Always negative
    pub points: i64,
}

/// Result of a spend allocation
///
/// Entries are ordered by when the partner was first drawn from, oldest credit first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Allocation {
    pub entries: Vec<PartnerSpend>,
}

impl Allocation {
    /// Total number of points spent, as a positive number
    pub fn total(&self) -> i64 {
        -self.entries.iter().map(|entry| entry.points).sum::<i64>()
    }

    pub fn as_map(&self) -> Balances {
        self.entries
            .iter()
            .map(|entry| (entry.partner.clone(), entry.points))
            .collect()
    }
}

/// Decide which credits pay for a spend of `requested` points
///
/// Credits are consumed oldest first across all partners. A partner is never drawn below its
/// current balance, and a single credit never gives more than its own points. Transactions with
/// the same time keep the order they are given in, which is the store's insertion order.
///
/// This does not write anything: the caller turns the allocation into debit transactions.
pub fn allocate(requested: i64, transactions: &[Transaction]) -> Result<Allocation, Error> {
    let totals = balances(transactions)?;

    // Stable sort
    let mut sorted: Vec<&Transaction> = transactions.iter().collect();
    sorted.sort_by_key(|transaction| transaction.time);

    let mut allocated: HashMap<&str, i64> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut remaining = requested;

    for transaction in sorted.into_iter().filter(|transaction| transaction.is_credit()) {
        if remaining <= 0 {
            break;
        }

        let partner = transaction.partner.as_str();
        let already = allocated.get(partner).copied().unwrap_or(0);
        let available = totals.get(partner).copied().unwrap_or(0) - already;
        if available <= 0 {
            continue;
        }

        let used = remaining.min(available).min(transaction.points);
        if already == 0 {
            order.push(partner);
        }
        allocated.insert(partner, already + used);
        remaining -= used;
    }

    if remaining > 0 {
        return Err(Error::InsufficientTotal {
            requested,
            available: requested - remaining,
        });
    }

    let entries = order
        .into_iter()
        .map(|partner| PartnerSpend {
            partner: partner.to_string(),
            points: -allocated[partner],
        })
        .collect();

    Ok(Allocation { entries })
}
