use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{balance_of, Transaction, TransactionInput};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The candidate is structurally invalid
    ///
    /// Missing fields, non-integer or zero points, an unparseable time, or a time in the future.
    #[error("invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    /// Applying the debit would make the partner's balance negative
    #[error("insufficient balance: {} points for {} with a balance of {current_points}", .transaction.points, .transaction.partner)]
    InsufficientBalance {
        transaction: Transaction,
        current_points: i64,
    },
}

/// Validate a candidate transaction against the partner's existing transactions
///
/// Structural checks run first; the balance is only looked at for debits.
pub fn validate(
    candidate: &TransactionInput,
    existing: &[Transaction],
    now: DateTime<Utc>,
) -> Result<Transaction, Error> {
    let transaction = parse_candidate(candidate, now)?;
    check_balance(&transaction, existing)?;
    Ok(transaction)
}

/// Structural validation
///
/// This never needs the store, so callers run it before fetching anything.
pub fn parse_candidate(
    candidate: &TransactionInput,
    now: DateTime<Utc>,
) -> Result<Transaction, Error> {
    let partner = match candidate.partner.as_deref().map(str::trim) {
        Some(partner) if !partner.is_empty() => partner.to_string(),
        Some(_) => return Err(invalid("partner must not be empty")),
        None => return Err(invalid("missing field: partner")),
    };

    let points = match &candidate.points {
        Some(value) => parse_points(value)?,
        None => return Err(invalid("missing field: points")),
    };
    if points == 0 {
        return Err(invalid("points must not be zero"));
    }

    let time = match candidate.time.as_deref() {
        Some(time) => parse_time(time)?,
        None => return Err(invalid("missing field: time")),
    };
    if time > now {
        return Err(Error::InvalidRequest(
            format!("time {} is in the future", time.to_rfc3339()).into(),
        ));
    }

    Ok(Transaction {
        partner,
        points,
        time,
    })
}

/// Business validation
///
/// A debit is rejected when the sum of the partner's existing points plus the debit is negative.
/// Credits are always accepted.
pub fn check_balance(transaction: &Transaction, existing: &[Transaction]) -> Result<(), Error> {
    if !transaction.is_debit() {
        return Ok(());
    }

    let current_points = balance_of(&transaction.partner, existing)
        .map_err(|err| Error::InvalidRequest(err.to_string().into()))?;
    let new_points = current_points
        .checked_add(transaction.points)
        .ok_or_else(|| invalid("points take the balance out of range"))?;
    if new_points < 0 {
        return Err(Error::InsufficientBalance {
            transaction: transaction.clone(),
            current_points,
        });
    }

    Ok(())
}

/// Parse a positive amount of points, as used by spend requests
pub fn parse_amount(value: Option<&Value>) -> Result<i64, Error> {
    let amount = match value {
        Some(value) => parse_points(value)?,
        None => return Err(invalid("missing field: points")),
    };
    if amount <= 0 {
        return Err(invalid("points must be a positive integer"));
    }
    Ok(amount)
}

fn parse_points(value: &Value) -> Result<i64, Error> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| invalid("points must be an integer")),
        _ => Err(invalid("points must be a number")),
    }
}

fn parse_time(time: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::parse_from_rfc3339(time)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|err| Error::InvalidRequest(format!("invalid time {time:?}: {err}").into()))
}

fn invalid(reason: &'static str) -> Error {
    Error::InvalidRequest(reason.into())
}
