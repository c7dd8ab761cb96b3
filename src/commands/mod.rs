use std::{borrow::Cow, sync::Arc};

use crate::{
    domain::{allocation, validation, Transaction},
    ports::database,
};

pub mod create_transaction;
pub mod get_balances;
pub mod spend_points;

pub use create_transaction::{CreateTransactionRequest, CreateTransactionResponse};
pub use get_balances::{GetBalancesRequest, GetBalancesResponse};
pub use spend_points::{SpendPointsRequest, SpendPointsResponse};

pub struct DomainLogic<D> {
    database: Arc<D>,
}

impl<D> DomainLogic<D> {
    pub fn new(database: Arc<D>) -> Self {
        Self { database }
    }
}

impl<D> Clone for DomainLogic<D> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),

    #[error("insufficient balance: {} has {current_points} points, cannot apply {}", .transaction.partner, .transaction.points)]
    InsufficientBalance {
        transaction: Transaction,
        current_points: i64,
    },

    #[error("requested amount exceeds total available balance: {requested} requested, {available} available")]
    InsufficientTotal { requested: i64, available: i64 },

    /// A concurrent write changed a partner's balance between allocation and write
    #[error("balance of {partner} changed while spending {requested} points")]
    BalanceChanged { requested: i64, partner: String },

    #[error("database port error: {0}")]
    Database(#[from] database::Error),
}

impl From<validation::Error> for Error {
    fn from(err: validation::Error) -> Self {
        match err {
            validation::Error::InvalidRequest(reason) => Self::InvalidRequest(reason),
            validation::Error::InsufficientBalance {
                transaction,
                current_points,
            } => Self::InsufficientBalance {
                transaction,
                current_points,
            },
        }
    }
}

impl From<allocation::Error> for Error {
    fn from(err: allocation::Error) -> Self {
        match err {
            allocation::Error::InsufficientTotal {
                requested,
                available,
            } => Self::InsufficientTotal {
                requested,
                available,
            },
            allocation::Error::Overflow(err) => Self::Database(err.into()),
        }
    }
}
