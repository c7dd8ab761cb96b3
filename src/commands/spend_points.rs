use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use chrono::Utc;
use serde_json::Value;
use tower::Service;
use tracing::{debug, info, warn};

use crate::{
    domain::{allocate, validation, Allocation, Transaction},
    ports::database::{self, DatabasePort},
};

use super::{DomainLogic, Error};

pub struct SpendPointsRequest {
    /// Number of points to spend, as received from the caller
    pub points: Option<Value>,
}

impl SpendPointsRequest {
    pub fn new(points: i64) -> Self {
        Self {
            points: Some(points.into()),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct SpendPointsResponse {
    /// Points taken from each partner, as negative numbers
    pub allocation: Allocation,
}

impl<D> Service<SpendPointsRequest> for DomainLogic<D>
where
    D: DatabasePort + Send + Sync + 'static,
{
    type Response = SpendPointsResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: SpendPointsRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let requested = validation::parse_amount(req.points.as_ref())?;

            let transactions = database.all_transactions().await?;
            debug!(requested, count = transactions.len(), "allocating spend");

            let allocation = allocate(requested, &transactions).map_err(|err| {
                warn!(error = %err, "rejected spend");
                err
            })?;

            // One debit per partner, all at the time of the spend
            let now = Utc::now();
            let debits: Vec<Transaction> = allocation
                .entries
                .iter()
                .map(|entry| Transaction::new(entry.partner.clone(), entry.points, now))
                .collect();

            // Written as one batch, so either every debit lands or none does
            match database.append_transactions(debits).await {
                Ok(_) => {}
                Err(database::Error::NegativeBalance { partner, .. }) => {
                    warn!(%partner, "balance changed during spend");
                    return Err(Error::BalanceChanged { requested, partner });
                }
                Err(err) => return Err(err.into()),
            }

            info!(
                requested,
                partners = allocation.entries.len(),
                "points spent"
            );
            Ok(SpendPointsResponse { allocation })
        })
    }
}
