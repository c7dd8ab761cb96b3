use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use tower::Service;
use tracing::debug;

use crate::{
    domain::{balances, Balances},
    ports::database::{self, DatabasePort},
};

use super::{DomainLogic, Error};

#[derive(Debug, Default)]
pub struct GetBalancesRequest;

#[derive(Debug, PartialEq, Eq)]
pub struct GetBalancesResponse {
    pub balances: Balances,
}

impl<D> Service<GetBalancesRequest> for DomainLogic<D>
where
    D: DatabasePort + Send + Sync + 'static,
{
    type Response = GetBalancesResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: GetBalancesRequest) -> Self::Future {
        let database = self.database.clone();
        Box::pin(async move {
            let transactions = database.all_transactions().await?;
            debug!(count = transactions.len(), "computing balances");

            let balances = balances(&transactions).map_err(database::Error::from)?;
            Ok(GetBalancesResponse { balances })
        })
    }
}
