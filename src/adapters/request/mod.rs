//! JSON request/response boundary
//!
//! A request is a single JSON document naming the operation and carrying its body:
//!
//! ```json
//! {"operation": "create_transaction", "body": {"partner": "DANNON", "points": 300, "time": "2020-10-31T10:00:00Z"}}
//! {"operation": "get_balances"}
//! {"operation": "spend_points", "body": {"points": 5000}}
//! ```
//!
//! Every request gets a response envelope with a status code, the response data, and a
//! human-readable message. Rejections echo the original request back as the data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tracing::{error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    commands::{
        CreateTransactionRequest, DomainLogic, Error, GetBalancesRequest, SpendPointsRequest,
    },
    domain::TransactionInput,
    ports::database::DatabasePort,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "operation", content = "body", rename_all = "snake_case")]
pub enum Request {
    CreateTransaction(TransactionInput),
    GetBalances,
    SpendPoints(SpendInput),
}

#[derive(Debug, Default, Deserialize)]
pub struct SpendInput {
    #[serde(default)]
    pub points: Option<Value>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub status_code: u16,
    pub body: ResponseBody,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ResponseBody {
    pub data: Value,
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
enum HandleError {
    #[error(transparent)]
    Command(#[from] Error),

    #[error("could not encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

pub fn build_response(status_code: u16, data: Value, message: impl Into<String>) -> Response {
    Response {
        status_code,
        body: ResponseBody {
            data,
            message: message.into(),
        },
    }
}

/// Handle one raw request document
pub async fn handle<D>(domain: &DomainLogic<D>, raw: &str) -> Response
where
    D: DatabasePort + Send + Sync + 'static,
{
    let request_id = Uuid::new_v4();
    async move {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "malformed request");
                return build_response(
                    422,
                    Value::String(raw.to_string()),
                    format!("Improper request body: {err}"),
                );
            }
        };

        let request: Request = match serde_json::from_value(value.clone()) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "unknown request");
                return build_response(422, value, format!("Improper request body: {err}"));
            }
        };

        dispatch(domain.clone(), request)
            .await
            .unwrap_or_else(|err| error_response(err, value))
    }
    .instrument(info_span!("request", %request_id))
    .await
}

async fn dispatch<D>(domain: DomainLogic<D>, request: Request) -> Result<Response, HandleError>
where
    D: DatabasePort + Send + Sync + 'static,
{
    let response = match request {
        Request::CreateTransaction(transaction) => {
            let res = domain
                .oneshot(CreateTransactionRequest { transaction })
                .await?;
            build_response(
                200,
                to_value(&res.transaction)?,
                "Transaction successfully posted!",
            )
        }
        Request::GetBalances => {
            let res = domain.oneshot(GetBalancesRequest).await?;
            build_response(200, to_value(&res.balances)?, "Current balance per partner")
        }
        Request::SpendPoints(input) => {
            let res = domain
                .oneshot(SpendPointsRequest {
                    points: input.points,
                })
                .await?;
            build_response(200, to_value(&res.allocation)?, "Points successfully spent!")
        }
    };

    Ok(response)
}

fn error_response(err: HandleError, request: Value) -> Response {
    let message = err.to_string();
    let err = match err {
        HandleError::Command(err) => err,
        HandleError::Encode(_) => {
            error!(error = %message, "failed to encode response");
            return build_response(500, request, message);
        }
    };

    match err {
        Error::InvalidRequest(_)
        | Error::InsufficientTotal { .. }
        | Error::BalanceChanged { .. } => build_response(422, request, message),
        Error::InsufficientBalance { transaction, .. } => match to_value(&transaction) {
            Ok(data) => build_response(422, data, message),
            Err(_) => build_response(422, request, message),
        },
        Error::Database(_) => build_response(500, request, message),
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(value)
}
