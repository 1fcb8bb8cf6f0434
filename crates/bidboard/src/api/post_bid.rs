use {
    crate::{
        api::{AppState, error},
        resolution::SubmitBidError,
        validation::ValidationError,
    },
    axum::{
        body,
        extract::State,
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Json, Response},
    },
    model::{
        Amount, BidderId, LotId,
        events::{BidEvent, RequesterMetadata},
    },
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BidSubmission {
    pub lot_id: LotId,
    pub bidder_id: BidderId,
    pub amount: Amount,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BidResponse {
    events: Vec<BidEvent>,
}

/// Informational request metadata; never part of any bidding decision.
fn requester_metadata(headers: &HeaderMap) -> Option<RequesterMetadata> {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string());
    let device = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    if ip.is_none() && device.is_none() {
        return None;
    }
    Some(RequesterMetadata { ip, device })
}

pub async fn post_bid_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: body::Bytes,
) -> Response {
    let submission = match serde_json::from_slice::<BidSubmission>(&body) {
        Ok(submission) => submission,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };

    let result = state
        .resolver
        .submit_bid(
            submission.lot_id,
            submission.bidder_id,
            submission.amount.clone(),
            requester_metadata(&headers),
        )
        .await;
    match result {
        Ok(events) => {
            tracing::debug!(
                lot = submission.lot_id,
                bidder = submission.bidder_id,
                events = events.len(),
                "bid admitted"
            );
            (StatusCode::CREATED, Json(BidResponse { events })).into_response()
        }
        Err(err) => {
            tracing::debug!(?submission, ?err, "bid not admitted");
            SubmitBidErrorWrapper(err).into_response()
        }
    }
}

pub(crate) struct SubmitBidErrorWrapper(pub SubmitBidError);

impl IntoResponse for SubmitBidErrorWrapper {
    fn into_response(self) -> Response {
        match self.0 {
            SubmitBidError::Validation(ValidationError::LotNotOpen) => (
                StatusCode::BAD_REQUEST,
                error("LotNotOpen", "The lot is not open for bidding"),
            )
                .into_response(),
            SubmitBidError::Validation(ValidationError::BidderNotVerified) => (
                StatusCode::FORBIDDEN,
                error(
                    "BidderNotVerified",
                    "Bidder must be verified before bidding",
                ),
            )
                .into_response(),
            SubmitBidError::Validation(ValidationError::BidTooLow { required }) => (
                StatusCode::BAD_REQUEST,
                error(
                    "BidTooLow",
                    format!("Bid does not beat the required amount of {required}"),
                ),
            )
                .into_response(),
            SubmitBidError::Busy => (
                StatusCode::TOO_MANY_REQUESTS,
                error("Busy", "The lot is processing another bid, retry shortly"),
            )
                .into_response(),
            err @ SubmitBidError::CascadeLimitExceeded(_) => {
                // Never a user error: a legitimate cascade must not hit the
                // cap, so this signals corrupted auto-bid configuration.
                tracing::error!(?err, "cascade limit exceeded");
                crate::api::internal_error_reply()
            }
            SubmitBidError::Storage(err) => {
                tracing::error!(?err, "submit_bid");
                crate::api::internal_error_reply()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{api::response_body, storage::StorageError, testing},
        model::{
            auction::{Lot, LotStatus},
            bidder::Bidder,
        },
        serde_json::json,
    };

    #[tokio::test]
    async fn handler_admits_a_valid_bid() {
        let (storage, state) = testing::app_state();
        storage.add_lot(Lot {
            id: 7,
            auction_id: 1,
            lot_number: 1,
            reserve_price: Amount::from(1000),
            min_increment: Amount::from(100),
            enforce_reserve: false,
            status: LotStatus::Open,
        });
        storage.add_bidder(Bidder {
            id: 3,
            display_name: "bob".to_string(),
            verified: true,
            auto_bid: None,
        });

        let body = body::Bytes::from(r#"{"lotId": 7, "bidderId": 3, "amount": "1050"}"#);
        let response = post_bid_handler(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: serde_json::Value =
            serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(body["events"][0]["seq"], 1);
        assert_eq!(body["events"][0]["eventType"], "bid_placed");
        assert_eq!(body["events"][0]["amount"], "1050");
    }

    #[tokio::test]
    async fn handler_rejects_malformed_json() {
        let (_storage, state) = testing::app_state();
        let body = body::Bytes::from("not json");
        let response = post_bid_handler(State(state), HeaderMap::new(), body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn rejected_bid_reports_the_reason() {
        let response = SubmitBidErrorWrapper(SubmitBidError::Validation(
            ValidationError::BidTooLow {
                required: Amount::from(1000),
            },
        ))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value =
            serde_json::from_slice(&response_body(response).await).unwrap();
        assert_eq!(
            body,
            json!({
                "errorType": "BidTooLow",
                "description": "Bid does not beat the required amount of 1000",
            })
        );
    }

    #[tokio::test]
    async fn unverified_bidder_is_forbidden() {
        let response =
            SubmitBidErrorWrapper(SubmitBidError::Validation(ValidationError::BidderNotVerified))
                .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn busy_is_retryable() {
        let response = SubmitBidErrorWrapper(SubmitBidError::Busy).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn storage_errors_are_internal() {
        let response = SubmitBidErrorWrapper(SubmitBidError::Storage(StorageError::Other(
            anyhow::anyhow!("boom"),
        )))
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn submission_deserializes_from_the_documented_shape() {
        let submission: BidSubmission = serde_json::from_value(json!({
            "lotId": 7,
            "bidderId": 3,
            "amount": "1050",
        }))
        .unwrap();
        assert_eq!(submission.lot_id, 7);
        assert_eq!(submission.bidder_id, 3);
        assert_eq!(submission.amount, Amount::from(1050));
    }

    #[test]
    fn requester_metadata_takes_the_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1, 10.0.0.2".parse().unwrap());
        headers.insert(header::USER_AGENT, "admin-console".parse().unwrap());
        assert_eq!(
            requester_metadata(&headers),
            Some(RequesterMetadata {
                ip: Some("10.0.0.1".to_string()),
                device: Some("admin-console".to_string()),
            })
        );
        assert_eq!(requester_metadata(&HeaderMap::new()), None);
    }
}
