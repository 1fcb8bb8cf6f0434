use {
    crate::{
        api::{AppState, error},
        storage::{BidStorage as _, Page},
    },
    anyhow::Context,
    axum::{
        extract::{Query, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    chrono::{DateTime, Utc},
    model::{
        AuctionId,
        events::{BidEvent, EventFilter, EventType, LotSelector},
    },
    serde::{Deserialize, Serialize},
    std::sync::Arc,
};

const DEFAULT_LIMIT: u64 = 50;
const MIN_LIMIT: u64 = 1;
const MAX_LIMIT: u64 = 1000;

/// The synthetic lot filter value for auction-wide events.
const AUCTION_LEVEL: &str = "auction-level";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryParams {
    pub auction_id: Option<AuctionId>,
    /// Event-type filter; the admin view calls it "status".
    pub status: Option<String>,
    pub lot_number: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Eq, PartialEq)]
pub(crate) struct InvalidFilter(String);

impl QueryParams {
    pub(crate) fn validate(&self) -> Result<(EventFilter, Page), InvalidFilter> {
        let event_type = match &self.status {
            None => None,
            Some(status) => Some(status.parse::<EventType>().map_err(|_| {
                InvalidFilter(format!(
                    "Unknown status {status:?}; expected one of bid_placed, auto_bid, outbid, \
                     winner."
                ))
            })?),
        };
        let lot = match self.lot_number.as_deref() {
            None => LotSelector::Any,
            Some(AUCTION_LEVEL) => LotSelector::AuctionLevel,
            Some(number) => LotSelector::Number(number.parse().map_err(|_| {
                InvalidFilter(format!(
                    "Invalid lotNumber {number:?}; expected a lot number or \
                     \"{AUCTION_LEVEL}\"."
                ))
            })?),
        };
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if !(MIN_LIMIT..=MAX_LIMIT).contains(&limit) {
            return Err(InvalidFilter(format!(
                "The pagination limit is [{MIN_LIMIT},{MAX_LIMIT}]."
            )));
        }
        let page = self.page.unwrap_or(0);
        let offset = page
            .checked_mul(limit)
            .ok_or_else(|| InvalidFilter("Page out of range.".to_string()))?;

        Ok((
            EventFilter {
                auction_id: self.auction_id,
                event_type,
                lot,
                since: self.start_date,
                until: self.end_date,
            },
            Page {
                offset,
                limit,
                // The admin view displays newest first.
                ascending: false,
            },
        ))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BidTrackingResponse {
    events: Vec<BidEvent>,
    pagination: Pagination,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Pagination {
    page: u64,
    limit: u64,
    total: i64,
}

pub async fn get_bid_tracking_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueryParams>,
) -> Response {
    let (filter, page) = match query.validate() {
        Ok(validated) => validated,
        Err(InvalidFilter(msg)) => {
            return (StatusCode::BAD_REQUEST, error("InvalidFilter", msg)).into_response();
        }
    };

    let result = state
        .storage
        .events(&filter, page)
        .await
        .context("get_bid_tracking");
    match result {
        Ok(events) => Json(BidTrackingResponse {
            events: events.events,
            pagination: Pagination {
                page: query.page.unwrap_or(0),
                limit: page.limit,
                total: events.total,
            },
        })
        .into_response(),
        // A failed load is distinguishable from an empty ledger: the former
        // is a 500, the latter a 200 with an empty events array.
        Err(err) => {
            tracing::error!(?err, "get_bid_tracking");
            crate::api::internal_error_reply()
        }
    }
}
