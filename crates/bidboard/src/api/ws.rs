//! The admin bid-tracking room. Pushes a `new-bid` message for every
//! admitted bid. Push is a hint, not the correctness path: delivery is
//! at-least-once and lossy under lag, and clients reconcile through the
//! query endpoint using the last `seq` they saw.

use {
    crate::{api::AppState, storage::BidStorage as _},
    axum::{
        extract::{
            Query, State, WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::{IntoResponse, Response},
    },
    futures::{SinkExt, StreamExt},
    model::{Amount, AuctionId, BidderId, events::BidEvent},
    serde::{Deserialize, Serialize},
    std::{collections::HashMap, sync::Arc},
    tokio::sync::broadcast::error::RecvError,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryParams {
    /// Restricts the room to a single auction; omitted means all admin
    /// observers see everything.
    pub auction_id: Option<AuctionId>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewBidMessage {
    pub r#type: &'static str,
    pub seq: i64,
    pub auction_id: AuctionId,
    pub amount: Amount,
    pub bidder: BidderName,
}

#[derive(Debug, PartialEq, Serialize)]
pub(crate) struct BidderName {
    pub name: String,
}

pub async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueryParams>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        if let Err(err) = handle_socket(state, socket, query.auction_id).await {
            tracing::debug!(?err, "websocket session ended with error");
        }
    })
    .into_response()
}

async fn handle_socket(
    state: Arc<AppState>,
    socket: WebSocket,
    auction_id: Option<AuctionId>,
) -> anyhow::Result<()> {
    let (mut sink, mut stream) = socket.split();
    let mut bus = state.events.subscribe();
    let mut names: HashMap<BidderId, String> = HashMap::new();

    loop {
        tokio::select! {
            received = bus.recv() => match received {
                Ok(event) => {
                    if auction_id.is_some_and(|id| id != event.auction_id) {
                        continue;
                    }
                    let Some(message) = new_bid_message(&state, &mut names, &event).await else {
                        continue;
                    };
                    let json = serde_json::to_string(&message)?;
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    // The client missed events; it must backfill by seq.
                    tracing::warn!(skipped, "websocket subscriber lagged");
                }
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Pings are answered by the protocol layer.
                Some(Ok(_)) => (),
            },
        }
    }
    Ok(())
}

/// Builds the push message for an admitting event; outbid and winner events
/// are not pushed, observers pick them up through the query endpoint.
async fn new_bid_message(
    state: &AppState,
    names: &mut HashMap<BidderId, String>,
    event: &BidEvent,
) -> Option<NewBidMessage> {
    if !event.kind.admits_leader() {
        return None;
    }
    let bidder_id = event.kind.bidder_id();
    let name = match names.get(&bidder_id) {
        Some(name) => name.clone(),
        None => {
            let name = match state.storage.bidder(bidder_id).await {
                Ok(Some(bidder)) => bidder.display_name,
                Ok(None) => "unknown".to_string(),
                Err(err) => {
                    // Degrade instead of dropping the session; the name is
                    // display sugar.
                    tracing::warn!(?err, bidder_id, "failed to resolve bidder name");
                    return Some(message(event, "unknown".to_string()));
                }
            };
            names.insert(bidder_id, name.clone());
            name
        }
    };
    Some(message(event, name))
}

fn message(event: &BidEvent, name: String) -> NewBidMessage {
    NewBidMessage {
        r#type: "new-bid",
        seq: event.seq,
        auction_id: event.auction_id,
        amount: event.kind.amount().clone(),
        bidder: BidderName { name },
    }
}
