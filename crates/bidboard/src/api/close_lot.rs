use {
    crate::{
        api::{AppState, error},
        finalizer::CloseLotError,
    },
    axum::{
        extract::{Path, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
    },
    model::{LotId, events::BidEvent},
    serde::Serialize,
    std::sync::Arc,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CloseLotResponse {
    winner: Option<BidEvent>,
}

/// The external scheduler's lot-closed signal. Idempotent; repeating the
/// call returns the already stored winner event.
pub async fn close_lot_handler(
    State(state): State<Arc<AppState>>,
    Path(lot_id): Path<LotId>,
) -> Response {
    match state.finalizer.close_lot(lot_id).await {
        Ok(winner) => Json(CloseLotResponse { winner }).into_response(),
        Err(err) => CloseLotErrorWrapper(err).into_response(),
    }
}

pub(crate) struct CloseLotErrorWrapper(pub CloseLotError);

impl IntoResponse for CloseLotErrorWrapper {
    fn into_response(self) -> Response {
        match self.0 {
            CloseLotError::UnknownLot => (
                StatusCode::NOT_FOUND,
                error("UnknownLot", "No lot with this id"),
            )
                .into_response(),
            CloseLotError::Busy => (
                StatusCode::TOO_MANY_REQUESTS,
                error("Busy", "The lot is processing another bid, retry shortly"),
            )
                .into_response(),
            CloseLotError::Storage(err) => {
                tracing::error!(?err, "close_lot");
                crate::api::internal_error_reply()
            }
        }
    }
}
