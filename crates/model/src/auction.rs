use {
    crate::{Amount, AuctionId, LotId},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    strum::{AsRefStr, Display, EnumString},
};

/// An auction as configured by the external scheduler.
///
/// Immutable once its lots are attached except for lot status transitions.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: AuctionId,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub lots: Vec<Lot>,
}

/// A single item under bid within an auction.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: LotId,
    pub auction_id: AuctionId,
    pub lot_number: i32,
    pub reserve_price: Amount,
    pub min_increment: Amount,
    /// Lots configured to enforce the reserve at submission time reject the
    /// opening bid when it is below the reserve price.
    pub enforce_reserve: bool,
    pub status: LotStatus,
}

impl Lot {
    pub fn is_open(&self) -> bool {
        self.status == LotStatus::Open
    }
}

/// Status transitions are one-way: Open -> Closing -> Closed.
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Display,
    EnumString,
    Eq,
    Hash,
    PartialEq,
    Deserialize,
    Serialize,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "snake_case")]
pub enum LotStatus {
    #[default]
    Open,
    Closing,
    Closed,
}

impl LotStatus {
    pub fn can_transition_to(&self, next: LotStatus) -> bool {
        matches!(
            (self, next),
            (LotStatus::Open, LotStatus::Closing)
                | (LotStatus::Open, LotStatus::Closed)
                | (LotStatus::Closing, LotStatus::Closed)
        )
    }
}
