use {
    crate::{Amount, BidderId},
    serde::{Deserialize, Serialize},
};

/// A customer admitted to the auction subsystem.
///
/// Profile management happens elsewhere; the engine only reads the identity,
/// the auction-verification flag and the optional auto-bid configuration.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bidder {
    pub id: BidderId,
    pub display_name: String,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_bid: Option<AutoBidConfig>,
}

/// A bidder-set ceiling the system may use to raise their bid without
/// further manual action.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoBidConfig {
    pub max_bid: Amount,
    pub active: bool,
}

impl Bidder {
    /// The ceiling up to which the system may bid on this bidder's behalf,
    /// if their auto-bid configuration is present and active.
    pub fn active_ceiling(&self) -> Option<&Amount> {
        self.auto_bid
            .as_ref()
            .filter(|config| config.active)
            .map(|config| &config.max_bid)
    }
}
