//! Contains models that are shared between the bidboard service and its
//! storage layer, with serialization as described by the admin API
//! documentation.

pub mod auction;
pub mod bidder;
pub mod events;
pub mod leaderboard;

/// Monetary amount in the shop's base currency.
///
/// Serialized as a decimal string so that no precision is lost on the wire;
/// stored as NUMERIC. Never a float.
pub type Amount = bigdecimal::BigDecimal;

pub type AuctionId = i64;
pub type LotId = i64;
pub type BidderId = i64;
