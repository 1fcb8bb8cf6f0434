use {
    database::bidders::BidderRow,
    model::bidder::{AutoBidConfig, Bidder},
};

pub fn bidder_from_row(row: BidderRow) -> Bidder {
    Bidder {
        id: row.id,
        display_name: row.display_name,
        verified: row.verified,
        auto_bid: row.autobid_max.map(|max_bid| AutoBidConfig {
            max_bid,
            active: row.autobid_active,
        }),
    }
}
