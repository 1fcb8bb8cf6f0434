use {
    database::lots::{LotRow, LotStatus as DbLotStatus},
    model::auction::{Lot, LotStatus},
};

pub fn lot_from_row(row: LotRow) -> Lot {
    Lot {
        id: row.id,
        auction_id: row.auction_id,
        lot_number: row.lot_number,
        reserve_price: row.reserve_price,
        min_increment: row.min_increment,
        enforce_reserve: row.enforce_reserve,
        status: match row.status {
            DbLotStatus::Open => LotStatus::Open,
            DbLotStatus::Closing => LotStatus::Closing,
            DbLotStatus::Closed => LotStatus::Closed,
        },
    }
}
