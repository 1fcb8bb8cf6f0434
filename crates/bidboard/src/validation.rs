use {
    model::{Amount, auction::Lot, bidder::Bidder, leaderboard::Leader},
    strum::AsRefStr,
    thiserror::Error,
};

/// Expected rejections, returned synchronously to the caller and never
/// logged as failures.
#[derive(AsRefStr, Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("lot is not open for bidding")]
    LotNotOpen,
    #[error("bidder is not verified for auction bidding")]
    BidderNotVerified,
    /// With a standing leader `required` is the leading amount, which the
    /// bid must strictly exceed; on a reserve-enforcing lot without bids it
    /// is the reserve price, which the bid must at least meet.
    #[error("bid does not beat the required amount of {required}")]
    BidTooLow { required: Amount },
}

#[cfg_attr(test, mockall::automock)]
pub trait BidValidating: Send + Sync {
    /// Checks a submission against the authoritative lot state. Read-only
    /// and side-effect-free; must run under the lot's exclusive section so
    /// `leader` cannot be stale.
    fn validate<'a>(
        &self,
        lot: &Lot,
        bidder: &Bidder,
        leader: Option<&'a Leader>,
        amount: &Amount,
    ) -> Result<(), ValidationError>;
}

#[derive(Default)]
pub struct BidValidator;

impl BidValidating for BidValidator {
    fn validate<'a>(
        &self,
        lot: &Lot,
        bidder: &Bidder,
        leader: Option<&'a Leader>,
        amount: &Amount,
    ) -> Result<(), ValidationError> {
        if !lot.is_open() {
            return Err(ValidationError::LotNotOpen);
        }
        if !bidder.verified {
            return Err(ValidationError::BidderNotVerified);
        }
        match leader {
            // A bid equal to the leading amount is already outbid; rejecting
            // it here avoids a redundant admit-then-outbid ledger pair.
            Some(leader) if amount <= &leader.amount => Err(ValidationError::BidTooLow {
                required: leader.amount.clone(),
            }),
            None if lot.enforce_reserve && amount < &lot.reserve_price => {
                Err(ValidationError::BidTooLow {
                    required: lot.reserve_price.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        model::auction::LotStatus,
    };

    fn lot(status: LotStatus, enforce_reserve: bool) -> Lot {
        Lot {
            id: 7,
            auction_id: 1,
            lot_number: 1,
            reserve_price: Amount::from(1000),
            min_increment: Amount::from(100),
            enforce_reserve,
            status,
        }
    }

    fn bidder(verified: bool) -> Bidder {
        Bidder {
            id: 1,
            display_name: "alice".to_string(),
            verified,
            auto_bid: None,
        }
    }

    fn leader(amount: u32) -> Leader {
        Leader {
            bidder_id: 9,
            amount: Amount::from(amount),
            max_bid: None,
        }
    }

    #[test]
    fn rejects_lot_not_open() {
        for status in [LotStatus::Closing, LotStatus::Closed] {
            assert_eq!(
                BidValidator.validate(&lot(status, false), &bidder(true), None, &Amount::from(1)),
                Err(ValidationError::LotNotOpen)
            );
        }
    }

    #[test]
    fn rejects_unverified_bidder() {
        assert_eq!(
            BidValidator.validate(
                &lot(LotStatus::Open, false),
                &bidder(false),
                None,
                &Amount::from(5000)
            ),
            Err(ValidationError::BidderNotVerified)
        );
    }

    #[test]
    fn rejects_bid_not_exceeding_the_leader() {
        let lot = lot(LotStatus::Open, false);
        // Equal to the leading amount: already outbid.
        assert_eq!(
            BidValidator.validate(&lot, &bidder(true), Some(&leader(1000)), &Amount::from(1000)),
            Err(ValidationError::BidTooLow {
                required: Amount::from(1000)
            })
        );
        // Any amount strictly above the leader is admissible; the minimum
        // increment only governs system raises.
        assert_eq!(
            BidValidator.validate(&lot, &bidder(true), Some(&leader(1000)), &Amount::from(1050)),
            Ok(())
        );
    }

    #[test]
    fn enforces_reserve_at_submission_when_configured() {
        assert_eq!(
            BidValidator.validate(
                &lot(LotStatus::Open, true),
                &bidder(true),
                None,
                &Amount::from(999)
            ),
            Err(ValidationError::BidTooLow {
                required: Amount::from(1000)
            })
        );
        // Meeting the reserve exactly is fine.
        assert_eq!(
            BidValidator.validate(
                &lot(LotStatus::Open, true),
                &bidder(true),
                None,
                &Amount::from(1000)
            ),
            Ok(())
        );
        // Without enforcement the opening bid may be below the reserve.
        assert_eq!(
            BidValidator.validate(
                &lot(LotStatus::Open, false),
                &bidder(true),
                None,
                &Amount::from(1)
            ),
            Ok(())
        );
    }
}
