pub mod bidders;
pub mod events;
pub mod lots;

use {
    crate::storage::{BidStorage, EventPage, LotClose, Page, StorageError},
    anyhow::{Context, Result, anyhow},
    async_trait::async_trait,
    model::{
        BidderId, LotId,
        auction::Lot,
        bidder::Bidder,
        events::{BidEvent, EventFilter, LotSelector, PendingEvent},
        leaderboard::Leader,
    },
};

// The pool uses an Arc internally.
#[derive(Clone)]
pub struct Postgres {
    pub pool: sqlx::PgPool,
}

impl Postgres {
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            pool: sqlx::PgPool::connect_lazy(uri)?,
        })
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        database::schema::ensure(&self.pool)
            .await
            .context("failed to ensure database schema")
    }

    pub async fn check_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1;")
            .execute(&self.pool)
            .await
            .context("database connection check failed")?;
        Ok(())
    }
}

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Timing of db queries.
    #[metric(name = "bidboard_database_queries", labels("type"))]
    database_queries: prometheus::HistogramVec,
}

impl Metrics {
    fn get() -> &'static Self {
        Metrics::instance(observe::metrics::get_storage_registry()).unwrap()
    }
}

#[async_trait]
impl BidStorage for Postgres {
    async fn lot(&self, lot: LotId) -> Result<Option<Lot>, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["lot"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let row = database::lots::fetch(&mut ex, lot).await?;
        Ok(row.map(lots::lot_from_row))
    }

    async fn bidder(&self, bidder: BidderId) -> Result<Option<Bidder>, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["bidder"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let row = database::bidders::fetch(&mut ex, bidder).await?;
        Ok(row.map(bidders::bidder_from_row))
    }

    async fn current_leader(&self, lot: LotId) -> Result<Option<Leader>, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["current_leader"])
            .start_timer();
        let mut ex = self.pool.acquire().await?;
        let row = database::bid_events::current_leader(&mut ex, lot).await?;
        Ok(row.map(|row| Leader {
            bidder_id: row.bidder_id,
            amount: row.amount,
            max_bid: row.max_bid,
        }))
    }

    async fn append_events(
        &self,
        events: Vec<PendingEvent>,
    ) -> Result<Vec<BidEvent>, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["append_events"])
            .start_timer();
        let rows: Vec<_> = events.iter().map(events::row_from_pending).collect();
        let mut tx = self.pool.begin().await?;
        let seqs = database::bid_events::append(&mut tx, &rows).await?;
        tx.commit().await?;
        Ok(events
            .into_iter()
            .zip(seqs)
            .map(|(pending, seq)| pending.into_event(seq))
            .collect())
    }

    async fn events(&self, filter: &EventFilter, page: Page) -> Result<EventPage, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["events"])
            .start_timer();
        let query = database::bid_events::EventQuery {
            auction_id: filter.auction_id,
            event_type: filter.event_type.map(events::db_event_type),
            auction_level_only: filter.lot == LotSelector::AuctionLevel,
            lot_number: match filter.lot {
                LotSelector::Number(number) => Some(number),
                _ => None,
            },
            since: filter.since,
            until: filter.until,
            ascending: page.ascending,
            offset: page.offset.try_into().context("page offset out of range")?,
            limit: page.limit.try_into().context("page limit out of range")?,
        };
        let mut ex = self.pool.acquire().await?;
        let (rows, total) = database::bid_events::query(&mut ex, &query).await?;
        let events = rows
            .into_iter()
            .map(events::event_from_row)
            .collect::<Result<_>>()?;
        Ok(EventPage { events, total })
    }

    async fn mark_closing(&self, lot: LotId) -> Result<(), StorageError> {
        let mut ex = self.pool.acquire().await?;
        database::lots::set_status(&mut ex, lot, database::lots::LotStatus::Closing).await?;
        Ok(())
    }

    async fn finalize_lot(
        &self,
        lot: LotId,
        winner: Option<PendingEvent>,
    ) -> Result<LotClose, StorageError> {
        let _timer = Metrics::get()
            .database_queries
            .with_label_values(&["finalize_lot"])
            .start_timer();
        let mut tx = self.pool.begin().await?;
        let row = database::lots::fetch_for_update(&mut tx, lot)
            .await?
            .ok_or_else(|| anyhow!("lot {lot} vanished during finalization"))?;
        if row.status == database::lots::LotStatus::Closed {
            let winner = database::bid_events::winner_event(&mut tx, lot)
                .await?
                .map(events::event_from_row)
                .transpose()?;
            return Ok(LotClose::AlreadyClosed { winner });
        }
        let winner = match winner {
            Some(pending) => {
                let rows = [events::row_from_pending(&pending)];
                let seqs = database::bid_events::append(&mut tx, &rows).await?;
                Some(pending.into_event(seqs[0]))
            }
            None => None,
        };
        database::lots::set_status(&mut tx, lot, database::lots::LotStatus::Closed).await?;
        tx.commit().await?;
        Ok(LotClose::Closed { winner })
    }

    async fn winner_event(&self, lot: LotId) -> Result<Option<BidEvent>, StorageError> {
        let mut ex = self.pool.acquire().await?;
        database::bid_events::winner_event(&mut ex, lot)
            .await?
            .map(events::event_from_row)
            .transpose()
            .map_err(Into::into)
    }
}

#[async_trait]
impl observe::metrics::LivenessChecking for Postgres {
    async fn is_alive(&self) -> bool {
        self.check_connection().await.is_ok()
    }
}
