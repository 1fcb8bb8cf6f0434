//! The append-only bid event ledger. Rows are inserted exactly once and
//! never updated or deleted; sequence numbers are assigned inside the
//! inserting transaction and are gapless across restarts.

use {
    crate::PgTransaction,
    chrono::{DateTime, Utc},
    sqlx::{PgConnection, types::BigDecimal},
    tracing::instrument,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "BidEventType")]
#[sqlx(rename_all = "snake_case")]
pub enum BidEventType {
    BidPlaced,
    AutoBid,
    Outbid,
    Winner,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "BidTrigger")]
#[sqlx(rename_all = "snake_case")]
pub enum BidTrigger {
    Manual,
    ReserveBidder,
    ReserveDefense,
}

/// A persisted ledger row.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct BidEventRow {
    pub seq: i64,
    pub auction_id: i64,
    /// NULL marks an auction-level event.
    pub lot_id: Option<i64>,
    pub event_type: BidEventType,
    pub bidder_id: i64,
    pub amount: BigDecimal,
    pub previous_amount: Option<BigDecimal>,
    pub max_bid: Option<BigDecimal>,
    pub trigger_kind: Option<BidTrigger>,
    pub timestamp: DateTime<Utc>,
    pub requester_ip: Option<String>,
    pub requester_device: Option<String>,
}

/// A row to be appended; the sequence number is assigned by [`append`].
#[derive(Clone, Debug, PartialEq)]
pub struct NewBidEvent {
    pub auction_id: i64,
    pub lot_id: Option<i64>,
    pub event_type: BidEventType,
    pub bidder_id: i64,
    pub amount: BigDecimal,
    pub previous_amount: Option<BigDecimal>,
    pub max_bid: Option<BigDecimal>,
    pub trigger_kind: Option<BidTrigger>,
    pub timestamp: DateTime<Utc>,
    pub requester_ip: Option<String>,
    pub requester_device: Option<String>,
}

/// Appends a batch of events, assigning consecutive sequence numbers, and
/// returns the first assigned number. The counter row is updated in the same
/// transaction as the inserts: concurrent appends serialize on its row lock
/// and a rollback releases the lock without consuming numbers.
#[instrument(skip_all, fields(events = events.len()))]
pub async fn append(
    ex: &mut PgTransaction<'_>,
    events: &[NewBidEvent],
) -> Result<Vec<i64>, sqlx::Error> {
    if events.is_empty() {
        return Ok(Vec::new());
    }
    let count: i64 = events.len().try_into().expect("event batch exceeds i64");

    const RESERVE: &str = "\
        UPDATE bid_event_sequence SET next_seq = next_seq + $1 RETURNING next_seq - $1;";
    let start: i64 = sqlx::query_scalar(RESERVE)
        .bind(count)
        .fetch_one(&mut **ex)
        .await?;

    const INSERT: &str = "\
        INSERT INTO bid_events ( \
            seq, auction_id, lot_id, event_type, bidder_id, amount, \
            previous_amount, max_bid, trigger_kind, timestamp, \
            requester_ip, requester_device) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12);";
    for (event, seq) in events.iter().zip(start..) {
        sqlx::query(INSERT)
            .bind(seq)
            .bind(event.auction_id)
            .bind(event.lot_id)
            .bind(event.event_type)
            .bind(event.bidder_id)
            .bind(&event.amount)
            .bind(&event.previous_amount)
            .bind(&event.max_bid)
            .bind(event.trigger_kind)
            .bind(event.timestamp)
            .bind(&event.requester_ip)
            .bind(&event.requester_device)
            .execute(&mut **ex)
            .await?;
    }
    Ok((start..start + count).collect())
}

/// Ledger query mirroring the admin filter set. Any `None`/default field is
/// unfiltered.
#[derive(Clone, Debug, Default)]
pub struct EventQuery {
    pub auction_id: Option<i64>,
    pub event_type: Option<BidEventType>,
    /// Only return auction-level events (rows without a lot).
    pub auction_level_only: bool,
    pub lot_number: Option<i32>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub ascending: bool,
    pub offset: i64,
    pub limit: i64,
}

#[derive(sqlx::FromRow)]
struct EventsQueryRow {
    #[sqlx(flatten)]
    event: BidEventRow,
    total_count: i64,
}

const QUERY_COLUMNS: &str = "\
    e.seq, e.auction_id, e.lot_id, e.event_type, e.bidder_id, e.amount, \
    e.previous_amount, e.max_bid, e.trigger_kind, e.timestamp, \
    e.requester_ip, e.requester_device, \
    COUNT(*) OVER() AS total_count \
    FROM bid_events e \
    LEFT JOIN lots l ON l.id = e.lot_id \
    WHERE ($1 IS NULL OR e.auction_id = $1) \
    AND   ($2 IS NULL OR e.event_type = $2) \
    AND   (NOT $3 OR e.lot_id IS NULL) \
    AND   ($4 IS NULL OR l.lot_number = $4) \
    AND   ($5 IS NULL OR e.timestamp >= $5) \
    AND   ($6 IS NULL OR e.timestamp <= $6) ";

/// Runs a filtered, paginated ledger query. Returns the page of rows and the
/// total number of matching rows.
#[instrument(skip_all)]
pub async fn query(
    ex: &mut PgConnection,
    filter: &EventQuery,
) -> Result<(Vec<BidEventRow>, i64), sqlx::Error> {
    // Two constants instead of dynamic SQL so the queries stay greppable.
    const QUERY_ASC: &str = const_format::concatcp!(
        "SELECT ",
        QUERY_COLUMNS,
        "ORDER BY e.seq ASC LIMIT $7 OFFSET $8;"
    );
    const QUERY_DESC: &str = const_format::concatcp!(
        "SELECT ",
        QUERY_COLUMNS,
        "ORDER BY e.seq DESC LIMIT $7 OFFSET $8;"
    );

    let query = if filter.ascending { QUERY_ASC } else { QUERY_DESC };
    let rows: Vec<EventsQueryRow> = sqlx::query_as(query)
        .bind(filter.auction_id)
        .bind(filter.event_type)
        .bind(filter.auction_level_only)
        .bind(filter.lot_number)
        .bind(filter.since)
        .bind(filter.until)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(ex)
        .await?;

    let total = rows.first().map(|row| row.total_count).unwrap_or_default();
    Ok((rows.into_iter().map(|row| row.event).collect(), total))
}

/// The current leader of a lot, scanned backward from the latest admitting
/// event, joined with the bidder's active auto-bid ceiling.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct LeaderRow {
    pub bidder_id: i64,
    pub amount: BigDecimal,
    pub max_bid: Option<BigDecimal>,
}

pub async fn current_leader(
    ex: &mut PgConnection,
    lot_id: i64,
) -> Result<Option<LeaderRow>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT e.bidder_id, e.amount, \
               CASE WHEN b.autobid_active THEN b.autobid_max END AS max_bid \
        FROM bid_events e \
        LEFT JOIN bidders b ON b.id = e.bidder_id \
        WHERE e.lot_id = $1 AND e.event_type IN ('bid_placed', 'auto_bid') \
        ORDER BY e.seq DESC \
        LIMIT 1;";
    sqlx::query_as(QUERY).bind(lot_id).fetch_optional(ex).await
}

/// The terminal winner event of a lot, if it was already finalized.
pub async fn winner_event(
    ex: &mut PgConnection,
    lot_id: i64,
) -> Result<Option<BidEventRow>, sqlx::Error> {
    const QUERY: &str = "\
        SELECT * FROM bid_events \
        WHERE lot_id = $1 AND event_type = 'winner' \
        ORDER BY seq DESC \
        LIMIT 1;";
    sqlx::query_as(QUERY).bind(lot_id).fetch_optional(ex).await
}

/// Highest assigned sequence number, 0 for an empty ledger.
pub async fn last_seq(ex: &mut PgConnection) -> Result<i64, sqlx::Error> {
    const QUERY: &str = "SELECT COALESCE(MAX(seq), 0) FROM bid_events;";
    sqlx::query_scalar(QUERY).fetch_one(ex).await
}
