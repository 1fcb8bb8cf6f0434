//! Schema bootstrap for deployments that do not run a separate migration
//! tool. All statements are idempotent.

use sqlx::PgPool;

const DDL: &str = r#"
DO $$ BEGIN
    CREATE TYPE "BidEventType" AS ENUM ('bid_placed', 'auto_bid', 'outbid', 'winner');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE "BidTrigger" AS ENUM ('manual', 'reserve_bidder', 'reserve_defense');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

DO $$ BEGIN
    CREATE TYPE "LotStatus" AS ENUM ('open', 'closing', 'closed');
EXCEPTION WHEN duplicate_object THEN NULL;
END $$;

CREATE TABLE IF NOT EXISTS auctions (
    id bigint PRIMARY KEY,
    title text NOT NULL,
    starts_at timestamptz NOT NULL,
    ends_at timestamptz NOT NULL
);

CREATE TABLE IF NOT EXISTS lots (
    id bigint PRIMARY KEY,
    auction_id bigint NOT NULL,
    lot_number int NOT NULL,
    reserve_price numeric NOT NULL,
    min_increment numeric NOT NULL,
    enforce_reserve boolean NOT NULL DEFAULT false,
    status "LotStatus" NOT NULL DEFAULT 'open'
);

CREATE TABLE IF NOT EXISTS bidders (
    id bigint PRIMARY KEY,
    display_name text NOT NULL,
    verified boolean NOT NULL DEFAULT false,
    autobid_max numeric,
    autobid_active boolean NOT NULL DEFAULT false
);

CREATE TABLE IF NOT EXISTS bid_events (
    seq bigint PRIMARY KEY,
    auction_id bigint NOT NULL,
    lot_id bigint,
    event_type "BidEventType" NOT NULL,
    bidder_id bigint NOT NULL,
    amount numeric NOT NULL,
    previous_amount numeric,
    max_bid numeric,
    trigger_kind "BidTrigger",
    timestamp timestamptz NOT NULL,
    requester_ip text,
    requester_device text
);

CREATE INDEX IF NOT EXISTS bid_events_lot_seq ON bid_events (lot_id, seq DESC);
CREATE INDEX IF NOT EXISTS bid_events_auction_seq ON bid_events (auction_id, seq DESC);

-- Single-row counter holding the next sequence number to assign. Appends
-- lock this row inside their transaction, which both serializes sequence
-- assignment and guarantees that a rolled back append consumes nothing.
CREATE TABLE IF NOT EXISTS bid_event_sequence (
    onerow boolean PRIMARY KEY DEFAULT true CHECK (onerow),
    next_seq bigint NOT NULL
);

INSERT INTO bid_event_sequence (onerow, next_seq)
SELECT true, 1
WHERE NOT EXISTS (SELECT 1 FROM bid_event_sequence);
"#;

pub async fn ensure(pool: &PgPool) -> sqlx::Result<()> {
    sqlx::raw_sql(DDL).execute(pool).await?;
    Ok(())
}
