pub mod auctions;
pub mod bid_events;
pub mod bidders;
pub mod lots;
pub mod schema;

use sqlx::{Executor, PgPool};

// Design:
//
// Functions that execute multiple statements take `&mut PgTransaction` to
// indicate this and to ensure that the whole function succeeds or fails
// together. Functions that execute a single statement take `&mut
// PgConnection`. We usually call the parameter `ex` for `Executor` which is
// the trait whose methods we use to run queries.
// This scheme allows callers to decide whether they want to use the function
// as part of a bigger transaction or standalone. Note that PgTransaction
// implements Deref to PgConnection. Callers do need to take care of calling
// `commit` on the transaction.

pub type PgTransaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

/// The tables this crate writes to, in dependency order.
pub const TABLES: &[&str] = &["bid_events", "lots", "bidders", "auctions"];

/// Deletes all data and resets the event sequence. Tests only.
#[allow(non_snake_case)]
pub async fn clear_DANGER(pool: &PgPool) -> sqlx::Result<()> {
    let mut ex = pool.begin().await?;
    for table in TABLES {
        ex.execute(format!("TRUNCATE {table};").as_str()).await?;
    }
    ex.execute("UPDATE bid_event_sequence SET next_seq = 1;")
        .await?;
    ex.commit().await
}
