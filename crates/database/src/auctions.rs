use {
    chrono::{DateTime, Utc},
    sqlx::PgConnection,
};

/// An auction row as created by the external scheduler.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct AuctionRow {
    pub id: i64,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

pub async fn fetch(ex: &mut PgConnection, id: i64) -> Result<Option<AuctionRow>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM auctions WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn save(ex: &mut PgConnection, auction: &AuctionRow) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO auctions (id, title, starts_at, ends_at) \
        VALUES ($1, $2, $3, $4) \
        ON CONFLICT (id) DO UPDATE SET title = $2, starts_at = $3, ends_at = $4;";
    sqlx::query(QUERY)
        .bind(auction.id)
        .bind(&auction.title)
        .bind(auction.starts_at)
        .bind(auction.ends_at)
        .execute(ex)
        .await?;
    Ok(())
}
