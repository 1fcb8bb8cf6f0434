use sqlx::{PgConnection, types::BigDecimal};

#[derive(Clone, Copy, Debug, Eq, PartialEq, sqlx::Type)]
#[sqlx(type_name = "LotStatus")]
#[sqlx(rename_all = "snake_case")]
pub enum LotStatus {
    Open,
    Closing,
    Closed,
}

/// A lot row. Written by the storefront's catalog management; this engine
/// only reads it and advances `status`.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct LotRow {
    pub id: i64,
    pub auction_id: i64,
    pub lot_number: i32,
    pub reserve_price: BigDecimal,
    pub min_increment: BigDecimal,
    pub enforce_reserve: bool,
    pub status: LotStatus,
}

pub async fn fetch(ex: &mut PgConnection, id: i64) -> Result<Option<LotRow>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM lots WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

/// Like [`fetch`] but takes the row lock, serializing concurrent status
/// transitions in the surrounding transaction.
pub async fn fetch_for_update(
    ex: &mut PgConnection,
    id: i64,
) -> Result<Option<LotRow>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM lots WHERE id = $1 FOR UPDATE;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn save(ex: &mut PgConnection, lot: &LotRow) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO lots ( \
            id, auction_id, lot_number, reserve_price, min_increment, \
            enforce_reserve, status) \
        VALUES ($1, $2, $3, $4, $5, $6, $7) \
        ON CONFLICT (id) DO UPDATE SET \
            auction_id = $2, lot_number = $3, reserve_price = $4, \
            min_increment = $5, enforce_reserve = $6, status = $7;";
    sqlx::query(QUERY)
        .bind(lot.id)
        .bind(lot.auction_id)
        .bind(lot.lot_number)
        .bind(&lot.reserve_price)
        .bind(&lot.min_increment)
        .bind(lot.enforce_reserve)
        .bind(lot.status)
        .execute(ex)
        .await?;
    Ok(())
}

pub async fn set_status(
    ex: &mut PgConnection,
    id: i64,
    status: LotStatus,
) -> Result<(), sqlx::Error> {
    const QUERY: &str = "UPDATE lots SET status = $2 WHERE id = $1;";
    sqlx::query(QUERY).bind(id).bind(status).execute(ex).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{clear_DANGER, schema},
        sqlx::PgPool,
    };

    #[tokio::test]
    #[ignore]
    async fn postgres_lot_round_trip() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        schema::ensure(&pool).await.unwrap();
        clear_DANGER(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let lot = LotRow {
            id: 7,
            auction_id: 1,
            lot_number: 3,
            reserve_price: BigDecimal::from(1000),
            min_increment: BigDecimal::from(100),
            enforce_reserve: true,
            status: LotStatus::Open,
        };
        save(&mut conn, &lot).await.unwrap();
        assert_eq!(fetch(&mut conn, 7).await.unwrap(), Some(lot.clone()));

        set_status(&mut conn, 7, LotStatus::Closed).await.unwrap();
        assert_eq!(
            fetch(&mut conn, 7).await.unwrap().unwrap().status,
            LotStatus::Closed
        );
        assert_eq!(fetch(&mut conn, 8).await.unwrap(), None);
    }
}
