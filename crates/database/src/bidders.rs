use sqlx::{PgConnection, types::BigDecimal};

/// A bidder row. Profile CRUD lives in the storefront; the engine reads the
/// verification flag and the auto-bid configuration.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct BidderRow {
    pub id: i64,
    pub display_name: String,
    pub verified: bool,
    pub autobid_max: Option<BigDecimal>,
    pub autobid_active: bool,
}

pub async fn fetch(ex: &mut PgConnection, id: i64) -> Result<Option<BidderRow>, sqlx::Error> {
    const QUERY: &str = "SELECT * FROM bidders WHERE id = $1;";
    sqlx::query_as(QUERY).bind(id).fetch_optional(ex).await
}

pub async fn save(ex: &mut PgConnection, bidder: &BidderRow) -> Result<(), sqlx::Error> {
    const QUERY: &str = "\
        INSERT INTO bidders (id, display_name, verified, autobid_max, autobid_active) \
        VALUES ($1, $2, $3, $4, $5) \
        ON CONFLICT (id) DO UPDATE SET \
            display_name = $2, verified = $3, autobid_max = $4, autobid_active = $5;";
    sqlx::query(QUERY)
        .bind(bidder.id)
        .bind(&bidder.display_name)
        .bind(bidder.verified)
        .bind(&bidder.autobid_max)
        .bind(bidder.autobid_active)
        .execute(ex)
        .await?;
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
    async fn postgres_bidder_round_trip() {
        let pool = PgPool::connect("postgresql://").await.unwrap();
        schema::ensure(&pool).await.unwrap();
        clear_DANGER(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let bidder = BidderRow {
            id: 1,
            display_name: "alice".to_string(),
            verified: true,
            autobid_max: Some(BigDecimal::from(1200)),
            autobid_active: true,
        };
        save(&mut conn, &bidder).await.unwrap();
        assert_eq!(fetch(&mut conn, 1).await.unwrap(), Some(bidder));
        assert_eq!(fetch(&mut conn, 2).await.unwrap(), None);
    }
}
