use axum::async_trait;
use sqlx::PgPool;

use crate::content::reorder::{OrderStore, OrderUpdate};
use crate::content::repo_types::{Collection, OrderableRow};

/// Rows in display order.
pub async fn list(db: &PgPool, collection: Collection) -> anyhow::Result<Vec<OrderableRow>> {
    let sql = format!(
        "SELECT id, title, content, sort_order, created_at FROM {} \
         ORDER BY sort_order, created_at, id",
        collection.table()
    );
    let rows = sqlx::query_as::<_, OrderableRow>(&sql).fetch_all(db).await?;
    Ok(rows)
}

/// Persist a batch of order changes as per-id updates. Deliberately not a
/// transaction: partial application is tolerated by the caller's rollback.
pub async fn update_orders(
    db: &PgPool,
    collection: Collection,
    updates: &[OrderUpdate],
) -> anyhow::Result<()> {
    let sql = format!(
        "UPDATE {} SET sort_order = $1 WHERE id = $2",
        collection.table()
    );
    for update in updates {
        sqlx::query(&sql)
            .bind(update.sort_order)
            .bind(update.id)
            .execute(db)
            .await?;
    }
    Ok(())
}

/// `OrderStore` backed by one collection's table.
pub struct SqlOrderStore<'a> {
    pub db: &'a PgPool,
    pub collection: Collection,
}

#[async_trait]
impl OrderStore for SqlOrderStore<'_> {
    async fn persist_orders(&self, updates: &[OrderUpdate]) -> anyhow::Result<()> {
        update_orders(self.db, self.collection, updates).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_round_trip_to_tables() {
        for (slug, table) in [
            ("certifications", "certifications"),
            ("experience", "experience_entries"),
            ("services", "service_offerings"),
        ] {
            let collection = Collection::from_slug(slug).expect("known slug");
            assert_eq!(collection.table(), table);
        }
        assert!(Collection::from_slug("projects").is_none());
    }
}
