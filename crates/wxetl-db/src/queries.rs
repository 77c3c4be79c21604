//! Warehouse operations for the MySQL and SQLite backends

use crate::{MySqlWarehouse, SqliteWarehouse, ROWS_PER_INSERT};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::{MySql, MySqlConnection, QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, instrument, warn};
use wxetl_core::{NormalizedRow, RowKey, TableRef, Warehouse};

/// Same schema, name with a suffix
fn sibling(table: &TableRef, suffix: &str) -> Result<TableRef> {
    Ok(TableRef::new(
        table.schema(),
        &format!("{}_{}", table.name(), suffix),
    )?)
}

async fn insert_mysql(
    conn: &mut MySqlConnection,
    table: &TableRef,
    rows: &[NormalizedRow],
) -> Result<()> {
    let prefix = MySqlWarehouse::DIALECT.insert_prefix(table);
    for chunk in rows.chunks(ROWS_PER_INSERT) {
        let mut builder = QueryBuilder::<MySql>::new(&prefix);
        builder.push_values(chunk, |mut b, row| push_row!(b, row));
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

async fn insert_sqlite(
    conn: &mut SqliteConnection,
    table: &TableRef,
    rows: &[NormalizedRow],
) -> Result<()> {
    let prefix = SqliteWarehouse::DIALECT.insert_prefix(table);
    for chunk in rows.chunks(ROWS_PER_INSERT) {
        let mut builder = QueryBuilder::<Sqlite>::new(&prefix);
        builder.push_values(chunk, |mut b, row| push_row!(b, row));
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl Warehouse for MySqlWarehouse {
    fn name(&self) -> &str {
        "mysql"
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM information_schema.tables
            WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ?
            "#,
        )
        .bind(table.schema())
        .bind(table.name())
        .fetch_one(self.pool())
        .await?;

        Ok(count > 0)
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn read_existing_keys(&self, table: &TableRef) -> Result<Vec<RowKey>> {
        let sql = Self::DIALECT.select_keys_sql(table);
        let keys = sqlx::query_as::<_, (String, NaiveDateTime)>(&sql)
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(|(city, timestamp)| RowKey::new(city, timestamp))
            .collect::<Vec<_>>();

        debug!("Read {} stored keys from {}", keys.len(), table);
        Ok(keys)
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn create_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        sqlx::query(&Self::DIALECT.create_table_sql(table))
            .execute(self.pool())
            .await
            .with_context(|| format!("creating {}", table))?;

        self.append_rows(table, rows).await
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn append_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        insert_mysql(&mut *tx, table, rows).await?;
        tx.commit().await?;

        debug!("Inserted {} rows into {}", rows.len(), table);
        Ok(())
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn replace_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let delete = Self::DIALECT.delete_key_sql(table);
        let mut tx = self.pool().begin().await?;
        for row in rows {
            sqlx::query(&delete)
                .bind(row.city.as_str())
                .bind(row.key().timestamp())
                .execute(&mut *tx)
                .await?;
        }
        insert_mysql(&mut *tx, table, rows).await?;
        tx.commit().await?;

        debug!("Replaced {} rows in {}", rows.len(), table);
        Ok(())
    }

    /// MySQL commits DDL implicitly, so the new contents are built in a
    /// staging table and swapped in with one `RENAME TABLE`.
    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn recreate_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let dialect = Self::DIALECT;
        let staging = sibling(table, "staging")?;
        let retired = sibling(table, "retired")?;

        sqlx::query(&dialect.drop_table_sql(&staging))
            .execute(self.pool())
            .await?;
        if let Err(e) = self.create_table(&staging, rows).await {
            if let Err(cleanup) = sqlx::query(&dialect.drop_table_sql(&staging))
                .execute(self.pool())
                .await
            {
                warn!("Could not drop {}: {}", staging, cleanup);
            }
            return Err(e.context(format!("staging rows for {}", table)));
        }

        let swap = if self.table_exists(table).await? {
            sqlx::query(&dialect.drop_table_sql(&retired))
                .execute(self.pool())
                .await?;
            format!(
                "RENAME TABLE {} TO {}, {} TO {}",
                dialect.qualified(table),
                dialect.qualified(&retired),
                dialect.qualified(&staging),
                dialect.qualified(table)
            )
        } else {
            format!(
                "RENAME TABLE {} TO {}",
                dialect.qualified(&staging),
                dialect.qualified(table)
            )
        };
        sqlx::query(&swap)
            .execute(self.pool())
            .await
            .with_context(|| format!("swapping in {}", table))?;
        sqlx::query(&dialect.drop_table_sql(&retired))
            .execute(self.pool())
            .await?;

        debug!("Recreated {} with {} rows", table, rows.len());
        Ok(())
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        sqlx::query(&Self::DIALECT.drop_table_sql(table))
            .execute(self.pool())
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Warehouse for SqliteWarehouse {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn table_exists(&self, table: &TableRef) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}.sqlite_master WHERE type = 'table' AND name = ?",
            Self::DIALECT.quote(table.schema().unwrap_or("main"))
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(table.name())
            .fetch_one(self.pool())
            .await?;

        Ok(count > 0)
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn read_existing_keys(&self, table: &TableRef) -> Result<Vec<RowKey>> {
        let sql = Self::DIALECT.select_keys_sql(table);
        let keys = sqlx::query_as::<_, (String, NaiveDateTime)>(&sql)
            .fetch_all(self.pool())
            .await?
            .into_iter()
            .map(|(city, timestamp)| RowKey::new(city, timestamp))
            .collect::<Vec<_>>();

        debug!("Read {} stored keys from {}", keys.len(), table);
        Ok(keys)
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn create_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        sqlx::query(&Self::DIALECT.create_table_sql(table))
            .execute(self.pool())
            .await
            .with_context(|| format!("creating {}", table))?;

        self.append_rows(table, rows).await
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn append_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool().begin().await?;
        insert_sqlite(&mut *tx, table, rows).await?;
        tx.commit().await?;

        debug!("Inserted {} rows into {}", rows.len(), table);
        Ok(())
    }

    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn replace_rows(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let delete = Self::DIALECT.delete_key_sql(table);
        let mut tx = self.pool().begin().await?;
        for row in rows {
            sqlx::query(&delete)
                .bind(row.city.as_str())
                .bind(row.key().timestamp())
                .execute(&mut *tx)
                .await?;
        }
        insert_sqlite(&mut *tx, table, rows).await?;
        tx.commit().await?;

        debug!("Replaced {} rows in {}", rows.len(), table);
        Ok(())
    }

    /// Drop, create and fill in one transaction; SQLite DDL rolls back too.
    #[instrument(skip(self, table, rows), fields(table = %table, rows = rows.len()))]
    async fn recreate_table(&self, table: &TableRef, rows: &[NormalizedRow]) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query(&Self::DIALECT.drop_table_sql(table))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&Self::DIALECT.create_table_sql(table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("creating {}", table))?;
        insert_sqlite(&mut *tx, table, rows).await?;
        tx.commit().await?;

        debug!("Recreated {} with {} rows", table, rows.len());
        Ok(())
    }

    #[instrument(skip(self, table), fields(table = %table))]
    async fn drop_table(&self, table: &TableRef) -> Result<()> {
        sqlx::query(&Self::DIALECT.drop_table_sql(table))
            .execute(self.pool())
            .await?;
        Ok(())
    }
}
