//! Chunked multi-row upserts shared by the dimension and fact loaders

use sqlx::query_builder::Separated;
use sqlx::{Connection, PgConnection, Postgres, QueryBuilder};
use tracing::{debug, warn};

/// Bind parameters PostgreSQL accepts in one statement
pub const MAX_BIND_PARAMS: usize = u16::MAX as usize;

/// A row that can be written with `INSERT ... VALUES ... ON CONFLICT`
pub trait UpsertRow: Send + Sync {
    /// Values bound per row
    const COLUMNS: usize;
    /// `INSERT INTO table (columns)` prefix; `VALUES` is appended by the builder
    const INSERT: &'static str;
    /// Conflict clause appended after the value list
    const ON_CONFLICT: &'static str;

    /// Bind this row's values, in `INSERT` column order
    fn push_binds<'args>(&'args self, b: &mut Separated<'_, 'args, Postgres, &'static str>);
}

/// Rows per statement: `batch_size`, capped so one chunk stays within
/// [`MAX_BIND_PARAMS`]
pub fn chunk_rows<T: UpsertRow>(batch_size: usize) -> usize {
    batch_size.clamp(1, (MAX_BIND_PARAMS / T::COLUMNS.max(1)).max(1))
}

/// Upsert `rows` in chunks of `batch_size`, all inside one transaction.
///
/// Any failure rolls the whole transaction back, so either every chunk is
/// visible or none is. Returns the number of rows affected.
pub async fn upsert_rows<T: UpsertRow>(
    conn: &mut PgConnection,
    rows: &[T],
    batch_size: usize,
) -> Result<u64, sqlx::Error> {
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_size = chunk_rows::<T>(batch_size);
    if chunk_size < batch_size {
        warn!(
            batch_size,
            chunk_size,
            columns = T::COLUMNS,
            "Batch size exceeds the bind parameter limit, using smaller chunks"
        );
    }
    let total_chunks = rows.len().div_ceil(chunk_size);
    let mut tx = conn.begin().await?;
    let mut affected = 0;

    for (chunk_idx, chunk) in rows.chunks(chunk_size).enumerate() {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(T::INSERT);
        builder.push_values(chunk, |mut b, row| row.push_binds(&mut b));
        builder.push(T::ON_CONFLICT);

        match builder.build().execute(&mut *tx).await {
            Ok(result) => {
                affected += result.rows_affected();
                debug!(
                    chunk = chunk_idx + 1,
                    total_chunks,
                    rows = chunk.len(),
                    "Upserted chunk"
                );
            },
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            },
        }
    }

    tx.commit().await?;
    Ok(affected)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Wide;

    impl UpsertRow for Wide {
        const COLUMNS: usize = 9;
        const INSERT: &'static str = "INSERT INTO wide (a, b, c, d, e, f, g, h, i) ";
        const ON_CONFLICT: &'static str = " ON CONFLICT DO NOTHING";

        fn push_binds<'args>(&'args self, _b: &mut Separated<'_, 'args, Postgres, &'static str>) {}
    }

    struct Narrow;

    impl UpsertRow for Narrow {
        const COLUMNS: usize = 1;
        const INSERT: &'static str = "INSERT INTO narrow (a) ";
        const ON_CONFLICT: &'static str = " ON CONFLICT DO NOTHING";

        fn push_binds<'args>(&'args self, _b: &mut Separated<'_, 'args, Postgres, &'static str>) {}
    }

    #[test]
    fn test_chunk_rows_keeps_small_batches() {
        assert_eq!(chunk_rows::<Wide>(1000), 1000);
        assert_eq!(chunk_rows::<Narrow>(8000), 8000);
    }

    #[test]
    fn test_chunk_rows_caps_at_bind_limit() {
        assert_eq!(chunk_rows::<Wide>(8000), 7281);
        assert!(chunk_rows::<Wide>(8000) * Wide::COLUMNS <= MAX_BIND_PARAMS);
        assert_eq!(chunk_rows::<Narrow>(100_000), MAX_BIND_PARAMS);
    }

    #[test]
    fn test_chunk_rows_never_zero() {
        assert_eq!(chunk_rows::<Wide>(0), 1);
    }
}
