use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::config::INSERT_CHUNK_SIZE;
use crate::db::models::{CryptoRow, EconomicRow};
use crate::error::Result;
use crate::types::{CryptoEvent, Domain, EconomicEvent, EconomicKey, Keyed};

/// Append-only store for both event domains.
///
/// Each `insert_new_*` call reads the existing keys and appends the net-new
/// rows inside one transaction. The unique constraints on the identity keys
/// catch overlapping runs that race past the key scan.
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Open (creating if missing) the SQLite file at `db_path` and apply migrations.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        info!("Database ready at {db_path}");
        Ok(store)
    }

    /// Private in-memory database. One pinned connection, since every
    /// SQLite memory connection is its own database.
    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count(&self, domain: Domain) -> Result<i64> {
        let sql = match domain {
            Domain::Crypto => "SELECT COUNT(*) FROM crypto_calendar",
            Domain::Economic => "SELECT COUNT(*) FROM economic_calendar",
        };
        Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(&self.pool).await?)
    }

    // -----------------------------------------------------------------------
    // Deduplicated inserts
    // -----------------------------------------------------------------------

    /// Append the crypto events whose `id` is not yet stored. Returns rows appended.
    pub async fn insert_new_crypto(&self, records: Vec<CryptoEvent>) -> Result<u64> {
        let records = dedup_last_wins(records);
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let existing: HashSet<String> = sqlx::query_scalar::<_, String>("SELECT id FROM crypto_calendar")
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

        let incoming = records.len();
        let fresh = net_new(records, &existing);
        debug!(
            domain = %Domain::Crypto,
            incoming,
            existing = existing.len(),
            fresh = fresh.len(),
            "key diff computed"
        );
        if fresh.is_empty() {
            info!("[crypto_calendar] no new rows ({incoming} already stored)");
            return Ok(0);
        }

        let rows: Vec<CryptoRow> = fresh.iter().map(CryptoRow::from_event).collect();
        let outcome = insert_crypto_rows(&mut tx, &rows).await;
        commit_or_resolve(Domain::Crypto, tx, outcome, rows.len()).await
    }

    /// Append the economic events whose (datetime, currency, title) is not yet
    /// stored. Existing rows are never updated, even when values changed.
    pub async fn insert_new_economic(&self, records: Vec<EconomicEvent>) -> Result<u64> {
        let records = dedup_last_wins(records);
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let existing: HashSet<EconomicKey> = sqlx::query_as::<_, EconomicKey>(
            "SELECT datetime, IFNULL(currency, ''), title FROM economic_calendar",
        )
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let incoming = records.len();
        let fresh = net_new(records, &existing);
        debug!(
            domain = %Domain::Economic,
            incoming,
            existing = existing.len(),
            fresh = fresh.len(),
            "key diff computed"
        );
        if fresh.is_empty() {
            info!("[economic_calendar] no new rows ({incoming} already stored)");
            return Ok(0);
        }

        let rows: Vec<EconomicRow> = fresh.iter().map(EconomicRow::from_event).collect();
        let outcome = insert_economic_rows(&mut tx, &rows).await;
        commit_or_resolve(Domain::Economic, tx, outcome, rows.len()).await
    }

    // -----------------------------------------------------------------------
    // Window reads
    // -----------------------------------------------------------------------

    /// Crypto rows with `start <= start_time_kst < end`, ordered by start time.
    pub async fn crypto_in_window(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<CryptoEvent>> {
        let rows = sqlx::query_as::<_, CryptoRow>(
            r#"
            SELECT id, title, categories, coin_name, coin_symbol, start_time_kst, link, source
            FROM crypto_calendar
            WHERE start_time_kst >= ? AND start_time_kst < ?
            ORDER BY start_time_kst, id
            "#,
        )
        .bind(date_bound(start))
        .bind(date_bound(end))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CryptoRow::into_event).collect())
    }

    /// Economic rows with `start <= datetime < end`, ordered by time then impact.
    pub async fn economic_in_window(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<EconomicEvent>> {
        let rows = sqlx::query_as::<_, EconomicRow>(
            r#"
            SELECT datetime, currency, impact_bulls, title, event_url, actual, forecast, previous, type
            FROM economic_calendar
            WHERE datetime >= ? AND datetime < ?
            ORDER BY datetime, impact_bulls DESC
            "#,
        )
        .bind(date_bound(start))
        .bind(date_bound(end))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(EconomicRow::into_event).collect())
    }
}

fn date_bound(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

// ---------------------------------------------------------------------------
// Key diff
// ---------------------------------------------------------------------------

/// Collapse records sharing a key. The last occurrence's values win; the
/// surviving record keeps the position of the first occurrence.
pub fn dedup_last_wins<T: Keyed>(records: Vec<T>) -> Vec<T> {
    let mut slot_of: HashMap<T::Key, usize> = HashMap::with_capacity(records.len());
    let mut out: Vec<T> = Vec::with_capacity(records.len());
    for record in records {
        match slot_of.get(&record.key()) {
            Some(&slot) => out[slot] = record,
            None => {
                slot_of.insert(record.key(), out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Records whose key is absent from `existing`, in input order.
pub fn net_new<T: Keyed>(records: Vec<T>, existing: &HashSet<T::Key>) -> Vec<T> {
    records
        .into_iter()
        .filter(|r| !existing.contains(&r.key()))
        .collect()
}

// ---------------------------------------------------------------------------
// Bulk inserts
// ---------------------------------------------------------------------------

async fn insert_crypto_rows(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[CryptoRow],
) -> std::result::Result<(), sqlx::Error> {
    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO crypto_calendar \
             (id, title, categories, coin_name, coin_symbol, start_time_kst, link, source) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.id.clone())
                .push_bind(row.title.clone())
                .push_bind(row.categories.clone())
                .push_bind(row.coin_name.clone())
                .push_bind(row.coin_symbol.clone())
                .push_bind(row.start_time_kst.clone())
                .push_bind(row.link.clone())
                .push_bind(row.source.clone());
        });
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

async fn insert_economic_rows(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[EconomicRow],
) -> std::result::Result<(), sqlx::Error> {
    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO economic_calendar \
             (datetime, currency, impact_bulls, title, event_url, actual, forecast, previous, type) ",
        );
        qb.push_values(chunk, |mut b, row| {
            b.push_bind(row.datetime.clone())
                .push_bind(row.currency.clone())
                .push_bind(row.impact_bulls)
                .push_bind(row.title.clone())
                .push_bind(row.event_url.clone())
                .push_bind(row.actual.clone())
                .push_bind(row.forecast.clone())
                .push_bind(row.previous.clone())
                .push_bind(row.event_type.clone());
        });
        qb.build().execute(&mut **tx).await?;
    }
    Ok(())
}

/// Commit a successful batch. A unique-key conflict means another run
/// inserted the same keys after our scan: the batch is rolled back and
/// reported as 0 inserted.
async fn commit_or_resolve(
    domain: Domain,
    tx: Transaction<'_, Sqlite>,
    outcome: std::result::Result<(), sqlx::Error>,
    row_count: usize,
) -> Result<u64> {
    match outcome {
        Ok(()) => {
            tx.commit().await?;
            info!(domain = %domain, inserted = row_count, "[{domain}_calendar] appended {row_count} new rows");
            Ok(row_count as u64)
        }
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await?;
            warn!(
                domain = %domain,
                "[{domain}_calendar] key conflict during insert, concurrent run suspected; batch dropped: {e}"
            );
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
