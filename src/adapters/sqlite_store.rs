//! SQLite persistence adapter.
//!
//! Owns the `transactions`, `price_history`, `fund_ticker_mapping` and
//! `mapping_status` tables. The duplicate-import uniqueness key on
//! transactions is (platform, date, fund_name, transaction_type, value,
//! reference); `reference` is stored as an empty string when absent so
//! the key stays effective for platforms that supply no reference.

use crate::domain::error::FolioError;
use crate::domain::mapping::{MappingStatus, TickerMapping};
use crate::domain::price::PricePoint;
use crate::domain::transaction::{Platform, TaxWrapper, Transaction, TransactionType};
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{StorePort, TransactionFilter};
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const DATE_FMT: &str = "%Y-%m-%d";

#[derive(Debug)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, FolioError> {
        let db_path =
            config
                .get_string("database", "path")
                .ok_or_else(|| FolioError::ConfigMissing {
                    section: "database".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("database", "pool_size", 4) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e: r2d2::Error| FolioError::Database {
                reason: e.to_string(),
            })?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, FolioError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| FolioError::Database {
                reason: e.to_string(),
            })?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, FolioError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| FolioError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), FolioError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                tax_wrapper TEXT NOT NULL,
                date TEXT NOT NULL,
                fund_name TEXT NOT NULL,
                transaction_type TEXT NOT NULL,
                units REAL NOT NULL,
                price_per_unit REAL NOT NULL,
                value REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'GBP',
                sedol TEXT,
                isin TEXT,
                reference TEXT NOT NULL DEFAULT '',
                raw_description TEXT,
                excluded INTEGER NOT NULL DEFAULT 0,
                mapped_fund_name TEXT,
                UNIQUE(platform, date, fund_name, transaction_type, value, reference)
            );
            CREATE INDEX IF NOT EXISTS idx_tx_date ON transactions(date);
            CREATE INDEX IF NOT EXISTS idx_tx_fund_name ON transactions(fund_name);
            CREATE INDEX IF NOT EXISTS idx_tx_platform ON transactions(platform);
            CREATE INDEX IF NOT EXISTS idx_tx_tax_wrapper ON transactions(tax_wrapper);

            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                date TEXT NOT NULL,
                ticker TEXT NOT NULL,
                fund_name TEXT NOT NULL DEFAULT '',
                close_price REAL NOT NULL,
                UNIQUE(date, ticker)
            );
            CREATE INDEX IF NOT EXISTS idx_price_date ON price_history(date);
            CREATE INDEX IF NOT EXISTS idx_price_ticker ON price_history(ticker);

            CREATE TABLE IF NOT EXISTS fund_ticker_mapping (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fund_name TEXT NOT NULL,
                ticker TEXT NOT NULL,
                sedol TEXT,
                isin TEXT,
                vip INTEGER NOT NULL DEFAULT 0,
                UNIQUE(fund_name, ticker)
            );
            CREATE INDEX IF NOT EXISTS idx_mapping_fund_name ON fund_ticker_mapping(fund_name);
            CREATE INDEX IF NOT EXISTS idx_mapping_ticker ON fund_ticker_mapping(ticker);

            CREATE TABLE IF NOT EXISTS mapping_status (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL UNIQUE,
                fund_name TEXT,
                earliest_date TEXT,
                latest_date TEXT,
                transaction_count INTEGER NOT NULL DEFAULT 0
            );",
        )
        .map_err(|e: rusqlite::Error| FolioError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }
}

fn query_err(e: rusqlite::Error) -> FolioError {
    FolioError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_date_column(value: &str, index: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn parse_enum_column<T>(
    parsed: Option<T>,
    raw: &str,
    what: &str,
    index: usize,
) -> rusqlite::Result<T> {
    parsed.ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::other(format!("unknown {what}: {raw}"))),
        )
    })
}

fn row_to_transaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transaction> {
    let platform_str: String = row.get(0)?;
    let wrapper_str: String = row.get(1)?;
    let date_str: String = row.get(2)?;
    let type_str: String = row.get(4)?;
    let reference: String = row.get(11)?;
    let excluded: i64 = row.get(14)?;

    Ok(Transaction {
        platform: parse_enum_column(Platform::parse(&platform_str), &platform_str, "platform", 0)?,
        tax_wrapper: parse_enum_column(TaxWrapper::parse(&wrapper_str), &wrapper_str, "tax wrapper", 1)?,
        date: parse_date_column(&date_str, 2)?,
        fund_name: row.get(3)?,
        transaction_type: parse_enum_column(
            TransactionType::parse(&type_str),
            &type_str,
            "transaction type",
            4,
        )?,
        units: row.get(5)?,
        price_per_unit: row.get(6)?,
        value: row.get(7)?,
        currency: row.get(8)?,
        sedol: row.get(9)?,
        isin: row.get(10)?,
        reference: if reference.is_empty() {
            None
        } else {
            Some(reference)
        },
        raw_description: row.get(12)?,
        excluded: excluded != 0,
        mapped_fund_name: row.get(13)?,
    })
}

const TRANSACTION_COLUMNS: &str = "platform, tax_wrapper, date, fund_name, transaction_type, \
     units, price_per_unit, value, currency, sedol, isin, reference, raw_description, \
     mapped_fund_name, excluded";

impl StorePort for SqliteStore {
    fn fetch_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>, FolioError> {
        let conn = self.conn()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut args: Vec<String> = Vec::new();

        if !filter.include_excluded {
            conditions.push("excluded = 0");
        }
        if let Some(fund) = &filter.fund {
            conditions.push("(fund_name = ? OR mapped_fund_name = ?)");
            args.push(fund.clone());
            args.push(fund.clone());
        }
        if let Some(platform) = filter.platform {
            conditions.push("platform = ?");
            args.push(platform.as_db_str().to_string());
        }
        if let Some(wrapper) = filter.tax_wrapper {
            conditions.push("tax_wrapper = ?");
            args.push(wrapper.as_db_str().to_string());
        }
        if let Some(start) = filter.start_date {
            conditions.push("date >= ?");
            args.push(start.format(DATE_FMT).to_string());
        }
        if let Some(end) = filter.end_date {
            conditions.push("date <= ?");
            args.push(end.format(DATE_FMT).to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let query = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions{where_clause} ORDER BY date ASC, id ASC"
        );

        let mut stmt = conn.prepare(&query).map_err(query_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), row_to_transaction)
            .map_err(query_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(query_err)?);
        }
        Ok(transactions)
    }

    fn insert_transactions(
        &self,
        transactions: &[Transaction],
    ) -> Result<(usize, usize), FolioError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut inserted = 0usize;
        let mut duplicates = 0usize;

        for record in transactions {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO transactions (
                        platform, tax_wrapper, date, fund_name, transaction_type,
                        units, price_per_unit, value, currency, sedol, isin,
                        reference, raw_description, mapped_fund_name, excluded
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        record.platform.as_db_str(),
                        record.tax_wrapper.as_db_str(),
                        record.date.format(DATE_FMT).to_string(),
                        record.fund_name,
                        record.transaction_type.as_db_str(),
                        record.units,
                        record.price_per_unit,
                        record.value,
                        record.currency,
                        record.sedol,
                        record.isin,
                        record.reference.as_deref().unwrap_or(""),
                        record.raw_description,
                        record.mapped_fund_name,
                        record.excluded as i64,
                    ],
                )
                .map_err(query_err)?;

            if changed > 0 {
                inserted += 1;
            } else {
                duplicates += 1;
            }
        }

        tx.commit().map_err(query_err)?;
        log::info!("inserted {inserted} transactions, skipped {duplicates} duplicates");
        Ok((inserted, duplicates))
    }

    fn fetch_mappings(&self) -> Result<Vec<TickerMapping>, FolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT fund_name, ticker, sedol, isin, vip
                 FROM fund_ticker_mapping ORDER BY fund_name, ticker",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let vip: i64 = row.get(4)?;
                Ok(TickerMapping {
                    fund_name: row.get(0)?,
                    ticker: row.get(1)?,
                    sedol: row.get(2)?,
                    isin: row.get(3)?,
                    vip: vip != 0,
                })
            })
            .map_err(query_err)?;

        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row.map_err(query_err)?);
        }
        Ok(mappings)
    }

    fn insert_mapping(&self, mapping: &TickerMapping) -> Result<bool, FolioError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO fund_ticker_mapping (fund_name, ticker, sedol, isin, vip)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    mapping.fund_name,
                    mapping.ticker,
                    mapping.sedol,
                    mapping.isin,
                    mapping.vip as i64,
                ],
            )
            .map_err(query_err)?;
        Ok(changed > 0)
    }

    fn fetch_prices(&self, ticker: Option<&str>) -> Result<Vec<PricePoint>, FolioError> {
        let conn = self.conn()?;

        let (query, args): (&str, Vec<String>) = match ticker {
            Some(t) => (
                "SELECT date, ticker, fund_name, close_price FROM price_history
                 WHERE ticker = ? ORDER BY date ASC",
                vec![t.to_string()],
            ),
            None => (
                "SELECT date, ticker, fund_name, close_price FROM price_history
                 ORDER BY ticker ASC, date ASC",
                Vec::new(),
            ),
        };

        let mut stmt = conn.prepare(query).map_err(query_err)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(args.iter()), |row| {
                let date_str: String = row.get(0)?;
                Ok(PricePoint {
                    date: parse_date_column(&date_str, 0)?,
                    ticker: row.get(1)?,
                    fund_name: row.get(2)?,
                    close: row.get(3)?,
                })
            })
            .map_err(query_err)?;

        let mut prices = Vec::new();
        for row in rows {
            prices.push(row.map_err(query_err)?);
        }
        Ok(prices)
    }

    fn insert_prices(&self, prices: &[PricePoint]) -> Result<(usize, usize), FolioError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        let mut inserted = 0usize;
        let mut duplicates = 0usize;

        for price in prices {
            let changed = tx
                .execute(
                    "INSERT OR IGNORE INTO price_history (date, ticker, fund_name, close_price)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        price.date.format(DATE_FMT).to_string(),
                        price.ticker,
                        price.fund_name,
                        price.close,
                    ],
                )
                .map_err(query_err)?;

            if changed > 0 {
                inserted += 1;
            } else {
                duplicates += 1;
            }
        }

        tx.commit().map_err(query_err)?;
        log::info!("inserted {inserted} price points, skipped {duplicates} duplicates");
        Ok((inserted, duplicates))
    }

    fn latest_price(&self, ticker: &str) -> Result<Option<PricePoint>, FolioError> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT date, ticker, fund_name, close_price FROM price_history
             WHERE ticker = ?1 ORDER BY date DESC LIMIT 1",
            params![ticker],
            |row| {
                let date_str: String = row.get(0)?;
                Ok(PricePoint {
                    date: parse_date_column(&date_str, 0)?,
                    ticker: row.get(1)?,
                    fund_name: row.get(2)?,
                    close: row.get(3)?,
                })
            },
        );

        match result {
            Ok(price) => Ok(Some(price)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(query_err(e)),
        }
    }

    fn price_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, FolioError> {
        let conn = self.conn()?;

        let result: (Option<String>, Option<String>, i64) = conn
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM price_history WHERE ticker = ?1",
                params![ticker],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min_str), Some(max_str), count) if count > 0 => {
                let min = NaiveDate::parse_from_str(&min_str, DATE_FMT).map_err(
                    |e: chrono::ParseError| FolioError::Database {
                        reason: e.to_string(),
                    },
                )?;
                let max = NaiveDate::parse_from_str(&max_str, DATE_FMT).map_err(
                    |e: chrono::ParseError| FolioError::Database {
                        reason: e.to_string(),
                    },
                )?;
                Ok(Some((min, max, count as usize)))
            }
            _ => Ok(None),
        }
    }

    fn fetch_mapping_statuses(&self) -> Result<Vec<MappingStatus>, FolioError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT ticker, fund_name, earliest_date, latest_date, transaction_count
                 FROM mapping_status ORDER BY ticker",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map([], |row| {
                let earliest: Option<String> = row.get(2)?;
                let latest: Option<String> = row.get(3)?;
                let count: i64 = row.get(4)?;
                Ok(MappingStatus {
                    ticker: row.get(0)?,
                    fund_name: row.get(1)?,
                    earliest_date: earliest
                        .as_deref()
                        .map(|s| parse_date_column(s, 2))
                        .transpose()?,
                    latest_date: latest
                        .as_deref()
                        .map(|s| parse_date_column(s, 3))
                        .transpose()?,
                    transaction_count: count as usize,
                })
            })
            .map_err(query_err)?;

        let mut statuses = Vec::new();
        for row in rows {
            statuses.push(row.map_err(query_err)?);
        }
        Ok(statuses)
    }

    fn refresh_mapping_status(&self) -> Result<usize, FolioError> {
        let conn = self.conn()?;
        let refreshed = conn
            .execute(
                "INSERT INTO mapping_status (ticker, fund_name, earliest_date, latest_date, transaction_count)
                 SELECT ftm.ticker, MIN(ftm.fund_name), MIN(t.date), MAX(t.date), COUNT(t.id)
                 FROM fund_ticker_mapping ftm
                 JOIN transactions t
                   ON (t.fund_name = ftm.fund_name OR t.mapped_fund_name = ftm.fund_name)
                 WHERE t.excluded = 0
                 GROUP BY ftm.ticker
                 ON CONFLICT(ticker) DO UPDATE SET
                     fund_name = excluded.fund_name,
                     earliest_date = excluded.earliest_date,
                     latest_date = excluded.latest_date,
                     transaction_count = excluded.transaction_count",
                [],
            )
            .map_err(query_err)?;
        Ok(refreshed)
    }

    fn set_mapped_fund_name(&self, fund_name: &str, mapped: &str) -> Result<usize, FolioError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET mapped_fund_name = ?2 WHERE fund_name = ?1",
            params![fund_name, mapped],
        )
        .map_err(query_err)
    }

    fn set_excluded(&self, fund_name: &str, excluded: bool) -> Result<usize, FolioError> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE transactions SET excluded = ?2
             WHERE fund_name = ?1 OR mapped_fund_name = ?1",
            params![fund_name, excluded as i64],
        )
        .map_err(query_err)
    }
}
