// src/db.rs
use crate::error::{AppError, Result};
use crate::models::{Holding, Transaction, User};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        hash TEXT NOT NULL,
        cash TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        symbol TEXT NOT NULL,
        shares INTEGER NOT NULL,
        price TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS transactions_user_symbol ON transactions (user_id, symbol);
";

/// A trade to append to the ledger together with its cash movement.
#[derive(Debug, Clone)]
pub struct TradeEntry {
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
}

impl Database {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        info!("Opened database at {}", path.display());
        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts a user and returns its id. A duplicate username maps to `UsernameTaken`.
    pub async fn create_user(&self, username: &str, hash: &str, cash: Decimal) -> Result<i64> {
        let conn = self.connection.lock().await;
        match conn.execute(
            "INSERT INTO users (username, hash, cash) VALUES (?1, ?2, ?3)",
            params![username, hash, cash.to_string()],
        ) {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(AppError::UsernameTaken)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.connection.lock().await;
        let user = conn
            .query_row(
                "SELECT id, username, hash, cash FROM users WHERE username = ?1",
                params![username],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn cash(&self, user_id: i64) -> Result<Decimal> {
        let conn = self.connection.lock().await;
        cash_of(&conn, user_id)
    }

    /// Net shares per symbol, only symbols with a positive balance.
    pub async fn holdings(&self, user_id: i64) -> Result<Vec<Holding>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT symbol, SUM(shares) AS net FROM transactions
             WHERE user_id = ?1 GROUP BY symbol HAVING net > 0 ORDER BY symbol",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(Holding {
                symbol: row.get(0)?,
                shares: row.get(1)?,
            })
        })?;
        let holdings = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(holdings)
    }

    pub async fn owned_shares(&self, user_id: i64, symbol: &str) -> Result<i64> {
        let conn = self.connection.lock().await;
        owned_shares_of(&conn, user_id, symbol)
    }

    /// Applies the cash movement and appends the ledger row in one SQLite transaction.
    /// Buys need enough cash and sells enough shares, checked inside the transaction.
    pub async fn record_trade(&self, entry: &TradeEntry) -> Result<Transaction> {
        let mut conn = self.connection.lock().await;
        let tx = conn.transaction()?;

        let cash = cash_of(&tx, entry.user_id)?;
        let amount = entry.price * Decimal::from(entry.shares);
        if entry.shares > 0 && cash < amount {
            return Err(AppError::InsufficientCash);
        }
        if entry.shares < 0 && owned_shares_of(&tx, entry.user_id, &entry.symbol)? < -entry.shares {
            return Err(AppError::InsufficientShares);
        }

        tx.execute(
            "UPDATE users SET cash = ?1 WHERE id = ?2",
            params![(cash - amount).to_string(), entry.user_id],
        )?;
        tx.execute(
            "INSERT INTO transactions (user_id, symbol, shares, price, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.user_id,
                entry.symbol,
                entry.shares,
                entry.price.to_string(),
                entry.timestamp
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Transaction {
            id,
            user_id: entry.user_id,
            symbol: entry.symbol.clone(),
            shares: entry.shares,
            price: entry.price,
            timestamp: entry.timestamp,
        })
    }

    /// All ledger rows for a user, most recent first.
    pub async fn transactions(&self, user_id: i64) -> Result<Vec<Transaction>> {
        let conn = self.connection.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, symbol, shares, price, timestamp FROM transactions
             WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], transaction_from_row)?;
        let transactions = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transactions)
    }
}

fn cash_of(conn: &Connection, user_id: i64) -> Result<Decimal> {
    let cash = conn.query_row(
        "SELECT cash FROM users WHERE id = ?1",
        params![user_id],
        |row| decimal_column(row, 0),
    )?;
    Ok(cash)
}

fn owned_shares_of(conn: &Connection, user_id: i64, symbol: &str) -> Result<i64> {
    let owned: Option<i64> = conn.query_row(
        "SELECT SUM(shares) FROM transactions WHERE user_id = ?1 AND symbol = ?2",
        params![user_id, symbol],
        |row| row.get(0),
    )?;
    Ok(owned.unwrap_or(0))
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        hash: row.get(2)?,
        cash: decimal_column(row, 3)?,
    })
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        shares: row.get(3)?,
        price: decimal_column(row, 4)?,
        timestamp: row.get(5)?,
    })
}
