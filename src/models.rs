// src/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub hash: String,
    pub cash: Decimal,
}

/// One row of the append-only ledger. Positive shares are buys, negative are sells.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub shares: i64,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn is_buy(&self) -> bool {
        self.shares > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub symbol: String,
    pub shares: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone)]
pub struct PortfolioLine {
    pub symbol: String,
    pub name: String,
    pub shares: i64,
    pub price: Decimal,
    pub value: Decimal,
}

#[derive(Debug, Clone)]
pub struct Portfolio {
    pub lines: Vec<PortfolioLine>,
    pub cash: Decimal,
    pub total: Decimal,
}

// Form fields are optional so a missing field becomes an apology, not a warp rejection.

#[derive(Debug, Default, Deserialize)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
    pub confirmation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TradeForm {
    pub symbol: Option<String>,
    pub shares: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteForm {
    pub symbol: Option<String>,
}
