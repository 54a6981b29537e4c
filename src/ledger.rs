// src/ledger.rs
use crate::db::{Database, TradeEntry};
use crate::error::{AppError, Result};
use crate::models::{Portfolio, PortfolioLine, Quote, Transaction};
use crate::quote::{normalize_symbol, QuoteSource};
use chrono::Utc;
use log::info;
use rust_decimal::Decimal;

/// Parses a share count: ASCII digits only, strictly positive.
pub fn parse_shares(raw: Option<&str>) -> Result<i64> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::Validation(
            "shares must be a positive integer".into(),
        ));
    }
    let shares: i64 = raw
        .parse()
        .map_err(|_| AppError::Validation("shares must be a positive integer".into()))?;
    if shares <= 0 {
        return Err(AppError::Validation("shares must be positive".into()));
    }
    Ok(shares)
}

pub fn parse_symbol(raw: Option<&str>) -> Result<String> {
    raw.and_then(normalize_symbol)
        .ok_or_else(|| AppError::Validation("must provide symbol".into()))
}

pub async fn quote(quotes: &dyn QuoteSource, symbol: &str) -> Result<Quote> {
    quotes.lookup(symbol).await.ok_or(AppError::InvalidSymbol)
}

/// Prices every open position at the live quote. One miss fails the whole view.
pub async fn view_portfolio(
    db: &Database,
    quotes: &dyn QuoteSource,
    user_id: i64,
) -> Result<Portfolio> {
    let holdings = db.holdings(user_id).await?;
    let mut lines = Vec::with_capacity(holdings.len());
    let mut total = Decimal::ZERO;

    for holding in holdings {
        let quote = quotes
            .lookup(&holding.symbol)
            .await
            .ok_or_else(|| AppError::QuoteUnavailable(holding.symbol.clone()))?;
        let value = quote.price * Decimal::from(holding.shares);
        total += value;
        lines.push(PortfolioLine {
            symbol: holding.symbol,
            name: quote.name,
            shares: holding.shares,
            price: quote.price,
            value,
        });
    }

    let cash = db.cash(user_id).await?;
    Ok(Portfolio {
        lines,
        cash,
        total: total + cash,
    })
}

pub async fn buy(
    db: &Database,
    quotes: &dyn QuoteSource,
    user_id: i64,
    symbol: &str,
    shares: i64,
) -> Result<Transaction> {
    if shares <= 0 {
        return Err(AppError::Validation("shares must be positive".into()));
    }
    let quote = quote(quotes, symbol).await?;

    let cost = quote.price * Decimal::from(shares);
    if db.cash(user_id).await? < cost {
        return Err(AppError::InsufficientCash);
    }

    let tx = db
        .record_trade(&TradeEntry {
            user_id,
            symbol: quote.symbol,
            shares,
            price: quote.price,
            timestamp: Utc::now(),
        })
        .await?;
    info!(
        "User {} bought {} shares of {} at {}",
        user_id, shares, tx.symbol, tx.price
    );
    Ok(tx)
}

pub async fn sell(
    db: &Database,
    quotes: &dyn QuoteSource,
    user_id: i64,
    symbol: &str,
    shares: i64,
) -> Result<Transaction> {
    if shares <= 0 {
        return Err(AppError::Validation("shares must be positive".into()));
    }
    if shares > db.owned_shares(user_id, symbol).await? {
        return Err(AppError::InsufficientShares);
    }
    let quote = quote(quotes, symbol).await?;

    // Ledger rows keep the held symbol, not the provider's spelling of it.
    let tx = db
        .record_trade(&TradeEntry {
            user_id,
            symbol: symbol.to_string(),
            shares: -shares,
            price: quote.price,
            timestamp: Utc::now(),
        })
        .await?;
    info!(
        "User {} sold {} shares of {} at {}",
        user_id, shares, tx.symbol, tx.price
    );
    Ok(tx)
}

pub async fn history(db: &Database, user_id: i64) -> Result<Vec<Transaction>> {
    db.transactions(user_id).await
}

/// Symbols the user can currently sell.
pub async fn owned_symbols(db: &Database, user_id: i64) -> Result<Vec<String>> {
    let holdings = db.holdings(user_id).await?;
    Ok(holdings.into_iter().map(|h| h.symbol).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct FixedQuotes(HashMap<&'static str, Decimal>);

    #[async_trait]
    impl QuoteSource for FixedQuotes {
        async fn lookup(&self, symbol: &str) -> Option<Quote> {
            self.0.get(symbol).map(|price| Quote {
                symbol: symbol.to_string(),
                name: symbol.to_string(),
                price: *price,
            })
        }
    }

    fn quotes() -> FixedQuotes {
        FixedQuotes(HashMap::from([("AAPL", dec!(100.00)), ("MSFT", dec!(20.50))]))
    }

    async fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().await.unwrap();
        let id = db.create_user("bob", "hash", dec!(10000.00)).await.unwrap();
        (db, id)
    }

    #[test]
    fn share_parsing() {
        assert_eq!(parse_shares(Some("5")).unwrap(), 5);
        assert_eq!(parse_shares(Some(" 12 ")).unwrap(), 12);
        for bad in [None, Some(""), Some("0"), Some("-3"), Some("1.5"), Some("ten")] {
            assert!(
                matches!(parse_shares(bad), Err(AppError::Validation(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn symbol_parsing() {
        assert_eq!(parse_symbol(Some("aapl")).unwrap(), "AAPL");
        assert!(matches!(parse_symbol(Some(" ")), Err(AppError::Validation(_))));
        assert!(matches!(parse_symbol(None), Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn buying_five_at_one_hundred() {
        let (db, id) = setup().await;
        let tx = buy(&db, &quotes(), id, "AAPL", 5).await.unwrap();

        assert_eq!((tx.shares, tx.price), (5, dec!(100.00)));
        assert_eq!(db.cash(id).await.unwrap(), dec!(9500.00));
        let rows = history(&db, id).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!((rows[0].shares, rows[0].price), (5, dec!(100.00)));
    }

    #[tokio::test]
    async fn unaffordable_buy_changes_nothing() {
        let (db, id) = setup().await;
        let err = buy(&db, &quotes(), id, "AAPL", 101).await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientCash));
        assert_eq!(db.cash(id).await.unwrap(), dec!(10000.00));
        assert!(history(&db, id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_symbol_is_invalid() {
        let (db, id) = setup().await;
        let err = buy(&db, &quotes(), id, "NOPE", 1).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidSymbol));
    }

    #[tokio::test]
    async fn selling_credits_cash() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "MSFT", 4).await.unwrap();
        let tx = sell(&db, &quotes(), id, "MSFT", 3).await.unwrap();

        assert_eq!((tx.shares, tx.price), (-3, dec!(20.50)));
        assert_eq!(db.cash(id).await.unwrap(), dec!(9979.50));
        assert_eq!(owned_symbols(&db, id).await.unwrap(), vec!["MSFT".to_string()]);
    }

    #[tokio::test]
    async fn overselling_changes_nothing() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "AAPL", 2).await.unwrap();
        let err = sell(&db, &quotes(), id, "AAPL", 3).await.unwrap_err();

        assert!(matches!(err, AppError::InsufficientShares));
        assert_eq!(db.cash(id).await.unwrap(), dec!(9800.00));
        assert_eq!(history(&db, id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn selling_unheld_symbol_is_insufficient_shares() {
        let (db, id) = setup().await;
        let err = sell(&db, &quotes(), id, "AAPL", 1).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientShares));
    }

    #[tokio::test]
    async fn sell_without_a_quote_changes_nothing() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "AAPL", 3).await.unwrap();

        let empty = FixedQuotes(HashMap::new());
        let err = sell(&db, &empty, id, "AAPL", 1).await.unwrap_err();

        assert!(matches!(err, AppError::InvalidSymbol));
        assert_eq!(db.cash(id).await.unwrap(), dec!(9700.00));
        assert_eq!(history(&db, id).await.unwrap().len(), 1);
        assert_eq!(db.owned_shares(id, "AAPL").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn closed_position_leaves_portfolio() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "AAPL", 10).await.unwrap();
        sell(&db, &quotes(), id, "AAPL", 10).await.unwrap();

        let portfolio = view_portfolio(&db, &quotes(), id).await.unwrap();
        assert!(portfolio.lines.is_empty());
        assert_eq!(portfolio.total, dec!(10000.00));
    }

    #[tokio::test]
    async fn portfolio_totals_holdings_and_cash() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "AAPL", 5).await.unwrap();
        buy(&db, &quotes(), id, "MSFT", 2).await.unwrap();

        let portfolio = view_portfolio(&db, &quotes(), id).await.unwrap();
        assert_eq!(portfolio.lines.len(), 2);
        assert_eq!(portfolio.lines[0].value, dec!(500.00));
        assert_eq!(portfolio.lines[1].value, dec!(41.00));
        assert_eq!(portfolio.cash, dec!(9459.00));
        assert_eq!(portfolio.total, dec!(10000.00));
    }

    #[tokio::test]
    async fn portfolio_fails_on_quote_miss() {
        let (db, id) = setup().await;
        buy(&db, &quotes(), id, "AAPL", 1).await.unwrap();

        let empty = FixedQuotes(HashMap::new());
        let err = view_portfolio(&db, &empty, id).await.unwrap_err();
        assert!(matches!(err, AppError::QuoteUnavailable(ref s) if s == "AAPL"));
    }
}
