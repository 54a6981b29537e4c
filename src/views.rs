// src/views.rs
use crate::models::{Portfolio, Quote, Transaction};
use rust_decimal::{Decimal, RoundingStrategy};
use warp::http::StatusCode;

/// Error page payload.
#[derive(Debug, Clone)]
pub struct Apology {
    pub status: StatusCode,
    pub message: String,
}

/// Formats money as `$1,234.56`.
pub fn usd(value: Decimal) -> String {
    let rounded = value
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .abs();
    let text = format!("{:.2}", rounded);
    let (whole, cents) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}${}.{}", sign, grouped, cents)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Clone, Copy)]
enum Nav {
    LoggedIn,
    LoggedOut,
    // The apology page is rendered without knowing who is asking.
    Bare,
}

fn layout(title: &str, nav: Nav, flash: Option<&str>, body: &str) -> String {
    let nav = match nav {
        Nav::LoggedIn => {
            r#"<a href="/quote">Quote</a> <a href="/buy">Buy</a> <a href="/sell">Sell</a> <a href="/history">History</a> <a href="/logout">Log Out</a>"#
        }
        Nav::LoggedOut => r#"<a href="/register">Register</a> <a href="/login">Log In</a>"#,
        Nav::Bare => "",
    };
    let flash = flash
        .map(|msg| format!(r#"<div class="flash">{}</div>"#, escape(msg)))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Paper Broker: {title}</title></head>
<body>
<nav><a href="/">Paper Broker</a> {nav}</nav>
{flash}
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
        nav = nav,
        flash = flash,
        body = body,
    )
}

pub fn apology(apology: &Apology) -> String {
    let body = format!(
        r#"<h1 class="apology">{}</h1><p>{}</p>"#,
        apology.status.as_u16(),
        escape(&apology.message)
    );
    layout("Apology", Nav::Bare, None, &body)
}

pub fn index(portfolio: &Portfolio, flash: Option<&str>) -> String {
    let rows: String = portfolio
        .lines
        .iter()
        .map(|line| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                escape(&line.symbol),
                escape(&line.name),
                line.shares,
                usd(line.price),
                usd(line.value)
            )
        })
        .collect();
    let body = format!(
        r#"<table>
<thead><tr><th>Symbol</th><th>Name</th><th>Shares</th><th>Price</th><th>TOTAL</th></tr></thead>
<tbody>
{rows}</tbody>
<tfoot>
<tr><td colspan="4">CASH</td><td>{cash}</td></tr>
<tr><td colspan="4">TOTAL</td><td>{total}</td></tr>
</tfoot>
</table>"#,
        rows = rows,
        cash = usd(portfolio.cash),
        total = usd(portfolio.total),
    );
    layout("Portfolio", Nav::LoggedIn, flash, &body)
}

pub fn buy() -> String {
    let body = r#"<form action="/buy" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<input min="1" name="shares" placeholder="Shares" type="number">
<button type="submit">Buy</button>
</form>"#;
    layout("Buy", Nav::LoggedIn, None, body)
}

pub fn sell(symbols: &[String]) -> String {
    let options: String = symbols
        .iter()
        .map(|s| format!(r#"<option value="{0}">{0}</option>"#, escape(s)))
        .collect();
    let body = format!(
        r#"<form action="/sell" method="post">
<select name="symbol"><option disabled selected value="">Symbol</option>{}</select>
<input min="1" name="shares" placeholder="Shares" type="number">
<button type="submit">Sell</button>
</form>"#,
        options
    );
    layout("Sell", Nav::LoggedIn, None, &body)
}

pub fn quote() -> String {
    let body = r#"<form action="/quote" method="post">
<input autocomplete="off" autofocus name="symbol" placeholder="Symbol" type="text">
<button type="submit">Quote</button>
</form>"#;
    layout("Quote", Nav::LoggedIn, None, body)
}

pub fn quoted(quote: &Quote) -> String {
    let body = format!(
        "<p>A share of {} ({}) costs {}.</p>",
        escape(&quote.name),
        escape(&quote.symbol),
        usd(quote.price)
    );
    layout("Quoted", Nav::LoggedIn, None, &body)
}

pub fn history(transactions: &[Transaction]) -> String {
    let rows: String = transactions
        .iter()
        .map(|tx| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                if tx.is_buy() { "Bought" } else { "Sold" },
                escape(&tx.symbol),
                tx.shares,
                usd(tx.price),
                tx.timestamp.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect();
    let body = format!(
        r#"<table>
<thead><tr><th>Type</th><th>Symbol</th><th>Shares</th><th>Price</th><th>Transacted</th></tr></thead>
<tbody>
{}</tbody>
</table>"#,
        rows
    );
    layout("History", Nav::LoggedIn, None, &body)
}

pub fn login() -> String {
    let body = r#"<form action="/login" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<button type="submit">Log In</button>
</form>"#;
    layout("Log In", Nav::LoggedOut, None, body)
}

pub fn register() -> String {
    let body = r#"<form action="/register" method="post">
<input autocomplete="off" autofocus name="username" placeholder="Username" type="text">
<input name="password" placeholder="Password" type="password">
<input name="confirmation" placeholder="Password (again)" type="password">
<button type="submit">Register</button>
</form>"#;
    layout("Register", Nav::LoggedOut, None, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn usd_formatting() {
        assert_eq!(usd(dec!(0)), "$0.00");
        assert_eq!(usd(dec!(9500)), "$9,500.00");
        assert_eq!(usd(dec!(1234567.891)), "$1,234,567.89");
        assert_eq!(usd(dec!(999.995)), "$1,000.00");
        assert_eq!(usd(dec!(-42.5)), "-$42.50");
    }

    #[test]
    fn apology_escapes_message() {
        let page = apology(
            &Apology {
                status: StatusCode::BAD_REQUEST,
                message: "<script>alert('x')</script>".into(),
            },
        );
        assert!(page.contains("400"));
        assert!(page.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(!page.contains("<script>"));
    }
}
