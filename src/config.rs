// src/config.rs
use crate::error::{AppError, Result};
use rand::RngCore;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_QUOTE_URL: &str = "https://www.alphavantage.co/query";
pub const DEFAULT_STARTING_CASH: Decimal = dec!(10000.00);

#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub database_path: String,
    pub listen_addr: SocketAddr,
    pub session_secret: Vec<u8>,
    pub starting_cash: Decimal,
    pub quote_base_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::Config("API_KEY not set".into()))?;

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "finance.db".into());

        let listen_addr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3030".into())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("invalid LISTEN_ADDR: {}", e)))?;

        let session_secret = match std::env::var("SESSION_SECRET") {
            Ok(secret) if !secret.is_empty() => secret.into_bytes(),
            _ => random_secret(),
        };

        let starting_cash = match std::env::var("STARTING_CASH") {
            Ok(raw) => Decimal::from_str(raw.trim())
                .map_err(|e| AppError::Config(format!("invalid STARTING_CASH: {}", e)))?,
            Err(_) => DEFAULT_STARTING_CASH,
        };
        if starting_cash.is_sign_negative() {
            return Err(AppError::Config("STARTING_CASH must not be negative".into()));
        }

        let quote_base_url =
            std::env::var("QUOTE_BASE_URL").unwrap_or_else(|_| DEFAULT_QUOTE_URL.into());

        Ok(Self {
            api_key,
            database_path,
            listen_addr,
            session_secret,
            starting_cash,
            quote_base_url,
        })
    }
}

fn random_secret() -> Vec<u8> {
    let mut bytes = vec![0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}
