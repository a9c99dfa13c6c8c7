//! Application configuration: symbol selections and brokerage credentials.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const PAPER_TRADING_URL: &str = "https://paper-api.alpaca.markets";
pub const DATA_URL: &str = "https://data.alpaca.markets";
pub const DATA_STREAM_URL: &str = "wss://stream.data.alpaca.markets/v2";

/// One traded symbol and the cash allotted to each entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSelection {
    pub symbol: String,

    /// Cash per entry, in account currency
    pub lot: Decimal,
}

/// Load selections from a JSON array of `{ "symbol": .., "lot": .. }`.
pub fn load_selections(path: &Path) -> Result<Vec<SymbolSelection>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read selections from {}", path.display()))?;
    let selections: Vec<SymbolSelection> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse selections in {}", path.display()))?;
    normalize_selections(selections)
}

/// Build selections from symbols given on the command line, all sharing `lot`.
pub fn selections_from_args(symbols: &[String], lot: Decimal) -> Result<Vec<SymbolSelection>> {
    let selections = symbols
        .iter()
        .map(|symbol| SymbolSelection {
            symbol: symbol.clone(),
            lot,
        })
        .collect();
    normalize_selections(selections)
}

/// Uppercase symbols, reject empty symbols and non-positive lots, and keep
/// the last entry for a repeated symbol at the position of its first one.
pub fn normalize_selections(selections: Vec<SymbolSelection>) -> Result<Vec<SymbolSelection>> {
    let mut out: Vec<SymbolSelection> = Vec::with_capacity(selections.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for selection in selections {
        let symbol = selection.symbol.trim().to_uppercase();
        if symbol.is_empty() {
            anyhow::bail!("Empty symbol in selections");
        }
        if selection.lot <= Decimal::ZERO {
            anyhow::bail!("Lot for {} must be positive, got {}", symbol, selection.lot);
        }

        let normalized = SymbolSelection {
            symbol: symbol.clone(),
            lot: selection.lot,
        };

        match index.get(&symbol) {
            Some(&i) => {
                warn!(symbol = %symbol, lot = %selection.lot, "Duplicate selection, last one wins");
                out[i] = normalized;
            }
            None => {
                index.insert(symbol, out.len());
                out.push(normalized);
            }
        }
    }

    if out.is_empty() {
        anyhow::bail!("No symbols selected");
    }

    Ok(out)
}

/// Brokerage endpoints and credentials.
#[derive(Debug, Clone)]
pub struct AlpacaConfig {
    pub key_id: String,
    pub secret_key: String,

    /// Trading REST base URL (paper or live)
    pub trading_url: String,

    /// Market data REST base URL
    pub data_url: String,

    /// Market data stream base URL, without the feed suffix
    pub data_stream_url: String,

    /// Market data feed (sip or iex)
    pub feed: String,
}

impl AlpacaConfig {
    /// Read configuration from the environment (a `.env` file is honored).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let key_id = std::env::var("APCA_API_KEY_ID").context("APCA_API_KEY_ID not set")?;
        let secret_key =
            std::env::var("APCA_API_SECRET_KEY").context("APCA_API_SECRET_KEY not set")?;
        let trading_url =
            std::env::var("APCA_API_BASE_URL").unwrap_or_else(|_| PAPER_TRADING_URL.to_string());
        let data_url =
            std::env::var("APCA_API_DATA_URL").unwrap_or_else(|_| DATA_URL.to_string());
        let data_stream_url =
            std::env::var("APCA_DATA_STREAM_URL").unwrap_or_else(|_| DATA_STREAM_URL.to_string());
        let feed = std::env::var("APCA_DATA_FEED").unwrap_or_else(|_| "sip".to_string());

        Ok(Self {
            key_id,
            secret_key,
            trading_url: trading_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
            data_stream_url: data_stream_url.trim_end_matches('/').to_string(),
            feed,
        })
    }

    /// Websocket URL of the trade updates stream.
    pub fn trading_stream_url(&self) -> String {
        let base = if let Some(rest) = self.trading_url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.trading_url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.trading_url.clone()
        };
        format!("{}/stream", base)
    }

    /// Websocket URL of the market data stream for the configured feed.
    pub fn data_feed_stream_url(&self) -> String {
        format!("{}/{}", self.data_stream_url, self.feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn make_config(trading_url: &str) -> AlpacaConfig {
        AlpacaConfig {
            key_id: "key".to_string(),
            secret_key: "secret".to_string(),
            trading_url: trading_url.to_string(),
            data_url: DATA_URL.to_string(),
            data_stream_url: DATA_STREAM_URL.to_string(),
            feed: "iex".to_string(),
        }
    }

    #[test]
    fn test_stream_urls() {
        let config = make_config(PAPER_TRADING_URL);
        assert_eq!(
            config.trading_stream_url(),
            "wss://paper-api.alpaca.markets/stream"
        );
        assert_eq!(
            config.data_feed_stream_url(),
            "wss://stream.data.alpaca.markets/v2/iex"
        );
    }

    #[test]
    fn test_parse_selection_file_format() {
        let raw = r#"[{"symbol": "tsla", "lot": 2000}, {"symbol": "AAPL", "lot": "1500.50"}]"#;
        let selections: Vec<SymbolSelection> = serde_json::from_str(raw).unwrap();
        let selections = normalize_selections(selections).unwrap();

        assert_eq!(selections[0].symbol, "TSLA");
        assert_eq!(selections[0].lot, dec!(2000));
        assert_eq!(selections[1].lot, dec!(1500.50));
    }

    #[test]
    fn test_duplicates_keep_last_lot() {
        let symbols = vec!["TSLA".to_string(), "FB".to_string(), "tsla".to_string()];
        let mut selections = selections_from_args(&symbols, dec!(2000)).unwrap();
        assert_eq!(selections.len(), 2);

        selections.push(SymbolSelection {
            symbol: "FB".to_string(),
            lot: dec!(500),
        });
        let selections = normalize_selections(selections).unwrap();
        assert_eq!(selections[1].symbol, "FB");
        assert_eq!(selections[1].lot, dec!(500));
    }

    #[test]
    fn test_rejects_bad_lots_and_empty_lists() {
        assert!(selections_from_args(&["AAPL".to_string()], dec!(0)).is_err());
        assert!(selections_from_args(&[], dec!(1000)).is_err());
    }
}
