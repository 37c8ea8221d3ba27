//! BRL/BTC price sourcing. A shared TTL cache fronts the public price
//! oracle, and a background ticker pushes fresh snapshots to subscribers
//! over a watch channel.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("price oracle unreachable: {0}")]
    Fetch(String),
    #[error("price oracle response did not contain the BRL quote")]
    MissingQuote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSnapshot {
    pub price_brl_per_btc: Decimal,
    pub fetched_at: DateTime<Utc>,
}

pub struct Config {
    pub url: Url,
    pub ttl_secs: i64,
    pub request_timeout: Duration,
}

pub struct PriceCache {
    client: reqwest::Client,
    url: Url,
    ttl_secs: i64,
    cached: Mutex<Option<PriceSnapshot>>,
}

impl PriceCache {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap(),
            url: config.url,
            ttl_secs: config.ttl_secs,
            cached: Mutex::new(None),
        }
    }

    /// A cache pre-filled with a fresh snapshot, so nothing ever hits the
    /// network.
    #[cfg(test)]
    pub(crate) fn seeded(price_brl_per_btc: Decimal) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: Url::parse("http://localhost/price").unwrap(),
            ttl_secs: 3600,
            cached: Mutex::new(Some(PriceSnapshot {
                price_brl_per_btc,
                fetched_at: Utc::now(),
            })),
        }
    }

    /// Returns the cached snapshot while it is fresh, otherwise fetches a new
    /// one. A failed fetch leaves any previous snapshot untouched.
    pub async fn get(&self) -> Result<PriceSnapshot, Error> {
        let mut cached = self.cached.lock().await;
        if let Some(snapshot) = *cached {
            if Utc::now() - snapshot.fetched_at < chrono::Duration::seconds(self.ttl_secs) {
                return Ok(snapshot);
            }
        }
        let snapshot = self.fetch().await?;
        *cached = Some(snapshot);
        Ok(snapshot)
    }

    /// Unconditionally fetches and stores a fresh snapshot.
    pub async fn refresh(&self) -> Result<PriceSnapshot, Error> {
        let snapshot = self.fetch().await?;
        *self.cached.lock().await = Some(snapshot);
        Ok(snapshot)
    }

    async fn fetch(&self) -> Result<PriceSnapshot, Error> {
        let response: OracleResponse = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Fetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::Fetch(e.to_string()))?;
        let price = response
            .bitcoin
            .and_then(|q| q.brl)
            .ok_or(Error::MissingQuote)?;
        if price <= Decimal::ZERO {
            return Err(Error::MissingQuote);
        }
        Ok(PriceSnapshot {
            price_brl_per_btc: price,
            fetched_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OracleResponse {
    bitcoin: Option<BrlQuote>,
}

#[derive(Debug, Deserialize)]
struct BrlQuote {
    brl: Option<Decimal>,
}

struct Ticker {
    prices: Arc<PriceCache>,
    sender: watch::Sender<Option<PriceSnapshot>>,
    interval: Duration,
}

#[async_trait::async_trait]
impl crate::worker::Worker for Ticker {
    async fn run(&mut self) {
        match self.prices.refresh().await {
            Ok(snapshot) => {
                self.sender.send_if_modified(|current| {
                    let changed = current
                        .map(|c| c.price_brl_per_btc != snapshot.price_brl_per_btc)
                        .unwrap_or(true);
                    *current = Some(snapshot);
                    changed
                });
            }
            Err(e) => log::warn!("price refresh failed: {}", e),
        }
    }

    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Spawns the background price ticker and returns the channel that the SSE
/// route subscribes to.
pub fn start_ticker(
    prices: Arc<PriceCache>,
    interval: Duration,
) -> watch::Receiver<Option<PriceSnapshot>> {
    let (sender, receiver) = watch::channel(None);
    crate::worker::start(Ticker {
        prices,
        sender,
        interval,
    });
    receiver
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_oracle_response() {
        let response: OracleResponse =
            serde_json::from_str(r#"{"bitcoin": {"brl": 512345.67}}"#).unwrap();
        assert_eq!(response.bitcoin.unwrap().brl, Some(dec!(512345.67)));
    }

    #[test]
    fn tolerates_missing_quote() {
        let response: OracleResponse = serde_json::from_str(r#"{"bitcoin": {}}"#).unwrap();
        assert_eq!(response.bitcoin.unwrap().brl, None);

        let response: OracleResponse = serde_json::from_str("{}").unwrap();
        assert!(response.bitcoin.is_none());
    }
}
