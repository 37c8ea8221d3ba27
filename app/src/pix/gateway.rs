//! HTTP client for the PIX settlement gateway. Access tokens are exchanged
//! for a refresh token and cached until expiry inside the client; every other
//! call carries the bearer token. Withdrawals are never retried here since a
//! repeated payout is a double payment.

use crate::brl::Cents;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

#[derive(Debug, Error)]
pub enum Error {
    #[error("pix gateway timed out")]
    TimedOut,
    #[error("pix gateway unreachable: {0}")]
    Transport(String),
    #[error("pix gateway rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("pix gateway sent an unexpected response: {0}")]
    Decode(String),
}

pub struct Config {
    pub base_url: Url,
    pub app_id: String,
    pub app_secret: String,
    pub refresh_token: String,
    pub request_timeout: std::time::Duration,
}

/// Where a withdrawal goes: a canonical PIX key, or the provider hash of a
/// resolved QR code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Key(String),
    QrHash(String),
}

/// A deposit QR code issued by the gateway (admin top-up path).
#[derive(Debug, Clone)]
pub struct DepositQr {
    pub id: String,
    pub payload: String,
}

/// A QR code resolved through the gateway's directory lookup.
#[derive(Debug, Clone)]
pub struct QrLookup {
    pub hash: String,
    pub amount: Cents,
    pub key: String,
    pub payee_name: String,
}

/// A successfully executed withdrawal.
#[derive(Debug, Clone)]
pub struct Settlement {
    pub id: String,
    pub payee_name: String,
}

type Clock = fn() -> DateTime<Utc>;

/// Cached gateway access token with its expiry. Owned by the client; the
/// clock is injectable so expiry is testable.
#[derive(Debug)]
pub struct TokenCache {
    token: Option<AccessToken>,
    clock: Clock,
}

#[derive(Debug, Clone)]
struct AccessToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl TokenCache {
    fn new() -> Self {
        Self::with_clock(Utc::now)
    }

    fn with_clock(clock: Clock) -> Self {
        Self { token: None, clock }
    }

    fn current(&self) -> Option<&str> {
        let now = (self.clock)();
        self.token
            .as_ref()
            .filter(|token| token.expires_at > now)
            .map(|token| token.token.as_str())
    }

    fn store(&mut self, token: String, expires_in_secs: i64) {
        self.token = Some(AccessToken {
            token,
            expires_at: (self.clock)() + Duration::seconds(expires_in_secs),
        });
    }
}

#[derive(Clone)]
pub struct Gateway {
    client: reqwest::Client,
    base_url: Url,
    app_id: String,
    app_secret: String,
    refresh_token: String,
    token: Arc<Mutex<TokenCache>>,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap(),
            base_url: config.base_url,
            app_id: config.app_id,
            app_secret: config.app_secret,
            refresh_token: config.refresh_token,
            token: Arc::new(Mutex::new(TokenCache::new())),
        }
    }

    /// Issues a deposit QR code for the given fiat amount.
    pub async fn create_deposit_qr(&self, amount: Cents) -> Result<DepositQr, Error> {
        let response: DepositResponse = self
            .send(
                self.client
                    .post(self.url("/pix-qrcode-payments"))
                    .json(&DepositBody { amount: amount.0 }),
            )
            .await?;
        Ok(DepositQr {
            id: response.id,
            payload: response.payload,
        })
    }

    /// Fiat available on the gateway account, in cents.
    pub async fn admin_balance(&self) -> Result<Cents, Error> {
        let response: BalanceResponse = self
            .send(self.client.get(self.url("/recipients/DEFAULT/balance")))
            .await?;
        Ok(Cents(response.available))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    /// Exchanges the refresh token for an access token unless a live one is
    /// cached. The lock is held across the exchange so concurrent callers
    /// don't refresh more than once.
    async fn access_token(&self) -> Result<String, Error> {
        let mut cache = self.token.lock().await;
        if let Some(token) = cache.current() {
            return Ok(token.to_owned());
        }
        let response = self
            .client
            .post(self.url("/access-tokens"))
            .basic_auth(&self.app_id, Some(&self.app_secret))
            .json(&TokenBody {
                refresh_token: &self.refresh_token,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let response: TokenResponse = decode(response).await?;
        cache.store(response.token.clone(), response.expires_in);
        Ok(response.token)
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<T, Error> {
        let token = self.access_token().await?;
        let response = req
            .bearer_auth(token)
            .send()
            .await
            .map_err(transport_error)?;
        decode(response).await
    }
}

#[async_trait]
pub trait WithdrawApi: Send + Sync {
    /// Resolves a QR code to its hash, fixed amount and payee.
    async fn lookup_qr(&self, qrcode: &str) -> Result<QrLookup, Error>;

    /// Executes a withdrawal. A returned `Ok` means the fiat has moved.
    async fn withdraw(&self, amount: Cents, target: &Target) -> Result<Settlement, Error>;
}

#[async_trait]
impl WithdrawApi for Gateway {
    async fn lookup_qr(&self, qrcode: &str) -> Result<QrLookup, Error> {
        let response: DictLookupResponse = self
            .send(
                self.client
                    .get(self.url("/dict/barcode"))
                    .query(&[("qrcode", qrcode)]),
            )
            .await?;
        Ok(QrLookup {
            hash: response.hash,
            amount: Cents(response.amount),
            key: response.key,
            payee_name: response.recipient.name,
        })
    }

    async fn withdraw(&self, amount: Cents, target: &Target) -> Result<Settlement, Error> {
        let body = WithdrawalBody {
            method: "PIX",
            amount: amount.0,
            pix_key: match target {
                Target::Key(key) => Some(key),
                Target::QrHash(_) => None,
            },
            hash: match target {
                Target::Key(_) => None,
                Target::QrHash(hash) => Some(hash),
            },
        };
        let response: WithdrawalResponse = self
            .send(
                self.client
                    .post(self.url("/recipients/DEFAULT/withdrawals"))
                    .json(&body),
            )
            .await?;
        Ok(Settlement {
            id: response.id,
            payee_name: response.recipient.name,
        })
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::TimedOut
    } else {
        Error::Transport(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    response.json().await.map_err(|e| Error::Decode(e.to_string()))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenBody<'a> {
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    expires_in: i64,
}

#[derive(Debug, Serialize)]
struct DepositBody {
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct DepositResponse {
    id: String,
    payload: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    available: i64,
}

#[derive(Debug, Deserialize)]
struct DictLookupResponse {
    hash: String,
    amount: i64,
    key: String,
    recipient: Recipient,
}

#[derive(Debug, Deserialize)]
struct Recipient {
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawalBody<'a> {
    method: &'static str,
    amount: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pix_key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hash: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WithdrawalResponse {
    id: String,
    recipient: Recipient,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicI64, Ordering};

    static NOW_SECS: AtomicI64 = AtomicI64::new(0);

    fn test_clock() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW_SECS.load(Ordering::SeqCst), 0).unwrap()
    }

    #[test]
    fn token_cache_serves_until_expiry() {
        NOW_SECS.store(1_000, Ordering::SeqCst);
        let mut cache = TokenCache::with_clock(test_clock);
        assert_eq!(cache.current(), None);

        cache.store("tok".to_owned(), 600);
        assert_eq!(cache.current(), Some("tok"));

        NOW_SECS.store(1_599, Ordering::SeqCst);
        assert_eq!(cache.current(), Some("tok"));

        NOW_SECS.store(1_600, Ordering::SeqCst);
        assert_eq!(cache.current(), None);
    }

    #[test]
    fn withdrawal_body_carries_exactly_one_target() {
        let by_key = WithdrawalBody {
            method: "PIX",
            amount: 1010,
            pix_key: Some("52998224725"),
            hash: None,
        };
        let json = serde_json::to_value(&by_key).unwrap();
        assert_eq!(json["pixKey"], "52998224725");
        assert!(json.get("hash").is_none());

        let by_hash = WithdrawalBody {
            method: "PIX",
            amount: 1010,
            pix_key: None,
            hash: Some("abc123"),
        };
        let json = serde_json::to_value(&by_hash).unwrap();
        assert_eq!(json["hash"], "abc123");
        assert!(json.get("pixKey").is_none());
    }
}
