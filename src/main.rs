use std::sync::Arc;
use std::time::Duration;

use app::convert;
use app::database::{connect, run_migrations, seed_development_data};
use app::{ln, pix, rates};
use rocket::{launch, Build, Rocket};
use rust_decimal::Decimal;
use serde::Deserialize;
use url::Url;

#[derive(Debug, Deserialize)]
struct Config {
    database_url: Url,
    pix_gateway: PixGatewayConfig,
    lightning_gateway: LightningGatewayConfig,
    price_oracle: PriceOracleConfig,
    policy: PolicyConfig,
    rate_limit: RateLimitConfig,
    #[serde(default)]
    show_debug_data: bool,
}

#[derive(Debug, Deserialize)]
struct PixGatewayConfig {
    url: Url,
    app_id: String,
    app_secret: String,
    refresh_token: String,
    request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct LightningGatewayConfig {
    url: Url,
    api_key: String,
    request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PriceOracleConfig {
    url: Url,
    ttl_secs: i64,
    refresh_secs: u64,
    request_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct PolicyConfig {
    fee_rate: f64,
    spread_rate: f64,
    topup_margin: f64,
    min_brl: f64,
    max_brl: f64,
}

impl PolicyConfig {
    fn into_policy(self) -> convert::Policy {
        convert::Policy {
            fee_rate: decimal(self.fee_rate),
            spread_rate: decimal(self.spread_rate),
            topup_margin: decimal(self.topup_margin),
            limits: convert::Limits {
                min: decimal(self.min_brl),
                max: decimal(self.max_brl),
            },
        }
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::try_from(value).unwrap()
}

#[derive(Debug, Deserialize)]
struct RateLimitConfig {
    limit: usize,
    span: Duration,
}

impl RateLimitConfig {
    fn into_rate_limit(self) -> api::RateLimit {
        api::RateLimit::new(self.limit, self.span)
    }
}

#[launch]
async fn rocket() -> _ {
    start_server().await
}

async fn start_server() -> Rocket<Build> {
    env_logger::init();

    let rocket = Rocket::build();
    let config: Config = rocket.figment().extract().unwrap();

    let db = connect(&config.database_url).await.unwrap();
    run_migrations(&db).await;
    #[cfg(debug_assertions)]
    seed_development_data(&db).await;

    let pix = pix::Gateway::new(pix::gateway::Config {
        base_url: config.pix_gateway.url,
        app_id: config.pix_gateway.app_id,
        app_secret: config.pix_gateway.app_secret,
        refresh_token: config.pix_gateway.refresh_token,
        request_timeout: Duration::from_secs(config.pix_gateway.request_timeout_secs),
    });
    let ln = ln::Gateway::new(ln::Config {
        base_url: config.lightning_gateway.url,
        api_key: config.lightning_gateway.api_key,
        request_timeout: Duration::from_secs(config.lightning_gateway.request_timeout_secs),
    });
    let prices = Arc::new(rates::PriceCache::new(rates::Config {
        url: config.price_oracle.url,
        ttl_secs: config.price_oracle.ttl_secs,
        request_timeout: Duration::from_secs(config.price_oracle.request_timeout_secs),
    }));
    let ticker = rates::start_ticker(
        Arc::clone(&prices),
        Duration::from_secs(config.price_oracle.refresh_secs),
    );

    api::register(
        rocket,
        api::RocketState {
            db,
            pix,
            ln,
            prices,
            ticker,
            policy: config.policy.into_policy(),
            rate_limit: config.rate_limit.into_rate_limit(),
            show_debug_data: config.show_debug_data,
        },
    )
}
