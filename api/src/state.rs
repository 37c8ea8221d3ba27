use std::sync::Arc;

use app::{convert, database::Database, ln, pix, rates};
use tokio::sync::watch;

use crate::rate_limit::RateLimit;

pub struct RocketState {
    pub db: Database,
    pub pix: pix::Gateway,
    pub ln: ln::Gateway,
    pub prices: Arc<rates::PriceCache>,
    pub ticker: watch::Receiver<Option<rates::PriceSnapshot>>,
    pub policy: convert::Policy,
    pub rate_limit: RateLimit,
    /// Attach internal error detail to responses. Off outside development.
    pub show_debug_data: bool,
}
