//! This library contains definitions for the API layer.

use rocket::{Build, Rocket};

mod error;
mod rate_limit;
mod routes;
mod state;

pub use rate_limit::RateLimit;
pub use state::RocketState;

pub fn register(rocket: Rocket<Build>, state: RocketState) -> Rocket<Build> {
    routes::register(rocket, state)
}
