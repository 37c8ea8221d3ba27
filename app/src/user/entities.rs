use crate::btc;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(pub Uuid);

/// Hex-encoded Nostr public key, linked by the user for login recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(pub String);

#[derive(Debug, Clone)]
pub struct User {
    pub id: Id,
    pub public_key: Option<PublicKey>,
    pub balance: btc::Sats,
    pub created: DateTime<Utc>,
}
