//! PIX settlement rail integration: key validation and the HTTP client for
//! the settlement gateway.

pub mod gateway;
mod key;

pub use gateway::{DepositQr, Gateway, QrLookup, Settlement, Target, WithdrawApi};
pub use key::{InvalidKey, Kind, PixKey};
