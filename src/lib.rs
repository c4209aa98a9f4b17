pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod escrow;
pub mod events;
pub mod lifecycle;
pub mod marketplace;
pub mod pricing;
pub mod reputation;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use error::{MarketError, Result};
pub use marketplace::Marketplace;
