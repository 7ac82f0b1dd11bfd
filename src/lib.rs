//! Real-time Binance quote and trade feed handlers.
//!
//! Two binaries (`quote-feed-handler`, `trade-feed-handler`) share this
//! library: configuration, the connection-lifecycle supervisor, the
//! order-book engine, the publisher, and the health/shutdown machinery.
//! Everything here is written against cooperative single-task concurrency
//! (§5) — no lock guards per-symbol state because exactly one
//! `tokio::select!` loop owns it.

pub mod binance;
pub mod book;
pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod health;
pub mod publisher;
pub mod records;
pub mod sink;
pub mod shutdown;
pub mod symbol;
pub mod trade;
