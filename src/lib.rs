//! Kraken realtime connectivity.
//!
//! Async client for the Kraken WebSocket v1 API and the REST endpoints it
//! depends on: public market data (ticker, ohlc, trade, spread and
//! checksum-verified order books), private account channels, and order
//! actions correlated with their acknowledgements.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod orderbook;
pub mod rest;
pub mod tls;
pub mod websocket;

pub use error::{LinkError, PairFailure, Result};
