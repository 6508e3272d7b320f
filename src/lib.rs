//! # Scaleout transport
//!
//! `scaleout-transport` carries message streams between independent server
//! processes by routing them through a small, fixed set of shared broker
//! topics. Each stream key (a message's `source`) always hashes to the same
//! topic, so a stream stays ordered per topic and every node agrees on where
//! it lives.
//!
//! ## Core Modules
//!
//! - `message`: The `Message` value exchanged between nodes.
//! - `codec`: Binary framing of message batches to and from broker message bodies.
//! - `broker`: The broker collaborator traits plus an in-process implementation.
//! - `connection`: Owns a broker connection, runs one receive pump per subscription and publishes batches.
//! - `router`: Splits outgoing batches by stream key and decodes incoming ones for the upstream bus.
//! - `config`: Loads settings from files and environment variables.
//! - `utils`: Error types and logging initialisation.

pub mod broker;
pub mod codec;
pub mod config;
pub mod connection;
pub mod message;
pub mod router;
pub mod utils;

pub use connection::{ConnectionManager, ConnectionOptions, Subscription};
pub use message::Message;
pub use router::{PartitionRouter, RouterOptions, ScaleoutReceiver};
pub use utils::error::{BrokerError, FramingError, Result, TransportError};
