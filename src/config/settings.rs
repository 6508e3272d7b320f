use std::time::Duration;

use serde::Deserialize;

use crate::connection::ConnectionOptions;
use crate::router::RouterOptions;

/// Top-level configuration settings for the transport.
///
/// Includes the broker endpoint and partitioning, receive pump tuning and
/// logging.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Settings {
    pub transport: TransportSettings,
    pub pump: PumpSettings,
    pub logging: LoggingSettings,
}

/// Where to connect and how messages are spread over topics.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TransportSettings {
    pub endpoint: String,
    pub topic_prefix: String,
    pub topic_count: usize,
}

/// Receive pump and publish tuning.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PumpSettings {
    pub receive_batch_size: usize,
    pub backoff_secs: u64,
    pub message_ttl_secs: u64,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values are filled from
/// defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub transport: Option<PartialTransportSettings>,
    pub pump: Option<PartialPumpSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialTransportSettings {
    pub endpoint: Option<String>,
    pub topic_prefix: Option<String>,
    pub topic_count: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPumpSettings {
    pub receive_batch_size: Option<usize>,
    pub backoff_secs: Option<u64>,
    pub message_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let connection = ConnectionOptions::default();
        let router = RouterOptions::default();

        Self {
            transport: TransportSettings {
                endpoint: "memory://local".to_string(),
                topic_prefix: router.topic_prefix,
                topic_count: router.topic_count,
            },
            pump: PumpSettings {
                receive_batch_size: connection.receive_batch_size,
                backoff_secs: connection.backoff.as_secs(),
                message_ttl_secs: connection.message_ttl.as_secs(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fill every value missing from `partial` with its default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Self::default();
        let transport = partial.transport.unwrap_or_default();
        let pump = partial.pump.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Self {
            transport: TransportSettings {
                endpoint: transport.endpoint.unwrap_or(default.transport.endpoint),
                topic_prefix: transport
                    .topic_prefix
                    .unwrap_or(default.transport.topic_prefix),
                topic_count: transport
                    .topic_count
                    .unwrap_or(default.transport.topic_count),
            },
            pump: PumpSettings {
                receive_batch_size: pump
                    .receive_batch_size
                    .unwrap_or(default.pump.receive_batch_size),
                backoff_secs: pump.backoff_secs.unwrap_or(default.pump.backoff_secs),
                message_ttl_secs: pump
                    .message_ttl_secs
                    .unwrap_or(default.pump.message_ttl_secs),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            receive_batch_size: self.pump.receive_batch_size,
            backoff: Duration::from_secs(self.pump.backoff_secs),
            message_ttl: Duration::from_secs(self.pump.message_ttl_secs),
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            topic_prefix: self.transport.topic_prefix.clone(),
            topic_count: self.transport.topic_count,
        }
    }
}
