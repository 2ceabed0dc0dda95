use serde::Deserialize;

use crate::codec::{PayloadEncoding, WireProfile};

/// Largest frame the broker accepts unless configured otherwise.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Top-level configuration settings for the application.
///
/// Includes settings for the broker process, for clients connecting to it
/// and for logging.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub server: ServerSettings,
    pub client: ClientSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broker.
///
/// `name` only appears in logs. A `max_frame_size` of 0 disables the limit.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerSettings {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub wire_profile: WireProfile,
    pub max_frame_size: usize,
}

/// Where a client connects and how it lays out data.
///
/// `wire_profile` must match the broker's.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ClientSettings {
    pub host: String,
    pub port: u16,
    pub wire_profile: WireProfile,
    pub payload_encoding: PayloadEncoding,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Every field is optional; missing values are filled from the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub client: Option<PartialClientSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub wire_profile: Option<WireProfile>,
    pub max_frame_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialClientSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub wire_profile: Option<WireProfile>,
    pub payload_encoding: Option<PayloadEncoding>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            name: "topicbus".to_string(),
            host: "0.0.0.0".to_string(),
            port: 9090,
            wire_profile: WireProfile::Raw,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9090,
            wire_profile: WireProfile::Raw,
            payload_encoding: PayloadEncoding::Binary,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PartialSettings {
    /// Fills every missing field from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server.unwrap_or_default();
        let client = self.client.unwrap_or_default();
        let logging = self.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                name: server.name.unwrap_or(default.server.name),
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
                wire_profile: server.wire_profile.unwrap_or(default.server.wire_profile),
                max_frame_size: server
                    .max_frame_size
                    .unwrap_or(default.server.max_frame_size),
            },
            client: ClientSettings {
                host: client.host.unwrap_or(default.client.host),
                port: client.port.unwrap_or(default.client.port),
                wire_profile: client.wire_profile.unwrap_or(default.client.wire_profile),
                payload_encoding: client
                    .payload_encoding
                    .unwrap_or(default.client.payload_encoding),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
