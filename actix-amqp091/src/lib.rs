#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate log;

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use amqp091_codec::types::{FieldTable, FieldValue};
use bytestring::ByteString;

mod cell;
mod channel;
mod client;
mod connection;
mod errors;
mod hb;
mod message;
pub mod sasl;

pub use amqp091_codec as codec;

pub use self::channel::{Channel, ChannelMode, ChannelState, Confirmation, ListenerId, Outcome};
pub use self::client::Client;
pub use self::errors::{AmqpError, CloseReason};
pub use self::message::Message;
pub use self::sasl::SaslMechanism;

/// Heartbeat interval travels as a signed 16-bit field
const MAX_HEARTBEAT: u64 = 1 << 15;

/// Amqp 0-9-1 client configuration.
#[derive(Clone)]
pub struct Configuration {
    pub host: String,
    pub port: u16,
    pub vhost: ByteString,
    pub user: String,
    pub password: String,
    pub mechanism: SaslMechanism,
    pub heartbeat: Duration,
    pub heartbeat_callback: Option<Rc<dyn Fn()>>,
    pub frame_max: u32,
    pub channel_max: u16,
    pub timeout: Duration,
    pub write_buffer: usize,
    pub client_properties: FieldTable,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("user", &self.user)
            .field("mechanism", &self.mechanism)
            .field("heartbeat", &self.heartbeat)
            .field("frame_max", &self.frame_max)
            .field("channel_max", &self.channel_max)
            .field("timeout", &self.timeout)
            .field("write_buffer", &self.write_buffer)
            .field("client_properties", &self.client_properties)
            .finish()
    }
}

impl Configuration {
    /// Create connection configuration.
    pub fn new() -> Self {
        Configuration {
            host: "127.0.0.1".to_string(),
            port: 5672,
            vhost: ByteString::from_static("/"),
            user: "guest".to_string(),
            password: "guest".to_string(),
            mechanism: SaslMechanism::default(),
            heartbeat: Duration::from_secs(60),
            heartbeat_callback: None,
            frame_max: 0,
            channel_max: 0,
            timeout: Duration::from_secs(1),
            write_buffer: 1024 * 1024,
            client_properties: FieldTable::default(),
        }
    }

    /// Set broker address
    ///
    /// By default `127.0.0.1:5672` is used
    pub fn address(&mut self, host: &str, port: u16) -> &mut Self {
        self.host = host.to_string();
        self.port = port;
        self
    }

    pub fn vhost(&mut self, vhost: &str) -> &mut Self {
        self.vhost = ByteString::from(vhost);
        self
    }

    pub fn credentials(&mut self, user: &str, password: &str) -> &mut Self {
        self.user = user.to_string();
        self.password = password.to_string();
        self
    }

    pub fn mechanism(&mut self, mechanism: SaslMechanism) -> &mut Self {
        self.mechanism = mechanism;
        self
    }

    /// Requested heartbeat interval, zero disables heartbeats unless the
    /// broker asks for them.
    ///
    /// By default heartbeat is set to 60 seconds
    pub fn heartbeat(&mut self, interval: Duration) -> &mut Self {
        self.heartbeat = interval;
        self
    }

    /// Callback invoked after every heartbeat frame sent by the client
    pub fn heartbeat_callback<F: Fn() + 'static>(&mut self, f: F) -> &mut Self {
        self.heartbeat_callback = Some(Rc::new(f));
        self
    }

    /// Upper bound for the negotiated frame size, zero accepts the broker's value.
    pub fn frame_max(&mut self, size: u32) -> &mut Self {
        self.frame_max = size;
        self
    }

    /// Upper bound for the negotiated channel max, zero accepts the broker's value.
    pub fn channel_max(&mut self, num: u16) -> &mut Self {
        self.channel_max = num;
        self
    }

    /// Connect and handshake timeout
    ///
    /// By default timeout is set to 1 second
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Outbound bytes queued before `Channel::publish` waits for the
    /// transport to drain.
    ///
    /// By default write buffer is 1Mb
    pub fn write_buffer(&mut self, size: usize) -> &mut Self {
        self.write_buffer = size;
        self
    }

    /// Add entry to the `connection.start-ok` client properties
    pub fn client_property<V: Into<FieldValue>>(&mut self, key: &str, value: V) -> &mut Self {
        self.client_properties
            .insert(ByteString::from(key), value.into());
        self
    }

    pub(crate) fn validate(&self) -> Result<(), AmqpError> {
        if self.heartbeat.as_secs() >= MAX_HEARTBEAT {
            Err(AmqpError::InvalidHeartbeat)
        } else {
            Ok(())
        }
    }

    /// Client properties with product and capabilities defaults.
    pub(crate) fn start_ok_properties(&self) -> FieldTable {
        let mut props = self.client_properties.clone();
        props
            .entry(ByteString::from_static("product"))
            .or_insert_with(|| FieldValue::from(env!("CARGO_PKG_NAME")));
        props
            .entry(ByteString::from_static("version"))
            .or_insert_with(|| FieldValue::from(env!("CARGO_PKG_VERSION")));
        props
            .entry(ByteString::from_static("capabilities"))
            .or_insert_with(|| {
                let mut caps = FieldTable::default();
                for cap in &[
                    "publisher_confirms",
                    "consumer_cancel_notify",
                    "basic.nack",
                    "connection.blocked",
                ] {
                    caps.insert(ByteString::from_static(*cap), FieldValue::Boolean(true));
                }
                FieldValue::Table(caps)
            });
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let mut config = Configuration::default();
        assert!(config.validate().is_ok());
        config.heartbeat(Duration::from_secs(32767));
        assert!(config.validate().is_ok());
        config.heartbeat(Duration::from_secs(32768));
        match config.validate() {
            Err(AmqpError::InvalidHeartbeat) => (),
            res => panic!("unexpected result: {:?}", res),
        }
    }

    #[test]
    fn test_start_ok_properties() {
        let mut config = Configuration::default();
        config.client_property("product", "my-app");
        let props = config.start_ok_properties();
        assert_eq!(props["product"].as_str(), Some("my-app"));
        assert!(props["capabilities"].as_table().is_some());
        assert!(props.contains_key("version"));
    }
}
