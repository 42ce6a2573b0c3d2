//! Builder for a connection

use siderite_amqp_types::primitives::{FieldTable, FieldValue, ShortStr};

use crate::address::Address;
use crate::endpoint::Transport;
use crate::sasl::SaslProfile;
use crate::Error;

use super::{new_inner, start_handshake, Connection, DEFAULT_FRAME_MAX};

const DEFAULT_LOCALE: &str = "en_US";

/// Collects login, virtual host and tuning proposals, then opens the
/// connection over a transport.
#[derive(Debug, Clone)]
pub struct Builder {
    profile: SaslProfile,
    vhost: String,
    locale: String,
    channel_max: u16,
    frame_max: u32,
    heartbeat: u16,
    properties: Vec<(String, FieldValue)>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// A builder with guest credentials, vhost `/` and default tuning.
    pub fn new() -> Self {
        Self {
            profile: SaslProfile::default(),
            vhost: "/".to_owned(),
            locale: DEFAULT_LOCALE.to_owned(),
            channel_max: 0,
            frame_max: DEFAULT_FRAME_MAX,
            heartbeat: 0,
            properties: Vec::new(),
        }
    }

    /// Sets the SASL profile.
    pub fn login(mut self, profile: impl Into<SaslProfile>) -> Self {
        self.profile = profile.into();
        self
    }

    /// Sets the virtual host to open.
    pub fn virtual_host(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    /// Sets the locale requested in `start-ok`.
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Proposes a channel limit, 0 meaning no preference.
    pub fn channel_max(mut self, value: u16) -> Self {
        self.channel_max = value;
        self
    }

    /// Proposes a maximum frame size, 0 meaning no preference.
    pub fn frame_max(mut self, value: u32) -> Self {
        self.frame_max = value;
        self
    }

    /// Proposes a heartbeat interval in seconds, 0 meaning none.
    pub fn heartbeat(mut self, value: u16) -> Self {
        self.heartbeat = value;
        self
    }

    /// Adds or overrides an entry of the client-properties table sent in
    /// `start-ok`.
    pub fn client_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Seeds login, vhost and tuning from a parsed address.
    pub fn address(mut self, address: &Address) -> Self {
        self.profile = address.login().clone();
        self.vhost = address.vhost().to_owned();
        if let Some(heartbeat) = address.heartbeat() {
            self.heartbeat = heartbeat;
        }
        if let Some(channel_max) = address.channel_max() {
            self.channel_max = channel_max;
        }
        if let Some(frame_max) = address.frame_max() {
            self.frame_max = frame_max;
        }
        self
    }

    /// Opens the connection: sends the protocol preamble through the
    /// transport and returns with the handshake in flight.
    pub fn open(self, transport: Box<dyn Transport>) -> Result<Connection, Error> {
        let vhost = ShortStr::new(self.vhost)?;
        let locale = ShortStr::new(self.locale)?;
        let mut client_properties = default_properties()?;
        for (key, value) in self.properties {
            client_properties.insert(ShortStr::new(key)?, value);
        }
        let inner = new_inner(
            transport,
            self.profile,
            vhost,
            locale,
            client_properties,
            self.channel_max,
            self.frame_max,
            self.heartbeat,
        );
        start_handshake(&inner);
        Ok(Connection::from_inner(inner))
    }
}

fn default_properties() -> Result<FieldTable, Error> {
    let mut capabilities = FieldTable::new();
    capabilities.insert(ShortStr::new("publisher_confirms")?, true);
    capabilities.insert(ShortStr::new("basic.nack")?, true);
    capabilities.insert(ShortStr::new("consumer_cancel_notify")?, true);
    capabilities.insert(ShortStr::new("connection.blocked")?, true);

    let mut table = FieldTable::new();
    table.insert(ShortStr::new("product")?, "siderite-amqp");
    table.insert(ShortStr::new("version")?, env!("CARGO_PKG_VERSION"));
    table.insert(ShortStr::new("platform")?, "Rust");
    table.insert(ShortStr::new("capabilities")?, capabilities);
    Ok(table)
}
