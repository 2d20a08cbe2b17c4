use super::WillMessage;
use crate::v5::properties::Properties;
use std::time::Duration;

/// Per-connection identity and CONNECT parameters. Immutable for the
/// lifetime of one connection attempt; the downgrade path re-sends the
/// same options at protocol level 4.
#[derive(Clone)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub clean_start: bool,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
    pub will: Option<WillMessage>,
    pub properties: ConnectProperties,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("clean_start", &self.clean_start)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("will", &self.will)
            .field("properties", &self.properties)
            .finish()
    }
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self::new("")
    }
}

impl ConnectOptions {
    #[must_use]
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            clean_start: true,
            username: None,
            password: None,
            will: None,
            properties: ConnectProperties::default(),
        }
    }

    #[must_use]
    pub fn with_keep_alive(mut self, duration: Duration) -> Self {
        self.keep_alive = duration;
        self
    }

    #[must_use]
    pub fn with_clean_start(mut self, clean: bool) -> Self {
        self.clean_start = clean;
        self
    }

    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl AsRef<[u8]>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.as_ref().to_vec());
        self
    }

    #[must_use]
    pub fn with_will(mut self, will: WillMessage) -> Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub fn with_session_expiry_interval(mut self, interval: u32) -> Self {
        self.properties.session_expiry_interval = Some(interval);
        self
    }

    #[must_use]
    pub fn with_receive_maximum(mut self, receive_maximum: u16) -> Self {
        self.properties.receive_maximum = Some(receive_maximum);
        self
    }

    #[must_use]
    pub fn with_topic_alias_maximum(mut self, maximum: u16) -> Self {
        self.properties.topic_alias_maximum = Some(maximum);
        self
    }

    #[must_use]
    pub fn with_user_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties
            .user_properties
            .push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn keep_alive_secs(&self) -> u16 {
        u16::try_from(self.keep_alive.as_secs()).unwrap_or(u16::MAX)
    }
}

/// MQTT5 CONNECT property block, kept as plain optionals so the v3.1.1
/// path can simply skip it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub receive_maximum: Option<u16>,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: Option<u16>,
    pub request_response_information: Option<bool>,
    pub request_problem_information: Option<bool>,
    pub user_properties: Vec<(String, String)>,
}

impl ConnectProperties {
    #[must_use]
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(v) = self.session_expiry_interval {
            props.set_session_expiry_interval(v);
        }
        if let Some(v) = self.receive_maximum {
            props.set_receive_maximum(v);
        }
        if let Some(v) = self.maximum_packet_size {
            props.set_maximum_packet_size(v);
        }
        if let Some(v) = self.topic_alias_maximum {
            props.set_topic_alias_maximum(v);
        }
        if let Some(v) = self.request_response_information {
            props.set_request_response_information(v);
        }
        if let Some(v) = self.request_problem_information {
            props.set_request_problem_information(v);
        }
        for (key, value) in &self.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}

/// What the broker told us in its CONNACK property block. Defaults follow
/// the MQTT 5.0 absent-property rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    pub receive_maximum: u16,
    pub maximum_qos: u8,
    pub retain_available: bool,
    pub maximum_packet_size: u32,
    pub assigned_client_id: Option<String>,
    pub topic_alias_maximum: u16,
    pub server_keep_alive: Option<u16>,
    pub response_information: Option<String>,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            receive_maximum: 65_535,
            maximum_qos: 2,
            retain_available: true,
            maximum_packet_size: crate::encoding::VARIABLE_INT_MAX,
            assigned_client_id: None,
            topic_alias_maximum: 0,
            server_keep_alive: None,
            response_information: None,
        }
    }
}

impl ServerProperties {
    #[must_use]
    pub fn from_connack_properties(props: &Properties) -> Self {
        let mut server = Self::default();
        if let Some(v) = props.receive_maximum() {
            server.receive_maximum = v;
        }
        if let Some(v) = props.maximum_qos() {
            server.maximum_qos = v;
        }
        if let Some(v) = props.retain_available() {
            server.retain_available = v;
        }
        if let Some(v) = props.maximum_packet_size() {
            server.maximum_packet_size = v;
        }
        if let Some(v) = props.assigned_client_identifier() {
            server.assigned_client_id = Some(v.to_string());
        }
        if let Some(v) = props.topic_alias_maximum() {
            server.topic_alias_maximum = v;
        }
        if let Some(v) = props.server_keep_alive() {
            server.server_keep_alive = Some(v);
        }
        if let Some(v) = props.response_information() {
            server.response_information = Some(v.to_string());
        }
        server
    }
}

/// MQTT5 DISCONNECT property template (session expiry and user properties),
/// adopted into the session config and sent with every DISCONNECT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectProperties {
    pub session_expiry_interval: Option<u32>,
    pub user_properties: Vec<(String, String)>,
}

impl DisconnectProperties {
    #[must_use]
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(v) = self.session_expiry_interval {
            props.set_session_expiry_interval(v);
        }
        for (key, value) in &self.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}
