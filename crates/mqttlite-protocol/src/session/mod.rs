//! Per-connection session configuration and state that outlives single
//! packets: the MQTT5 property templates adopted from the caller and the
//! peer topic-alias table.

mod topic_alias;

pub use topic_alias::TopicAliasTable;

use crate::types::{
    DisconnectProperties, PublishProperties, ServerProperties, SubscribeProperties,
    UnsubscribeProperties,
};

/// MQTT5 session configuration block: property templates for each packet
/// kind plus what the broker reported at CONNACK time. Templates supplied
/// by the caller are cloned in (deep copy), so later caller mutations
/// cannot alias live connection state. The whole block is discarded on
/// the 5.0 → 3.1.1 downgrade.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    pub publish: PublishProperties,
    pub subscribe: SubscribeProperties,
    pub unsubscribe: UnsubscribeProperties,
    pub disconnect: DisconnectProperties,
    pub server: ServerProperties,
}

impl SessionConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn adopt_publish_template(&mut self, template: &PublishProperties) {
        self.publish = template.clone();
    }

    pub fn adopt_subscribe_template(&mut self, template: &SubscribeProperties) {
        self.subscribe = template.clone();
    }

    pub fn adopt_unsubscribe_template(&mut self, template: &UnsubscribeProperties) {
        self.unsubscribe = template.clone();
    }

    pub fn adopt_disconnect_template(&mut self, template: &DisconnectProperties) {
        self.disconnect = template.clone();
    }

    /// Tears the v5 block back to defaults; the downgrade path calls this
    /// before re-issuing CONNECT at protocol level 4.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adopted_templates_are_deep_copies() {
        let mut config = SessionConfig::new();
        let mut template = PublishProperties {
            content_type: Some("application/json".to_string()),
            ..Default::default()
        };
        config.adopt_publish_template(&template);

        template.content_type = Some("text/plain".to_string());
        assert_eq!(
            config.publish.content_type.as_deref(),
            Some("application/json")
        );
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut config = SessionConfig::new();
        config.publish.topic_alias = Some(3);
        config.server.receive_maximum = 5;

        config.reset();
        assert_eq!(config.publish.topic_alias, None);
        assert_eq!(config.server.receive_maximum, 65_535);
    }
}
