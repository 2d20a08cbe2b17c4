use crate::error::{MqttError, Result};
use std::collections::HashMap;

/// Peer topic-alias bindings for inbound publishes. An alias is bound the
/// first time the peer sends it together with a topic, rebound when the
/// peer repeats it with a different topic, and lives until disconnect.
#[derive(Debug, Default)]
pub struct TopicAliasTable {
    maximum: u16,
    alias_to_topic: HashMap<u16, String>,
}

impl TopicAliasTable {
    #[must_use]
    pub fn new(maximum: u16) -> Self {
        Self {
            maximum,
            alias_to_topic: HashMap::new(),
        }
    }

    #[must_use]
    pub fn maximum(&self) -> u16 {
        self.maximum
    }

    pub fn set_maximum(&mut self, maximum: u16) {
        self.maximum = maximum;
    }

    /// Binds `alias` to `topic`. Zero and out-of-range aliases are
    /// protocol errors.
    pub fn bind(&mut self, alias: u16, topic: &str) -> Result<()> {
        if alias == 0 || alias > self.maximum {
            return Err(MqttError::TopicAliasInvalid(alias));
        }
        self.alias_to_topic.insert(alias, topic.to_string());
        Ok(())
    }

    /// Resolves an alias-only publish. An alias with no prior binding is a
    /// protocol error.
    pub fn resolve(&self, alias: u16) -> Result<&str> {
        self.alias_to_topic
            .get(&alias)
            .map(String::as_str)
            .ok_or(MqttError::TopicAliasInvalid(alias))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.alias_to_topic.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alias_to_topic.is_empty()
    }

    pub fn clear(&mut self) {
        self.alias_to_topic.clear();
    }
}
