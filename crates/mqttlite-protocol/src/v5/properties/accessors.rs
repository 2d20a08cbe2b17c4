//! Typed convenience accessors over the property multimap. Setters silently
//! replace any prior value for non-repeatable identifiers.

use super::{Properties, PropertyId, PropertyValue};
use bytes::Bytes;

impl Properties {
    fn set(&mut self, id: PropertyId, value: PropertyValue) {
        self.properties.remove(&id);
        // add() cannot fail after the remove: the type is correct by construction
        let _ = self.add(id, value);
    }

    fn get_u8(&self, id: PropertyId) -> Option<u8> {
        match self.get(id) {
            Some(PropertyValue::Byte(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_u16(&self, id: PropertyId) -> Option<u16> {
        match self.get(id) {
            Some(PropertyValue::TwoByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_u32(&self, id: PropertyId) -> Option<u32> {
        match self.get(id) {
            Some(PropertyValue::FourByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    fn get_str(&self, id: PropertyId) -> Option<&str> {
        match self.get(id) {
            Some(PropertyValue::Utf8String(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn set_session_expiry_interval(&mut self, interval: u32) {
        self.set(
            PropertyId::SessionExpiryInterval,
            PropertyValue::FourByteInteger(interval),
        );
    }

    #[must_use]
    pub fn session_expiry_interval(&self) -> Option<u32> {
        self.get_u32(PropertyId::SessionExpiryInterval)
    }

    pub fn set_receive_maximum(&mut self, max: u16) {
        self.set(
            PropertyId::ReceiveMaximum,
            PropertyValue::TwoByteInteger(max),
        );
    }

    #[must_use]
    pub fn receive_maximum(&self) -> Option<u16> {
        self.get_u16(PropertyId::ReceiveMaximum)
    }

    pub fn set_maximum_packet_size(&mut self, size: u32) {
        self.set(
            PropertyId::MaximumPacketSize,
            PropertyValue::FourByteInteger(size),
        );
    }

    #[must_use]
    pub fn maximum_packet_size(&self) -> Option<u32> {
        self.get_u32(PropertyId::MaximumPacketSize)
    }

    pub fn set_topic_alias_maximum(&mut self, max: u16) {
        self.set(
            PropertyId::TopicAliasMaximum,
            PropertyValue::TwoByteInteger(max),
        );
    }

    #[must_use]
    pub fn topic_alias_maximum(&self) -> Option<u16> {
        self.get_u16(PropertyId::TopicAliasMaximum)
    }

    pub fn set_topic_alias(&mut self, alias: u16) {
        self.set(PropertyId::TopicAlias, PropertyValue::TwoByteInteger(alias));
    }

    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        self.get_u16(PropertyId::TopicAlias)
    }

    pub fn set_request_response_information(&mut self, request: bool) {
        self.set(
            PropertyId::RequestResponseInformation,
            PropertyValue::Byte(u8::from(request)),
        );
    }

    pub fn set_request_problem_information(&mut self, request: bool) {
        self.set(
            PropertyId::RequestProblemInformation,
            PropertyValue::Byte(u8::from(request)),
        );
    }

    pub fn set_maximum_qos(&mut self, qos: u8) {
        self.set(PropertyId::MaximumQoS, PropertyValue::Byte(qos));
    }

    #[must_use]
    pub fn maximum_qos(&self) -> Option<u8> {
        self.get_u8(PropertyId::MaximumQoS)
    }

    #[must_use]
    pub fn retain_available(&self) -> Option<bool> {
        self.get_u8(PropertyId::RetainAvailable).map(|v| v != 0)
    }

    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        self.get_u16(PropertyId::ServerKeepAlive)
    }

    pub fn set_server_keep_alive(&mut self, secs: u16) {
        self.set(
            PropertyId::ServerKeepAlive,
            PropertyValue::TwoByteInteger(secs),
        );
    }

    #[must_use]
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        self.get_str(PropertyId::AssignedClientIdentifier)
    }

    #[must_use]
    pub fn response_information(&self) -> Option<&str> {
        self.get_str(PropertyId::ResponseInformation)
    }

    pub fn set_reason_string(&mut self, reason: String) {
        self.set(PropertyId::ReasonString, PropertyValue::Utf8String(reason));
    }

    #[must_use]
    pub fn reason_string(&self) -> Option<&str> {
        self.get_str(PropertyId::ReasonString)
    }

    pub fn set_subscription_identifier(&mut self, id: u32) {
        self.set(
            PropertyId::SubscriptionIdentifier,
            PropertyValue::VariableByteInteger(id),
        );
    }

    #[must_use]
    pub fn subscription_identifier(&self) -> Option<u32> {
        match self.get(PropertyId::SubscriptionIdentifier) {
            Some(PropertyValue::VariableByteInteger(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn set_payload_format_indicator(&mut self, utf8: bool) {
        self.set(
            PropertyId::PayloadFormatIndicator,
            PropertyValue::Byte(u8::from(utf8)),
        );
    }

    pub fn set_message_expiry_interval(&mut self, interval: u32) {
        self.set(
            PropertyId::MessageExpiryInterval,
            PropertyValue::FourByteInteger(interval),
        );
    }

    pub fn set_content_type(&mut self, content_type: String) {
        self.set(
            PropertyId::ContentType,
            PropertyValue::Utf8String(content_type),
        );
    }

    pub fn set_response_topic(&mut self, topic: String) {
        self.set(PropertyId::ResponseTopic, PropertyValue::Utf8String(topic));
    }

    #[must_use]
    pub fn response_topic(&self) -> Option<&str> {
        self.get_str(PropertyId::ResponseTopic)
    }

    pub fn set_correlation_data(&mut self, data: Bytes) {
        self.set(PropertyId::CorrelationData, PropertyValue::BinaryData(data));
    }

    pub fn set_will_delay_interval(&mut self, interval: u32) {
        self.set(
            PropertyId::WillDelayInterval,
            PropertyValue::FourByteInteger(interval),
        );
    }

    /// Appends a user property; repeated keys are allowed and order is kept.
    pub fn add_user_property(&mut self, key: String, value: String) {
        let _ = self.add(
            PropertyId::UserProperty,
            PropertyValue::Utf8StringPair(key, value),
        );
    }

    #[must_use]
    pub fn user_properties(&self) -> Vec<(String, String)> {
        self.get_all(PropertyId::UserProperty)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| match v {
                        PropertyValue::Utf8StringPair(k, val) => Some((k.clone(), val.clone())),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_replace() {
        let mut props = Properties::new();
        props.set_topic_alias(3);
        props.set_topic_alias(7);
        assert_eq!(props.topic_alias(), Some(7));
        assert_eq!(props.get_all(PropertyId::TopicAlias).unwrap().len(), 1);
    }

    #[test]
    fn test_typed_getters() {
        let mut props = Properties::new();
        props.set_session_expiry_interval(120);
        props.set_receive_maximum(10);
        props.set_response_topic("reply/here".to_string());

        assert_eq!(props.session_expiry_interval(), Some(120));
        assert_eq!(props.receive_maximum(), Some(10));
        assert_eq!(props.response_topic(), Some("reply/here"));
        assert_eq!(props.maximum_qos(), None);
    }

    #[test]
    fn test_user_properties_accessor() {
        let mut props = Properties::new();
        props.add_user_property("k1".to_string(), "v1".to_string());
        props.add_user_property("k2".to_string(), "v2".to_string());

        assert_eq!(
            props.user_properties(),
            vec![
                ("k1".to_string(), "v1".to_string()),
                ("k2".to_string(), "v2".to_string())
            ]
        );
    }
}
