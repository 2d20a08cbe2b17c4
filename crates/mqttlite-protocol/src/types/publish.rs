use crate::v5::properties::Properties;

/// MQTT5 PUBLISH property template adopted into the session config and
/// applied to every outbound publish.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishProperties {
    pub payload_format_indicator: Option<bool>,
    pub message_expiry_interval: Option<u32>,
    pub topic_alias: Option<u16>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl PublishProperties {
    /// Builds the wire property block. When the server supplied response
    /// information at CONNACK time, the response topic is suffixed with it
    /// (`<response_topic>/<response_info>`).
    #[must_use]
    pub fn to_properties(&self, response_info: Option<&str>) -> Properties {
        let mut props = Properties::new();
        if let Some(v) = self.payload_format_indicator {
            props.set_payload_format_indicator(v);
        }
        if let Some(v) = self.message_expiry_interval {
            props.set_message_expiry_interval(v);
        }
        if let Some(v) = self.topic_alias {
            props.set_topic_alias(v);
        }
        if let Some(ref topic) = self.response_topic {
            match response_info {
                Some(info) if !info.is_empty() => {
                    props.set_response_topic(format!("{topic}/{info}"));
                }
                _ => props.set_response_topic(topic.clone()),
            }
        }
        if let Some(ref v) = self.correlation_data {
            props.set_correlation_data(v.clone().into());
        }
        if let Some(ref v) = self.content_type {
            props.set_content_type(v.clone());
        }
        for (key, value) in &self.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }
}
