use crate::v5::properties::Properties;

/// MQTT5 SUBSCRIBE property template: subscription identifier, shared
/// subscription group, and per-call user properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscribeProperties {
    pub subscription_identifier: Option<u32>,
    pub share_group: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl SubscribeProperties {
    #[must_use]
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        if let Some(id) = self.subscription_identifier {
            props.set_subscription_identifier(id);
        }
        for (key, value) in &self.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }

    /// Rewrites `filter` into the shared-subscription form
    /// `$share/<group>/<filter>` when a share group is configured.
    #[must_use]
    pub fn apply_share_group(&self, filter: &str) -> String {
        match self.share_group {
            Some(ref group) if !group.is_empty() => format!("$share/{group}/{filter}"),
            _ => filter.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsubscribeProperties {
    pub share_group: Option<String>,
    pub user_properties: Vec<(String, String)>,
}

impl UnsubscribeProperties {
    #[must_use]
    pub fn to_properties(&self) -> Properties {
        let mut props = Properties::new();
        for (key, value) in &self.user_properties {
            props.add_user_property(key.clone(), value.clone());
        }
        props
    }

    #[must_use]
    pub fn apply_share_group(&self, filter: &str) -> String {
        match self.share_group {
            Some(ref group) if !group.is_empty() => format!("$share/{group}/{filter}"),
            _ => filter.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::v5::properties::PropertyId;

    #[test]
    fn test_share_group_rewrite() {
        let props = SubscribeProperties {
            share_group: Some("workers".to_string()),
            ..Default::default()
        };
        assert_eq!(props.apply_share_group("jobs/#"), "$share/workers/jobs/#");

        let plain = SubscribeProperties::default();
        assert_eq!(plain.apply_share_group("jobs/#"), "jobs/#");
    }

    #[test]
    fn test_subscription_identifier_emitted() {
        let template = SubscribeProperties {
            subscription_identifier: Some(42),
            ..Default::default()
        };
        let props = template.to_properties();
        assert_eq!(props.subscription_identifier(), Some(42));
        assert!(!props.contains(PropertyId::UserProperty));
    }
}
