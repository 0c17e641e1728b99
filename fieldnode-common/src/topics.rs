use serde::{Deserialize, Serialize};

/// Default topic for outbound telemetry.
pub const TELEMETRY_TOPIC: &str = "/temp";

/// Default prefix of the per-node configuration topic.
pub const CONFIG_TOPIC_PREFIX: &str = "/config/";

/// Default topic for first-connect announcements.
pub const FIRST_CONNECT_TOPIC: &str = "/firstConnect";

/// Logical topic names used by a node.
///
/// Topics follow the broker's slash-separated convention:
/// - `/temp` - telemetry, one message per sampling period
/// - `/config/<nodeId>` - per-node configuration (retained by the broker)
/// - `/firstConnect` - announcement carrying only the node identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topics {
    /// Telemetry topic.
    #[serde(default = "default_telemetry")]
    pub telemetry: String,

    /// Prefix of the configuration topic; the node identity is appended.
    #[serde(default = "default_config_prefix")]
    pub config_prefix: String,

    /// Broadcast topic for unconfigured nodes.
    #[serde(default = "default_first_connect")]
    pub first_connect: String,
}

fn default_telemetry() -> String {
    TELEMETRY_TOPIC.to_string()
}

fn default_config_prefix() -> String {
    CONFIG_TOPIC_PREFIX.to_string()
}

fn default_first_connect() -> String {
    FIRST_CONNECT_TOPIC.to_string()
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            telemetry: default_telemetry(),
            config_prefix: default_config_prefix(),
            first_connect: default_first_connect(),
        }
    }
}

impl Topics {
    /// Configuration topic for a node.
    ///
    /// # Example
    /// ```
    /// use fieldnode_common::topics::Topics;
    ///
    /// let topics = Topics::default();
    /// assert_eq!(topics.config_topic("AABBCCDDEEFF"), "/config/AABBCCDDEEFF");
    /// ```
    pub fn config_topic(&self, node_id: &str) -> String {
        format!("{}{}", self.config_prefix, node_id)
    }

    /// Extract the node identity from a configuration topic.
    ///
    /// # Example
    /// ```
    /// use fieldnode_common::topics::Topics;
    ///
    /// let topics = Topics::default();
    /// assert_eq!(topics.parse_config_topic("/config/AABBCCDDEEFF"), Some("AABBCCDDEEFF"));
    /// assert_eq!(topics.parse_config_topic("/temp"), None);
    /// ```
    pub fn parse_config_topic<'a>(&self, topic: &'a str) -> Option<&'a str> {
        topic
            .strip_prefix(self.config_prefix.as_str())
            .filter(|id| !id.is_empty() && !id.contains('/'))
    }
}

/// Map a logical topic onto a key expression under `prefix`.
///
/// Key expressions may not start with `/`, so the leading slash is dropped.
///
/// # Example
/// ```
/// use fieldnode_common::topics::to_key_expr;
///
/// assert_eq!(to_key_expr("fieldnode", "/config/AABB"), "fieldnode/config/AABB");
/// assert_eq!(to_key_expr("fieldnode", "/temp"), "fieldnode/temp");
/// ```
pub fn to_key_expr(prefix: &str, topic: &str) -> String {
    let topic = topic.trim_start_matches('/');
    if prefix.is_empty() {
        topic.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), topic)
    }
}

/// Inverse of [`to_key_expr`].
///
/// # Example
/// ```
/// use fieldnode_common::topics::from_key_expr;
///
/// assert_eq!(from_key_expr("fieldnode", "fieldnode/config/AABB"), Some("/config/AABB".to_string()));
/// assert_eq!(from_key_expr("fieldnode", "other/temp"), None);
/// ```
pub fn from_key_expr(prefix: &str, key: &str) -> Option<String> {
    let rest = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix.trim_end_matches('/'))?
            .strip_prefix('/')?
    };
    Some(format!("/{}", rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topics() {
        let topics = Topics::default();
        assert_eq!(topics.telemetry, "/temp");
        assert_eq!(topics.first_connect, "/firstConnect");
        assert_eq!(topics.config_topic("0A0B"), "/config/0A0B");
    }

    #[test]
    fn test_parse_config_topic_rejects_nested() {
        let topics = Topics::default();
        assert_eq!(topics.parse_config_topic("/config/"), None);
        assert_eq!(topics.parse_config_topic("/config/a/b"), None);
    }

    #[test]
    fn test_custom_prefix() {
        let topics = Topics {
            config_prefix: "site1/config/".to_string(),
            ..Topics::default()
        };
        assert_eq!(topics.config_topic("01"), "site1/config/01");
        assert_eq!(topics.parse_config_topic("site1/config/01"), Some("01"));
    }

    #[test]
    fn test_key_expr_mapping() {
        assert_eq!(to_key_expr("", "/firstConnect"), "firstConnect");
        assert_eq!(to_key_expr("site/", "/temp"), "site/temp");
        assert_eq!(from_key_expr("", "temp"), Some("/temp".to_string()));
        assert_eq!(from_key_expr("site", "sitex/temp"), None);
    }
}
