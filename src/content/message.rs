use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of message kinds exchanged with embedded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Theme,
    Data,
    Ready,
    Back,
    Error,
}

impl MessageKind {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "theme" => Some(Self::Theme),
            "data" => Some(Self::Data),
            "ready" => Some(Self::Ready),
            "back" => Some(Self::Back),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Kinds the content is allowed to send to the parent.
    pub fn is_inbound(self) -> bool {
        matches!(self, Self::Ready | Self::Back | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentMessage {
    /// Parent → content: styling parameters.
    Theme {
        #[serde(default)]
        theme: Map<String, Value>,
    },
    /// Parent → content: payload plus the time it was produced.
    Data {
        payload: Value,
        #[serde(default)]
        timestamp: u64,
    },
    /// Content → parent: load acknowledgment.
    Ready {
        #[serde(default, rename = "screenId", skip_serializing_if = "Option::is_none")]
        screen_id: Option<String>,
    },
    /// Content → parent: the user asked to go back.
    Back,
    /// Content → parent: fault report.
    Error {
        #[serde(default)]
        message: String,
    },
}

impl ContentMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Theme { .. } => MessageKind::Theme,
            Self::Data { .. } => MessageKind::Data,
            Self::Ready { .. } => MessageKind::Ready,
            Self::Back => MessageKind::Back,
            Self::Error { .. } => MessageKind::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_shape_uses_type_tag() {
        let ready: ContentMessage =
            serde_json::from_value(json!({"type": "ready", "screenId": "s1"})).unwrap();
        assert_eq!(
            ready,
            ContentMessage::Ready {
                screen_id: Some("s1".into())
            }
        );

        let data = ContentMessage::Data {
            payload: json!({"value": 3}),
            timestamp: 99,
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"type": "data", "payload": {"value": 3}, "timestamp": 99})
        );
    }

    #[test]
    fn kinds_are_closed() {
        assert_eq!(MessageKind::from_tag("back"), Some(MessageKind::Back));
        assert_eq!(MessageKind::from_tag("navigate"), None);
        assert!(MessageKind::Ready.is_inbound());
        assert!(!MessageKind::Theme.is_inbound());
    }
}
