use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const NOTIFICATION_TOPIC: &str = "notifications";
pub const DEAD_LETTER_TOPIC: &str = "notifications.dead-letter";
pub const SEND_ROUTING_KEY: &str = "notification.send";
pub const DEAD_LETTER_REASON_HEADER: &str = "x-dead-letter-reason";

/// Template keys understood by the notification service.
pub mod templates {
    pub const RESERVATION_CONFIRMATION: &str = "reservation_confirmation";
    pub const RESERVATION_CANCELLATION: &str = "reservation_cancellation";
    pub const TABLE_READY: &str = "table_ready";
    pub const BILL_READY: &str = "bill_ready";
    pub const PAYMENT_RECEIPT: &str = "payment_receipt";
    pub const PASSWORD_RESET: &str = "password_reset";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Medium {
    #[default]
    Email,
}

impl Medium {
    pub fn as_str(self) -> &'static str {
        match self {
            Medium::Email => "Email",
        }
    }
}

/// One message to deliver. Travels as JSON through the broker and is never
/// persisted by the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationJob {
    #[serde(rename = "type")]
    pub template: String,
    #[serde(deserialize_with = "one_or_many")]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub attachment_required: bool,
    #[serde(default)]
    pub medium: Medium,
    #[serde(default)]
    pub attempt: u32,
}

impl NotificationJob {
    pub fn new(template: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            recipients: vec![recipient.into()],
            variables: BTreeMap::new(),
            attachment_required: false,
            medium: Medium::Email,
            attempt: 0,
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.variables.insert(key.into(), value.to_string());
        self
    }

    pub fn with_attachment(mut self) -> Self {
        self.attachment_required = true;
        self
    }

    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(address) => vec![address],
        OneOrMany::Many(addresses) => addresses,
    })
}

/// Topic-exchange binding match: words are dot separated, `*` matches exactly
/// one word and `#` matches zero or more.
pub fn binding_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((&"#", rest)), _) => {
            matches_words(rest, key)
                || key
                    .split_first()
                    .map_or(false, |(_, key_rest)| matches_words(pattern, key_rest))
        }
        (Some(_), None) => false,
        (Some((&"*", rest)), Some((_, key_rest))) => matches_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && matches_words(rest, key_rest)
        }
    }
}
