use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Permanent,
    OneTime,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Permanent => "permanent",
            LinkKind::OneTime => "one_time",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "permanent" => Some(LinkKind::Permanent),
            "one_time" => Some(LinkKind::OneTime),
            _ => None,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ShareDescriptor {
    pub link_id: String,
    pub kind: LinkKind,
    pub expires_at: Option<DateTime<Utc>>,
}

/// File metadata record. `stored_name` is the on-disk locator; it is
/// internal to the storage layer and never serialized in responses.
#[derive(Serialize, Debug, Clone)]
pub struct FileMeta {
    pub id: String,
    pub owner_id: String,
    pub original_name: String,
    #[serde(skip_serializing)]
    pub stored_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub share: Option<ShareDescriptor>,
}
