use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind-specific attachment fields. Sorted keys keep exports stable.
pub type Metadata = BTreeMap<String, Value>;

/// RFC 3339 UTC rendering of an epoch timestamp, e.g. `2023-11-14T22:13:20Z`.
pub fn iso_timestamp(epoch_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch_secs, 0)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerKind {
    User,
    Group,
    Chat,
}

impl PeerKind {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "user" => Some(Self::User),
            "group" => Some(Self::Group),
            "chat" => Some(Self::Chat),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Group => "group",
            Self::Chat => "chat",
        }
    }
}

/// A conversation selected for harvesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub peer_id: i64,
    pub kind: PeerKind,
    pub title: String,
}

/// A community selected for harvesting. `id` is always negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    pub id: i64,
    pub name: String,
    pub screen_name: String,
    pub members_count: u64,
    pub description: String,
    pub is_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Conversation(Peer),
    Community(Community),
}

impl Target {
    pub fn id(&self) -> i64 {
        match self {
            Self::Conversation(peer) => peer.peer_id,
            Self::Community(community) => community.id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Conversation(peer) => &peer.title,
            Self::Community(community) => &community.name,
        }
    }

    /// Human-readable label used in logs and the run summary.
    pub fn label(&self) -> String {
        match self {
            Self::Conversation(peer) => {
                format!("dialog {} ({} {})", peer.title, peer.kind.as_str(), peer.peer_id)
            }
            Self::Community(community) => format!("community {} ({})", community.name, community.id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Video,
    Document,
    Sticker,
    Audio,
    Link,
    Other,
}

impl AttachmentKind {
    /// Maps a remote attachment type name; anything unknown is `Other`.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "photo" => Self::Photo,
            "video" => Self::Video,
            "doc" | "document" => Self::Document,
            "sticker" => Self::Sticker,
            "audio" => Self::Audio,
            "link" => Self::Link,
            _ => Self::Other,
        }
    }

    /// The key under which the remote API nests this kind's payload.
    pub fn wire_key(&self) -> Option<&'static str> {
        match self {
            Self::Photo => Some("photo"),
            Self::Video => Some("video"),
            Self::Document => Some("doc"),
            Self::Sticker => Some("sticker"),
            Self::Audio => Some("audio"),
            Self::Link => Some("link"),
            Self::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
            Self::Document => "document",
            Self::Sticker => "sticker",
            Self::Audio => "audio",
            Self::Link => "link",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub metadata: Metadata,
}

impl Attachment {
    pub fn new(kind: AttachmentKind) -> Self {
        Self {
            kind,
            metadata: Metadata::new(),
        }
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        self.metadata.get(key).and_then(Value::as_i64)
    }

    /// Best external reference for the attachment: a direct url, else a VK page.
    pub fn reference(&self) -> Option<&str> {
        self.meta_str("url").or_else(|| self.meta_str("vk_link"))
    }
}

/// A message forwarded inside another message. Deeper forwards are only counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForwardedMessage {
    pub message_id: Option<i64>,
    pub date: i64,
    pub date_iso: String,
    pub from_id: i64,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub truncated_forwards: usize,
    pub vk_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub date: i64,
    pub date_iso: String,
    pub from_id: i64,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub fwd_messages: Vec<ForwardedMessage>,
    pub reply_to: Option<i64>,
    pub vk_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub date: i64,
    pub date_iso: String,
    pub from_id: i64,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub reply_to: Option<i64>,
    pub vk_link: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Likes {
    pub count: u64,
    pub user_reacted: bool,
    pub users: Vec<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reposts {
    pub count: u64,
}

/// Original post embedded in a repost (`copy_history`). One level only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepostedPost {
    pub id: i64,
    pub owner_id: i64,
    pub date: i64,
    pub date_iso: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub vk_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub owner_id: i64,
    pub from_id: i64,
    pub date: i64,
    pub date_iso: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
    pub copy_history: Vec<RepostedPost>,
    pub comments: Vec<Comment>,
    pub likes: Likes,
    pub reposts: Reposts,
    pub views: u64,
    pub is_pinned: bool,
    pub vk_link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationArchive {
    pub title: String,
    pub peer_id: i64,
    #[serde(rename = "type")]
    pub kind: PeerKind,
    pub export_date: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityArchiveType {
    #[default]
    CommunityPosts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityArchive {
    #[serde(rename = "type")]
    pub archive_type: CommunityArchiveType,
    pub export_date: String,
    pub community: Community,
    pub posts_count: usize,
    pub posts: Vec<Post>,
}

/// A fully harvested target, ready for export.
#[derive(Debug, Clone, PartialEq)]
pub enum Archive {
    Conversation(ConversationArchive),
    Community(CommunityArchive),
}

impl Archive {
    /// Number of top-level entities (messages or posts).
    pub fn item_count(&self) -> usize {
        match self {
            Self::Conversation(archive) => archive.messages.len(),
            Self::Community(archive) => archive.posts.len(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Self::Conversation(archive) => &archive.title,
            Self::Community(archive) => &archive.community.name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_timestamp_is_utc_with_z_suffix() {
        assert_eq!(iso_timestamp(0), "1970-01-01T00:00:00Z");
        assert_eq!(iso_timestamp(1_700_000_000), "2023-11-14T22:13:20Z");
    }

    #[test]
    fn unknown_wire_kinds_map_to_other() {
        assert_eq!(AttachmentKind::from_wire("doc"), AttachmentKind::Document);
        assert_eq!(AttachmentKind::from_wire("wall"), AttachmentKind::Other);
        assert_eq!(AttachmentKind::from_wire(""), AttachmentKind::Other);
    }

    #[test]
    fn attachment_kind_serializes_lowercase() {
        let json = serde_json::to_string(&AttachmentKind::Document).unwrap();
        assert_eq!(json, "\"document\"");
    }
}
