//! Conversion of raw remote payloads into the archive model.
//!
//! Every function here is total: missing fields and unexpected shapes fall
//! back to defaults instead of failing, so one broken entity never takes its
//! siblings down with it.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::links::{comment_link, message_link, photo_link, post_link, video_link};
use crate::model::{
    iso_timestamp, Attachment, AttachmentKind, Comment, Community, ForwardedMessage, Likes,
    Message, Metadata, Peer, PeerKind, Post, Reposts, RepostedPost,
};

/// Counts entries skipped while normalizing one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    /// Entries that were not objects or carried no usable id.
    pub dropped: usize,
    /// Entries whose id was already seen in the batch.
    pub duplicates: usize,
}

impl NormalizeReport {
    pub fn merge(&mut self, other: NormalizeReport) {
        self.dropped += other.dropped;
        self.duplicates += other.duplicates;
    }

    pub fn is_clean(&self) -> bool {
        self.dropped == 0 && self.duplicates == 0
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn int(raw: &Value, key: &str) -> Option<i64> {
    raw.get(key).and_then(as_int)
}

fn count(raw: &Value, key: &str) -> u64 {
    int(raw, key)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0)
}

fn text(raw: &Value, key: &str) -> String {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

fn flag(raw: &Value, key: &str) -> bool {
    int(raw, key).is_some_and(|n| n != 0)
}

fn array<'a>(raw: &'a Value, key: &str) -> &'a [Value] {
    raw.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn insert_str(metadata: &mut Metadata, key: &str, source: &Value, source_key: &str) {
    if let Some(value) = source.get(source_key).and_then(Value::as_str) {
        metadata.insert(key.to_string(), Value::String(value.to_string()));
    }
}

fn insert_int(metadata: &mut Metadata, key: &str, source: &Value, source_key: &str) {
    if let Some(value) = int(source, source_key) {
        metadata.insert(key.to_string(), Value::from(value));
    }
}

/// Normalizes one attachment entry of the form `{"type": t, t: {...}}`.
///
/// A known kind whose payload object is missing becomes `other` with empty
/// metadata. An unknown kind becomes `other` with its wire name and full raw
/// payload preserved.
pub fn normalize_attachment(raw: &Value) -> Attachment {
    let Some(wire_type) = raw.get("type").and_then(Value::as_str) else {
        return Attachment::new(AttachmentKind::Other);
    };
    let kind = AttachmentKind::from_wire(wire_type);

    let Some(key) = kind.wire_key() else {
        return unknown_attachment(wire_type, raw);
    };
    let Some(payload) = raw.get(key).filter(|p| p.is_object()) else {
        return Attachment::new(AttachmentKind::Other);
    };

    let mut attachment = Attachment::new(kind);
    let metadata = &mut attachment.metadata;
    match kind {
        AttachmentKind::Photo => {
            let largest = array(payload, "sizes")
                .iter()
                .max_by_key(|size| {
                    int(size, "width")
                        .unwrap_or(0)
                        .saturating_mul(int(size, "height").unwrap_or(0))
                });
            if let Some(size) = largest {
                insert_str(metadata, "url", size, "url");
            }
            let dims = if payload.get("width").is_some() {
                Some(payload)
            } else {
                largest
            };
            if let Some(source) = dims {
                insert_int(metadata, "width", source, "width");
                insert_int(metadata, "height", source, "height");
            }
            if let (Some(owner), Some(id)) = (int(payload, "owner_id"), int(payload, "id")) {
                metadata.insert("vk_link".into(), Value::String(photo_link(owner, id)));
            }
        }
        AttachmentKind::Video => {
            let title = payload
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or("Video");
            metadata.insert("title".into(), Value::String(title.to_string()));
            insert_int(metadata, "duration", payload, "duration");
            insert_str(metadata, "player", payload, "player");
            if let (Some(owner), Some(id)) = (int(payload, "owner_id"), int(payload, "id")) {
                metadata.insert("vk_link".into(), Value::String(video_link(owner, id)));
            }
        }
        AttachmentKind::Document => {
            insert_str(metadata, "title", payload, "title");
            insert_int(metadata, "size", payload, "size");
            insert_str(metadata, "url", payload, "url");
            insert_str(metadata, "ext", payload, "ext");
        }
        AttachmentKind::Audio => {
            insert_str(metadata, "artist", payload, "artist");
            insert_str(metadata, "title", payload, "title");
            insert_int(metadata, "duration", payload, "duration");
            insert_str(metadata, "url", payload, "url");
        }
        AttachmentKind::Sticker => {
            if let Some(image) = array(payload, "images").last() {
                insert_str(metadata, "url", image, "url");
            }
            insert_int(metadata, "sticker_id", payload, "sticker_id");
        }
        AttachmentKind::Link => {
            insert_str(metadata, "url", payload, "url");
            insert_str(metadata, "title", payload, "title");
            insert_str(metadata, "description", payload, "description");
        }
        AttachmentKind::Other => {}
    }
    attachment
}

fn unknown_attachment(wire_type: &str, raw: &Value) -> Attachment {
    let mut attachment = Attachment::new(AttachmentKind::Other);
    let metadata = &mut attachment.metadata;
    metadata.insert("raw_type".into(), Value::String(wire_type.to_string()));
    if let Some(payload) = raw.get(wire_type) {
        if wire_type == "wall" {
            let owner = int(payload, "owner_id").or_else(|| int(payload, "to_id"));
            if let (Some(owner), Some(id)) = (owner, int(payload, "id")) {
                metadata.insert("vk_link".into(), Value::String(post_link(owner, id)));
            }
            insert_str(metadata, "text", payload, "text");
        }
    }
    metadata.insert("raw".into(), raw.clone());
    attachment
}

pub fn normalize_attachments(raw: &Value) -> Vec<Attachment> {
    array(raw, "attachments")
        .iter()
        .map(normalize_attachment)
        .collect()
}

/// Normalizes a forwarded message. Its own forwards are counted, not stored.
pub fn normalize_forwarded(raw: &Value) -> ForwardedMessage {
    let message_id = int(raw, "id").or_else(|| int(raw, "conversation_message_id"));
    let from_id = int(raw, "from_id").unwrap_or(0);
    let peer_id = int(raw, "peer_id");
    let date = int(raw, "date").unwrap_or(0);
    let vk_link = match (peer_id, int(raw, "id")) {
        (Some(peer), Some(id)) => Some(message_link(peer, id)),
        _ => None,
    };
    ForwardedMessage {
        message_id,
        date,
        date_iso: iso_timestamp(date),
        from_id,
        text: text(raw, "text"),
        attachments: normalize_attachments(raw),
        truncated_forwards: array(raw, "fwd_messages").len(),
        vk_link,
    }
}

pub fn normalize_message(raw: &Value, peer_id: i64) -> Message {
    let message_id = int(raw, "id").unwrap_or(0);
    let date = int(raw, "date").unwrap_or(0);
    Message {
        message_id,
        date,
        date_iso: iso_timestamp(date),
        from_id: int(raw, "from_id").unwrap_or(0),
        text: text(raw, "text"),
        attachments: normalize_attachments(raw),
        fwd_messages: array(raw, "fwd_messages")
            .iter()
            .filter(|fwd| fwd.is_object())
            .map(normalize_forwarded)
            .collect(),
        reply_to: raw.get("reply_message").and_then(|reply| int(reply, "id")),
        vk_link: message_link(peer_id, message_id),
    }
}

/// Normalizes a history batch: drops id-less entries, dedupes by id and
/// sorts ascending by `(date, id)`. The remote returns history newest first.
pub fn normalize_messages(items: &[Value], peer_id: i64) -> (Vec<Message>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut seen = HashSet::new();
    let mut messages = Vec::with_capacity(items.len());
    for raw in items {
        if !raw.is_object() || int(raw, "id").is_none() {
            report.dropped += 1;
            continue;
        }
        let message = normalize_message(raw, peer_id);
        if !seen.insert(message.message_id) {
            report.duplicates += 1;
            continue;
        }
        messages.push(message);
    }
    messages.sort_by_key(|m| (m.date, m.message_id));
    (messages, report)
}

pub fn normalize_reposted(raw: &Value) -> RepostedPost {
    let id = int(raw, "id").unwrap_or(0);
    let owner_id = int(raw, "owner_id").unwrap_or(0);
    let date = int(raw, "date").unwrap_or(0);
    RepostedPost {
        id,
        owner_id,
        date,
        date_iso: iso_timestamp(date),
        text: text(raw, "text"),
        attachments: normalize_attachments(raw),
        vk_link: post_link(owner_id, id),
    }
}

/// Likes as embedded in a post payload; the liker list is filled separately.
pub fn embedded_likes(raw_post: &Value) -> Likes {
    let likes = raw_post.get("likes").unwrap_or(&Value::Null);
    Likes {
        count: count(likes, "count"),
        user_reacted: flag(likes, "user_likes"),
        users: Vec::new(),
    }
}

/// Normalizes a wall post. Comments stay empty and likes carry only the
/// embedded counters; the harvester fills in the rest.
pub fn normalize_post(raw: &Value, owner_id: i64) -> Post {
    let id = int(raw, "id").unwrap_or(0);
    let owner_id = int(raw, "owner_id").unwrap_or(owner_id);
    let date = int(raw, "date").unwrap_or(0);
    let reposts = raw.get("reposts").unwrap_or(&Value::Null);
    let views = raw.get("views").unwrap_or(&Value::Null);
    Post {
        id,
        owner_id,
        from_id: int(raw, "from_id").unwrap_or(owner_id),
        date,
        date_iso: iso_timestamp(date),
        text: text(raw, "text"),
        attachments: normalize_attachments(raw),
        copy_history: array(raw, "copy_history")
            .iter()
            .filter(|item| item.is_object())
            .map(normalize_reposted)
            .collect(),
        comments: Vec::new(),
        likes: embedded_likes(raw),
        reposts: Reposts {
            count: count(reposts, "count"),
        },
        views: count(views, "count"),
        is_pinned: flag(raw, "is_pinned"),
        vk_link: post_link(owner_id, id),
    }
}

/// Same batch invariants as [`normalize_messages`], for wall posts.
pub fn normalize_posts(items: &[Value], owner_id: i64) -> (Vec<Post>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut seen = HashSet::new();
    let mut posts = Vec::with_capacity(items.len());
    for raw in items {
        if !raw.is_object() || int(raw, "id").is_none() {
            report.dropped += 1;
            continue;
        }
        let post = normalize_post(raw, owner_id);
        if !seen.insert(post.id) {
            report.duplicates += 1;
            continue;
        }
        posts.push(post);
    }
    posts.sort_by_key(|p| (p.date, p.id));
    (posts, report)
}

pub fn normalize_comment(raw: &Value, owner_id: i64, post_id: i64) -> Comment {
    let id = int(raw, "id").unwrap_or(0);
    let date = int(raw, "date").unwrap_or(0);
    Comment {
        id,
        date,
        date_iso: iso_timestamp(date),
        from_id: int(raw, "from_id").unwrap_or(0),
        text: text(raw, "text"),
        attachments: normalize_attachments(raw),
        reply_to: int(raw, "reply_to_comment"),
        vk_link: comment_link(owner_id, post_id, id),
    }
}

/// Flattens top-level comments and their embedded `thread.items` into one
/// ordered list. Each thread reply points at the comment it answers, or at
/// its thread root when the remote omits the link. Reply links are then
/// checked for cycles with [`resolve_reply_links`].
pub fn normalize_comments(items: &[Value], owner_id: i64, post_id: i64) -> (Vec<Comment>, NormalizeReport) {
    let mut report = NormalizeReport::default();
    let mut seen = HashSet::new();
    let mut comments = Vec::with_capacity(items.len());

    let mut push = |raw: &Value, root: Option<i64>, comments: &mut Vec<Comment>| {
        if !raw.is_object() || int(raw, "id").is_none() {
            report.dropped += 1;
            return;
        }
        let mut comment = normalize_comment(raw, owner_id, post_id);
        if comment.reply_to.is_none() {
            comment.reply_to = root;
        }
        if !seen.insert(comment.id) {
            report.duplicates += 1;
            return;
        }
        comments.push(comment);
    };

    for raw in items {
        push(raw, None, &mut comments);
        let root = int(raw, "id");
        if let Some(thread) = raw.get("thread") {
            for reply in array(thread, "items") {
                push(reply, root, &mut comments);
            }
        }
    }

    resolve_reply_links(&mut comments);
    (comments, report)
}

/// Breaks reply cycles in a flat comment list and returns how many links were cut.
///
/// A comment's `reply_to` is cleared when following parents from it leads
/// back to itself. Links to comments outside the list are kept as-is.
pub fn resolve_reply_links(comments: &mut [Comment]) -> usize {
    let mut parents: HashMap<i64, Option<i64>> =
        comments.iter().map(|c| (c.id, c.reply_to)).collect();
    let mut cut = 0;

    for comment in comments.iter_mut() {
        let mut visited = HashSet::from([comment.id]);
        let mut cursor = parents.get(&comment.id).copied().flatten();
        while let Some(parent) = cursor {
            if parent == comment.id {
                comment.reply_to = None;
                parents.insert(comment.id, None);
                cut += 1;
                break;
            }
            if !visited.insert(parent) {
                // A cycle further up; it is cut when one of its members is visited.
                break;
            }
            cursor = parents.get(&parent).copied().flatten();
        }
    }
    cut
}

/// Title lookup built from the `profiles` / `groups` of an extended response.
#[derive(Debug, Clone, Default)]
pub struct PeerDirectory {
    users: HashMap<i64, String>,
    groups: HashMap<i64, String>,
}

impl PeerDirectory {
    pub fn from_response(response: &Value) -> Self {
        let mut directory = Self::default();
        for profile in array(response, "profiles") {
            if let Some(id) = int(profile, "id") {
                let name = format!("{}_{}", text(profile, "first_name"), text(profile, "last_name"));
                directory.users.insert(id, name.trim_matches('_').to_string());
            }
        }
        for group in array(response, "groups") {
            if let Some(id) = int(group, "id") {
                directory.groups.insert(id.abs(), text(group, "name"));
            }
        }
        directory
    }

    fn title_for(&self, peer_id: i64, kind: PeerKind, item: &Value) -> Option<String> {
        let title = match kind {
            PeerKind::User => self.users.get(&peer_id).cloned(),
            PeerKind::Group => self.groups.get(&peer_id.abs()).cloned(),
            PeerKind::Chat => item
                .get("conversation")
                .and_then(|c| c.get("chat_settings"))
                .map(|settings| text(settings, "title")),
        };
        title.filter(|t| !t.trim().is_empty())
    }
}

/// Normalizes one `messages.getConversations` item; `None` for peers that are
/// not a user, group or chat (or carry no id).
pub fn normalize_peer(item: &Value, directory: &PeerDirectory) -> Option<Peer> {
    let peer = item.get("conversation")?.get("peer")?;
    let peer_id = int(peer, "id")?;
    let kind = PeerKind::from_wire(peer.get("type")?.as_str()?)?;
    let title = directory
        .title_for(peer_id, kind, item)
        .unwrap_or_else(|| format!("dialog_{peer_id}"));
    Some(Peer {
        peer_id,
        kind,
        title,
    })
}

/// Normalizes a `groups.getById` response (a bare array or `{"groups": [...]}`).
pub fn normalize_community(response: &Value) -> Option<Community> {
    let group = match response {
        Value::Array(items) => items.first(),
        other => array(other, "groups").first(),
    }?;
    let id = int(group, "id")?;
    Some(Community {
        id: -id.abs(),
        name: text(group, "name"),
        screen_name: text(group, "screen_name"),
        members_count: count(group, "members_count"),
        description: text(group, "description"),
        is_closed: flag(group, "is_closed"),
    })
}

/// Liker ids from a `likes.getList` page; entries may be ids or user objects.
pub fn normalize_liker(raw: &Value) -> Option<i64> {
    as_int(raw).or_else(|| int(raw, "id"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn comment(id: i64, reply_to: Option<i64>) -> Comment {
        Comment {
            id,
            date: 0,
            date_iso: iso_timestamp(0),
            from_id: 1,
            text: String::new(),
            attachments: Vec::new(),
            reply_to,
            vk_link: String::new(),
        }
    }

    #[test]
    fn self_reply_is_cut() {
        let mut comments = vec![comment(1, Some(1))];
        assert_eq!(resolve_reply_links(&mut comments), 1);
        assert_eq!(comments[0].reply_to, None);
    }

    #[test]
    fn two_cycle_is_cut_once() {
        let mut comments = vec![comment(1, Some(2)), comment(2, Some(1)), comment(3, Some(1))];
        assert_eq!(resolve_reply_links(&mut comments), 1);
        assert_eq!(comments[0].reply_to, None);
        assert_eq!(comments[1].reply_to, Some(1));
        assert_eq!(comments[2].reply_to, Some(1));
    }

    #[test]
    fn dangling_parent_is_kept() {
        let mut comments = vec![comment(5, Some(404))];
        assert_eq!(resolve_reply_links(&mut comments), 0);
        assert_eq!(comments[0].reply_to, Some(404));
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let raw = json!({"id": "17", "date": "100", "text": 5});
        let message = normalize_message(&raw, 3);
        assert_eq!(message.message_id, 17);
        assert_eq!(message.date, 100);
        assert_eq!(message.text, "");
    }
}
