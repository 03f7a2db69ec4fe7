//! Deep links back into the VK web interface.

/// Peer ids at or above this value address multi-user chats.
pub const CHAT_PEER_OFFSET: i64 = 2_000_000_000;

pub fn message_link(peer_id: i64, message_id: i64) -> String {
    if peer_id >= CHAT_PEER_OFFSET {
        format!(
            "https://vk.com/im?sel=c{}&msgid={message_id}",
            peer_id - CHAT_PEER_OFFSET
        )
    } else {
        format!("https://vk.com/im?sel={peer_id}&msgid={message_id}")
    }
}

pub fn post_link(owner_id: i64, post_id: i64) -> String {
    format!("https://vk.com/wall{owner_id}_{post_id}")
}

pub fn comment_link(owner_id: i64, post_id: i64, comment_id: i64) -> String {
    format!("https://vk.com/wall{owner_id}_{post_id}?reply={comment_id}")
}

pub fn video_link(owner_id: i64, video_id: i64) -> String {
    format!("https://vk.com/video{owner_id}_{video_id}")
}

pub fn photo_link(owner_id: i64, photo_id: i64) -> String {
    format!("https://vk.com/photo{owner_id}_{photo_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_peers_use_local_chat_id() {
        assert_eq!(
            message_link(2_000_000_007, 42),
            "https://vk.com/im?sel=c7&msgid=42"
        );
        assert_eq!(message_link(15, 3), "https://vk.com/im?sel=15&msgid=3");
        assert_eq!(message_link(-20, 3), "https://vk.com/im?sel=-20&msgid=3");
    }

    #[test]
    fn wall_links_carry_owner_and_reply() {
        assert_eq!(post_link(-1, 99), "https://vk.com/wall-1_99");
        assert_eq!(comment_link(-1, 99, 5), "https://vk.com/wall-1_99?reply=5");
    }
}
