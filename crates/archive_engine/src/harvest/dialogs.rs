use std::collections::HashSet;

use archive_core::normalize::{normalize_messages, normalize_peer, PeerDirectory};
use archive_core::{ConversationArchive, Page, Paginator, Peer};
use archive_logging::{archive_debug, archive_info};

use crate::harvest::HarvestContext;
use crate::pages::{collect_pages, raw_page};
use crate::{HarvestError, Params};

pub const CONVERSATIONS_PAGE_SIZE: usize = 200;
pub const HISTORY_PAGE_SIZE: usize = 200;

pub struct DialogHarvester<'a> {
    ctx: &'a HarvestContext,
}

impl<'a> DialogHarvester<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        Self { ctx }
    }

    /// Conversations to harvest, most recent first, at most `max_dialogs`.
    ///
    /// Peers of unsupported kinds still count toward the cap.
    pub async fn list_dialogs(&self) -> Result<Vec<Peer>, HarvestError> {
        let gateway = self.ctx.gateway.as_ref();
        let paginator =
            Paginator::new(CONVERSATIONS_PAGE_SIZE).with_limit(Some(self.ctx.settings.max_dialogs));

        let collected = collect_pages(paginator, &self.ctx.cancel, move |request| async move {
            let params = Params::new()
                .with("offset", request.offset)
                .with("count", request.count)
                .with("extended", 1);
            let response = gateway.call("messages.getConversations", &params).await?;
            let directory = PeerDirectory::from_response(&response);
            let page = raw_page(response);
            let peers: Vec<Option<Peer>> = page
                .items
                .iter()
                .map(|item| normalize_peer(item, &directory))
                .collect();
            Ok(Page::new(peers, page.total))
        })
        .await?;
        if collected.cancelled {
            return Err(HarvestError::Cancelled);
        }

        let mut seen = HashSet::new();
        let peers: Vec<Peer> = collected
            .items
            .into_iter()
            .flatten()
            .filter(|peer| seen.insert(peer.peer_id))
            .collect();
        archive_info!("Found {} conversations", peers.len());
        Ok(peers)
    }

    /// Full message history of one conversation, oldest first.
    pub async fn harvest(&self, peer: &Peer) -> Result<ConversationArchive, HarvestError> {
        let gateway = self.ctx.gateway.as_ref();
        let peer_id = peer.peer_id;
        let paginator = Paginator::new(HISTORY_PAGE_SIZE).with_limit(self.ctx.settings.max_messages);

        let collected = collect_pages(paginator, &self.ctx.cancel, move |request| async move {
            let params = Params::new()
                .with("peer_id", peer_id)
                .with("offset", request.offset)
                .with("count", request.count);
            let response = gateway.call("messages.getHistory", &params).await?;
            Ok(raw_page(response))
        })
        .await?;
        if collected.cancelled {
            return Err(HarvestError::Cancelled);
        }

        let (messages, report) = normalize_messages(&collected.items, peer_id);
        if !report.is_clean() {
            archive_debug!(
                "Conversation {peer_id}: dropped {} malformed and {} duplicate messages",
                report.dropped,
                report.duplicates
            );
        }
        Ok(ConversationArchive {
            title: peer.title.clone(),
            peer_id,
            kind: peer.kind,
            export_date: self.ctx.export_date(),
            messages,
        })
    }
}
