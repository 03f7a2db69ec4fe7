//! Per-target harvesting: paginate, normalize, assemble one archive tree.
//!
//! A target's own fetches run strictly in sequence; parallelism only exists
//! between targets.

mod dialogs;
mod posts;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::gateway::Gateway;
use crate::Clock;

pub use dialogs::{DialogHarvester, CONVERSATIONS_PAGE_SIZE, HISTORY_PAGE_SIZE};
pub use posts::{
    PostHarvester, COMMENTS_PAGE_SIZE, LIKES_PAGE_SIZE, THREAD_ITEMS_COUNT, WALL_PAGE_SIZE,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestSettings {
    /// Cap on conversations taken from the conversation list.
    pub max_dialogs: usize,
    /// Cap on messages per conversation; `None` harvests the full history.
    pub max_messages: Option<usize>,
    /// Cap on wall posts per community.
    pub posts_count: usize,
    pub include_comments: bool,
    pub include_reactions: bool,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            max_dialogs: 200,
            max_messages: None,
            posts_count: 100,
            include_comments: true,
            include_reactions: true,
        }
    }
}

/// What every harvester needs: the shared gateway, the run's halt signal
/// and the export clock.
#[derive(Clone)]
pub struct HarvestContext {
    pub gateway: Arc<Gateway>,
    pub cancel: CancellationToken,
    pub settings: HarvestSettings,
    pub clock: Clock,
}

impl HarvestContext {
    pub fn export_date(&self) -> String {
        (self.clock)()
    }
}
