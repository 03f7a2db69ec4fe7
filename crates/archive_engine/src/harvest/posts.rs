use archive_core::normalize::{normalize_comments, normalize_community, normalize_liker, normalize_posts};
use archive_core::{Comment, Community, CommunityArchive, CommunityArchiveType, Paginator, Post};
use archive_logging::{archive_debug, archive_info, archive_warn};
use serde_json::Value;

use crate::harvest::HarvestContext;
use crate::pages::{collect_pages, counted_page, raw_page};
use crate::{HarvestError, Params};

pub const WALL_PAGE_SIZE: usize = 100;
pub const COMMENTS_PAGE_SIZE: usize = 100;
pub const LIKES_PAGE_SIZE: usize = 1000;
/// Thread replies embedded with each top-level comment.
pub const THREAD_ITEMS_COUNT: usize = 10;

pub struct PostHarvester<'a> {
    ctx: &'a HarvestContext,
}

impl<'a> PostHarvester<'a> {
    pub fn new(ctx: &'a HarvestContext) -> Self {
        Self { ctx }
    }

    /// Looks up a community by numeric id (sign ignored) or screen name.
    pub async fn resolve_community(&self, id: &str) -> Result<Community, HarvestError> {
        let group_id = id.trim().trim_start_matches('-');
        let params = Params::new()
            .with("group_id", group_id)
            .with("fields", "description,members_count");
        let response = self.ctx.gateway.call("groups.getById", &params).await?;
        normalize_community(&response)
            .ok_or_else(|| HarvestError::NotFound(format!("community {group_id}")))
    }

    /// Wall posts of one community, oldest first, with comments and likes
    /// filled in when enabled.
    pub async fn harvest(&self, community: &Community) -> Result<CommunityArchive, HarvestError> {
        if community.is_closed {
            return Err(HarvestError::ClosedCommunity(community.name.clone()));
        }
        let gateway = self.ctx.gateway.as_ref();
        let owner_id = community.id;
        let paginator = Paginator::new(WALL_PAGE_SIZE).with_limit(Some(self.ctx.settings.posts_count));

        let collected = collect_pages(paginator, &self.ctx.cancel, move |request| async move {
            let params = Params::new()
                .with("owner_id", owner_id)
                .with("offset", request.offset)
                .with("count", request.count);
            let response = gateway.call("wall.get", &params).await?;
            Ok(raw_page(response))
        })
        .await?;
        if collected.cancelled {
            return Err(HarvestError::Cancelled);
        }

        let (mut posts, report) = normalize_posts(&collected.items, owner_id);
        if !report.is_clean() {
            archive_debug!(
                "Community {owner_id}: dropped {} malformed and {} duplicate posts",
                report.dropped,
                report.duplicates
            );
        }
        archive_info!("Community {}: {} posts", community.name, posts.len());

        for post in &mut posts {
            if self.ctx.cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }
            if self.ctx.settings.include_comments {
                post.comments = self.comments(post).await?;
            }
            if self.ctx.settings.include_reactions {
                let users = self.likers(post).await?;
                post.likes.count = post.likes.count.max(users.len() as u64);
                post.likes.users = users;
            }
        }

        Ok(CommunityArchive {
            archive_type: CommunityArchiveType::CommunityPosts,
            export_date: self.ctx.export_date(),
            community: community.clone(),
            posts_count: posts.len(),
            posts,
        })
    }

    async fn comments(&self, post: &Post) -> Result<Vec<Comment>, HarvestError> {
        let gateway = self.ctx.gateway.as_ref();
        let (owner_id, post_id) = (post.owner_id, post.id);

        let result = collect_pages(
            Paginator::new(COMMENTS_PAGE_SIZE),
            &self.ctx.cancel,
            move |request| async move {
                let params = Params::new()
                    .with("owner_id", owner_id)
                    .with("post_id", post_id)
                    .with("offset", request.offset)
                    .with("count", request.count)
                    .with("sort", "asc")
                    .with("thread_items_count", THREAD_ITEMS_COUNT);
                let response = gateway.call("wall.getComments", &params).await?;
                Ok(counted_page(response, &["current_level_count", "count"]))
            },
        )
        .await;

        let mut collected = match result {
            Ok(collected) if collected.cancelled => return Err(HarvestError::Cancelled),
            Ok(collected) => collected,
            Err(err) => return degrade(HarvestError::from(err), post, "comments"),
        };
        self.complete_threads(post, &mut collected.items).await?;
        let (comments, report) = normalize_comments(&collected.items, owner_id, post_id);
        if !report.is_clean() {
            archive_debug!(
                "Post {post_id}: dropped {} malformed and {} duplicate comments",
                report.dropped,
                report.duplicates
            );
        }
        Ok(comments)
    }

    /// Replaces each truncated embedded thread with its full reply list.
    ///
    /// A thread that cannot be fetched keeps its embedded replies.
    async fn complete_threads(&self, post: &Post, items: &mut [Value]) -> Result<(), HarvestError> {
        for raw in items.iter_mut() {
            let Some(root) = raw.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let Some(thread) = raw.get_mut("thread").filter(|thread| thread.is_object()) else {
                continue;
            };
            let total = thread.get("count").and_then(Value::as_u64).unwrap_or(0);
            let embedded = thread.get("items").and_then(Value::as_array).map_or(0, Vec::len);
            if total <= embedded as u64 {
                continue;
            }
            match self.thread_replies(post, root).await {
                Ok(replies) => {
                    archive_debug!("Comment {root}: fetched {} of {total} replies", replies.len());
                    thread["items"] = Value::Array(replies);
                }
                Err(HarvestError::Target(cause)) => {
                    archive_warn!(
                        "Post {}: thread {root} truncated to {embedded} replies ({cause})",
                        post.vk_link
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    async fn thread_replies(&self, post: &Post, root: i64) -> Result<Vec<Value>, HarvestError> {
        let gateway = self.ctx.gateway.as_ref();
        let (owner_id, post_id) = (post.owner_id, post.id);

        let collected = collect_pages(
            Paginator::new(COMMENTS_PAGE_SIZE),
            &self.ctx.cancel,
            move |request| async move {
                let params = Params::new()
                    .with("owner_id", owner_id)
                    .with("post_id", post_id)
                    .with("comment_id", root)
                    .with("offset", request.offset)
                    .with("count", request.count)
                    .with("sort", "asc");
                let response = gateway.call("wall.getComments", &params).await?;
                Ok(counted_page(response, &["count"]))
            },
        )
        .await?;
        if collected.cancelled {
            return Err(HarvestError::Cancelled);
        }
        Ok(collected.items)
    }

    async fn likers(&self, post: &Post) -> Result<Vec<i64>, HarvestError> {
        let gateway = self.ctx.gateway.as_ref();
        let (owner_id, post_id) = (post.owner_id, post.id);

        let result = collect_pages(
            Paginator::new(LIKES_PAGE_SIZE),
            &self.ctx.cancel,
            move |request| async move {
                let params = Params::new()
                    .with("type", "post")
                    .with("owner_id", owner_id)
                    .with("item_id", post_id)
                    .with("offset", request.offset)
                    .with("count", request.count);
                let response = gateway.call("likes.getList", &params).await?;
                Ok(raw_page(response))
            },
        )
        .await;

        match result {
            Ok(collected) if collected.cancelled => Err(HarvestError::Cancelled),
            Ok(collected) => Ok(collected.items.iter().filter_map(normalize_liker).collect()),
            Err(err) => degrade(HarvestError::from(err), post, "likes"),
        }
    }
}

/// Target-scoped failures of a nested fetch leave that one field empty.
fn degrade<T: Default>(err: HarvestError, post: &Post, what: &str) -> Result<T, HarvestError> {
    match err {
        HarvestError::Target(cause) => {
            archive_warn!("Post {}: {what} unavailable ({cause}); left empty", post.vk_link);
            Ok(T::default())
        }
        other => Err(other),
    }
}
