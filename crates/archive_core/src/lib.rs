//! Domain model and pure transformations for the VK archive pipeline.
//!
//! Nothing in this crate performs IO: remote payloads come in as
//! `serde_json::Value`, archives go out as plain data.

pub mod filename;
pub mod links;
pub mod model;
pub mod normalize;
pub mod paginate;
pub mod settings;
pub mod summary;

pub use filename::{assign_file_stems, sanitize_file_stem};
pub use model::{
    iso_timestamp, Archive, Attachment, AttachmentKind, Comment, Community, CommunityArchive,
    CommunityArchiveType, ConversationArchive, ForwardedMessage, Likes, Message, Metadata, Peer,
    PeerKind, Post, Reposts, RepostedPost, Target,
};
pub use normalize::NormalizeReport;
pub use paginate::{Page, PageIter, PageRequest, Paginator};
pub use settings::{DumpMode, ExportFormat};
pub use summary::{HaltReason, RunSummary, SkippedTarget, TargetOutcome, TargetReport};
