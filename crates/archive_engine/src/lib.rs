//! Archive engine: remote API access, harvesting and export.
mod client;
mod export;
mod gateway;
mod harvest;
mod orchestrator;
mod pages;
mod persist;
mod types;

pub use client::{map_error_code, parse_envelope, ClientSettings, RemoteApi, VkHttpClient};
pub use export::{
    escape_html, render_markup, renderer_for, ExportError, Exporter, HtmlRenderer, JsonRenderer,
    OutputLayout, Renderer,
};
pub use gateway::{Gateway, GatewaySettings, GatewayStats};
pub use harvest::{
    DialogHarvester, HarvestContext, HarvestSettings, PostHarvester, COMMENTS_PAGE_SIZE,
    CONVERSATIONS_PAGE_SIZE, HISTORY_PAGE_SIZE, LIKES_PAGE_SIZE, THREAD_ITEMS_COUNT,
    WALL_PAGE_SIZE,
};
pub use orchestrator::{run_archive, system_clock, RunConfig, MAX_THREAD_COUNT};
pub use pages::{collect_pages, counted_page, raw_page, Collected};
pub use persist::{ensure_output_dir, PersistError, StagedExport};
pub use types::{ApiError, Clock, HarvestError, Params, RunError};
