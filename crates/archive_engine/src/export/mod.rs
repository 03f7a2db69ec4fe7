//! Rendering of harvested archives and writing them to disk.
//!
//! Renderers are pure views over one immutable archive; the exporter runs
//! every configured renderer over the same tree.

mod html;
mod json;

use std::path::PathBuf;

use archive_core::{Archive, CommunityArchive, ConversationArchive, ExportFormat};
use archive_logging::archive_info;
use thiserror::Error;

use crate::persist::{ensure_output_dir, PersistError, StagedExport};

pub use html::{escape_html, render_markup, HtmlRenderer};
pub use json::JsonRenderer;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

pub trait Renderer: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn render_conversation(&self, archive: &ConversationArchive) -> Result<String, ExportError>;

    fn render_community(&self, archive: &CommunityArchive) -> Result<String, ExportError>;

    fn render(&self, archive: &Archive) -> Result<String, ExportError> {
        match archive {
            Archive::Conversation(archive) => self.render_conversation(archive),
            Archive::Community(archive) => self.render_community(archive),
        }
    }
}

pub fn renderer_for(format: ExportFormat) -> Box<dyn Renderer> {
    match format {
        ExportFormat::Json => Box::new(JsonRenderer),
        ExportFormat::Html => Box::new(HtmlRenderer),
    }
}

/// Where export files land: `<root>/<dialogs_dir>` and `<root>/<posts_dir>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub dialogs_dir: String,
    pub posts_dir: String,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("output"),
            dialogs_dir: "dialogs".to_string(),
            posts_dir: "posts".to_string(),
        }
    }
}

impl OutputLayout {
    pub fn dialogs_path(&self) -> PathBuf {
        self.root.join(&self.dialogs_dir)
    }

    pub fn posts_path(&self) -> PathBuf {
        self.root.join(&self.posts_dir)
    }

    pub fn dir_for(&self, archive: &Archive) -> PathBuf {
        match archive {
            Archive::Conversation(_) => self.dialogs_path(),
            Archive::Community(_) => self.posts_path(),
        }
    }

    pub fn file_name(archive: &Archive, stem: &str, format: ExportFormat) -> String {
        match archive {
            Archive::Conversation(_) => format!("{stem}.{}", format.extension()),
            Archive::Community(_) => format!("{stem}_posts.{}", format.extension()),
        }
    }
}

pub struct Exporter {
    layout: OutputLayout,
    renderers: Vec<Box<dyn Renderer>>,
}

impl Exporter {
    pub fn new(layout: OutputLayout, formats: &[ExportFormat]) -> Self {
        Self {
            layout,
            renderers: formats.iter().copied().map(renderer_for).collect(),
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Creates the output directories up front so a bad path fails the run early.
    pub fn prepare(&self) -> Result<(), PersistError> {
        ensure_output_dir(&self.layout.dialogs_path())?;
        ensure_output_dir(&self.layout.posts_path())
    }

    /// Writes one file per configured format and returns their paths.
    ///
    /// Every format is rendered and staged before any file takes its final
    /// name, so a failure leaves no partial set behind.
    pub fn export(&self, archive: &Archive, stem: &str) -> Result<Vec<PathBuf>, ExportError> {
        let mut staged = StagedExport::new(self.layout.dir_for(archive))?;
        for renderer in &self.renderers {
            let content = renderer.render(archive)?;
            staged.stage(&OutputLayout::file_name(archive, stem, renderer.format()), &content)?;
        }

        let paths = staged.commit()?;
        for path in &paths {
            archive_info!("Wrote {}", path.display());
        }
        Ok(paths)
    }
}
