use archive_core::{CommunityArchive, ConversationArchive, ExportFormat};
use serde::Serialize;

use super::{ExportError, Renderer};

/// Pretty-printed JSON in model field order, newline-terminated.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn render_conversation(&self, archive: &ConversationArchive) -> Result<String, ExportError> {
        to_document(archive)
    }

    fn render_community(&self, archive: &CommunityArchive) -> Result<String, ExportError> {
        to_document(archive)
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<String, ExportError> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}
