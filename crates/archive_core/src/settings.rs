use std::fmt;

/// Which target families a run harvests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DumpMode {
    #[default]
    Dialogs,
    Posts,
    Both,
}

impl DumpMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dialogs" => Some(Self::Dialogs),
            "posts" => Some(Self::Posts),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    pub fn includes_dialogs(&self) -> bool {
        matches!(self, Self::Dialogs | Self::Both)
    }

    pub fn includes_posts(&self) -> bool {
        matches!(self, Self::Posts | Self::Both)
    }
}

impl fmt::Display for DumpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dialogs => write!(f, "dialogs"),
            Self::Posts => write!(f, "posts"),
            Self::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExportFormat {
    Json,
    Html,
}

impl ExportFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "html" => Some(Self::Html),
            _ => None,
        }
    }

    /// Parses a comma list such as `json,html`; duplicates collapse, order is kept.
    ///
    /// The error carries the offending token, or the whole input when it
    /// names no format at all.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, String> {
        let mut formats = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let format = Self::parse(part).ok_or_else(|| part.to_string())?;
            if !formats.contains(&format) {
                formats.push(format);
            }
        }
        if formats.is_empty() {
            return Err(raw.trim().to_string());
        }
        Ok(formats)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
