use std::fmt::Write as _;
use std::path::PathBuf;

/// A target that was harvested and exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetReport {
    pub label: String,
    /// Top-level entities written (messages or posts).
    pub items: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTarget {
    pub label: String,
    pub reason: String,
}

/// Why a run stopped before every target was processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    QuotaExhausted,
    Cancelled,
}

impl HaltReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExhausted => "daily request quota exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Result of processing one target in the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Succeeded(TargetReport),
    Skipped(SkippedTarget),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: Vec<TargetReport>,
    pub skipped: Vec<SkippedTarget>,
    pub halted: Option<HaltReason>,
    pub requests_made: u64,
}

impl RunSummary {
    pub fn record(&mut self, outcome: TargetOutcome) {
        match outcome {
            TargetOutcome::Succeeded(report) => self.succeeded.push(report),
            TargetOutcome::Skipped(skipped) => self.skipped.push(skipped),
        }
    }

    pub fn skip(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedTarget {
            label: label.into(),
            reason: reason.into(),
        });
    }

    /// Orders entries by label so the report does not depend on completion order.
    pub fn sort(&mut self) {
        self.succeeded.sort_by(|a, b| a.label.cmp(&b.label));
        self.skipped.sort_by(|a, b| a.label.cmp(&b.label));
    }

    pub fn is_success(&self) -> bool {
        self.halted.is_none()
    }

    /// Plain-text report printed at the end of a run.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Targets succeeded: {}, skipped: {}, requests made: {}",
            self.succeeded.len(),
            self.skipped.len(),
            self.requests_made
        );
        for report in &self.succeeded {
            let _ = writeln!(out, "  ok   {} ({} items)", report.label, report.items);
            for file in &report.files {
                let _ = writeln!(out, "         {}", file.display());
            }
        }
        for skipped in &self.skipped {
            let _ = writeln!(out, "  skip {}: {}", skipped.label, skipped.reason);
        }
        if let Some(reason) = self.halted {
            let _ = writeln!(out, "Run halted: {}", reason.as_str());
        }
        out
    }
}
