//! Main Scanner Module
//!
//! Orchestrates a scan of one MFT image: locate records, decode their
//! attributes (optionally in parallel) and gather every recoverable fault
//! into a [`ScanReport`].

use crate::error::MftError;
use crate::ntfs::structs::ROOT_ENTRY_NUMBER;
use crate::ntfs::{Entry, MftImage, RawRecord};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Scanner Configuration
// ============================================================================

/// Configuration for the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Decode records on the rayon thread pool
    pub parallel: bool,
    /// Entry number treated as the namespace root
    pub root_entry: u64,
    /// Drop records whose in-use flag is clear
    pub in_use_only: bool,
    /// Show progress during scan
    pub show_progress: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            root_entry: ROOT_ENTRY_NUMBER,
            in_use_only: false,
            show_progress: false,
        }
    }
}

// ============================================================================
// Scan Phases
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Locating,
    Decoding,
    Complete,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Locating => "Locating records",
            ScanPhase::Decoding => "Decoding attributes",
            ScanPhase::Complete => "Complete",
        }
    }
}

// ============================================================================
// Scan Report
// ============================================================================

/// Everything a scan produced. Entries borrow from the scanned image.
#[derive(Debug)]
pub struct ScanReport<'a> {
    /// Decoded entries in scan order
    pub entries: Vec<Entry<'a>>,
    /// Malformed records and attribute chains, in the order they were met
    pub issues: Vec<MftError>,
    /// Records located before decoding started
    pub records_located: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl<'a> ScanReport<'a> {
    /// The image held no `FILE` signature at all
    pub fn no_entries_found(&self) -> bool {
        self.entries.is_empty() && self.records_located == 0 && !self.cancelled
    }

    pub fn malformed_records(&self) -> usize {
        self.issues
            .iter()
            .filter(|e| matches!(e, MftError::MalformedRecord { .. }))
            .count()
    }

    pub fn malformed_attributes(&self) -> usize {
        self.issues
            .iter()
            .filter(|e| matches!(e, MftError::MalformedAttribute { .. }))
            .count()
    }

    pub fn directories(&self) -> usize {
        self.entries.iter().filter(|e| e.is_directory()).count()
    }
}

// ============================================================================
// Image Scanner
// ============================================================================

/// Scanner over one opened image
pub struct ImageScanner<'i> {
    image: &'i MftImage,
    config: ScanConfig,
    /// Cancellation flag
    cancelled: Arc<AtomicBool>,
}

impl<'i> ImageScanner<'i> {
    pub fn new(image: &'i MftImage) -> Self {
        Self {
            image,
            config: ScanConfig::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configure the scanner
    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Get cancellation token
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Cancel the scan
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Perform the scan
    pub fn scan(&self) -> ScanReport<'i> {
        let start_time = Instant::now();
        tracing::info!(
            path = ?self.image.path(),
            bytes = self.image.len(),
            parallel = self.config.parallel,
            in_use_only = self.config.in_use_only,
            "scan started"
        );

        let pb = self.config.show_progress.then(|| progress_bar(self.image.len() as u64));
        let mut issues = Vec::new();

        // Phase 1: locate records
        if let Some(ref pb) = pb {
            pb.set_message(ScanPhase::Locating.as_str());
        }
        let mut records = Vec::new();
        let mut scanner = self.image.records();
        while let Some(item) = scanner.next() {
            if self.is_cancelled() {
                break;
            }
            match item {
                Ok(record) => records.push(record),
                Err(malformed) => issues.push(MftError::from(malformed)),
            }
            if let Some(ref pb) = pb {
                pb.set_position(scanner.position() as u64);
            }
        }
        let records_located = records.len();
        tracing::debug!(records = records_located, malformed = issues.len(), "records located");

        // Phase 2: decode attributes
        if let Some(ref pb) = pb {
            pb.set_message(ScanPhase::Decoding.as_str());
            pb.set_length(records_located as u64);
            pb.set_position(0);
        }
        let decoded = if self.config.parallel {
            self.decode_parallel(&records, pb.as_ref())
        } else {
            self.decode_sequential(&records, pb.as_ref())
        };

        // located records always hold a full header, so `None` only marks
        // a record skipped after cancellation
        let mut entries = Vec::with_capacity(decoded.len());
        for entry in decoded.into_iter().flatten() {
            if self.config.in_use_only && !entry.is_in_use() {
                continue;
            }
            if let Some(fault) = entry.walk_fault() {
                issues.push(fault);
            }
            entries.push(entry);
        }

        let cancelled = self.is_cancelled();
        let elapsed = start_time.elapsed();
        let report = ScanReport {
            entries,
            issues,
            records_located,
            cancelled,
            elapsed,
        };

        if report.no_entries_found() {
            tracing::info!("no entries found");
        }
        if cancelled {
            tracing::warn!(decoded = report.entries.len(), "scan cancelled");
        }
        tracing::info!(
            entries = report.entries.len(),
            malformed_records = report.malformed_records(),
            malformed_attributes = report.malformed_attributes(),
            elapsed_ms = elapsed.as_millis() as u64,
            "scan complete"
        );

        if let Some(pb) = pb {
            pb.finish_with_message(format!(
                "{}: {} entries, {} issues ({:.2}s)",
                ScanPhase::Complete.as_str(),
                report.entries.len(),
                report.issues.len(),
                elapsed.as_secs_f64()
            ));
        }

        report
    }

    /// One slot per record; `None` for records skipped after cancellation
    fn decode_sequential(&self, records: &[RawRecord<'i>], pb: Option<&ProgressBar>) -> Vec<Option<Entry<'i>>> {
        let mut out = Vec::with_capacity(records.len());
        for (ordinal, record) in records.iter().enumerate() {
            if self.is_cancelled() {
                out.push(None);
                continue;
            }
            out.push(Entry::decode(*record, ordinal as u64));
            if let Some(pb) = pb {
                pb.inc(1);
            }
        }
        out
    }

    fn decode_parallel(&self, records: &[RawRecord<'i>], pb: Option<&ProgressBar>) -> Vec<Option<Entry<'i>>> {
        let cancelled = &self.cancelled;
        records
            .par_iter()
            .enumerate()
            .map(|(ordinal, record)| {
                if cancelled.load(Ordering::Relaxed) {
                    return None;
                }
                let entry = Entry::decode(*record, ordinal as u64);
                if let Some(pb) = pb {
                    pb.inc(1);
                }
                entry
            })
            .collect()
    }
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    match ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
    {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => tracing::debug!(error = %e, "falling back to default progress style"),
    }
    pb
}
