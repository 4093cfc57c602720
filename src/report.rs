//! Reporters and the registry that notifies them

use crate::compare;
use crate::result::{ComparisonResult, Status};
use std::io::Write;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Consumer of comparison results
pub trait Reporter: Send + Sync {
    fn report_comparison(&self, result: &ComparisonResult);
}

/// Ordered list of reporters.
///
/// Each `notify_all` walks its own snapshot of the list, so concurrent
/// notifications and registrations do not interfere with each other.
#[derive(Default)]
pub struct ReporterRegistry {
    reporters: RwLock<Vec<Arc<dyn Reporter>>>,
}

impl std::fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterRegistry")
            .field("reporters", &self.len())
            .finish()
    }
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, reporter: Arc<dyn Reporter>) {
        self.reporters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reporter);
    }

    pub fn clear_all(&self) {
        self.reporters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.reporters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hand `result` to every reporter in registration order.
    ///
    /// A reporter that panics is logged and skipped; the remaining reporters
    /// are still notified. Returns the number of reporters that failed.
    pub fn notify_all(&self, result: &ComparisonResult) -> usize {
        let snapshot: Vec<Arc<dyn Reporter>> = self
            .reporters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut failures = 0;
        for (idx, reporter) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| reporter.report_comparison(result))).is_err() {
                failures += 1;
                log::error!(
                    "Reporter #{} panicked while reporting {}",
                    idx,
                    result.page_url()
                );
            }
        }
        failures
    }
}

/// Reports through the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report_comparison(&self, result: &ComparisonResult) {
        let page = result.page_url();
        match result.status() {
            Status::Passed => log::info!("{}: passed", page),
            Status::Failed => log::warn!("{}: failed", page),
            Status::ReferenceMissing => log::warn!("{}: missing reference", page),
            Status::Error => log::error!(
                "{}: error ({})",
                page,
                result.message().unwrap_or("page could not be read")
            ),
        }
        for url in result.erroneous_resource_urls() {
            log::warn!("{}: could not load referenced resource {}", page, url);
        }
    }
}

/// Writes one line per result, followed by any resource warnings
pub struct TextReporter<W: Write + Send> {
    out: Mutex<W>,
}

impl TextReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Reporter for TextReporter<W> {
    fn report_comparison(&self, result: &ComparisonResult) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = writeln!(out, "{:<17} {}", result.status().label(), result.page_url());
        if let (Some(page), Some(reference)) = (result.page_surface(), result.reference_surface()) {
            if result.status() == Status::Failed {
                let _ = writeln!(
                    out,
                    "    {} pixel(s) differ from the reference",
                    compare::count_differing_pixels(page, reference)
                );
            }
        }
        if result.status() == Status::Error {
            let _ = writeln!(
                out,
                "    The page '{}' could not be read.",
                result.page_url()
            );
        }
        if !result.erroneous_resource_urls().is_empty() {
            let _ = writeln!(out, "    Could not load the referenced resources:");
            for url in result.erroneous_resource_urls() {
                let _ = writeln!(out, "      {}", url);
            }
        }
        let _ = out.flush();
    }
}

/// Keeps every reported result
#[derive(Default)]
pub struct RecordingReporter {
    results: Mutex<Vec<ComparisonResult>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ComparisonResult> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn statuses(&self) -> Vec<(String, Status)> {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|r| (r.page_url().to_string(), r.status()))
            .collect()
    }
}

impl Reporter for RecordingReporter {
    fn report_comparison(&self, result: &ComparisonResult) {
        self.results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result.clone());
    }
}

const MAX_READABLE_NAME: usize = 80;

/// Writes the difference image of every failed comparison as PNG into a
/// directory
#[derive(Debug, Clone)]
pub struct DiffImageReporter {
    dir: PathBuf,
}

impl DiffImageReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Destination of the difference image for `page`.
    ///
    /// A shortened, readable form of the page is followed by the hex SHA-256
    /// of the full page identity, so distinct pages never share a file.
    pub fn path_for(&self, page: &str) -> PathBuf {
        let readable: String = page
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .take(MAX_READABLE_NAME)
            .collect();
        let digest = hex::encode(Sha256::digest(page.as_bytes()));
        self.dir.join(format!("{}-{}.diff.png", readable, digest))
    }
}

impl Reporter for DiffImageReporter {
    fn report_comparison(&self, result: &ComparisonResult) {
        let Some(diff) = result.difference_surface() else {
            return;
        };
        let path = self.path_for(result.page_url());
        let written = diff.to_png().and_then(|png| {
            std::fs::create_dir_all(&self.dir)?;
            std::fs::write(&path, png)?;
            Ok(())
        });
        match written {
            Ok(()) => log::info!("Wrote difference image {}", path.display()),
            Err(e) => log::warn!("Failed to write difference image {}: {}", path.display(), e),
        }
    }
}
