//! RFox Critic
//!
//! Visual regression checks for web pages. A page is rendered into a pixel
//! surface, compared pixel-exactly against a previously accepted reference
//! and classified as `passed`, `failed`, `referenceMissing` or `error`.
//! Results are handed to registered reporters and can be accepted as the new
//! reference.
//!
//! # Features
//!
//! - **html** (default): built-in renderer that fetches pages over HTTP or
//!   from disk and rasterizes them without a browser
//! - **Injectable collaborators**: renderers and reference stores are traits,
//!   so the pipeline can be driven by any backend (or by fakes in tests)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rfcritic::{Critic, CriticConfig, FileStore, HtmlRenderer, LogReporter};
//!
//! # async fn run() -> rfcritic::Result<()> {
//! let config = CriticConfig::default();
//! let renderer = Arc::new(HtmlRenderer::new(config.clone())?);
//! let store = Arc::new(FileStore::new("references"));
//! let critic = Critic::new(renderer, store, config);
//! critic.add_reporter(Arc::new(LogReporter));
//!
//! let result = critic.compare("http://localhost:8000/index.html").await;
//! if result.status() != rfcritic::Status::Passed {
//!     result.accept().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod compare;
pub mod critic;
pub mod renderer;
pub mod report;
pub mod result;
pub mod store;
pub mod surface;

// Built-in renderer (reqwest + scraper)
#[cfg(feature = "html")]
pub mod rendering;

pub use critic::Critic;
pub use renderer::{PageRenderer, RenderOutput, RendererClient, Rendering, ResourceError};
pub use report::{
    DiffImageReporter, LogReporter, RecordingReporter, Reporter, ReporterRegistry, TextReporter,
};
pub use result::{ComparisonResult, Status};
pub use store::{FileStore, Lookup, MemoryStore, ReferenceStore, ReferenceStoreClient};
pub use surface::Surface;

#[cfg(feature = "html")]
pub use rendering::HtmlRenderer;

/// Configuration for a `Critic` and the built-in renderer
///
/// The defaults match the behaviour expected by existing references: pages
/// without a reference are rendered at 800x600 and every rendering goes
/// through the normalize stage.
///
/// # Examples
///
/// ```
/// let cfg = rfcritic::CriticConfig::default();
/// assert_eq!(cfg.default_viewport.width, 800);
/// assert!(cfg.normalize_surfaces);
/// ```
#[derive(Debug, Clone)]
pub struct CriticConfig {
    /// Size used when a page has no reference yet
    pub default_viewport: Viewport,
    /// Round-trip every rendering through the storage encoding before it is
    /// compared or stored
    pub normalize_surfaces: bool,
    /// Timeout for page and resource requests in milliseconds
    pub request_timeout_ms: u64,
    /// User agent string sent with requests
    pub user_agent: String,
    /// Maximum number of comparisons `Critic::compare_all` runs at once
    pub concurrency: usize,
}

impl Default for CriticConfig {
    fn default() -> Self {
        Self {
            default_viewport: Viewport::default(),
            normalize_surfaces: true,
            request_timeout_ms: 30000,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) RFOX-Critic/0.1".to_string(),
            concurrency: num_cpus::get(),
        }
    }
}

impl CriticConfig {
    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.default_viewport.width == 0 || self.default_viewport.height == 0 {
            return Err(Error::Config(format!(
                "default viewport must be non-empty, got {}x{}",
                self.default_viewport.width, self.default_viewport.height
            )));
        }
        if self.concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
        }
    }
}
