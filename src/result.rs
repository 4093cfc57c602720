//! Comparison results and the actions bound to them

use crate::compare;
use crate::renderer::{Rendering, RendererClient};
use crate::store::ReferenceStoreClient;
use crate::surface::Surface;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal classification of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Passed,
    Failed,
    ReferenceMissing,
    Error,
}

impl Status {
    /// Human-readable label used by reporters
    pub fn label(&self) -> &'static str {
        match self {
            Status::Passed => "passed",
            Status::Failed => "failed",
            Status::ReferenceMissing => "missing reference",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Renderer and store handles a result needs to re-render or accept its page
#[derive(Clone, Debug)]
pub(crate) struct PageHooks {
    pub renderer: RendererClient,
    pub store: ReferenceStoreClient,
    pub normalize: bool,
}

impl PageHooks {
    /// Render `page` and run the normalize stage when enabled
    pub async fn render(&self, page: &str, width: u32, height: u32) -> Result<Rendering> {
        let mut rendering = self.renderer.render(page, width, height).await?;
        if self.normalize {
            rendering.surface = rendering.surface.normalize()?;
        }
        Ok(rendering)
    }
}

/// Outcome of comparing one page
///
/// A page surface is present unless the status is `Error`; a reference
/// surface is present for `Passed` and `Failed`; a difference surface only
/// for `Failed`.
#[derive(Clone)]
pub struct ComparisonResult {
    status: Status,
    page_url: String,
    page_surface: Option<Surface>,
    reference_surface: Option<Surface>,
    erroneous_resource_urls: Vec<String>,
    difference_surface: Option<Surface>,
    message: Option<String>,
    hooks: Option<PageHooks>,
}

impl fmt::Debug for ComparisonResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims = |s: &Option<Surface>| s.as_ref().map(Surface::dimensions);
        f.debug_struct("ComparisonResult")
            .field("status", &self.status)
            .field("page_url", &self.page_url)
            .field("page_surface", &dims(&self.page_surface))
            .field("reference_surface", &dims(&self.reference_surface))
            .field("difference_surface", &dims(&self.difference_surface))
            .field("erroneous_resource_urls", &self.erroneous_resource_urls)
            .field("message", &self.message)
            .finish()
    }
}

impl ComparisonResult {
    pub(crate) fn error(page: &str, message: String) -> Self {
        Self {
            status: Status::Error,
            page_url: page.to_string(),
            page_surface: None,
            reference_surface: None,
            erroneous_resource_urls: Vec::new(),
            difference_surface: None,
            message: Some(message),
            hooks: None,
        }
    }

    pub(crate) fn reference_missing(page: &str, rendering: Rendering, hooks: PageHooks) -> Self {
        Self {
            status: Status::ReferenceMissing,
            page_url: page.to_string(),
            page_surface: Some(rendering.surface),
            reference_surface: None,
            erroneous_resource_urls: rendering.erroneous_resource_urls,
            difference_surface: None,
            message: None,
            hooks: Some(hooks),
        }
    }

    /// Classify a rendering against its reference
    pub(crate) fn compared(
        page: &str,
        rendering: Rendering,
        reference: Surface,
        hooks: PageHooks,
    ) -> Self {
        let (status, difference_surface) = if compare::equal(&rendering.surface, &reference) {
            (Status::Passed, None)
        } else {
            // dimension mismatches still get a difference image
            (Status::Failed, Some(compare::diff_aligned(&rendering.surface, &reference)))
        };
        Self {
            status,
            page_url: page.to_string(),
            page_surface: Some(rendering.surface),
            reference_surface: Some(reference),
            erroneous_resource_urls: rendering.erroneous_resource_urls,
            difference_surface,
            message: None,
            hooks: Some(hooks),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    /// The current rendering of the page
    pub fn page_surface(&self) -> Option<&Surface> {
        self.page_surface.as_ref()
    }

    pub fn reference_surface(&self) -> Option<&Surface> {
        self.reference_surface.as_ref()
    }

    pub fn difference_surface(&self) -> Option<&Surface> {
        self.difference_surface.as_ref()
    }

    /// Sub-resources that failed to load, in encounter order
    pub fn erroneous_resource_urls(&self) -> &[String] {
        &self.erroneous_resource_urls
    }

    /// Diagnostic for `Error` results
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether `accept` and `resize` are available
    pub fn can_accept(&self) -> bool {
        self.hooks.is_some() && self.page_surface.is_some()
    }

    /// Store the current rendering as the page's new reference.
    ///
    /// Encode failures are returned and nothing is stored.
    pub async fn accept(&self) -> Result<()> {
        let (Some(hooks), Some(surface)) = (&self.hooks, &self.page_surface) else {
            return Err(Error::Other(format!(
                "No rendered page to accept for {}",
                self.page_url
            )));
        };
        hooks.store.put(&self.page_url, surface).await.map_err(|e| {
            log::error!("Accepting {} failed: {}", self.page_url, e);
            e
        })?;
        log::info!("Accepted rendering of {} as new reference", self.page_url);
        Ok(())
    }

    /// Re-render the page at a new size, replacing the page surface.
    ///
    /// Returns the sub-resources that failed during the new rendering. The
    /// status and difference surface describe the original comparison and
    /// are left untouched.
    pub async fn resize(&mut self, width: u32, height: u32) -> Result<Vec<String>> {
        if width == 0 || height == 0 {
            return Err(Error::Config(format!(
                "cannot resize {} to an empty size {}x{}",
                self.page_url, width, height
            )));
        }
        let Some(hooks) = &self.hooks else {
            return Err(Error::Other(format!(
                "No rendered page to resize for {}",
                self.page_url
            )));
        };
        let rendering = hooks.render(&self.page_url, width, height).await?;
        self.page_surface = Some(rendering.surface);
        Ok(rendering.erroneous_resource_urls)
    }
}
