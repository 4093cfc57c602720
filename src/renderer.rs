//! Renderer client: drives a page renderer and classifies what went wrong.
//!
//! A failure to load the page itself is fatal to a comparison. Failures of
//! sub-resources (images, stylesheets, scripts) are collected and reported
//! alongside an otherwise successful rendering.

use crate::surface::Surface;
use crate::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Resource type used by renderers to flag the page itself as missing
pub const PAGE_RESOURCE_TYPE: &str = "page";

/// A resource that failed to load during rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    /// "page", "image", "stylesheet", "script", ...
    pub resource_type: String,
    /// Locator of the failing resource, if known
    pub url: Option<String>,
}

impl ResourceError {
    pub fn new(resource_type: impl Into<String>, url: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            url,
        }
    }

    pub fn page(url: impl Into<String>) -> Self {
        Self::new(PAGE_RESOURCE_TYPE, Some(url.into()))
    }

    pub fn is_page(&self) -> bool {
        self.resource_type == PAGE_RESOURCE_TYPE
    }
}

/// Raw output of a renderer
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub surface: Surface,
    pub errors: Vec<ResourceError>,
}

/// Rendering collaborator
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `locator` into a surface of `width` x `height`
    async fn render(&self, locator: &str, width: u32, height: u32) -> Result<RenderOutput>;
}

/// A successful rendering with the sub-resources that failed to load
#[derive(Debug, Clone)]
pub struct Rendering {
    pub surface: Surface,
    pub erroneous_resource_urls: Vec<String>,
}

/// Classifying wrapper around a `PageRenderer`
#[derive(Clone)]
pub struct RendererClient {
    renderer: Arc<dyn PageRenderer>,
}

impl std::fmt::Debug for RendererClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererClient").finish_non_exhaustive()
    }
}

impl RendererClient {
    pub fn new(renderer: Arc<dyn PageRenderer>) -> Self {
        Self { renderer }
    }

    /// Render `page`, returning `Error::PageUnreachable` when the page itself
    /// failed and the failing sub-resource urls otherwise
    pub async fn render(&self, page: &str, width: u32, height: u32) -> Result<Rendering> {
        let output = match self.renderer.render(page, width, height).await {
            Ok(o) => o,
            Err(Error::PageUnreachable(msg)) => return Err(Error::PageUnreachable(msg)),
            Err(e) => return Err(Error::PageUnreachable(format!("{}: {}", page, e))),
        };

        if output.errors.iter().any(ResourceError::is_page) {
            return Err(Error::PageUnreachable(page.to_string()));
        }

        let erroneous_resource_urls = erroneous_urls(&output.errors);
        if !erroneous_resource_urls.is_empty() {
            log::warn!(
                "{} sub-resource(s) of {} failed to load: {}",
                erroneous_resource_urls.len(),
                page,
                erroneous_resource_urls.join(", ")
            );
        }

        Ok(Rendering {
            surface: output.surface,
            erroneous_resource_urls,
        })
    }
}

/// Urls of the failing resources in encounter order; entries without a url
/// are skipped
fn erroneous_urls(errors: &[ResourceError]) -> Vec<String> {
    errors.iter().filter_map(|e| e.url.clone()).collect()
}
