//! Built-in page renderer.
//!
//! Fetches a page over `http(s)://` or from a `file://` path, verifies the
//! sub-resources it references, lays out headings, paragraphs and images and
//! rasterizes them into a `Surface`. No scripts are executed.

pub mod layout;
pub mod paint;
pub mod raster;

use crate::renderer::{PageRenderer, RenderOutput, ResourceError};
use crate::surface::{Rgba, Surface};
use crate::{CriticConfig, Error, Result, Viewport};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const DEFAULT_BACKGROUND: Rgba = [255, 255, 255, 255];

/// A sub-resource referenced by the page
#[derive(Debug, Clone)]
struct PendingResource {
    resource_type: &'static str,
    url: String,
    resolved: Option<Url>,
}

/// Everything the renderer needs from the parsed document
#[derive(Debug)]
struct PageAnalysis {
    resources: Vec<PendingResource>,
    nodes: Vec<layout::LayoutNode>,
    background: Rgba,
}

/// Renderer backed by reqwest and scraper
pub struct HtmlRenderer {
    client: Client,
    config: CriticConfig,
}

impl HtmlRenderer {
    pub fn new(config: CriticConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &CriticConfig {
        &self.config
    }

    async fn fetch_page(&self, url: &Url) -> Result<String> {
        match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| Error::Render(format!("Not a local path: {}", url)))?;
                Ok(tokio::fs::read_to_string(path).await?)
            }
            "http" | "https" => {
                let resp = self.client.get(url.clone()).send().await?;
                if !resp.status().is_success() {
                    return Err(Error::Network(format!("HTTP {} for {}", resp.status(), url)));
                }
                Ok(resp.text().await?)
            }
            other => Err(Error::Render(format!("Unsupported scheme '{}'", other))),
        }
    }

    async fn resource_loads(&self, url: &Url) -> bool {
        match url.scheme() {
            "file" => match url.to_file_path() {
                Ok(path) => tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false),
                Err(_) => false,
            },
            "http" | "https" => match self.client.get(url.clone()).send().await {
                Ok(resp) => resp.status().is_success(),
                Err(e) => {
                    log::debug!("Fetching {} failed: {}", url, e);
                    false
                }
            },
            "data" => true,
            _ => false,
        }
    }

    async fn check_resource(&self, resource: &PendingResource) -> bool {
        match &resource.resolved {
            Some(url) => self.resource_loads(url).await,
            None => false,
        }
    }
}

#[async_trait]
impl PageRenderer for HtmlRenderer {
    async fn render(&self, locator: &str, width: u32, height: u32) -> Result<RenderOutput> {
        let page_missing = || RenderOutput {
            surface: Surface::new(width, height),
            errors: vec![ResourceError::page(locator)],
        };

        let page_url = match resolve_locator(locator) {
            Ok(u) => u,
            Err(e) => {
                log::warn!("Cannot resolve page locator {}: {}", locator, e);
                return Ok(page_missing());
            }
        };

        let html = match self.fetch_page(&page_url).await {
            Ok(h) => h,
            Err(e) => {
                log::warn!("Failed to load page {}: {}", page_url, e);
                return Ok(page_missing());
            }
        };

        let analysis = analyse(&html, &page_url, Viewport { width, height });
        let checks = analysis.resources.iter().map(|r| self.check_resource(r));
        let outcomes = futures::future::join_all(checks).await;

        let mut errors = Vec::new();
        let mut cross_origin = false;
        for (resource, loaded) in analysis.resources.iter().zip(outcomes) {
            if !loaded {
                errors.push(ResourceError::new(resource.resource_type, Some(resource.url.clone())));
            } else if resource.resource_type == "image" {
                cross_origin |= is_cross_origin(&page_url, resource.resolved.as_ref());
            }
        }

        let commands =
            paint::build_display_list(width, height, analysis.background, &analysis.nodes);
        let mut surface = raster::rasterize(width, height, &commands);
        if cross_origin {
            surface.taint();
        }
        log::debug!(
            "Rendered {} at {}x{} ({} paint commands, {} failed resources)",
            page_url,
            width,
            height,
            commands.len(),
            errors.len()
        );

        Ok(RenderOutput { surface, errors })
    }
}

/// Parse a page locator: a URL, or a filesystem path relative to the
/// current directory
pub fn resolve_locator(locator: &str) -> Result<Url> {
    if let Ok(url) = Url::parse(locator) {
        if url.scheme().len() > 1 {
            return Ok(url);
        }
    }
    let path = std::path::Path::new(locator);
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Url::from_file_path(&abs)
        .map_err(|_| Error::Config(format!("Invalid page locator: {}", locator)))
}

fn is_cross_origin(page: &Url, resource: Option<&Url>) -> bool {
    match (page.scheme(), resource) {
        ("http" | "https", Some(r)) if r.scheme() != "data" => r.origin() != page.origin(),
        _ => false,
    }
}

fn analyse(html: &str, base: &Url, viewport: Viewport) -> PageAnalysis {
    let document = Html::parse_document(html);
    PageAnalysis {
        resources: referenced_resources(&document, base),
        nodes: layout::layout_document(&document, viewport),
        background: body_background(&document).unwrap_or(DEFAULT_BACKGROUND),
    }
}

/// Sub-resources in document order
fn referenced_resources(document: &Html, base: &Url) -> Vec<PendingResource> {
    let Ok(sel) = Selector::parse("img[src], link[rel=\"stylesheet\"][href], script[src]") else {
        return Vec::new();
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let (resource_type, attr) = match el.value().name() {
                "img" => ("image", "src"),
                "link" => ("stylesheet", "href"),
                _ => ("script", "src"),
            };
            let raw = el.value().attr(attr)?.trim();
            if raw.is_empty() {
                return None;
            }
            let resolved = base.join(raw).ok();
            let url = resolved.as_ref().map(Url::to_string).unwrap_or_else(|| raw.to_string());
            Some(PendingResource { resource_type, url, resolved })
        })
        .collect()
}

fn body_background(document: &Html) -> Option<Rgba> {
    let sel = Selector::parse("body").ok()?;
    let body = document.select(&sel).next()?;
    let from_style = body.value().attr("style").and_then(|style| {
        style.split(';').find_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            match prop.trim().to_ascii_lowercase().as_str() {
                "background" | "background-color" => parse_color(value),
                _ => None,
            }
        })
    });
    from_style.or_else(|| body.value().attr("bgcolor").and_then(parse_color))
}

/// Parse `#rgb`, `#rrggbb` or a handful of named colours
pub fn parse_color(value: &str) -> Option<Rgba> {
    let v = value.trim().to_ascii_lowercase();
    if let Some(hex) = v.strip_prefix('#') {
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let bytes = hex::decode(expanded).ok()?;
        return Some([bytes[0], bytes[1], bytes[2], 255]);
    }
    match v.as_str() {
        "white" => Some([255, 255, 255, 255]),
        "black" => Some([0, 0, 0, 255]),
        "red" => Some([255, 0, 0, 255]),
        "green" => Some([0, 128, 0, 255]),
        "blue" => Some([0, 0, 255, 255]),
        "gray" | "grey" => Some([128, 128, 128, 255]),
        "transparent" => Some([0, 0, 0, 0]),
        _ => None,
    }
}
