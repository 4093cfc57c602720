//! Comparison orchestrator.
//!
//! For each page the critic resolves the stored reference, renders the page
//! at the reference's size (or the default viewport), compares the two and
//! reports the classified result. Renderer and store faults end up in the
//! result's status; they are never returned from `compare`.

use crate::renderer::{PageRenderer, RendererClient};
use crate::report::{Reporter, ReporterRegistry};
use crate::result::{ComparisonResult, PageHooks};
use crate::store::{Lookup, ReferenceStore, ReferenceStoreClient};
use crate::surface::Surface;
use crate::CriticConfig;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;

/// Pipeline stages of a single comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ResolvingReference,
    Rendering,
    Comparing,
    ClassifyMissing,
    Errored,
    Reporting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Start => "start",
            Stage::ResolvingReference => "resolving-reference",
            Stage::Rendering => "rendering",
            Stage::Comparing => "comparing",
            Stage::ClassifyMissing => "classify-missing",
            Stage::Errored => "errored",
            Stage::Reporting => "reporting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tracks the stage of one comparison and logs every transition
struct Progress<'a> {
    page: &'a str,
    stage: Stage,
}

impl<'a> Progress<'a> {
    fn new(page: &'a str) -> Self {
        Self { page, stage: Stage::Start }
    }

    fn advance(&mut self, next: Stage) {
        log::debug!("{}: {} -> {}", self.page, self.stage, next);
        self.stage = next;
    }
}

/// Drives comparisons and owns the reporter registry
pub struct Critic {
    hooks: PageHooks,
    reporters: Arc<ReporterRegistry>,
    config: CriticConfig,
}

impl fmt::Debug for Critic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Critic")
            .field("reporters", &self.reporters)
            .field("config", &self.config)
            .finish()
    }
}

impl Critic {
    /// Create a critic with its own, empty reporter registry
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        store: Arc<dyn ReferenceStore>,
        config: CriticConfig,
    ) -> Self {
        Self::with_registry(renderer, store, config, Arc::new(ReporterRegistry::new()))
    }

    /// Create a critic that notifies an existing registry
    pub fn with_registry(
        renderer: Arc<dyn PageRenderer>,
        store: Arc<dyn ReferenceStore>,
        config: CriticConfig,
        reporters: Arc<ReporterRegistry>,
    ) -> Self {
        let hooks = PageHooks {
            renderer: RendererClient::new(renderer),
            store: ReferenceStoreClient::new(store),
            normalize: config.normalize_surfaces,
        };
        Self { hooks, reporters, config }
    }

    pub fn config(&self) -> &CriticConfig {
        &self.config
    }

    pub fn reporters(&self) -> &Arc<ReporterRegistry> {
        &self.reporters
    }

    pub fn add_reporter(&self, reporter: Arc<dyn Reporter>) {
        self.reporters.register(reporter);
    }

    pub fn clear_reporters(&self) {
        self.reporters.clear_all();
    }

    /// Compare `page` against its stored reference and notify all reporters
    pub async fn compare(&self, page: &str) -> ComparisonResult {
        let mut progress = Progress::new(page);

        progress.advance(Stage::ResolvingReference);
        let reference = match self.hooks.store.get(page).await {
            Lookup::Found(surface) => Some(surface),
            Lookup::Absent => None,
            Lookup::Unreadable(e) => {
                log::warn!("Ignoring unreadable reference for {}: {}", page, e);
                None
            }
        };
        let (width, height) = reference.as_ref().map(Surface::dimensions).unwrap_or((
            self.config.default_viewport.width,
            self.config.default_viewport.height,
        ));

        progress.advance(Stage::Rendering);
        let result = match self.hooks.render(page, width, height).await {
            Err(e) => {
                progress.advance(Stage::Errored);
                log::warn!("Comparison of {} errored: {}", page, e);
                ComparisonResult::error(page, e.to_string())
            }
            Ok(rendering) => match reference {
                None => {
                    progress.advance(Stage::ClassifyMissing);
                    ComparisonResult::reference_missing(page, rendering, self.hooks.clone())
                }
                Some(reference) => {
                    progress.advance(Stage::Comparing);
                    ComparisonResult::compared(page, rendering, reference, self.hooks.clone())
                }
            },
        };

        progress.advance(Stage::Reporting);
        self.reporters.notify_all(&result);
        progress.advance(Stage::Done);
        log::info!("{}: {}", page, result.status());
        result
    }

    /// Compare several pages concurrently; results come back in input order
    pub async fn compare_all<I, S>(&self, pages: I) -> Vec<ComparisonResult>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        stream::iter(pages)
            .map(|page| async move { self.compare(page.as_ref()).await })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::tests::FakeRenderer;
    use crate::renderer::ResourceError;
    use crate::report::RecordingReporter;
    use crate::result::Status;
    use crate::store::MemoryStore;
    use crate::Viewport;

    const BLACK: [u8; 4] = [0, 0, 0, 255];
    const WHITE: [u8; 4] = [255, 255, 255, 255];

    fn critic(renderer: FakeRenderer, store: Arc<MemoryStore>) -> (Critic, Arc<RecordingReporter>) {
        let critic = Critic::new(Arc::new(renderer), store, CriticConfig::default());
        let recorder = Arc::new(RecordingReporter::new());
        critic.add_reporter(recorder.clone());
        (critic, recorder)
    }

    async fn store_with(page: &str, surface: &Surface) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        ReferenceStoreClient::new(store.clone())
            .put(page, surface)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_missing_reference_renders_at_default_size() {
        let renderer = FakeRenderer::default().with_page("p.html", None, vec![]);
        let (critic, recorder) = critic(renderer, Arc::new(MemoryStore::new()));

        let result = critic.compare("p.html").await;
        assert_eq!(result.status(), Status::ReferenceMissing);
        assert_eq!(result.page_surface().unwrap().dimensions(), (800, 600));
        assert!(result.reference_surface().is_none());
        assert!(result.difference_surface().is_none());
        assert!(result.can_accept());
        assert_eq!(recorder.statuses(), vec![("p.html".to_string(), Status::ReferenceMissing)]);
    }

    #[tokio::test]
    async fn test_renders_at_reference_dimensions() {
        let store = store_with("p.html", &Surface::filled(30, 20, WHITE)).await;
        let renderer = Arc::new(FakeRenderer::default().with_page("p.html", None, vec![]));
        let critic = Critic::new(renderer.clone(), store, CriticConfig::default());

        let result = critic.compare("p.html").await;
        assert_eq!(result.status(), Status::Passed);
        assert_eq!(renderer.calls.lock().unwrap()[0], ("p.html".to_string(), 30, 20));
    }

    #[tokio::test]
    async fn test_black_against_black_passes() {
        let store = store_with("p", &Surface::filled(800, 600, BLACK)).await;
        let renderer =
            FakeRenderer::default().with_page("p", Some(Surface::filled(800, 600, BLACK)), vec![]);
        let (critic, _) = critic(renderer, store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Passed);
        assert!(result.reference_surface().is_some());
        assert!(result.difference_surface().is_none());
    }

    #[tokio::test]
    async fn test_white_against_black_fails_everywhere() {
        let store = store_with("p", &Surface::filled(800, 600, BLACK)).await;
        let renderer =
            FakeRenderer::default().with_page("p", Some(Surface::filled(800, 600, WHITE)), vec![]);
        let (critic, _) = critic(renderer, store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Failed);
        let diff = result.difference_surface().unwrap();
        assert_eq!(diff.dimensions(), (800, 600));
        assert!(diff.as_rgba().chunks_exact(4).all(|px| px[..3] == [255, 255, 255]));
        assert!(result.can_accept());
    }

    #[tokio::test]
    async fn test_single_pixel_change_fails() {
        let reference = Surface::filled(10, 10, WHITE);
        let mut rendered = reference.clone();
        rendered.put_pixel(9, 9, [255, 255, 254, 255]);
        let store = store_with("p", &reference).await;
        let (critic, _) =
            critic(FakeRenderer::default().with_page("p", Some(rendered), vec![]), store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Failed);
        assert!(result.difference_surface().is_some());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_fails_rather_than_errors() {
        let store = store_with("p", &Surface::filled(10, 10, WHITE)).await;
        let renderer =
            FakeRenderer::default().with_page("p", Some(Surface::filled(12, 10, WHITE)), vec![]);
        let (critic, _) = critic(renderer, store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Failed);
        assert_eq!(result.difference_surface().unwrap().dimensions(), (12, 10));
    }

    #[tokio::test]
    async fn test_page_failure_is_error_without_surfaces() {
        let renderer = FakeRenderer::default().with_page(
            "gone.html",
            None,
            vec![ResourceError::page("gone.html")],
        );
        let (critic, recorder) = critic(renderer, Arc::new(MemoryStore::new()));

        let result = critic.compare("gone.html").await;
        assert_eq!(result.status(), Status::Error);
        assert!(result.page_surface().is_none());
        assert!(result.reference_surface().is_none());
        assert!(result.message().is_some());
        assert_eq!(recorder.results().len(), 1);
    }

    #[tokio::test]
    async fn test_resource_errors_do_not_change_status() {
        let errors = vec![
            ResourceError::new("image", Some("bg.png".into())),
            ResourceError::new("stylesheet", Some("site.css".into())),
        ];
        let store = store_with("p", &Surface::filled(5, 5, WHITE)).await;
        let renderer = FakeRenderer::default().with_page("p", None, errors);
        let (critic, _) = critic(renderer, store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Passed);
        assert_eq!(result.erroneous_resource_urls(), &["bg.png", "site.css"]);
    }

    #[tokio::test]
    async fn test_accept_then_compare_passes() {
        let store = Arc::new(MemoryStore::new());
        let renderer =
            FakeRenderer::default().with_page("p", Some(Surface::filled(42, 7, WHITE)), vec![]);
        let (critic, _) = critic(renderer, store);

        let first = critic.compare("p").await;
        assert_eq!(first.status(), Status::ReferenceMissing);
        assert_eq!(first.page_surface().unwrap().dimensions(), (42, 7));
        first.accept().await.unwrap();

        let second = critic.compare("p").await;
        assert_eq!(second.status(), Status::Passed);
    }

    #[tokio::test]
    async fn test_tainted_rendering_is_an_error_when_normalizing() {
        let mut tainted = Surface::filled(4, 4, WHITE);
        tainted.taint();
        let renderer = FakeRenderer::default().with_page("p", Some(tainted), vec![]);
        let (critic, _) = critic(renderer, Arc::new(MemoryStore::new()));

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::Error);
        assert!(result.message().unwrap().contains("encode"));
    }

    #[tokio::test]
    async fn test_tainted_rendering_cannot_be_accepted_without_normalize() {
        let mut tainted = Surface::filled(4, 4, WHITE);
        tainted.taint();
        let store = Arc::new(MemoryStore::new());
        let config = CriticConfig {
            normalize_surfaces: false,
            ..Default::default()
        };
        let renderer = FakeRenderer::default().with_page("p", Some(tainted), vec![]);
        let critic = Critic::new(Arc::new(renderer), store.clone(), config);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::ReferenceMissing);
        assert!(matches!(result.accept().await, Err(crate::Error::Encode(_))));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_unreadable_reference_counts_as_missing() {
        let store = Arc::new(MemoryStore::new());
        store.save("p", "garbage").await.unwrap();
        let renderer = FakeRenderer::default().with_page("p", None, vec![]);
        let (critic, _) = critic(renderer, store);

        let result = critic.compare("p").await;
        assert_eq!(result.status(), Status::ReferenceMissing);
        assert_eq!(result.page_surface().unwrap().dimensions(), (800, 600));
    }

    #[tokio::test]
    async fn test_resize_rerenders_at_new_size() {
        let renderer = FakeRenderer::default().with_page(
            "p",
            None,
            vec![ResourceError::new("image", Some("x.png".into()))],
        );
        let config = CriticConfig {
            default_viewport: Viewport { width: 40, height: 30 },
            ..Default::default()
        };
        let critic = Critic::new(Arc::new(renderer), Arc::new(MemoryStore::new()), config);

        let mut result = critic.compare("p").await;
        assert_eq!(result.page_surface().unwrap().dimensions(), (40, 30));
        let errors = result.resize(64, 16).await.unwrap();
        assert_eq!(errors, vec!["x.png"]);
        assert_eq!(result.page_surface().unwrap().dimensions(), (64, 16));
        assert_eq!(result.status(), Status::ReferenceMissing);
    }

    #[tokio::test]
    async fn test_resize_rejects_empty_size() {
        let renderer = Arc::new(FakeRenderer::default().with_page("p", None, vec![]));
        let critic =
            Critic::new(renderer.clone(), Arc::new(MemoryStore::new()), CriticConfig::default());

        let mut result = critic.compare("p").await;
        assert!(matches!(result.resize(0, 0).await, Err(crate::Error::Config(_))));
        assert!(matches!(result.resize(10, 0).await, Err(crate::Error::Config(_))));
        assert_eq!(result.page_surface().unwrap().dimensions(), (800, 600));
        assert_eq!(renderer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_compare_without_reporters_still_completes() {
        let renderer = FakeRenderer::default().with_page("p", None, vec![]);
        let critic =
            Critic::new(Arc::new(renderer), Arc::new(MemoryStore::new()), CriticConfig::default());
        assert!(critic.reporters().is_empty());
        assert_eq!(critic.compare("p").await.status(), Status::ReferenceMissing);
    }

    #[tokio::test]
    async fn test_independent_critics_have_independent_registries() {
        let page = || FakeRenderer::default().with_page("p", None, vec![]);
        let a = critic(page(), Arc::new(MemoryStore::new()));
        let b = critic(page(), Arc::new(MemoryStore::new()));
        a.0.compare("p").await;
        assert_eq!(a.1.results().len(), 1);
        assert!(b.1.results().is_empty());
    }

    #[tokio::test]
    async fn test_compare_all_keeps_input_order() {
        let renderer = FakeRenderer::default()
            .with_page("a", None, vec![])
            .with_page("c", None, vec![]);
        let (critic, recorder) = critic(renderer, Arc::new(MemoryStore::new()));

        let results = critic.compare_all(["a", "b", "c"]).await;
        let statuses: Vec<_> = results.iter().map(|r| (r.page_url(), r.status())).collect();
        assert_eq!(
            statuses,
            vec![
                ("a", Status::ReferenceMissing),
                ("b", Status::Error),
                ("c", Status::ReferenceMissing),
            ]
        );
        assert_eq!(recorder.results().len(), 3);
    }
}
