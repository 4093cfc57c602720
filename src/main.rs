use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use rfcritic::{
    Critic, CriticConfig, DiffImageReporter, FileStore, HtmlRenderer, Status, TextReporter,
    Viewport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rfcritic", version, about = "Visual regression checks for web pages")]
struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compare pages against their stored references
    Compare {
        #[command(flatten)]
        common: CommonArgs,
        /// Store the rendering of pages without a reference
        #[arg(long)]
        accept_missing: bool,
        /// Write difference images of failed pages into this directory
        #[arg(long)]
        diff_dir: Option<PathBuf>,
    },
    /// Render pages and store them as the new reference
    Accept {
        #[command(flatten)]
        common: CommonArgs,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Page URLs or paths
    #[arg(required = true)]
    pages: Vec<String>,
    /// Directory holding the reference images
    #[arg(long, default_value = "references")]
    store: PathBuf,
    /// Render width (compare: only for pages without a reference) [default: 800]
    #[arg(long)]
    width: Option<u32>,
    /// Render height (compare: only for pages without a reference) [default: 600]
    #[arg(long)]
    height: Option<u32>,
    /// Skip the encode/decode normalize stage
    #[arg(long)]
    no_normalize: bool,
    /// Timeout for page and resource requests
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,
}

impl CommonArgs {
    /// The size given on the command line, if any
    fn size(&self) -> Option<Viewport> {
        if self.width.is_none() && self.height.is_none() {
            return None;
        }
        let default = Viewport::default();
        Some(Viewport {
            width: self.width.unwrap_or(default.width),
            height: self.height.unwrap_or(default.height),
        })
    }

    fn config(&self) -> CriticConfig {
        CriticConfig {
            default_viewport: self.size().unwrap_or_default(),
            normalize_surfaces: !self.no_normalize,
            request_timeout_ms: self.timeout_ms,
            ..Default::default()
        }
    }

    fn critic(&self) -> anyhow::Result<Critic> {
        let config = self.config();
        config.validate()?;
        let renderer = HtmlRenderer::new(config.clone()).context("creating renderer")?;
        let store = FileStore::new(&self.store);
        Ok(Critic::new(Arc::new(renderer), Arc::new(store), config))
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // tracing-subscriber also installs the `log` bridge
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn compare(
    common: CommonArgs,
    accept_missing: bool,
    diff_dir: Option<PathBuf>,
) -> anyhow::Result<bool> {
    let critic = common.critic()?;
    critic.add_reporter(Arc::new(TextReporter::stdout()));
    if let Some(dir) = diff_dir {
        critic.add_reporter(Arc::new(DiffImageReporter::new(dir)));
    }
    compare_pages(&critic, &common.pages, accept_missing).await
}

/// Compare `pages`; true when every page passed (or was accepted because
/// its reference was missing and `accept_missing` is set)
async fn compare_pages(
    critic: &Critic,
    pages: &[String],
    accept_missing: bool,
) -> anyhow::Result<bool> {
    let results = critic.compare_all(pages).await;
    let mut all_passed = true;
    for result in &results {
        match result.status() {
            Status::Passed => {}
            Status::ReferenceMissing if accept_missing => {
                result
                    .accept()
                    .await
                    .with_context(|| format!("accepting {}", result.page_url()))?;
                println!("accepted          {}", result.page_url());
            }
            _ => all_passed = false,
        }
    }
    Ok(all_passed)
}

async fn accept(common: CommonArgs) -> anyhow::Result<bool> {
    let critic = common.critic()?;
    accept_pages(&critic, &common.pages, common.size()).await
}

/// Render `pages` and store each rendering as the new reference, whatever
/// its comparison status.
///
/// With `size` the page is rendered at that size; otherwise at the size of
/// its current reference (or the default viewport when there is none).
async fn accept_pages(
    critic: &Critic,
    pages: &[String],
    size: Option<Viewport>,
) -> anyhow::Result<bool> {
    let mut all_accepted = true;
    for mut result in critic.compare_all(pages).await {
        if !result.can_accept() {
            eprintln!(
                "cannot accept {}: {}",
                result.page_url(),
                result.message().unwrap_or("page could not be rendered")
            );
            all_accepted = false;
            continue;
        }
        if let Some(size) = size {
            if let Err(e) = result.resize(size.width, size.height).await {
                eprintln!("cannot accept {}: {}", result.page_url(), e);
                all_accepted = false;
                continue;
            }
        }
        result
            .accept()
            .await
            .with_context(|| format!("accepting {}", result.page_url()))?;
        println!("accepted          {}", result.page_url());
    }
    Ok(all_accepted)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let ok = match cli.command {
        Command::Compare {
            common,
            accept_missing,
            diff_dir,
        } => compare(common, accept_missing, diff_dir).await?,
        Command::Accept { common } => accept(common).await?,
    };

    if !ok {
        bail!("not all pages passed");
    }
    Ok(())
}
