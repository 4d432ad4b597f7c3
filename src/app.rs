use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context as _, Result};
use url::Url;

use crate::api::{self, ApiClient, HttpTransport};
use crate::config::{self, Config};
use crate::context::{Context, Flags};
use crate::credentials::{self, CookieJar, Credentials};
use crate::logging;
use crate::page::Page;
use crate::poll::Poller;
use crate::render;
use crate::scanner::Scanner;
use crate::stats::{self, Stats};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub page: PathBuf,
    pub config_file: Option<PathBuf>,
    /// Stop after this many cycles instead of polling forever.
    pub cycles: Option<u64>,
    /// Where to write the annotated page after a bounded run.
    pub output: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;
    let log = logging::init(cfg.flags.debug || cfg.flags.verbose);

    let source = fs::read_to_string(&options.page)
        .with_context(|| format!("read page {}", options.page.display()))?;
    let page_url = Url::parse(&cfg.scan.page_url).context("parse scan.page_url")?;
    let page = Page::parse(&source, page_url);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build runtime")?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run_page(cfg, page, options, log))
}

async fn run_page(
    cfg: Config,
    page: Page,
    options: RunOptions,
    log: Option<logging::FilterHandle>,
) -> Result<()> {
    let transport = HttpTransport::new(api::ClientConfig {
        user_agent: cfg.session.user_agent.clone(),
        base_url: Some(cfg.api.base_url.clone()),
        timeout: Some(cfg.api.timeout),
        http_client: None,
    })
    .context("build api client")?;

    let bearer_token = if cfg.session.bearer_token.trim().is_empty() {
        credentials::bootstrap_bearer_token(&page, transport.http(), &cfg.api.bootstrap_script_prefix)
            .await
            .context("obtain bearer token")?
    } else {
        cfg.session.bearer_token.trim().to_string()
    };
    let credentials = Credentials::new(bearer_token, Rc::new(CookieJar::new(cfg.session.cookie.clone())));

    let scanner = Scanner::new(&cfg.scan.host, &cfg.scan.container)?;
    let api = ApiClient::new(Rc::new(transport)).with_rate_limit_code(cfg.api.rate_limit_code);
    let mut flags = Flags::new(cfg.flags.debug, cfg.flags.verbose, cfg.flags.stats);
    if let Some(log) = log {
        flags = flags.with_verbosity(Rc::new(log));
    }

    render::install_styles(&page);
    if flags.debug() {
        flags.set_debug(&page, true);
    }

    let ctx = Rc::new(
        Context::new(page, scanner, api, credentials, flags).with_retry_delay(cfg.poll.retry_delay),
    );
    let poller = Poller::new(Rc::clone(&ctx), cfg.poll.interval);
    tracing::info!(interval = ?cfg.poll.interval, "watching page");

    let Some(cycles) = options.cycles else {
        poller.run().await;
        return Ok(());
    };

    poller.run_cycles(cycles).await;
    poller.drain().await;

    let summary = stats::summary(
        &Stats::from_registry(&ctx.registry.borrow()),
        &ctx.limiter.borrow(),
        ctx.now(),
    );
    tracing::info!("{summary}");

    if let Some(output) = options.output.as_ref() {
        fs::write(output, ctx.page.to_html())
            .with_context(|| format!("write annotated page to {}", output.display()))?;
        tracing::info!(path = %output.display(), "annotated page written");
    }

    Ok(())
}
