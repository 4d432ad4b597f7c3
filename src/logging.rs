use std::env;

use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

const QUIET: &str = "selflike=info";
const VERBOSE: &str = "selflike=debug";

/// Receives verbosity changes made while the loop runs.
pub trait Verbosity {
    fn apply(&self, verbose: bool);
}

/// Swaps the active log filter in place.
pub struct FilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    env: Option<String>,
}

impl FilterHandle {
    fn new(handle: reload::Handle<EnvFilter, Registry>, env: Option<String>) -> Self {
        Self { handle, env }
    }
}

impl Verbosity for FilterHandle {
    fn apply(&self, verbose: bool) {
        let filter = build_filter(self.env.as_deref(), verbose);
        if let Err(err) = self.handle.reload(filter) {
            tracing::warn!(error = %err, "could not switch log level");
        } else {
            tracing::debug!(verbose, "log level switched");
        }
    }
}

/// `RUST_LOG` directives win; verbose mode only raises our own target.
fn build_filter(env: Option<&str>, verbose: bool) -> EnvFilter {
    match (env, verbose) {
        (Some(directives), true) => EnvFilter::new(format!("{directives},{VERBOSE}")),
        (Some(directives), false) => EnvFilter::new(directives),
        (None, true) => EnvFilter::new(VERBOSE),
        (None, false) => EnvFilter::new(QUIET),
    }
}

/// Installs the global subscriber, writing to stderr. Returns `None` when a
/// subscriber is already installed.
pub fn init(verbose: bool) -> Option<FilterHandle> {
    let env = env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty());
    let (filter, handle) = reload::Layer::new(build_filter(env.as_deref(), verbose));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .ok()?;
    Some(FilterHandle::new(handle, env))
}
