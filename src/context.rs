use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::api::ApiClient;
use crate::credentials::Credentials;
use crate::logging::Verbosity;
use crate::page::Page;
use crate::rate_limit::RateLimiter;
use crate::registry::{Registry, RetryBackoff};
use crate::render;
use crate::scanner::Scanner;

/// Wall clock in unix seconds.
pub trait Clock {
    fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Operational switches that can be flipped while the loop runs.
///
/// Debug mode implies verbose logging and stats.
#[derive(Default)]
pub struct Flags {
    debug: Cell<bool>,
    verbose: Cell<bool>,
    stats: Cell<bool>,
    log: Option<Rc<dyn Verbosity>>,
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flags")
            .field("debug", &self.debug.get())
            .field("verbose", &self.verbose.get())
            .field("stats", &self.stats.get())
            .field("log", &self.log.is_some())
            .finish()
    }
}

impl Flags {
    pub fn new(debug: bool, verbose: bool, stats: bool) -> Self {
        Self {
            debug: Cell::new(debug),
            verbose: Cell::new(verbose),
            stats: Cell::new(stats),
            log: None,
        }
    }

    /// Routes verbosity changes to the log filter.
    pub fn with_verbosity(mut self, log: Rc<dyn Verbosity>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn debug(&self) -> bool {
        self.debug.get()
    }

    pub fn verbose(&self) -> bool {
        self.debug.get() || self.verbose.get()
    }

    pub fn stats(&self) -> bool {
        self.debug.get() || self.stats.get()
    }

    /// Switches debug mode and mirrors it on the page body.
    pub fn set_debug(&self, page: &Page, value: bool) {
        self.debug.set(value);
        render::apply_debug_class(page, value);
        self.sync_log();
    }

    pub fn set_verbose(&self, value: bool) {
        self.verbose.set(value);
        self.sync_log();
    }

    fn sync_log(&self) {
        if let Some(log) = &self.log {
            log.apply(self.verbose());
        }
    }

    pub fn set_stats(&self, value: bool) {
        self.stats.set(value);
    }
}

/// Everything one page's pipeline needs, built once at startup and passed
/// to every component.
pub struct Context {
    pub page: Page,
    pub scanner: Scanner,
    pub api: ApiClient,
    pub credentials: Credentials,
    pub registry: RefCell<Registry>,
    pub limiter: RefCell<RateLimiter>,
    pub backoff: RefCell<RetryBackoff>,
    pub flags: Flags,
    pub clock: Rc<dyn Clock>,
}

impl Context {
    pub fn new(
        page: Page,
        scanner: Scanner,
        api: ApiClient,
        credentials: Credentials,
        flags: Flags,
    ) -> Self {
        Self {
            page,
            scanner,
            api,
            credentials,
            registry: RefCell::new(Registry::new()),
            limiter: RefCell::new(RateLimiter::new()),
            backoff: RefCell::new(RetryBackoff::new(Duration::ZERO)),
            flags,
            clock: Rc::new(SystemClock),
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.backoff = RefCell::new(RetryBackoff::new(delay));
        self
    }

    pub fn with_clock(mut self, clock: Rc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }
}
