use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::analyzer;
use crate::context::Context;
use crate::registry::ItemId;
use crate::render;
use crate::scanner::Item;
use crate::stats::StatsReporter;

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Counts for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub scanned: usize,
    pub rendered: usize,
    pub dispatched: usize,
    pub in_flight: usize,
    pub deferred: usize,
    /// Whether a new stats summary was logged.
    pub stats_logged: bool,
}

/// Drives scan and classify cycles for one page.
///
/// Analyses are spawned onto the current `LocalSet` and tracked by item id
/// until they finish, so an id is never analysed twice at the same time.
pub struct Poller {
    ctx: Rc<Context>,
    interval: Duration,
    in_flight: Rc<RefCell<HashMap<ItemId, JoinHandle<()>>>>,
    reporter: StatsReporter,
}

impl Poller {
    pub fn new(ctx: Rc<Context>, interval: Duration) -> Self {
        Self {
            ctx,
            interval,
            in_flight: Rc::new(RefCell::new(HashMap::new())),
            reporter: StatsReporter::new(),
        }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.borrow().len()
    }

    /// Runs one cycle. Must be called from within a `LocalSet`.
    pub fn run_cycle(&self) -> CycleReport {
        let now = self.ctx.now();
        if self.ctx.limiter.borrow_mut().tick(now) {
            tracing::info!("rate limit window passed, resuming analysis");
        }

        let stats_logged =
            self.ctx.flags.stats() && self.reporter.report(&self.ctx, now).is_some();

        tracing::trace!("scanning page");
        let items = self.ctx.scanner.scan(&self.ctx.page);
        let mut report = CycleReport {
            scanned: items.len(),
            stats_logged,
            ..CycleReport::default()
        };

        for item in items {
            let status = self.ctx.registry.borrow().get(&item.id);
            if let Some(status) = status {
                render::reconcile(&self.ctx.page, &self.ctx.flags, Some(status), &item.element);
                report.rendered += 1;
                continue;
            }
            if self.in_flight.borrow().contains_key(&item.id) {
                report.in_flight += 1;
                continue;
            }
            if !self.ctx.backoff.borrow().is_ready(&item.id, now) {
                report.deferred += 1;
                continue;
            }
            self.dispatch(item);
            report.dispatched += 1;
        }

        report
    }

    fn dispatch(&self, item: Item) {
        let ctx = Rc::clone(&self.ctx);
        let in_flight = Rc::clone(&self.in_flight);
        let id = item.id.clone();
        let handle = tokio::task::spawn_local(async move {
            analyzer::analyze(&ctx, &item).await;
            in_flight.borrow_mut().remove(&item.id);
        });
        self.in_flight.borrow_mut().insert(id, handle);
    }

    /// Polls forever. The next cycle starts one interval after the previous
    /// one finished.
    pub async fn run(&self) {
        loop {
            self.run_cycle();
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Runs a fixed number of cycles, sleeping between them.
    pub async fn run_cycles(&self, cycles: u64) {
        for cycle in 0..cycles {
            let report = self.run_cycle();
            tracing::debug!(cycle, ?report, "poll cycle finished");
            if cycle + 1 < cycles {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// Waits for every analysis in flight to finish.
    pub async fn drain(&self) {
        loop {
            let handles: Vec<_> = self
                .in_flight
                .borrow_mut()
                .drain()
                .map(|(_, handle)| handle)
                .collect();
            if handles.is_empty() {
                return;
            }
            for result in futures::future::join_all(handles).await {
                if let Err(err) = result {
                    tracing::error!(error = %err, "analysis task aborted");
                }
            }
        }
    }
}
