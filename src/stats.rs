use std::cell::RefCell;
use std::fmt::Write as _;

use chrono::{Local, TimeZone};

use crate::context::Context;
use crate::rate_limit::RateLimiter;
use crate::registry::{Registry, Status};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub found: usize,
    pub checking: usize,
    pub self_liked: usize,
    pub not_self_liked: usize,
}

impl Stats {
    pub fn from_registry(registry: &Registry) -> Self {
        Self {
            found: registry.len(),
            checking: registry.count(Status::Checking),
            self_liked: registry.count(Status::SelfLiked),
            not_self_liked: registry.count(Status::NotSelfLiked),
        }
    }

    /// Share of classified items that are self-liked, 0 when nothing has
    /// been classified yet.
    pub fn self_liked_ratio(&self) -> f64 {
        let classified = self.self_liked + self.not_self_liked;
        if classified == 0 {
            0.0
        } else {
            self.self_liked as f64 / classified as f64
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Human readable summary of the registry and the rate limit state.
pub fn summary(stats: &Stats, limiter: &RateLimiter, now: i64) -> String {
    let mut msg = String::from("Current stats:\n\n");

    if limiter.is_active() {
        msg.push_str("RATE LIMIT EXCEEDED!\n\n");
    }
    if let Some(reset) = limiter.reset_window_end() {
        let clock = Local
            .timestamp_opt(reset, 0)
            .single()
            .map(|time| time.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| reset.to_string());
        let _ = write!(msg, "Next rate limit reset: {clock}");
        if limiter.is_active() {
            let left = reset.saturating_sub(now).max(0);
            let (minutes, seconds) = (left / 60, left % 60);
            if minutes > 0 {
                let _ = write!(msg, " (in {minutes} minutes and {seconds} seconds)");
            } else {
                let _ = write!(msg, " (in {seconds} seconds)");
            }
        }
        msg.push('\n');
    }
    if let (Some(limit), Some(remaining)) = (limiter.limit(), limiter.remaining()) {
        let _ = writeln!(msg, "Rate limit status: {remaining}/{limit}\n");
    }

    let _ = writeln!(msg, "{} post{} found so far", stats.found, plural(stats.found));
    if stats.checking > 0 {
        let verb = if stats.checking == 1 { "is" } else { "are" };
        let _ = writeln!(
            msg,
            "{} post{} {verb} still being analyzed",
            stats.checking,
            plural(stats.checking)
        );
    }
    let _ = writeln!(
        msg,
        "{} self-liked post{} found",
        stats.self_liked,
        plural(stats.self_liked)
    );
    let _ = writeln!(
        msg,
        "{} NOT self-liked post{} found",
        stats.not_self_liked,
        plural(stats.not_self_liked)
    );
    let _ = write!(
        msg,
        "{}% of analyzed posts are self-liked",
        percent(stats.self_liked_ratio())
    );
    msg
}

/// Percentage with at most four decimals and no trailing zeros.
fn percent(ratio: f64) -> String {
    let fixed = format!("{:.4}", ratio * 100.0);
    fixed.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Logs the summary whenever it differs from the previous one.
#[derive(Debug, Default)]
pub struct StatsReporter {
    last: RefCell<Option<String>>,
}

impl StatsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, ctx: &Context, now: i64) -> Option<String> {
        let stats = Stats::from_registry(&ctx.registry.borrow());
        let msg = summary(&stats, &ctx.limiter.borrow(), now);
        let mut last = self.last.borrow_mut();
        if last.as_deref() == Some(msg.as_str()) {
            return None;
        }
        tracing::info!("{msg}");
        *last = Some(msg.clone());
        Some(msg)
    }
}
