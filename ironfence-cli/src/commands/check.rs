//! `ironfence check` command handler
//!
//! Runs the kernel decision functions over userspace [`SlotTable`]s, so a
//! verdict printed here is the verdict the attached program would return.
//!
//! [`SlotTable`]: ironfence_xdp_engine::ironfence_xdp_common::SlotTable

use std::cell::Cell;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use ironfence_xdp_engine::ironfence_xdp_common::acl::{AclMatcher, rule_matches};
use ironfence_xdp_engine::ironfence_xdp_common::ratelimit::{
    Clock, RateLimiter, find_rule, window_snapshot,
};
use ironfence_xdp_engine::ironfence_xdp_common::{
    RATE_LIMIT_MAX_ENTRIES, RateLimitRule, RuleTable, SourceAddr, Verdict,
};
use ironfence_xdp_engine::{FilterMode, RuleFile};

use crate::cli::CheckArgs;
use crate::commands::RuleSource;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const NS_PER_MS: u64 = 1_000_000;

/// Execute the `check` command.
pub async fn execute(
    args: CheckArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let packets = packet_plan(&args.addrs, &args.at_ms)?;
    let source = RuleSource::resolve(config_path, args.rules, args.mode).await?;
    let rules = source.load().await?;

    info!(
        rules = %source.path.display(),
        mode = %source.mode,
        packets = packets.len(),
        "evaluating packets"
    );

    let mut report = evaluate(&rules, source.mode, &packets)?;
    report.rules = source.path.display().to_string();
    writer.render(&report)
}

/// A source address and its arrival time in milliseconds.
pub type Packet = (IpAddr, u64);

/// Pair addresses with arrival offsets.
///
/// - no offsets: every address arrives at 0
/// - one address: replayed once per offset
/// - otherwise addresses and offsets must have the same length
///
/// Offsets must not go backwards.
pub fn packet_plan(addrs: &[IpAddr], at_ms: &[u64]) -> Result<Vec<Packet>, CliError> {
    let packets: Vec<Packet> = match (addrs, at_ms) {
        (_, []) => addrs.iter().map(|&addr| (addr, 0)).collect(),
        ([addr], offsets) => offsets.iter().map(|&at| (*addr, at)).collect(),
        (addrs, offsets) if addrs.len() == offsets.len() => {
            addrs.iter().copied().zip(offsets.iter().copied()).collect()
        }
        (addrs, offsets) => {
            return Err(CliError::Command(format!(
                "{} addresses but {} --at-ms offsets",
                addrs.len(),
                offsets.len()
            )));
        }
    };

    if let Some(pair) = packets.windows(2).find(|pair| pair[1].1 < pair[0].1) {
        return Err(CliError::Command(format!(
            "--at-ms offsets must not decrease ({} after {})",
            pair[1].1, pair[0].1
        )));
    }
    Ok(packets)
}

/// Evaluate packets in order against the table selected by `mode`.
pub fn evaluate(
    rules: &RuleFile,
    mode: FilterMode,
    packets: &[Packet],
) -> Result<CheckReport, CliError> {
    let (decisions, windows) = match mode {
        FilterMode::Acl => (evaluate_acl(rules, packets)?, Vec::new()),
        FilterMode::RateLimit => evaluate_rate_limit(rules, packets)?,
    };

    let dropped = decisions.iter().filter(|d| d.verdict == "drop").count();
    Ok(CheckReport {
        rules: String::new(),
        mode: mode.as_str(),
        passed: decisions.len() - dropped,
        dropped,
        decisions,
        windows,
    })
}

fn evaluate_acl(rules: &RuleFile, packets: &[Packet]) -> Result<Vec<Decision>, CliError> {
    let compiled = rules.compile_acl()?;
    let matcher = AclMatcher::new(rules.acl_table()?);

    Ok(packets
        .iter()
        .enumerate()
        .map(|(seq, &(addr, at_ms))| {
            let src = SourceAddr::from(addr);
            let verdict = matcher.classify(&src);
            let rule = compiled.iter().position(|rule| rule_matches(rule, &src));
            Decision::new(seq, addr, at_ms, rule, verdict)
        })
        .collect())
}

/// Clock driven by the packet plan.
struct ReplayClock<'a>(&'a Cell<u64>);

impl Clock for ReplayClock<'_> {
    fn now_ns(&self) -> u64 {
        self.0.get()
    }
}

fn evaluate_rate_limit(
    rules: &RuleFile,
    packets: &[Packet],
) -> Result<(Vec<Decision>, Vec<WindowReport>), CliError> {
    let now = Cell::new(0);
    let limiter = RateLimiter::new(rules.rate_limit_table()?, ReplayClock(&now));

    let mut decisions = Vec::with_capacity(packets.len());
    for (seq, &(addr, at_ms)) in packets.iter().enumerate() {
        now.set(at_ms.saturating_mul(NS_PER_MS));
        let src = SourceAddr::from(addr);
        let rule = matched_index(limiter.table(), &src);
        let verdict = limiter.admit(&src);
        decisions.push(Decision::new(seq, addr, at_ms, rule, verdict));
    }

    let windows = (0..RATE_LIMIT_MAX_ENTRIES)
        .map_while(|index| window_snapshot(limiter.table(), index).map(|window| (index, window)))
        .map(|(index, window)| WindowReport {
            rule: index,
            limit: window.limit,
            packet_count: window.packet_count,
            window_ends_ms: window.next_interval_start / NS_PER_MS,
        })
        .collect();

    Ok((decisions, windows))
}

/// Index of the entry `find_rule` selects, found by pointer identity.
fn matched_index<T: RuleTable<RateLimitRule>>(table: &T, src: &SourceAddr) -> Option<usize> {
    let entry = find_rule(table, src)?;
    (0..RATE_LIMIT_MAX_ENTRIES)
        .map_while(|index| table.get_ptr_mut(index))
        .position(|ptr| ptr == entry)
}

/// Result of evaluating a packet sequence.
#[derive(Serialize)]
pub struct CheckReport {
    pub rules: String,
    pub mode: &'static str,
    pub passed: usize,
    pub dropped: usize,
    pub decisions: Vec<Decision>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub windows: Vec<WindowReport>,
}

/// Verdict for one packet.
#[derive(Serialize)]
pub struct Decision {
    pub seq: usize,
    pub source: IpAddr,
    pub at_ms: u64,
    /// Index of the matching rule (None: no rule matched).
    pub rule: Option<usize>,
    pub verdict: &'static str,
}

impl Decision {
    fn new(seq: usize, source: IpAddr, at_ms: u64, rule: Option<usize>, verdict: Verdict) -> Self {
        Self {
            seq,
            source,
            at_ms,
            rule,
            verdict: verdict.as_str(),
        }
    }
}

/// Rate-limit window state after the replay.
#[derive(Serialize)]
pub struct WindowReport {
    pub rule: u32,
    pub limit: u32,
    pub packet_count: u64,
    /// End of the current window (0: never opened).
    pub window_ends_ms: u64,
}

impl Render for CheckReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Check: {} (mode: {})", self.rules.bold(), self.mode)?;
        writeln!(w)?;
        writeln!(
            w,
            "{:<5} {:<40} {:>8} {:>6}  Verdict",
            "Seq", "Source", "At(ms)", "Rule"
        )?;
        writeln!(w, "{}", "-".repeat(72))?;

        for d in &self.decisions {
            let rule = d.rule.map_or_else(|| "-".to_owned(), |r| r.to_string());
            let verdict = match d.verdict {
                "drop" => "DROP".red().bold(),
                _ => "PASS".green(),
            };
            writeln!(
                w,
                "{:<5} {:<40} {:>8} {:>6}  {}",
                d.seq,
                d.source.to_string(),
                d.at_ms,
                rule,
                verdict
            )?;
        }

        if !self.windows.is_empty() {
            writeln!(w)?;
            writeln!(w, "Windows:")?;
            for win in &self.windows {
                writeln!(
                    w,
                    "  rule {}: {}/{} packets, window ends at {}ms",
                    win.rule, win.packet_count, win.limit, win.window_ends_ms
                )?;
            }
        }

        writeln!(w)?;
        writeln!(w, "{} passed, {} dropped", self.passed, self.dropped)?;
        Ok(())
    }
}
