//! `ironfence rules` command handler

use std::io::Write;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use ironfence_xdp_engine::ironfence_xdp_common::{AclRule, RateLimitRule, rule::has_v6_mask};
use ironfence_xdp_engine::{RuleAction, RuleFile};

use crate::cli::{RulesAction, RulesArgs};
use crate::commands::RuleSource;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        RulesAction::List { rules } => execute_list(config_path, rules, writer).await,
        RulesAction::Validate { path } => execute_validate(config_path, path, writer).await,
    }
}

async fn execute_list(
    config_path: &Path,
    rules: Option<PathBuf>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let source = RuleSource::resolve(config_path, rules, None).await?;
    info!(path = %source.path.display(), "listing rules");

    let file = source.load().await?;
    let mut report = list_report(&file)?;
    report.source = source.path.display().to_string();
    writer.render(&report)
}

async fn execute_validate(
    config_path: &Path,
    path: Option<PathBuf>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let source = RuleSource::resolve(config_path, path, None).await?;
    info!(path = %source.path.display(), "validating rules");

    let report = match source.load().await {
        Ok(file) => validate_report(&file, source.path.display().to_string()),
        Err(e) => RuleValidationReport {
            source: source.path.display().to_string(),
            valid: false,
            acl_rules: 0,
            rate_limit_rules: 0,
            errors: vec![e.to_string()],
        },
    };
    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Rule("rule file is invalid".to_owned()));
    }
    Ok(())
}

/// Compile both tables and describe every entry.
pub fn list_report(file: &RuleFile) -> Result<RuleListReport, CliError> {
    let acl = file
        .compile_acl()?
        .iter()
        .enumerate()
        .map(|(index, rule)| AclEntryReport::new(index, rule))
        .collect();
    let rate_limit = file
        .compile_rate_limits()?
        .iter()
        .enumerate()
        .map(|(index, rule)| RateLimitEntryReport::new(index, rule))
        .collect();

    Ok(RuleListReport {
        source: String::new(),
        acl,
        rate_limit,
    })
}

/// Compile both tables, collecting every failure.
pub fn validate_report(file: &RuleFile, source: String) -> RuleValidationReport {
    let mut errors = Vec::new();
    let acl_rules = file
        .compile_acl()
        .map_err(|e| errors.push(e.to_string()))
        .map_or(0, |rules| rules.len());
    let rate_limit_rules = file
        .compile_rate_limits()
        .map_err(|e| errors.push(e.to_string()))
        .map_or(0, |rules| rules.len());

    RuleValidationReport {
        source,
        valid: errors.is_empty(),
        acl_rules,
        rate_limit_rules,
        errors,
    }
}

fn v6_addr(words: [u32; 4]) -> Ipv6Addr {
    let mut octets = [0u8; 16];
    for (chunk, word) in octets.chunks_exact_mut(4).zip(words) {
        chunk.copy_from_slice(&word.to_be_bytes());
    }
    Ipv6Addr::from(octets)
}

/// Network and mask of one address family (None: family not matched by this entry).
#[derive(Serialize)]
pub struct NetMask {
    pub net: String,
    pub mask: String,
}

impl NetMask {
    fn v4(net: u32, mask: u32) -> Option<Self> {
        (mask != 0).then(|| Self {
            net: Ipv4Addr::from(net).to_string(),
            mask: Ipv4Addr::from(mask).to_string(),
        })
    }

    fn v6(net: [u32; 4], mask: [u32; 4]) -> Option<Self> {
        has_v6_mask(&mask).then(|| Self {
            net: v6_addr(net).to_string(),
            mask: v6_addr(mask).to_string(),
        })
    }
}

#[derive(Serialize)]
pub struct AclEntryReport {
    pub index: usize,
    pub action: &'static str,
    pub default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<NetMask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<NetMask>,
}

impl AclEntryReport {
    fn new(index: usize, rule: &AclRule) -> Self {
        let action = if rule.action == RuleAction::Allow.code() {
            "allow"
        } else {
            "block"
        };
        Self {
            index,
            action,
            default: rule.is_default(),
            ipv4: NetMask::v4(rule.ipv4_net, rule.ipv4_mask),
            ipv6: NetMask::v6(rule.ipv6_net, rule.ipv6_mask),
        }
    }
}

#[derive(Serialize)]
pub struct RateLimitEntryReport {
    pub index: usize,
    pub limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<NetMask>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<NetMask>,
}

impl RateLimitEntryReport {
    fn new(index: usize, rule: &RateLimitRule) -> Self {
        Self {
            index,
            limit: rule.limit,
            ipv4: NetMask::v4(rule.ipv4_net, rule.ipv4_mask),
            ipv6: NetMask::v6(rule.ipv6_net, rule.ipv6_mask),
        }
    }
}

#[derive(Serialize)]
pub struct RuleListReport {
    pub source: String,
    pub acl: Vec<AclEntryReport>,
    pub rate_limit: Vec<RateLimitEntryReport>,
}

fn write_nets(
    w: &mut dyn Write,
    ipv4: Option<&NetMask>,
    ipv6: Option<&NetMask>,
) -> std::io::Result<()> {
    for (family, net) in [("ipv4", ipv4), ("ipv6", ipv6)] {
        if let Some(net) = net {
            writeln!(w, "      {family} {} mask {}", net.net, net.mask)?;
        }
    }
    Ok(())
}

impl Render for RuleListReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rules: {}", self.source.bold())?;

        writeln!(w)?;
        writeln!(w, "ACL ({} entries)", self.acl.len())?;
        for entry in &self.acl {
            let action = match entry.action {
                "allow" => entry.action.green(),
                _ => entry.action.red(),
            };
            let scope = if entry.default { " (default)" } else { "" };
            writeln!(w, "  [{:>3}] {}{}", entry.index, action, scope.dimmed())?;
            write_nets(w, entry.ipv4.as_ref(), entry.ipv6.as_ref())?;
        }

        writeln!(w)?;
        writeln!(w, "Rate limit ({} entries)", self.rate_limit.len())?;
        for entry in &self.rate_limit {
            writeln!(w, "  [{:>3}] limit {} pkt/s", entry.index, entry.limit)?;
            write_nets(w, entry.ipv4.as_ref(), entry.ipv6.as_ref())?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub struct RuleValidationReport {
    pub source: String,
    pub valid: bool,
    pub acl_rules: usize,
    pub rate_limit_rules: usize,
    pub errors: Vec<String>,
}

impl Render for RuleValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Rule Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
            writeln!(w, "  ACL rules: {}", self.acl_rules)?;
            writeln!(w, "  Rate limit rules: {}", self.rate_limit_rules)?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
