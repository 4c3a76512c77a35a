//! Output formatting for the CLI
//!
//! Every command result renders either as pretty JSON, for scripts, or as
//! colored text for a terminal.

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};

use continual_policy_core::{LatestPolicy, PolicyVersionSummary, RollbackReport, Route};

use crate::error::Result;

/// Output format options for CLI results
#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors
    #[default]
    Text,
    /// JSON format for machine processing
    Json,
}

/// A command result that can be printed
pub trait Render: Serialize {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()>;

    fn render(&self, format: OutputFormat, out: &mut dyn Write) -> Result<()> {
        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(self)?;
                writeln!(out, "{}", json)?;
            }
            OutputFormat::Text => self.render_text(out)?,
        }
        out.flush()?;
        Ok(())
    }

    /// Render to stdout
    fn print(&self, format: OutputFormat) -> Result<()> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.render(format, &mut lock)
    }
}

impl Render for Route {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{} {}", "Task type:".dimmed(), self.task_type.as_str().cyan().bold())?;
        writeln!(out, "{} {}", "Contract: ".dimmed(), self.contract_id.cyan())
    }
}

/// Assembled user prompt for a query
#[derive(Debug, Clone, Serialize)]
pub struct PromptOutput {
    pub route: Route,
    pub prompt: String,
}

impl Render for PromptOutput {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} {} -> {}",
            "Route:".dimmed(),
            self.route.task_type.as_str().cyan(),
            self.route.contract_id.cyan()
        )?;
        writeln!(out, "{}", "-".repeat(60))?;
        write!(out, "{}", self.prompt)
    }
}

impl Render for LatestPolicy {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
        match (&self.path, &self.policy) {
            (Some(path), Some(policy)) => {
                writeln!(out, "{} {}", "Active policy:".cyan().bold(), path)?;
                writeln!(out, "{}", "-".repeat(60))?;
                writeln!(out, "{}", policy)
            }
            _ => writeln!(out, "{}", "No policy committed yet".yellow()),
        }
    }
}

impl Render for RollbackReport {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "{} Rolled back to version {} ({})",
            "+".green(),
            self.rolled_back_to.to_string().bold(),
            self.path
        )
    }
}

/// Listing of committed versions
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct VersionList(pub Vec<PolicyVersionSummary>);

impl Render for VersionList {
    fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.0.is_empty() {
            return writeln!(out, "{}", "No policy versions".yellow());
        }

        writeln!(out, "{}", "Policy versions".cyan().bold())?;
        writeln!(out, "{}", "=".repeat(60))?;
        for version in &self.0 {
            let marker = if version.active { "*".green() } else { " ".normal() };
            writeln!(
                out,
                "{} {:>4}  {}  {}",
                marker,
                version.index,
                version.sha256.get(..12).unwrap_or(version.sha256.as_str()).dimmed(),
                version.path
            )?;
        }
        Ok(())
    }
}
