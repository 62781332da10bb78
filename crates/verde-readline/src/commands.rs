//! REPL slash commands.

use anyhow::{Context, Result};
use colored::Colorize;
use verde_application::Orchestrator;
use verde_core::analysis::Metric;
use verde_core::version::{Direction, PredictionOutcome};

pub const COMMANDS: &[&str] = &["/state", "/design", "/versions", "/summary", "/best", "/help"];

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    State,
    Design,
    Versions,
    Summary,
    Best { metric: Metric, direction: Direction },
    Help,
}

impl Command {
    /// Parses a line starting with `/`.
    pub fn parse(line: &str) -> Result<Command, String> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default();
        match name {
            "/state" => Ok(Self::State),
            "/design" => Ok(Self::Design),
            "/versions" => Ok(Self::Versions),
            "/summary" => Ok(Self::Summary),
            "/help" => Ok(Self::Help),
            "/best" => {
                let rest: Vec<&str> = words.collect();
                let (metric_words, direction) = match rest.split_last() {
                    Some((last, init)) => match last.parse::<Direction>() {
                        Ok(direction) => (init.to_vec(), direction),
                        Err(_) => (rest.clone(), Direction::Min),
                    },
                    None => return Err("usage: /best <metric> [min|max]".to_string()),
                };
                let label = metric_words.join(" ");
                let metric = Metric::from_label(&label)
                    .ok_or_else(|| format!("unknown metric '{}'", label))?;
                Ok(Self::Best { metric, direction })
            }
            other => Err(format!("unknown command '{}', try /help", other)),
        }
    }

    pub async fn run(&self, orchestrator: &Orchestrator, session_id: &str) -> Result<()> {
        match self {
            Self::State => {
                let Some(session) = orchestrator.snapshot(session_id).await else {
                    println!("{}", "No session yet.".bright_black());
                    return Ok(());
                };
                println!(
                    "{}",
                    format!(
                        "state: {}  phase: {}  analysis: {}",
                        session.current_state,
                        session.phase.number(),
                        session.phase2_activated
                    )
                    .bright_cyan()
                );
            }
            Self::Design => {
                let Some(session) = orchestrator.snapshot(session_id).await else {
                    println!("{}", "No session yet.".bright_black());
                    return Ok(());
                };
                let json = serde_json::to_string_pretty(&session.design_data)
                    .context("Failed to render design data")?;
                println!("{}", json.bright_black());
                let missing = session.design_data.missing_fields();
                if !missing.is_empty() {
                    println!("{}", format!("missing: {}", missing.join(", ")).yellow());
                }
            }
            Self::Versions => {
                let records = orchestrator
                    .versions()
                    .list()
                    .await
                    .context("Failed to list versions")?;
                if records.is_empty() {
                    println!("{}", "No versions saved yet.".bright_black());
                }
                for record in records {
                    let outputs = match &record.outputs {
                        PredictionOutcome::Metrics(_) => [Metric::GwpTotal, Metric::Eui]
                            .into_iter()
                            .filter_map(|m| record.outputs.metric(m).map(|v| format!("{} {:.1}", m, v)))
                            .collect::<Vec<_>>()
                            .join(", "),
                        PredictionOutcome::Failed(reason) => reason.clone(),
                    };
                    println!(
                        "{} {} wwr={:.2} gfa={:.0}  {}",
                        record.version.to_string().bright_magenta(),
                        record.timestamp.bright_black(),
                        record.inputs.wwr,
                        record.inputs.gfa,
                        outputs
                    );
                }
            }
            Self::Summary => {
                let summary = orchestrator
                    .versions()
                    .summarize()
                    .await
                    .context("Failed to summarize versions")?;
                println!(
                    "{}",
                    format!("{} versions, {} failed", summary.versions, summary.failed).bright_cyan()
                );
                for (label, stats) in &summary.metrics {
                    println!(
                        "  {:<24} min {:>8.2}  max {:>8.2}  mean {:>8.2}",
                        label, stats.min, stats.max, stats.mean
                    );
                }
            }
            Self::Best { metric, direction } => {
                let best = orchestrator
                    .versions()
                    .best(*metric, *direction)
                    .await
                    .context("Failed to rank versions")?;
                match best {
                    Some(id) => println!("{}", format!("best {}: {}", metric, id).bright_green()),
                    None => println!("{}", format!("No version has {}.", metric).bright_black()),
                }
            }
            Self::Help => print_help(),
        }
        Ok(())
    }
}

pub fn print_help() {
    println!("{}", "Commands:".bright_yellow());
    println!("  /state                      conversation state and phase");
    println!("  /design                     current design data");
    println!("  /versions                   saved iterations");
    println!("  /summary                    min/max/mean per metric");
    println!("  /best <metric> [min|max]    best version for a metric");
    println!("  quit | exit                 leave");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_defaults_to_min() {
        assert_eq!(
            Command::parse("/best gwp").unwrap(),
            Command::Best {
                metric: Metric::GwpTotal,
                direction: Direction::Min
            }
        );
        assert_eq!(
            Command::parse("/best heating demand max").unwrap(),
            Command::Best {
                metric: Metric::HeatingDemand,
                direction: Direction::Max
            }
        );
    }

    #[test]
    fn bad_commands_are_reported() {
        assert!(Command::parse("/best").is_err());
        assert!(Command::parse("/best volume").is_err());
        assert!(Command::parse("/plan").is_err());
        assert_eq!(Command::parse("/state").unwrap(), Command::State);
    }
}
