mod common;
mod logic;
mod scenarios;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use rngtrack_core::EngineConfig;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use common::{parse_seed, split_csv};
use logic::{ScenarioResult, ScenarioRunner};
use scenarios::{get_scenario, list_scenarios};

#[derive(Debug, Parser)]
#[command(name = "rngtrack-tester", version = "0.1.0")]
#[command(about = "Scenario runner for the RNG Track outcome tracker engine")]
struct Args {
    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated; words are hashed)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 10)]
    iterations: usize,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Engine configuration JSON (defaults apply to missing fields)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if list_requested(&args)? {
        return Ok(());
    }

    announce_banner();

    let started = Instant::now();
    let config = load_config(args.config.as_deref())?;
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds: Vec<u64> = split_csv(&args.seeds).iter().map(|s| parse_seed(s)).collect();
    let runner = ScenarioRunner::new(config, args.verbose);

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for name in &scenarios {
        let Some(scenario) = get_scenario(name) else {
            eprintln!("⚠️  Unknown scenario: {}", name.yellow());
            continue;
        };
        all_results.extend(
            runner
                .run_scenario(scenario.as_ref(), &seeds, args.iterations)
                .await,
        );
    }

    write_reports(&args, &all_results, started)?;

    if all_results.iter().any(|result| !result.passed) {
        std::process::exit(1);
    }

    Ok(())
}

fn list_requested(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut out = open_output(args.output.as_deref())?;
    writeln!(out, "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(out, "  {key:20} - {description}")?;
    }
    out.flush()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "🎲 RNG Track Scenario Tester".bright_cyan().bold());
    println!("{}", "============================".cyan());
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default_config());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = EngineConfig::from_json(&json)
        .with_context(|| format!("invalid engine config in {}", path.display()))?;
    log::info!("loaded engine config from {}", path.display());
    Ok(config)
}

/// Comma-separated names, with `all` standing for the whole catalog.
fn expand_scenarios(raw: &str) -> Vec<String> {
    let requested = split_csv(raw);
    if !requested.iter().any(|name| name == "all") {
        return requested;
    }
    let mut names: Vec<String> = requested.into_iter().filter(|name| name != "all").collect();
    for (name, _) in list_scenarios() {
        if !names.iter().any(|known| known == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn write_reports(args: &Args, results: &[ScenarioResult], started: Instant) -> Result<()> {
    let mut out = open_output(args.output.as_deref())?;

    match (args.report.as_str(), results.is_empty()) {
        ("json", true) => writeln!(out, "[]")?,
        ("json", false) => logic::reports::generate_json_report(&mut out, results)?,
        ("markdown", true) => {
            writeln!(out, "# RNG Track Scenario Results\n\n_No scenarios executed._")?;
        }
        ("markdown", false) => {
            logic::reports::generate_markdown_report(&mut out, results, Utc::now())?;
        }
        (_, empty) => {
            if empty {
                writeln!(out, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(&mut out, results, started.elapsed())?;
            }
            writeln!(out)?;
            writeln!(out, "🏁 Finished in {:?}", started.elapsed())?;
        }
    }

    out.flush()?;
    Ok(())
}

/// Report sink: the file named by `--output`, or stdout.
fn open_output(path: Option<&Path>) -> Result<BufWriter<Box<dyn Write>>> {
    let sink: Box<dyn Write> = match path {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("cannot create {}", path.display()))?,
        ),
        None => Box::new(stdout()),
    };
    Ok(BufWriter::new(sink))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_expands_to_every_scenario_once() {
        let expanded = expand_scenarios("rare-drop, all");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert_eq!(expanded[0], "rare-drop");
    }

    #[test]
    fn missing_config_path_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default_config());
    }

    #[test]
    fn config_file_overrides_fields() {
        let path = std::env::temp_dir().join(format!(
            "rngtrack-config-{}.json",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        std::fs::write(&path, r#"{ "bulk_limit": 50, "import_policy": "exclude" }"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.bulk_limit, 50);
        assert_eq!(config.import_policy, rngtrack_core::ImportPolicy::Exclude);
        assert_eq!(config.min_search_len, 3);
    }
}
