// palisade/src/main.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Infrastructure (Config & Adapters)
use palisade_core::infrastructure::adapters::{
    JsonStatsSink, LogNotificationSink, ParquetOutputSink, YamlRuleSource,
};
use palisade_core::infrastructure::config::{SourceFormat, load_gate_config};
use palisade_core::infrastructure::engine::{DataFusionEngine, sanitize_identifier};

// Domain (state rendered by the CLI)
use palisade_core::domain::context::RunStats;
use palisade_core::domain::rules::Rule;

// Application (Use Cases)
use palisade_core::application::{GateOptions, NotificationSettings, QualityGate};

#[derive(Parser)]
#[command(name = "palisade")]
#[command(about = "The Declarative Data Quality Gate Engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 🚀 Runs the data quality gate (Source -> Rules -> Gated Output)
    Run {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },

    /// 🧪 Validates the rules file and lists the loaded rules
    Rules {
        /// Project directory
        #[arg(long, default_value = ".")]
        project_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Setup Logging (Tracing)
    // RUST_LOG=debug palisade run ... pour voir les détails
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        // --- USE CASE: RUN THE GATE ---
        Commands::Run { project_dir } => {
            let start = std::time::Instant::now();

            // A. Load the Config (Infra)
            println!("⚙️  Loading configuration...");
            let config = load_gate_config(&project_dir)?;
            println!(
                "   Product: {} | Table: {}",
                config.product_id, config.table
            );

            // B. Instantiate the engine and register the source dataset
            let engine = DataFusionEngine::new();
            let source_path = project_dir.join(&config.source.path);
            let source_name = sanitize_identifier(&config.table);
            let path_str = source_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Invalid source path: {:?}", source_path))?;
            match config.source.format {
                SourceFormat::Csv => engine.register_csv(&source_name, path_str).await?,
                SourceFormat::Parquet => engine.register_parquet(&source_name, path_str).await?,
            }

            // C. Wire the collaborators (dependency injection)
            let target_dir = project_dir.join(&config.target_path);
            let rules = YamlRuleSource::new(project_dir.join(&config.rules_path));
            let stats = JsonStatsSink::new(&target_dir);
            let notifier = LogNotificationSink;
            let output = ParquetOutputSink::new(&target_dir);
            let gate = QualityGate::new(&engine, &rules, &stats, &notifier, &output);

            let mut options = GateOptions::new(&config.product_id, &config.table);
            options.target_table_view = config.target_table_view.clone();
            options.write_to_table = config.write_to_table;
            options.write_error_records = config.write_error_records;
            options.write_options = config.output_options.clone();
            options.error_table_options = config.error_table_options.clone();
            options.notifications = NotificationSettings {
                on_start: config.notifications.on_start,
                on_completion: config.notifications.on_completion,
                on_fail: config.notifications.on_fail,
                on_error_drop_breach: config.notifications.on_error_drop_breach,
                error_drop_threshold: config.notifications.error_drop_threshold,
            };

            println!("🟢 Running the quality gate...");
            let result = gate
                .run(&options, || async {
                    Ok(engine.table(&source_name).await?)
                })
                .await;

            match result {
                Ok(outcome) => {
                    print_run_summary(&outcome.stats);
                    if outcome.passed {
                        println!("\n✨ SUCCESS! Gate passed in {:.2?}", start.elapsed());
                    } else {
                        eprintln!("\n❌ FAILURE. The data quality gate rejected this run.");
                        // Exit with error code for CI/CD
                        std::process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("\n💥 CRITICAL GATE ERROR: {}", e);
                    std::process::exit(1);
                }
            }
        }

        // --- USE CASE: VALIDATE & LIST RULES ---
        Commands::Rules { project_dir } => {
            let config = load_gate_config(&project_dir)?;
            let source = YamlRuleSource::new(project_dir.join(&config.rules_path));

            match source.load_all() {
                Ok(rules) => {
                    print_rules(&rules);
                    println!("✨ {} rules loaded successfully!", rules.len());
                }
                Err(e) => {
                    eprintln!("❌ Rules file invalid: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn print_run_summary(stats: &RunStats) {
    let mut table = comfy_table::Table::new();
    table.set_header(vec!["Stage", "Status", "Duration (s)"]);
    for (name, report) in [
        ("source_agg_dq", &stats.source_agg_dq),
        ("source_query_dq", &stats.source_query_dq),
        ("row_dq", &stats.row_dq),
        ("final_agg_dq", &stats.final_agg_dq),
        ("final_query_dq", &stats.final_query_dq),
    ] {
        table.add_row(vec![
            name.to_string(),
            report.status.to_string(),
            format!("{:.3}", report.duration_secs),
        ]);
    }
    println!("{table}");
    println!(
        "   Input: {} | Errors: {} | Output: {}",
        stats.input_count, stats.error_count, stats.output_count
    );
}

fn print_rules(rules: &[Rule]) {
    let mut table = comfy_table::Table::new();
    table.set_header(vec!["Rule", "Type", "Action", "Expectation"]);
    for rule in rules {
        table.add_row(vec![
            rule.name.clone(),
            rule.rule_type.to_string(),
            rule.action_if_failed.to_string(),
            rule.expectation.clone(),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};

    #[test]
    fn test_cli_parse_run_defaults() -> Result<()> {
        let args = Cli::parse_from(["palisade", "run"]);
        match args.command {
            Commands::Run { project_dir } => {
                assert_eq!(project_dir.to_string_lossy(), ".");
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_project_dir() -> Result<()> {
        let args = Cli::parse_from(["palisade", "run", "--project-dir", "/tmp"]);
        match args.command {
            Commands::Run { project_dir } => {
                assert_eq!(project_dir.to_string_lossy(), "/tmp");
                Ok(())
            }
            _ => bail!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_rules() -> Result<()> {
        let args = Cli::parse_from(["palisade", "rules", "--project-dir", "/srv/dq"]);
        match args.command {
            Commands::Rules { project_dir } => {
                assert_eq!(project_dir.to_string_lossy(), "/srv/dq");
                Ok(())
            }
            _ => bail!("Expected Rules command"),
        }
    }
}
