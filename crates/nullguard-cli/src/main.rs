//! NullGuard command line: analyze a serialized program, print findings.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use nullguard_analysis::{AnalysisOptions, Analyzer};
use nullguard_diagnostics::{human, Severity};
use nullguard_ir::Program;

#[derive(Parser)]
#[command(name = "nullguard")]
#[command(about = "Path-sensitive null-safety analyzer for C++-family programs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a program emitted by the frontend bridge
    Check {
        /// Path to the serialized program (JSON)
        input: PathBuf,
        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: String,
        /// Severity threshold: info, warning, error, critical
        #[arg(long)]
        severity: Option<String>,
        /// Max diagnostics to report (0 = unlimited)
        #[arg(long, default_value_t = 0)]
        max_diagnostics: usize,
        /// Bound on explored states per function
        #[arg(long)]
        max_path_nodes: Option<usize>,
    },
    /// Explain a rule in detail
    Explain {
        /// Rule code (e.g., NULL001)
        rule: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Check {
            input,
            format,
            severity,
            max_diagnostics,
            max_path_nodes,
        } => {
            let data = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let program = Program::from_json(&data)
                .with_context(|| format!("parsing {}", input.display()))?;

            let mut options = AnalysisOptions::default();
            if let Some(n) = max_path_nodes {
                options.max_path_nodes = n;
            }
            let mut diags = Analyzer::analyze_with_options(&program, &options);

            if let Some(threshold) = severity {
                let threshold = Severity::parse(&threshold)
                    .with_context(|| format!("unknown severity `{threshold}`"))?;
                diags.retain(|d| d.severity.is_at_least(threshold));
            }
            if max_diagnostics > 0 && diags.len() > max_diagnostics {
                tracing::warn!(
                    shown = max_diagnostics,
                    total = diags.len(),
                    "truncating diagnostics"
                );
                diags.truncate(max_diagnostics);
            }

            match format.as_str() {
                "json" => println!("{}", human::format_json(&diags)),
                "human" => print!("{}", human::format_human(&diags)),
                other => anyhow::bail!("unknown format `{other}` (expected human or json)"),
            }

            if diags.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Commands::Explain { rule } => {
            match explain(&rule.to_ascii_uppercase()) {
                Some(text) => {
                    println!("{text}");
                    Ok(ExitCode::SUCCESS)
                }
                None => anyhow::bail!("unknown rule `{rule}`"),
            }
        }
    }
}

fn explain(rule: &str) -> Option<&'static str> {
    let text = match rule {
        "NULL001" => {
            "NULL001 — dereference of a nullable pointer\n\n\
             A pointer that may be null is dereferenced without a null-safety\n\
             proof on the current path. Guard the dereference (`if (p) ...`),\n\
             or accept a gsl::not_null<T> so callers prove it for you."
        }
        "NULL002" => {
            "NULL002 — nullptr dereference of a nullable pointer\n\n\
             On this path the pointer is known to be null when dereferenced,\n\
             usually after a failed guard or an explicit null assignment."
        }
        "NULL003" => {
            "NULL003 — non-nullable pointer has nullptr value\n\n\
             A gsl::not_null wrapper was observed holding null. This breaks\n\
             the wrapper's invariant; the corruption happened earlier."
        }
        "NULL004" => {
            "NULL004 — converting a nullable pointer to non-nullable\n\n\
             A nullable pointer without a proof flows into gsl::not_null.\n\
             Check it first: `if (p) take(gsl::make_not_null(p));`"
        }
        "NULL005" => {
            "NULL005 — assigning nullptr to non-nullable\n\n\
             The null literal flows directly into a gsl::not_null wrapper."
        }
        "NULL006" => {
            "NULL006 — nullable pointer is undefined\n\n\
             A pointer is read before it was ever assigned a value."
        }
        "NULL007" => {
            "NULL007 — non-nullable pointer is undefined\n\n\
             A gsl::not_null wrapper is read before initialization."
        }
        "NULL008" => {
            "NULL008 — pointer escapes as volatile\n\n\
             The pointer's address was shared with non-const volatile storage.\n\
             Its value can change at any moment, so no null-safety proof can\n\
             ever be established for it again."
        }
        _ => return None,
    };
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_known_rules() {
        for rule in [
            "NULL001", "NULL002", "NULL003", "NULL004", "NULL005", "NULL006", "NULL007", "NULL008",
        ] {
            assert!(explain(rule).is_some(), "missing explanation for {rule}");
        }
        assert!(explain("NULL999").is_none());
    }
}
