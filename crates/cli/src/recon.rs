//! `migcheck run | validate | roles`: config-driven reconciliation of two CSV snapshots.

use std::path::{Path, PathBuf};

use migcheck_recon::config::{ReconConfig, RolesConfig};
use migcheck_recon::load::load_csv_file;
use migcheck_recon::report::SUMMARY;
use migcheck_recon::roles::discover;
use migcheck_recon::{run_report, Dataset, ReconReport};

use crate::exit_codes::{EXIT_DIFFERENCES, EXIT_INVALID_CONFIG, EXIT_RUNTIME, EXIT_USAGE};
use crate::export;
use crate::CliError;

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

pub struct RunArgs {
    pub config: PathBuf,
    pub target: Option<PathBuf>,
    pub source: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,
    pub json: bool,
    pub output: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config + inputs
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(path)
        .map_err(|e| recon_err(EXIT_RUNTIME, format!("cannot read config {}: {e}", path.display())))?;
    ReconConfig::from_toml(&config_str).map_err(|e| recon_err(EXIT_INVALID_CONFIG, e.to_string()))
}

/// A flag wins over the config; config paths are relative to the config file.
fn resolve_input(
    flag: Option<PathBuf>,
    configured: Option<&str>,
    config_path: &Path,
    side: &str,
) -> Result<PathBuf, CliError> {
    if let Some(path) = flag {
        return Ok(path);
    }
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    configured.map(|p| base_dir.join(p)).ok_or_else(|| CliError {
        code: EXIT_USAGE,
        message: format!("no {side} file given"),
        hint: Some(format!("pass --{side} <FILE> or set inputs.{side} in the config")),
    })
}

fn load_input(path: &Path) -> Result<Dataset, CliError> {
    let ds = load_csv_file(path).map_err(|e| recon_err(EXIT_RUNTIME, e.to_string()))?;
    tracing::info!("loaded {} rows x {} columns from {}", ds.row_count(), ds.columns().len(), path.display());
    Ok(ds)
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let target_path = resolve_input(args.target, config.inputs.target.as_deref(), &args.config, "target")?;
    let source_path = resolve_input(args.source, config.inputs.source.as_deref(), &args.config, "source")?;

    let target = load_input(&target_path)?;
    let source = load_input(&source_path)?;

    let report = run_report(&config, &target, &source);

    // Outputs are written before deciding the exit code, failed runs included
    if let Some(ref dir) = args.out_dir {
        let written = export::write_tables_csv(&report, dir)?;
        eprintln!("wrote {} tables to {}", written.len(), dir.display());
    }

    if args.json || args.output.is_some() {
        let json_str = export::report_json(&report)?;
        if let Some(ref path) = args.output {
            std::fs::write(path, &json_str)
                .map_err(|e| recon_err(EXIT_RUNTIME, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }
        if args.json {
            println!("{json_str}");
        }
    }

    print_human_summary(&report);

    if let Some(ref message) = report.error {
        return Err(recon_err(EXIT_RUNTIME, format!("reconciliation failed: {message}")));
    }
    if report.has_differences {
        return Err(recon_err(EXIT_DIFFERENCES, ""));
    }
    Ok(())
}

fn print_human_summary(report: &ReconReport) {
    let Some(ref meta) = report.meta else {
        return;
    };
    let c = &meta.outcomes;
    eprintln!(
        "{} vs {}: {} rows vs {} rows, {} keys: {} matched, {} value mismatches, {} only in {}, {} only in {}",
        meta.labels.target,
        meta.labels.source,
        meta.rows_a,
        meta.rows_b,
        c.total_keys,
        c.matched,
        c.value_mismatches,
        c.only_in_a,
        meta.labels.target,
        c.only_in_b,
        meta.labels.source,
    );

    let warnings = report
        .table(SUMMARY)
        .map(|t| {
            t.rows
                .iter()
                .filter(|r| r.first().and_then(|c| c.as_str()) == Some("Warnings"))
                .count()
        })
        .unwrap_or(0);
    if warnings > 0 {
        eprintln!("{warnings} warning(s); see the summary table");
    }
    eprintln!(
        "{}",
        if report.has_differences { "result: DIFFERENCES" } else { "result: MATCH" }
    );
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(&config_path)?;
    eprintln!(
        "config OK: {} (atol={}, rtol={}, partition={}, distribution={})",
        config.name.as_deref().unwrap_or("<unnamed>"),
        config.tolerance.atol,
        config.tolerance.rtol,
        config.partition.frequency,
        if config.distribution.enabled { "on" } else { "off" },
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// roles
// ---------------------------------------------------------------------------

pub fn cmd_roles(target: PathBuf, source: PathBuf, json: bool) -> Result<(), CliError> {
    let a = load_input(&target)?;
    let b = load_input(&source)?;
    let discovery = discover(&a, &b, &RolesConfig::default())
        .map_err(|e| recon_err(EXIT_RUNTIME, e.to_string()))?;

    for w in &discovery.warnings {
        eprintln!("warning: {w}");
    }

    if json {
        let json_str = serde_json::to_string_pretty(&discovery.schema)
            .map_err(|e| recon_err(EXIT_RUNTIME, format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        for (name, role) in discovery.schema.roles() {
            println!("{name}\t{role}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_overrides_config_path() {
        let config = Path::new("/etc/migcheck/orders.recon.toml");
        let flagged = resolve_input(Some("x.csv".into()), Some("y.csv"), config, "target").unwrap();
        assert_eq!(flagged, PathBuf::from("x.csv"));

        let configured = resolve_input(None, Some("y.csv"), config, "target").unwrap();
        assert_eq!(configured, PathBuf::from("/etc/migcheck/y.csv"));
    }

    #[test]
    fn missing_input_is_a_usage_error() {
        let err = resolve_input(None, None, Path::new("c.toml"), "source").unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
        assert!(err.hint.unwrap().contains("--source"));
    }
}
