//! Writes a report's tables to disk: one CSV per table, or one JSON document.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;

use migcheck_recon::{ReconReport, Table};

use crate::exit_codes::EXIT_RUNTIME;
use crate::CliError;

/// Plain-text rendering of a cell. Null becomes an empty field.
fn render_cell(cell: &Json) -> String {
    match cell {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn write_table_csv(table: &Table, path: &Path) -> Result<(), CliError> {
    let io_err = |e: csv::Error| CliError {
        code: EXIT_RUNTIME,
        message: format!("cannot write {}: {e}", path.display()),
        hint: None,
    };

    let mut writer = csv::Writer::from_path(path).map_err(io_err)?;
    writer.write_record(&table.columns).map_err(io_err)?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(render_cell))
            .map_err(io_err)?;
    }
    writer.flush().map_err(|e| io_err(e.into()))?;
    Ok(())
}

/// Write every table as `<out_dir>/<table name>.csv`, creating the directory.
/// Tables are written even when the run failed, so consumers always find the
/// full set.
pub fn write_tables_csv(report: &ReconReport, out_dir: &Path) -> Result<Vec<PathBuf>, CliError> {
    fs::create_dir_all(out_dir).map_err(|e| CliError {
        code: EXIT_RUNTIME,
        message: format!("cannot create {}: {e}", out_dir.display()),
        hint: None,
    })?;

    let mut written = Vec::with_capacity(report.tables.len());
    for table in &report.tables {
        let path = out_dir.join(format!("{}.csv", table.name));
        write_table_csv(table, &path)?;
        tracing::debug!("wrote {} rows to {}", table.rows.len(), path.display());
        written.push(path);
    }
    Ok(written)
}

pub fn report_json(report: &ReconReport) -> Result<String, CliError> {
    serde_json::to_string_pretty(report).map_err(|e| CliError {
        code: EXIT_RUNTIME,
        message: format!("JSON serialization error: {e}"),
        hint: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use migcheck_recon::config::ReconConfig;
    use migcheck_recon::report::TABLE_NAMES;
    use migcheck_recon::{run_report, Column, Dataset};
    use serde_json::json;

    #[test]
    fn cells_render_as_plain_text() {
        assert_eq!(render_cell(&Json::Null), "");
        assert_eq!(render_cell(&json!("Match")), "Match");
        assert_eq!(render_cell(&json!(12.5)), "12.5");
        assert_eq!(render_cell(&json!(3)), "3");
        assert_eq!(render_cell(&json!(true)), "true");
    }

    #[test]
    fn writes_one_csv_per_table() {
        let ds = Dataset::new(vec![
            Column::text("region", [Some("east"), Some("west")]),
            Column::numeric("amount", [Some(1.5), None]),
        ])
        .unwrap();
        let report = run_report(&ReconConfig::default(), &ds, &ds);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("tables");
        let written = write_tables_csv(&report, &out).unwrap();
        assert_eq!(written.len(), TABLE_NAMES.len());

        let annotated = fs::read_to_string(out.join("annotated_target.csv")).unwrap();
        let lines: Vec<&str> = annotated.lines().collect();
        assert_eq!(lines[0], "region,amount,validation_status,mismatch_details");
        assert_eq!(lines[1], "east,1.5,Match,");
        assert_eq!(lines[2], "west,,Match,");

        // Unavailable sections still get a header row
        let windows = fs::read_to_string(out.join("time_windows.csv")).unwrap();
        assert_eq!(windows.lines().count(), 1);
    }
}
