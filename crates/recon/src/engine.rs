use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::aggregate::{grand_totals, partition_checks, time_windows, Section};
use crate::config::ReconConfig;
use crate::dataset::Dataset;
use crate::distribution::compare_distributions;
use crate::error::{ReconError, ReconWarning};
use crate::keys::{build_keys, key_digest};
use crate::model::{ReconMeta, ReconResult, SideLabels};
use crate::reconcile::reconcile;
use crate::report::{self, ReconReport};
use crate::roles::discover;
use crate::summary::{build_summary, SummaryInput};

/// Run one reconciliation of `target` (A) against `source` (B).
///
/// Inputs are cloned before any preparation; the caller's datasets are never
/// touched.
pub fn run(config: &ReconConfig, target: &Dataset, source: &Dataset) -> Result<ReconResult, ReconError> {
    config.validate()?;
    let started = Instant::now();
    let tolerance = &config.tolerance;

    info!(
        "reconciling {} target rows against {} source rows",
        target.row_count(),
        source.row_count()
    );

    // ---- Roles ----
    let discovery = discover(target, source, &config.roles)?;
    let schema = &discovery.schema;
    debug!("role discovery took {:?}", started.elapsed());

    // ---- Keys ----
    let stage = Instant::now();
    let (keys_a, keys_b) = rayon::join(
        || build_keys(&discovery.a, schema),
        || build_keys(&discovery.b, schema),
    );
    let digest_a = key_digest(&keys_a);
    let digest_b = key_digest(&keys_b);
    debug!("key building took {:?}", stage.elapsed());

    // ---- Outer join ----
    let stage = Instant::now();
    let reconciliation = reconcile(
        &discovery.a,
        &keys_a,
        &discovery.b,
        &keys_b,
        &schema.measures,
        tolerance,
    );
    debug!("reconciliation took {:?}", stage.elapsed());

    // ---- Aggregates ----
    let stage = Instant::now();
    let totals = grand_totals(&discovery.a, &discovery.b, &schema.measures, tolerance);
    let windows = time_windows(&discovery.a, &discovery.b, schema, tolerance);
    let partitions = partition_checks(
        &discovery.a,
        &discovery.b,
        schema,
        config.partition.frequency,
        tolerance,
    );
    debug!("aggregation took {:?}", stage.elapsed());

    // ---- Distribution ----
    let stage = Instant::now();
    let distribution = if config.distribution.enabled {
        Section::Available(compare_distributions(
            &discovery.a,
            &discovery.b,
            &schema.measures,
            &config.distribution,
        ))
    } else {
        Section::Unavailable {
            reason: "distribution analysis disabled".into(),
        }
    };
    debug!("distribution analysis took {:?}", stage.elapsed());

    // Discovery already warned about a missing date column
    let mut warnings = discovery.warnings.clone();
    if schema.date_column.is_some() {
        if let Some(reason) = windows.unavailable_reason() {
            let w = ReconWarning::RoleAmbiguity {
                message: format!("time windows and partitions are unavailable: {reason}"),
            };
            warn!("{w}");
            warnings.push(w);
        }
    }

    let labels = SideLabels::from_inputs(&config.inputs);
    let summary = build_summary(&SummaryInput {
        discovery: &discovery,
        counts: &reconciliation.counts,
        key_digests: (&digest_a, &digest_b),
        warnings: &warnings,
        labels: &labels,
    });

    let c = &reconciliation.counts;
    info!(
        "{} keys: {} match, {} value mismatch, {} only in A, {} only in B",
        c.total_keys, c.matched, c.value_mismatches, c.only_in_a, c.only_in_b
    );
    debug!("run took {:?}", started.elapsed());

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
            labels,
            rows_a: discovery.a.row_count(),
            rows_b: discovery.b.row_count(),
            outcomes: reconciliation.counts.clone(),
            key_digest_a: digest_a,
            key_digest_b: digest_b,
        },
        schema: discovery.schema.clone(),
        warnings,
        summary,
        grand_totals: totals,
        time_windows: windows,
        partitions,
        distribution,
        reconciliation,
        target: discovery.a,
        source: discovery.b,
    })
}

/// Like [`run`], but always returns the full table set. Errors and panics
/// become a failure report instead of propagating.
pub fn run_report(config: &ReconConfig, target: &Dataset, source: &Dataset) -> ReconReport {
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run(config, target, source).map(|result| report::assemble(&result))
    }));

    let message = match outcome {
        Ok(Ok(report)) => return report,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            ReconError::EngineFailure(detail).to_string()
        }
    };

    error!("reconciliation failed: {message}");
    report::failure(&message, target, &SideLabels::from_inputs(&config.inputs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RolesConfig;
    use crate::dataset::Column;
    use crate::reconcile::Outcome;
    use crate::report::{ANNOTATED_TARGET, SUMMARY, TABLE_NAMES};

    fn orders(regions: &[&str], amounts: &[f64]) -> Dataset {
        Dataset::new(vec![
            Column::text("region", regions.iter().map(|r| Some(*r))),
            Column::numeric("amount", amounts.iter().map(|a| Some(*a))),
        ])
        .unwrap()
    }

    #[test]
    fn run_without_dates_degrades_windows() {
        let a = orders(&["east", "west"], &[10.0, 20.0]);
        let b = orders(&["east", "north"], &[10.0, 5.0]);
        let result = run(&ReconConfig::default(), &a, &b).unwrap();

        assert_eq!(result.reconciliation.counts.total_keys, 3);
        assert_eq!(result.reconciliation.counts.matched, 1);
        assert!(result.time_windows.unavailable_reason().is_some());
        assert!(result.partitions.unavailable_reason().is_some());
        assert!(result.has_differences());
        assert_eq!(result.meta.engine_version, env!("CARGO_PKG_VERSION"));
        assert_eq!(result.meta.key_digest_a.len(), 64);
        assert!(result
            .warnings
            .iter()
            .any(|w| matches!(w, ReconWarning::RoleAmbiguity { .. })));
    }

    #[test]
    fn identical_inputs_have_no_differences() {
        let a = orders(&["east", "west"], &[10.0, 20.0]);
        let result = run(&ReconConfig::default(), &a, &a).unwrap();
        assert!(!result.has_differences());
        assert!(result
            .reconciliation
            .records
            .iter()
            .all(|r| r.outcome == Outcome::Match));
        assert_eq!(result.meta.key_digest_a, result.meta.key_digest_b);
    }

    #[test]
    fn disabled_distribution_is_unavailable() {
        let a = orders(&["east"], &[1.0]);
        let mut config = ReconConfig::default();
        config.distribution.enabled = false;
        let result = run(&config, &a, &a).unwrap();
        assert_eq!(
            result.distribution.unavailable_reason(),
            Some("distribution analysis disabled")
        );
    }

    #[test]
    fn report_on_error_keeps_every_table() {
        let a = Dataset::new(vec![Column::numeric("amount", [Some(1.0), Some(2.0)])]).unwrap();
        let b = Dataset::new(vec![Column::numeric("amount", [Some(1.0)])]).unwrap();
        let config = ReconConfig {
            roles: RolesConfig {
                synthesize_dimension: false,
            },
            ..ReconConfig::default()
        };

        let report = run_report(&config, &a, &b);
        assert!(report.error.is_some());
        assert!(report.meta.is_none());
        for name in TABLE_NAMES {
            assert!(report.table(name).is_some(), "missing table {name}");
        }
        let summary = report.table(SUMMARY).unwrap();
        assert_eq!(summary.rows.len(), 1);
        assert_eq!(summary.rows[0][0], "ERROR");

        let annotated = report.table(ANNOTATED_TARGET).unwrap();
        assert_eq!(annotated.rows.len(), 2);
        assert_eq!(annotated.cell(0, "validation_status").unwrap(), "ERROR");
    }

    #[test]
    fn invalid_config_is_reported_not_raised() {
        let a = orders(&["east"], &[1.0]);
        let mut config = ReconConfig::default();
        config.tolerance.atol = -1.0;
        assert!(matches!(run(&config, &a, &a), Err(ReconError::ConfigValidation(_))));
        assert!(run_report(&config, &a, &a).error.is_some());
    }
}
