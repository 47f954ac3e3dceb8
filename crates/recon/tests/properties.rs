// Property-based tests for key building and reconciliation.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use std::collections::BTreeSet;

use proptest::prelude::*;

use migcheck_recon::config::ReconConfig;
use migcheck_recon::keys::build_keys;
use migcheck_recon::roles::discover;
use migcheck_recon::{run, Column, Dataset, Outcome};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Small alphabet so dimension combinations collide and duplicates are common.
fn arb_dimension() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        6 => prop::sample::select(vec!["east", "west", "a|b", "a\\", ""]).prop_map(|s| Some(s.to_string())),
        1 => Just(None),
    ]
}

fn arb_measure() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        6 => (-5i32..5).prop_map(|v| Some(v as f64 / 2.0)),
        1 => Just(None),
    ]
}

type Rows = Vec<(Option<String>, Option<String>, Option<f64>, Option<f64>)>;

fn arb_rows(max: usize) -> impl Strategy<Value = Rows> {
    prop::collection::vec((arb_dimension(), arb_dimension(), arb_measure(), arb_measure()), 0..max)
}

fn dataset(rows: &Rows) -> Dataset {
    Dataset::new(vec![
        Column::text("region", rows.iter().map(|r| r.0.clone())),
        Column::text("desk", rows.iter().map(|r| r.1.clone())),
        Column::numeric("qty", rows.iter().map(|r| r.2)),
        Column::numeric("amount", rows.iter().map(|r| r.3)),
    ])
    .unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn keys_are_deterministic_and_unique(rows in arb_rows(30)) {
        let ds = dataset(&rows);
        let discovery = discover(&ds, &ds, &Default::default()).unwrap();
        let first = build_keys(&discovery.a, &discovery.schema);
        let second = build_keys(&discovery.a, &discovery.schema);

        prop_assert_eq!(first.keys(), second.keys());
        let distinct: BTreeSet<_> = first.keys().iter().collect();
        prop_assert_eq!(distinct.len(), rows.len());
    }

    #[test]
    fn runs_are_repeatable(a in arb_rows(20), b in arb_rows(20)) {
        let (a, b) = (dataset(&a), dataset(&b));
        let config = ReconConfig::default();
        let r1 = run(&config, &a, &b).unwrap();
        let r2 = run(&config, &a, &b).unwrap();

        prop_assert_eq!(&r1.meta.key_digest_a, &r2.meta.key_digest_a);
        prop_assert_eq!(&r1.meta.key_digest_b, &r2.meta.key_digest_b);
        prop_assert_eq!(&r1.reconciliation, &r2.reconciliation);
        prop_assert_eq!(&r1.grand_totals, &r2.grand_totals);
    }

    #[test]
    fn outcomes_partition_the_key_union(a in arb_rows(20), b in arb_rows(20)) {
        let (ds_a, ds_b) = (dataset(&a), dataset(&b));
        let result = run(&ReconConfig::default(), &ds_a, &ds_b).unwrap();

        let discovery = discover(&ds_a, &ds_b, &Default::default()).unwrap();
        let keys_a = build_keys(&discovery.a, &discovery.schema);
        let keys_b = build_keys(&discovery.b, &discovery.schema);
        let union: BTreeSet<_> = keys_a.keys().iter().chain(keys_b.keys()).cloned().collect();

        let seen: Vec<_> = result.reconciliation.records.iter().map(|r| r.key.clone()).collect();
        let seen_set: BTreeSet<_> = seen.iter().cloned().collect();
        prop_assert_eq!(seen.len(), seen_set.len(), "duplicate key in output");
        prop_assert_eq!(&seen_set, &union);

        let c = &result.reconciliation.counts;
        prop_assert_eq!(c.matched + c.value_mismatches + c.only_in_a + c.only_in_b, union.len());
        prop_assert_eq!(c.only_in_a, union.iter().filter(|k| !keys_b.contains(k)).count());
        prop_assert_eq!(c.only_in_b, union.iter().filter(|k| !keys_a.contains(k)).count());
    }

    #[test]
    fn swapping_sides_negates_differences(a in arb_rows(20), b in arb_rows(20)) {
        let (a, b) = (dataset(&a), dataset(&b));
        let config = ReconConfig::default();
        let fwd = run(&config, &a, &b).unwrap();
        let rev = run(&config, &b, &a).unwrap();

        prop_assert_eq!(fwd.reconciliation.records.len(), rev.reconciliation.records.len());
        for (f, r) in fwd.reconciliation.records.iter().zip(&rev.reconciliation.records) {
            prop_assert_eq!(&f.key, &r.key);
            let mirrored = match f.outcome {
                Outcome::OnlyInA => Outcome::OnlyInB,
                Outcome::OnlyInB => Outcome::OnlyInA,
                other => other,
            };
            prop_assert_eq!(mirrored, r.outcome);
            for (fm, rm) in f.measures.iter().zip(&r.measures) {
                prop_assert_eq!(fm.matches, rm.matches);
                prop_assert_eq!(fm.difference.map(|d| -d), rm.difference);
            }
        }

        for (f, r) in fwd.grand_totals.iter().zip(&rev.grand_totals) {
            prop_assert_eq!(f.matches, r.matches);
            prop_assert_eq!(f.difference, -r.difference);
        }
    }
}
