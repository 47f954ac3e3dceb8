use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::windows::PartitionFrequency;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub roles: RolesConfig,
    #[serde(default)]
    pub partition: PartitionConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// File locations are only read by the CLI; the engine uses the labels.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputsConfig {
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default = "default_target_label")]
    pub target_label: String,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

fn default_target_label() -> String {
    "Target".into()
}

fn default_source_label() -> String {
    "Source".into()
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            target: None,
            source: None,
            target_label: default_target_label(),
            source_label: default_source_label(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ToleranceConfig {
    #[serde(default = "default_tolerance")]
    pub atol: f64,
    #[serde(default = "default_tolerance")]
    pub rtol: f64,
}

fn default_tolerance() -> f64 {
    1e-9
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            atol: default_tolerance(),
            rtol: default_tolerance(),
        }
    }
}

impl ToleranceConfig {
    /// Combined absolute + relative closeness. Two missing values are equal,
    /// one missing value never is.
    pub fn is_close(&self, a: Option<f64>, b: Option<f64>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => self.values_close(a, b),
            _ => false,
        }
    }

    fn values_close(&self, a: f64, b: f64) -> bool {
        if a == b {
            // Also covers equal infinities
            return true;
        }
        if !a.is_finite() || !b.is_finite() {
            return false;
        }
        // Scaled by the larger magnitude so the test is symmetric in (a, b)
        (a - b).abs() <= self.atol + self.rtol * a.abs().max(b.abs())
    }
}

// ---------------------------------------------------------------------------
// Roles, partitions, distribution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RolesConfig {
    /// Introduce a constant `ALL` dimension when no column is shared.
    #[serde(default = "default_true")]
    pub synthesize_dimension: bool,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            synthesize_dimension: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartitionConfig {
    #[serde(default)]
    pub frequency: PartitionFrequency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    #[default]
    KolmogorovSmirnov,
    DecileApproximation,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistributionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub test: DriftTest,
    #[serde(default = "default_psi_bins")]
    pub psi_bins: usize,
    #[serde(default = "default_p_value_threshold")]
    pub p_value_threshold: f64,
    #[serde(default = "default_psi_threshold")]
    pub psi_threshold: f64,
}

fn default_true() -> bool {
    true
}

fn default_psi_bins() -> usize {
    10
}

fn default_p_value_threshold() -> f64 {
    0.05
}

fn default_psi_threshold() -> f64 {
    0.1
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test: DriftTest::default(),
            psi_bins: default_psi_bins(),
            p_value_threshold: default_p_value_threshold(),
            psi_threshold: default_psi_threshold(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let tol = &self.tolerance;
        for (name, value) in [("atol", tol.atol), ("rtol", tol.rtol)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "tolerance.{name} must be a finite non-negative number, got {value}"
                )));
            }
        }

        let dist = &self.distribution;
        if dist.psi_bins == 0 {
            return Err(ReconError::ConfigValidation(
                "distribution.psi_bins must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&dist.p_value_threshold) {
            return Err(ReconError::ConfigValidation(format!(
                "distribution.p_value_threshold must be within [0, 1], got {}",
                dist.p_value_threshold
            )));
        }
        if !dist.psi_threshold.is_finite() || dist.psi_threshold < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "distribution.psi_threshold must be a finite non-negative number, got {}",
                dist.psi_threshold
            )));
        }

        let inputs = &self.inputs;
        if inputs.target_label.trim().is_empty() || inputs.source_label.trim().is_empty() {
            return Err(ReconError::ConfigValidation(
                "inputs.target_label and inputs.source_label must not be empty".into(),
            ));
        }
        if inputs.target_label == inputs.source_label {
            return Err(ReconError::ConfigValidation(format!(
                "inputs.target_label and inputs.source_label must differ (both '{}')",
                inputs.target_label
            )));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "orders migration"

[inputs]
target = "gcp.csv"
source = "edw.csv"
target_label = "GCP"
source_label = "EDW"

[tolerance]
atol = 0.01
rtol = 0.0

[roles]
synthesize_dimension = false

[partition]
frequency = "quarterly"

[distribution]
test = "decile_approximation"
psi_bins = 20
p_value_threshold = 0.01
psi_threshold = 0.25
"#;

    #[test]
    fn parse_full() {
        let config = ReconConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name.as_deref(), Some("orders migration"));
        assert_eq!(config.inputs.target.as_deref(), Some("gcp.csv"));
        assert_eq!(config.inputs.source_label, "EDW");
        assert_eq!(config.tolerance.atol, 0.01);
        assert_eq!(config.tolerance.rtol, 0.0);
        assert!(!config.roles.synthesize_dimension);
        assert_eq!(config.partition.frequency, PartitionFrequency::Quarterly);
        assert_eq!(config.distribution.test, DriftTest::DecileApproximation);
        assert_eq!(config.distribution.psi_bins, 20);
        assert!(config.distribution.enabled);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ReconConfig::from_toml("").unwrap();
        assert_eq!(config.tolerance.atol, 1e-9);
        assert_eq!(config.tolerance.rtol, 1e-9);
        assert_eq!(config.partition.frequency, PartitionFrequency::Monthly);
        assert_eq!(config.distribution.psi_bins, 10);
        assert_eq!(config.distribution.p_value_threshold, 0.05);
        assert_eq!(config.distribution.psi_threshold, 0.1);
        assert_eq!(config.distribution.test, DriftTest::KolmogorovSmirnov);
        assert_eq!(config.inputs.target_label, "Target");
        assert_eq!(config.inputs.source_label, "Source");
        assert!(config.roles.synthesize_dimension);
    }

    #[test]
    fn reject_negative_tolerance() {
        let err = ReconConfig::from_toml("[tolerance]\natol = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("tolerance.atol"));
    }

    #[test]
    fn reject_zero_bins() {
        let err = ReconConfig::from_toml("[distribution]\npsi_bins = 0\n").unwrap_err();
        assert!(err.to_string().contains("psi_bins"));
    }

    #[test]
    fn reject_equal_labels() {
        let input = "[inputs]\ntarget_label = \"X\"\nsource_label = \"X\"\n";
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn reject_unknown_frequency() {
        let err = ReconConfig::from_toml("[partition]\nfrequency = \"fortnightly\"\n");
        assert!(matches!(err, Err(ReconError::ConfigParse(_))));
    }

    #[test]
    fn reject_unknown_key() {
        let err = ReconConfig::from_toml("[tolerance]\nabs = 1.0\n");
        assert!(err.is_err(), "typo in tolerance key should fail deserialization");
    }

    #[test]
    fn closeness_rules() {
        let tol = ToleranceConfig::default();
        assert!(tol.is_close(None, None));
        assert!(!tol.is_close(Some(1.0), None));
        assert!(!tol.is_close(None, Some(0.0)));
        assert!(tol.is_close(Some(100.0), Some(100.000_000_000_5)));
        assert!(!tol.is_close(Some(100.0), Some(101.0)));
        assert!(tol.is_close(Some(f64::INFINITY), Some(f64::INFINITY)));
        assert!(!tol.is_close(Some(f64::INFINITY), Some(f64::NEG_INFINITY)));
    }

    #[test]
    fn closeness_is_symmetric() {
        let tol = ToleranceConfig { atol: 0.0, rtol: 0.1 };
        // |a-b| = 1; 0.1 * max(10, 9) = 1.0
        assert_eq!(tol.is_close(Some(10.0), Some(9.0)), tol.is_close(Some(9.0), Some(10.0)));
        assert!(tol.is_close(Some(10.0), Some(9.0)));
    }
}
