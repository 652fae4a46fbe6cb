//! Retention thresholds.
//!
//! A [`RetentionConfig`] is loaded once per run, validated, and passed by
//! reference into every component. Nothing in the engine reads thresholds
//! from the environment.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Days per month used when converting the compressed retention window.
pub const DAYS_PER_MONTH: i64 = 30;

/// Named retention thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionConfig {
    /// Raw data older than this is archived into monthly blobs
    pub raw_retention_days: u32,
    /// Processed data older than this is reported as expired
    pub processed_retention_days: u32,
    /// Best-ranked model artifacts kept in the models folder
    pub models_to_keep: usize,
    /// Total model artifacts retained (primary plus backup tier)
    pub backup_models_to_keep: usize,
    /// Compressed archives older than this many months are deleted
    pub compressed_retention_months: u32,
    /// Usage above this triggers emergency reclamation
    #[serde(rename = "maxStorageGB")]
    pub max_storage_gb: f64,
    /// File extensions that identify model artifacts
    pub model_extensions: Vec<String>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_retention_days: 30,
            processed_retention_days: 90,
            models_to_keep: 3,
            backup_models_to_keep: 5,
            compressed_retention_months: 12,
            max_storage_gb: 12.0,
            model_extensions: vec!["h5".to_string()],
        }
    }
}

impl RetentionConfig {
    /// Check the invariants the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.models_to_keep > self.backup_models_to_keep {
            return Err(invalid(format!(
                "modelsToKeep ({}) must not exceed backupModelsToKeep ({})",
                self.models_to_keep, self.backup_models_to_keep
            )));
        }
        if self.raw_retention_days == 0 {
            return Err(invalid("rawRetentionDays must be at least 1".to_string()));
        }
        if !self.max_storage_gb.is_finite() || self.max_storage_gb <= 0.0 {
            return Err(invalid(format!(
                "maxStorageGB must be a positive number, got {}",
                self.max_storage_gb
            )));
        }
        if self.model_extensions.iter().any(|e| e.trim().is_empty()) {
            return Err(invalid("modelExtensions must not contain empty entries".to_string()));
        }
        Ok(())
    }

    /// Size of the backup tier.
    pub fn backup_tier_size(&self) -> usize {
        self.backup_models_to_keep.saturating_sub(self.models_to_keep)
    }

    /// Age after which raw files are archived.
    pub fn raw_window(&self) -> Duration {
        Duration::days(i64::from(self.raw_retention_days))
    }

    /// Age after which processed files count as expired.
    pub fn processed_window(&self) -> Duration {
        Duration::days(i64::from(self.processed_retention_days))
    }

    /// Age after which compressed archives are deleted.
    pub fn compressed_window(&self) -> Duration {
        Duration::days(i64::from(self.compressed_retention_months) * DAYS_PER_MONTH)
    }

    /// Whether a file name carries one of the model extensions.
    pub fn is_model_artifact(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.model_extensions.iter().any(|ext| {
            let ext = ext.trim_start_matches('.').to_lowercase();
            lower.ends_with(&format!(".{ext}"))
        })
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidConfig { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = RetentionConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.backup_tier_size(), 2);
        assert_eq!(cfg.compressed_window(), Duration::days(360));
    }

    #[test]
    fn test_rejects_inverted_model_tiers() {
        let cfg = RetentionConfig {
            models_to_keep: 6,
            backup_models_to_keep: 5,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_rejects_bad_quota() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let cfg = RetentionConfig {
                max_storage_gb: bad,
                ..Default::default()
            };
            assert!(cfg.validate().is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_model_artifact_matching() {
        let cfg = RetentionConfig {
            model_extensions: vec!["h5".into(), ".keras".into()],
            ..Default::default()
        };
        assert!(cfg.is_model_artifact("lstm_2024-03-01.h5"));
        assert!(cfg.is_model_artifact("LSTM.H5"));
        assert!(cfg.is_model_artifact("net.keras"));
        assert!(!cfg.is_model_artifact("model_metrics.json"));
        assert!(!cfg.is_model_artifact("weights.h5.bak"));
    }

    #[test]
    fn test_serde_field_names() {
        let json = serde_json::to_value(RetentionConfig::default()).unwrap();
        assert_eq!(json["rawRetentionDays"], 30);
        assert_eq!(json["maxStorageGB"], 12.0);

        let partial: RetentionConfig =
            serde_json::from_str(r#"{"modelsToKeep": 2, "backupModelsToKeep": 4}"#).unwrap();
        assert_eq!(partial.models_to_keep, 2);
        assert_eq!(partial.raw_retention_days, 30);
    }
}
