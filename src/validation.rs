//! Comparing system-computed ROI temperatures against the
//! measurements of a reference tool for the same image.

use std::collections::BTreeMap;

use serde_derive::*;
use tracing::{info, warn};

use crate::{
    analysis::MultiPointAnalysisResult,
    error::{Error, Result},
    matching::{MatchKind, NameMatcher},
    reference::ReferenceSet,
    stats::Stats,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// `|difference|` strictly below this is `ok`.
    pub tolerance_ok: f64,
    /// `|difference|` strictly below this (and not `ok`) is a
    /// `warning`; anything else is an `error`.
    pub tolerance_warning: f64,
    /// Reference temperatures closer to zero than this leave
    /// the relative error undefined.
    pub relative_epsilon: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig {
            tolerance_ok: 0.5,
            tolerance_warning: 1.0,
            relative_epsilon: 1e-6,
        }
    }
}

impl ValidationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance_ok > 0. && self.tolerance_ok <= self.tolerance_warning) {
            return Err(Error::InvalidInput(format!(
                "tolerances must satisfy 0 < ok <= warning, got {} and {}",
                self.tolerance_ok, self.tolerance_warning
            )));
        }
        if !(self.relative_epsilon >= 0.) {
            return Err(Error::InvalidInput(format!(
                "relative epsilon must be non-negative, got {}",
                self.relative_epsilon
            )));
        }
        Ok(())
    }

    pub fn status(&self, difference: f64) -> ValidationStatus {
        let abs = difference.abs();
        if abs < self.tolerance_ok {
            ValidationStatus::Ok
        } else if abs < self.tolerance_warning {
            ValidationStatus::Warning
        } else {
            ValidationStatus::Error
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Ok,
    Warning,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationResult {
    /// Name on the reference side.
    pub roi_name: String,
    /// Name on the system side it was matched with.
    pub system_name: String,
    pub match_kind: MatchKind,
    pub reference_temp: f64,
    pub system_temp: f64,
    /// `system_temp - reference_temp`.
    pub difference: f64,
    /// `difference / reference_temp`; `None` when the
    /// reference temperature is too close to zero.
    pub relative_error: Option<f64>,
    pub status: ValidationStatus,
    /// `(min, max)` reported by the reference tool.
    pub reference_range: (f64, f64),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationStatistics {
    pub mean_abs_diff: f64,
    pub max_abs_diff: f64,
    pub min_abs_diff: f64,
    /// Population standard deviation of the signed
    /// differences.
    pub std_dev_diff: f64,
    pub mean_diff: f64,
    /// Over the pairs whose relative error is defined.
    pub mean_abs_relative_error: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub image_filename: String,
    pub results: Vec<ValidationResult>,
    pub total_reference_rois: usize,
    pub matched_count: usize,
    pub unmatched_reference_names: Vec<String>,
    pub unmatched_system_names: Vec<String>,
    /// `None` when nothing matched.
    pub statistics: Option<ValidationStatistics>,
}

impl ValidationReport {
    /// Share of the reference ROIs that were matched. Unmatched
    /// reference ROIs count as missed coverage.
    pub fn accuracy(&self) -> f64 {
        if self.total_reference_rois == 0 {
            return 0.;
        }
        self.matched_count as f64 / self.total_reference_rois as f64
    }

    pub fn status_counts(&self) -> BTreeMap<ValidationStatus, usize> {
        let mut counts = BTreeMap::new();
        for result in &self.results {
            *counts.entry(result.status).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    config: ValidationConfig,
    matcher: NameMatcher,
}

impl ValidationEngine {
    pub fn new(config: ValidationConfig, matcher: NameMatcher) -> Result<Self> {
        config.validate()?;
        Ok(ValidationEngine { config, matcher })
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validate `system_temps` (ROI name to mean °C) against
    /// the reference image named `image_filename`.
    pub fn validate(
        &self,
        reference: &ReferenceSet,
        system_temps: &BTreeMap<String, f64>,
        image_filename: &str,
    ) -> Result<ValidationReport> {
        let image = reference
            .image(image_filename)
            .ok_or_else(|| Error::ImageNotInReference(image_filename.to_string()))?;

        let (system_names, system_values): (Vec<&str>, Vec<f64>) =
            system_temps.iter().map(|(k, &v)| (k.as_str(), v)).unzip();
        let reference_names: Vec<&str> = image.measurements.iter().map(|m| m.roi_name.as_str()).collect();
        let matches = self.matcher.match_names(&system_names, &reference_names);

        let mut results = Vec::with_capacity(matches.pairs.len());
        for pair in &matches.pairs {
            let measurement = &image.measurements[pair.reference_index];
            let system_temp = system_values[pair.system_index];
            let reference_temp = measurement.mean_temp;
            let difference = system_temp - reference_temp;
            let relative_error = if reference_temp.abs() < self.config.relative_epsilon {
                None
            } else {
                Some(difference / reference_temp)
            };
            let status = self.config.status(difference);
            if status == ValidationStatus::Error {
                warn!(
                    roi = pair.reference.as_str(),
                    reference_temp, system_temp, "ROI outside validation tolerance"
                );
            }
            results.push(ValidationResult {
                roi_name: pair.reference.clone(),
                system_name: pair.system.clone(),
                match_kind: pair.kind,
                reference_temp,
                system_temp,
                difference,
                relative_error,
                status,
                reference_range: (measurement.min_temp, measurement.max_temp),
            });
        }

        let report = ValidationReport {
            image_filename: image_filename.to_string(),
            total_reference_rois: image.measurements.len(),
            matched_count: results.len(),
            statistics: statistics(&results),
            results,
            unmatched_reference_names: matches.unmatched_reference,
            unmatched_system_names: matches.unmatched_system,
        };
        info!(
            image = image_filename,
            matched = report.matched_count,
            total = report.total_reference_rois,
            "validated against reference"
        );
        Ok(report)
    }

    /// Validate the ROI means of an analysis against the
    /// reference image with the same name.
    pub fn validate_analysis(
        &self,
        reference: &ReferenceSet,
        result: &MultiPointAnalysisResult,
    ) -> Result<ValidationReport> {
        self.validate(reference, &result.roi_temperatures, &result.image_name)
    }
}

fn statistics(results: &[ValidationResult]) -> Option<ValidationStatistics> {
    if results.is_empty() {
        return None;
    }
    let diffs: Stats = results.iter().map(|r| r.difference).collect();
    let abs_diffs: Stats = results.iter().map(|r| r.difference.abs()).collect();
    let relative: Stats = results
        .iter()
        .filter_map(|r| r.relative_error)
        .map(f64::abs)
        .collect();

    Some(ValidationStatistics {
        mean_abs_diff: abs_diffs.mean,
        max_abs_diff: abs_diffs.max,
        min_abs_diff: abs_diffs.min,
        std_dev_diff: diffs.std_dev(),
        mean_diff: diffs.mean,
        mean_abs_relative_error: if relative.is_empty() {
            None
        } else {
            Some(relative.mean)
        },
    })
}
