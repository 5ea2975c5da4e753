//! Multi-ROI analysis of one temperature field against an
//! anatomical template.
//!
//! Every ROI is rasterized and measured independently; one
//! that cannot be measured (no geometry, degenerate shape,
//! no pixel inside the field) is reported as an
//! [`AnalysisWarning`] and left out of the numbers, the rest
//! of the image is still analyzed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde_derive::*;
use tracing::{debug, info, warn};

use crate::{
    asymmetry::{AsymmetryClass, AsymmetryThresholds},
    error::{Error, Result},
    field::TemperatureField,
    geometry::rasterize,
    stats::{masked_stats, RegionStats, Stats},
    template::{AnatomicalRoi, AnatomicalTemplate},
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisWarning {
    /// The ROI could not be measured.
    Roi { name: String, reason: String },
    /// Fewer than two members of a comparison group could be
    /// measured.
    Group {
        members: Vec<String>,
        present: Vec<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RoiStats {
    pub name: String,
    #[serde(flatten)]
    pub stats: RegionStats,
}

/// Absolute difference of the mean temperatures of two ROIs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PairDelta {
    pub a: String,
    pub b: String,
    pub delta_t: f64,
    pub classification: AsymmetryClass,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GroupComparison {
    /// Members as declared in the template.
    pub members: Vec<String>,
    /// Members that could be measured, in declaration order.
    pub present: Vec<String>,
    pub temperatures: BTreeMap<String, f64>,
    pub pairs: Vec<PairDelta>,
    /// Largest of `pairs`; the first one wins ties.
    pub max_pair: PairDelta,
    pub hottest: String,
    pub coldest: String,
    pub mean_temperature: f64,
}

/// Statistics over the mean temperatures of all measured
/// ROIs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OverallStats {
    pub roi_count: usize,
    pub mean_temperature: f64,
    pub min_temperature: f64,
    pub max_temperature: f64,
    pub temperature_range: f64,
    pub std_temperature: f64,
    /// Over all unordered pairs; `0` with a single ROI.
    pub mean_delta: f64,
    /// Ties go to the lexicographically first pair.
    pub max_pair: Option<PairDelta>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MultiPointAnalysisResult {
    pub template_name: String,
    pub image_name: String,
    pub timestamp: DateTime<Utc>,
    /// Measured ROIs, in template order.
    pub roi_stats: Vec<RoiStats>,
    pub roi_temperatures: BTreeMap<String, f64>,
    pub roi_pixel_counts: BTreeMap<String, usize>,
    /// `|mean a - mean b|` for every pair of measured ROIs,
    /// in both directions; the diagonal is `0`.
    pub comparison_matrix: BTreeMap<String, BTreeMap<String, f64>>,
    pub group_comparisons: Vec<GroupComparison>,
    /// `None` when no ROI could be measured.
    pub overall_stats: Option<OverallStats>,
    pub warnings: Vec<AnalysisWarning>,
}

impl MultiPointAnalysisResult {
    pub fn delta_t(&self, a: &str, b: &str) -> Option<f64> {
        self.comparison_matrix.get(a)?.get(b).copied()
    }

    pub fn max_delta(&self) -> Option<&PairDelta> {
        self.overall_stats.as_ref()?.max_pair.as_ref()
    }

    pub fn roi(&self, name: &str) -> Option<&RegionStats> {
        self.roi_stats.iter().find(|r| r.name == name).map(|r| &r.stats)
    }
}

#[derive(Debug, Clone)]
pub struct MultiPointAnalyzer {
    thresholds: AsymmetryThresholds,
    parallel: bool,
}

impl Default for MultiPointAnalyzer {
    fn default() -> Self {
        MultiPointAnalyzer {
            thresholds: AsymmetryThresholds::default(),
            parallel: true,
        }
    }
}

impl MultiPointAnalyzer {
    pub fn new(thresholds: AsymmetryThresholds, parallel: bool) -> Result<Self> {
        thresholds.validate()?;
        Ok(MultiPointAnalyzer {
            thresholds,
            parallel,
        })
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn thresholds(&self) -> &AsymmetryThresholds {
        &self.thresholds
    }

    pub fn analyze(
        &self,
        template: &AnatomicalTemplate,
        field: &TemperatureField,
        image_name: &str,
    ) -> Result<MultiPointAnalysisResult> {
        let measured: Vec<(&AnatomicalRoi, Result<RegionStats>)> = if self.parallel {
            template
                .rois()
                .par_iter()
                .map(|roi| (roi, measure_roi(roi, field)))
                .collect()
        } else {
            template
                .rois()
                .iter()
                .map(|roi| (roi, measure_roi(roi, field)))
                .collect()
        };

        let mut warnings = vec![];
        let mut roi_stats = vec![];
        for (roi, outcome) in measured {
            let name = roi.name.as_str();
            match outcome {
                Ok(stats) => {
                    debug!(roi = name, mean = stats.mean, pixels = stats.pixel_count, "measured ROI");
                    roi_stats.push(RoiStats {
                        name: name.to_string(),
                        stats,
                    });
                }
                Err(e) => {
                    warn!(roi = name, "skipping ROI: {}", e);
                    warnings.push(AnalysisWarning::Roi {
                        name: name.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let roi_temperatures: BTreeMap<String, f64> =
            roi_stats.iter().map(|r| (r.name.clone(), r.stats.mean)).collect();
        let roi_pixel_counts = roi_stats
            .iter()
            .map(|r| (r.name.clone(), r.stats.pixel_count))
            .collect();

        let comparison_matrix = roi_temperatures
            .iter()
            .map(|(a, ta)| {
                let row = roi_temperatures
                    .iter()
                    .map(|(b, tb)| (b.clone(), if a == b { 0. } else { (ta - tb).abs() }))
                    .collect();
                (a.clone(), row)
            })
            .collect();

        let mut group_comparisons = vec![];
        for members in template.comparison_groups() {
            match self.compare_group(members, &roi_temperatures)? {
                Some(comparison) => group_comparisons.push(comparison),
                None => {
                    let present: Vec<String> = members
                        .iter()
                        .filter(|m| roi_temperatures.contains_key(*m))
                        .cloned()
                        .collect();
                    warn!(?members, ?present, "skipping comparison group");
                    warnings.push(AnalysisWarning::Group {
                        members: members.clone(),
                        present,
                    });
                }
            }
        }

        let overall_stats = self.overall_stats(&roi_temperatures)?;

        info!(
            template = template.name.as_str(),
            image = image_name,
            measured = roi_stats.len(),
            warnings = warnings.len(),
            "analysis complete"
        );

        Ok(MultiPointAnalysisResult {
            template_name: template.name.clone(),
            image_name: image_name.to_string(),
            timestamp: Utc::now(),
            roi_stats,
            roi_temperatures,
            roi_pixel_counts,
            comparison_matrix,
            group_comparisons,
            overall_stats,
            warnings,
        })
    }

    fn pair(&self, a: &str, b: &str, ta: f64, tb: f64) -> Result<PairDelta> {
        let delta_t = (ta - tb).abs();
        Ok(PairDelta {
            a: a.to_string(),
            b: b.to_string(),
            delta_t,
            classification: self.thresholds.classify(delta_t)?,
        })
    }

    /// `None` when fewer than two members were measured.
    fn compare_group(
        &self,
        members: &[String],
        temperatures: &BTreeMap<String, f64>,
    ) -> Result<Option<GroupComparison>> {
        let present: Vec<(&String, f64)> = members
            .iter()
            .filter_map(|m| temperatures.get(m).map(|&t| (m, t)))
            .collect();
        if present.len() < 2 {
            return Ok(None);
        }

        let mut pairs = vec![];
        for (i, (a, ta)) in present.iter().enumerate() {
            for (b, tb) in &present[i + 1..] {
                pairs.push(self.pair(a, b, *ta, *tb)?);
            }
        }
        let max_pair = first_max(&pairs).clone();

        let mut hottest = present[0];
        let mut coldest = present[0];
        for &(name, t) in &present[1..] {
            if t > hottest.1 {
                hottest = (name, t);
            }
            if t < coldest.1 {
                coldest = (name, t);
            }
        }
        let mean: Stats = present.iter().map(|(_, t)| *t).collect();

        Ok(Some(GroupComparison {
            members: members.to_vec(),
            present: present.iter().map(|(m, _)| m.to_string()).collect(),
            temperatures: present.iter().map(|(m, t)| (m.to_string(), *t)).collect(),
            pairs,
            max_pair,
            hottest: hottest.0.clone(),
            coldest: coldest.0.clone(),
            mean_temperature: mean.mean,
        }))
    }

    fn overall_stats(&self, temperatures: &BTreeMap<String, f64>) -> Result<Option<OverallStats>> {
        let means: Stats = temperatures.values().copied().collect();
        if means.is_empty() {
            return Ok(None);
        }

        // BTreeMap order makes the pairs lexicographic
        let entries: Vec<(&String, &f64)> = temperatures.iter().collect();
        let mut pairs = vec![];
        for (i, (a, ta)) in entries.iter().enumerate() {
            for (b, tb) in &entries[i + 1..] {
                pairs.push(self.pair(a, b, **ta, **tb)?);
            }
        }
        let deltas: Stats = pairs.iter().map(|p| p.delta_t).collect();

        Ok(Some(OverallStats {
            roi_count: means.count,
            mean_temperature: means.mean,
            min_temperature: means.min,
            max_temperature: means.max,
            temperature_range: means.max - means.min,
            std_temperature: means.std_dev(),
            mean_delta: if deltas.is_empty() { 0. } else { deltas.mean },
            max_pair: if pairs.is_empty() {
                None
            } else {
                Some(first_max(&pairs).clone())
            },
        }))
    }
}

/// First pair with the largest delta. `pairs` is non-empty.
fn first_max(pairs: &[PairDelta]) -> &PairDelta {
    let mut max = &pairs[0];
    for pair in &pairs[1..] {
        if pair.delta_t > max.delta_t {
            max = pair;
        }
    }
    max
}

fn measure_roi(roi: &AnatomicalRoi, field: &TemperatureField) -> Result<RegionStats> {
    let geometry = roi
        .geometry
        .as_ref()
        .ok_or_else(|| Error::InvalidGeometry(format!("ROI `{}` has no geometry", roi.name)))?;
    let (width, height) = field.dimensions();
    let mask = rasterize(geometry, width, height)?;
    let stats = masked_stats(field, &mask, &roi.name)?;
    if !stats.mean.is_finite() {
        return Err(Error::InvalidInput(format!(
            "ROI `{}` covers non-finite temperatures",
            roi.name
        )));
    }
    Ok(stats)
}
