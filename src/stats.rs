//! Running statistics over temperature values.
//!
//! [`Stats`] is an accumulator that can be fed values one at
//! a time (`stats += value`) and merged with another
//! accumulator (`stats += &other`), which makes it usable
//! as the fold/reduce state of a parallel iterator. The
//! variance is tracked with Welford's update and merged
//! with Chan's pairwise formula.

use std::ops::AddAssign;

use ndarray::Zip;
use serde_derive::*;

use crate::{
    error::{Error, Result},
    field::TemperatureField,
    geometry::Mask,
};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub count: usize,
    pub mean: f64,
    m2: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            mean: 0.,
            m2: 0.,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Stats {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Population variance (`ddof = 0`).
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

impl AddAssign<f64> for Stats {
    fn add_assign(&mut self, val: f64) {
        self.count += 1;
        let delta = val - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (val - self.mean);
        self.min = self.min.min(val);
        self.max = self.max.max(val);
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        let n1 = self.count as f64;
        let n2 = other.count as f64;
        let total = n1 + n2;
        let delta = other.mean - self.mean;

        self.mean += delta * n2 / total;
        self.m2 += other.m2 + delta * delta * n1 * n2 / total;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

impl std::iter::FromIterator<f64> for Stats {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        let mut stats = Stats::default();
        for val in iter {
            stats += val;
        }
        stats
    }
}

/// Aggregate statistics of a temperature field inside a
/// region.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RegionStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
    pub median: f64,
    /// 25th percentile.
    pub q25: f64,
    /// 75th percentile.
    pub q75: f64,
    pub pixel_count: usize,
}

impl RegionStats {
    /// Statistics of `values`, which are accumulated in the
    /// order given and then sorted for the percentiles.
    /// Returns `None` when `values` is empty.
    pub fn from_values(mut values: Vec<f64>) -> Option<Self> {
        let stats: Stats = values.iter().copied().collect();
        if stats.is_empty() {
            return None;
        }
        values.sort_unstable_by(f64::total_cmp);
        Some(RegionStats {
            mean: stats.mean,
            min: stats.min,
            max: stats.max,
            std_dev: stats.std_dev(),
            median: percentile(&values, 50.),
            q25: percentile(&values, 25.),
            q75: percentile(&values, 75.),
            pixel_count: stats.count,
        })
    }
}

/// The `q`-th percentile (`0..=100`) of ascending `sorted`,
/// interpolating linearly between the two nearest ranks.
/// `NaN` for an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let rank = q.max(0.).min(100.) / 100. * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Compute statistics of `field` over the pixels selected by
/// `mask`.
///
/// Fails with [`Error::EmptyRegion`] when the mask selects
/// nothing; a small region is fine, an empty one is not.
/// The values are visited in row-major order, so the result
/// is deterministic.
pub fn region_stats(field: &TemperatureField, mask: &Mask) -> Result<RegionStats> {
    masked_stats(field, mask, "<unnamed>")
}

pub(crate) fn masked_stats(field: &TemperatureField, mask: &Mask, name: &str) -> Result<RegionStats> {
    if mask.dim() != field.values().dim() {
        return Err(Error::MaskShapeMismatch {
            mask: mask.dim(),
            field: field.values().dim(),
        });
    }

    let mut values = Vec::new();
    Zip::from(field.values()).and(mask).for_each(|&temp, &inside| {
        if inside {
            values.push(temp);
        }
    });

    RegionStats::from_values(values).ok_or_else(|| Error::EmptyRegion(name.to_string()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use super::*;

    #[test]
    fn accumulates_population_moments() {
        let stats: Stats = vec![2., 4., 4., 4., 5., 5., 7., 9.].into_iter().collect();
        assert_eq!(stats.count, 8);
        assert_relative_eq!(stats.mean, 5., epsilon = 1e-12);
        assert_relative_eq!(stats.std_dev(), 2., epsilon = 1e-12);
        assert_eq!(stats.min, 2.);
        assert_eq!(stats.max, 9.);
    }

    #[test]
    fn merge_matches_single_pass() {
        let values: Vec<f64> = (0..100).map(|i| 30. + (i as f64 * 0.37).sin()).collect();
        let whole: Stats = values.iter().copied().collect();

        let mut left: Stats = values[..37].iter().copied().collect();
        let right: Stats = values[37..].iter().copied().collect();
        left += &right;

        assert_eq!(left.count, whole.count);
        assert_relative_eq!(left.mean, whole.mean, epsilon = 1e-12);
        assert_relative_eq!(left.variance(), whole.variance(), epsilon = 1e-12);
        assert_eq!(left.min, whole.min);
        assert_eq!(left.max, whole.max);
    }

    #[test]
    fn merging_empty_is_identity() {
        let mut stats: Stats = vec![1., 2.].into_iter().collect();
        let before = stats;
        stats += &Stats::default();
        assert_eq!(stats, before);

        let mut empty = Stats::default();
        empty += &before;
        assert_eq!(empty, before);
    }

    #[test]
    fn region_stats_over_mask() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(3, 2, vec![30., 31., 32., 33., 34., 35.])?;
        let mut mask = Array2::from_elem((2, 3), false);
        mask[(0, 1)] = true;
        mask[(1, 2)] = true;

        let stats = region_stats(&field, &mask)?;
        assert_eq!(stats.pixel_count, 2);
        assert_relative_eq!(stats.mean, 33.);
        assert_eq!(stats.min, 31.);
        assert_eq!(stats.max, 35.);
        assert_relative_eq!(stats.std_dev, 2.);
        assert_relative_eq!(stats.median, 33.);
        assert_relative_eq!(stats.q25, 32.);
        assert_relative_eq!(stats.q75, 34.);
        Ok(())
    }

    #[test]
    fn percentiles_interpolate_between_ranks() {
        let sorted = [1., 2., 3., 4.];
        assert_relative_eq!(percentile(&sorted, 50.), 2.5);
        assert_relative_eq!(percentile(&sorted, 25.), 1.75);
        assert_relative_eq!(percentile(&sorted, 75.), 3.25);
        assert_eq!(percentile(&sorted, 0.), 1.);
        assert_eq!(percentile(&sorted, 100.), 4.);
        assert_eq!(percentile(&[7.], 80.), 7.);
        assert!(percentile(&[], 50.).is_nan());
    }

    #[test]
    fn region_percentiles_ignore_visit_order() -> anyhow::Result<()> {
        let stats = RegionStats::from_values(vec![36., 30., 31., 33., 35.])
            .ok_or_else(|| anyhow::anyhow!("no values"))?;
        assert_eq!(stats.pixel_count, 5);
        assert_eq!(stats.median, 33.);
        assert_eq!(stats.q25, 31.);
        assert_eq!(stats.q75, 35.);
        assert!(RegionStats::from_values(vec![]).is_none());
        Ok(())
    }

    #[test]
    fn empty_mask_is_an_error() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(2, 2, vec![30.; 4])?;
        let mask = Array2::from_elem((2, 2), false);
        assert!(matches!(region_stats(&field, &mask), Err(Error::EmptyRegion(_))));
        Ok(())
    }

    #[test]
    fn mask_shape_must_match() -> anyhow::Result<()> {
        let field = TemperatureField::from_shape_vec(2, 2, vec![30.; 4])?;
        let mask = Array2::from_elem((3, 2), true);
        assert!(matches!(
            region_stats(&field, &mask),
            Err(Error::MaskShapeMismatch { .. })
        ));
        Ok(())
    }
}
