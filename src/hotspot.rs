//! Automatic detection of hot regions, without drawn ROIs.
//!
//! The field is thresholded into a mask of hot pixels, the
//! mask is cleaned with a morphological opening and then a
//! closing (5x5 disk), and the 8-connected components left
//! are measured. Components smaller than
//! [`HotspotConfig::min_region_size`] are dropped; the rest
//! are ranked hottest first and the first
//! [`HotspotConfig::max_regions`] are kept.

use std::collections::VecDeque;

use itertools::iproduct;
use ndarray::{Array2, Zip};
use serde_derive::*;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    field::TemperatureField,
    geometry::{Bounds, Mask, RegionGeometry},
    stats::{percentile, RegionStats},
    template::{AnatomicalRoi, RegionType},
};

/// Side length of the adaptive threshold neighbourhood.
const ADAPTIVE_BLOCK: usize = 11;
/// Added to the local mean (on the 0..=255 scale) by the
/// adaptive threshold.
const ADAPTIVE_OFFSET: f64 = 5.;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Hot means at least the configured percentile of the
    /// field.
    Percentile,
    /// Otsu's threshold over the field rescaled to 0..=255.
    Otsu,
    /// Above a Gaussian-weighted local mean.
    Adaptive,
}

impl Default for ThresholdMethod {
    fn default() -> Self {
        ThresholdMethod::Percentile
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct HotspotConfig {
    pub method: ThresholdMethod,
    /// Percentile (`0..=100`) used by
    /// [`ThresholdMethod::Percentile`].
    pub percentile_threshold: f64,
    /// In pixels.
    pub min_region_size: usize,
    pub max_regions: usize,
}

impl Default for HotspotConfig {
    fn default() -> Self {
        HotspotConfig {
            method: ThresholdMethod::Percentile,
            percentile_threshold: 80.,
            min_region_size: 100,
            max_regions: 2,
        }
    }
}

impl HotspotConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0. ..=100.).contains(&self.percentile_threshold) {
            return Err(Error::InvalidInput(format!(
                "hotspot percentile must be within 0..=100, got {}",
                self.percentile_threshold
            )));
        }
        if self.max_regions == 0 {
            return Err(Error::InvalidInput("hotspot max_regions must be at least 1".into()));
        }
        Ok(())
    }
}

/// Which half of the image a hotspot's centroid lies in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Hotspot {
    /// Inclusive pixel bounds `(x0, y0, x1, y1)`.
    pub bounds: Bounds,
    /// Mean pixel position `(x, y)`.
    pub centroid: (f64, f64),
    pub side: Side,
    #[serde(flatten)]
    pub stats: RegionStats,
}

impl Hotspot {
    /// An ROI covering the hotspot's bounding box, so it can
    /// be added to a template and measured like a drawn one.
    pub fn to_roi<S: Into<String>>(&self, name: S) -> AnatomicalRoi {
        let (x0, y0, x1, y1) = self.bounds;
        let location = match self.side {
            Side::Left => "left",
            Side::Right => "right",
        };
        AnatomicalRoi::new(name, RegionType::Custom)
            .with_geometry(RegionGeometry::rectangle(
                (x0 as i32, y0 as i32),
                (x1 as i32, y1 as i32),
            ))
            .with_location(location)
            .with_notes(format!(
                "detected hotspot, {} px, mean {:.2} °C",
                self.stats.pixel_count, self.stats.mean
            ))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HotspotDetector {
    config: HotspotConfig,
}

impl HotspotDetector {
    pub fn new(config: HotspotConfig) -> Result<Self> {
        config.validate()?;
        Ok(HotspotDetector { config })
    }

    pub fn config(&self) -> &HotspotConfig {
        &self.config
    }

    /// Hot regions of `field`, hottest (by mean) first.
    pub fn detect(&self, field: &TemperatureField) -> Vec<Hotspot> {
        let values = field.values();
        if values.is_empty() {
            return vec![];
        }

        let mask = match self.config.method {
            ThresholdMethod::Percentile => threshold_percentile(values, self.config.percentile_threshold),
            ThresholdMethod::Otsu => threshold_otsu(values),
            ThresholdMethod::Adaptive => threshold_adaptive(values),
        };
        let mask = close(&open(&mask));

        let width = field.width() as f64;
        let mut hotspots: Vec<Hotspot> = components(&mask)
            .into_iter()
            .filter(|pixels| pixels.len() >= self.config.min_region_size)
            .filter_map(|pixels| measure(values, &pixels, width))
            .collect();
        hotspots.sort_by(|a, b| b.stats.mean.total_cmp(&a.stats.mean));
        hotspots.truncate(self.config.max_regions);

        info!(method = ?self.config.method, found = hotspots.len(), "detected hotspots");
        for h in &hotspots {
            debug!(side = ?h.side, mean = h.stats.mean, pixels = h.stats.pixel_count, "hotspot");
        }
        hotspots
    }

    /// Mean temperature of the hottest hotspot on each side,
    /// `(left, right)`.
    pub fn detect_left_right(&self, field: &TemperatureField) -> (Option<f64>, Option<f64>) {
        let hotspots = self.detect(field);
        let hottest = |side: Side| hotspots.iter().find(|h| h.side == side).map(|h| h.stats.mean);
        (hottest(Side::Left), hottest(Side::Right))
    }
}

fn measure(values: &Array2<f64>, pixels: &[(usize, usize)], width: f64) -> Option<Hotspot> {
    let x0 = pixels.iter().map(|p| p.0).min()?;
    let x1 = pixels.iter().map(|p| p.0).max()?;
    let y0 = pixels.iter().map(|p| p.1).min()?;
    let y1 = pixels.iter().map(|p| p.1).max()?;
    let n = pixels.len() as f64;
    let cx = pixels.iter().map(|p| p.0 as f64).sum::<f64>() / n;
    let cy = pixels.iter().map(|p| p.1 as f64).sum::<f64>() / n;

    let stats = RegionStats::from_values(pixels.iter().map(|&(x, y)| values[(y, x)]).collect())?;
    Some(Hotspot {
        bounds: (x0 as i64, y0 as i64, x1 as i64, y1 as i64),
        centroid: (cx, cy),
        side: if cx < width / 2. { Side::Left } else { Side::Right },
        stats,
    })
}

fn threshold_percentile(values: &Array2<f64>, q: f64) -> Mask {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_unstable_by(f64::total_cmp);
    let threshold = percentile(&sorted, q);
    debug!(percentile = q, threshold, "percentile threshold");
    values.mapv(|v| v >= threshold)
}

/// The field rescaled linearly so its finite minimum maps to
/// 0 and its maximum to 255, truncated to whole levels. A
/// flat field is all 0.
fn levels(values: &Array2<f64>) -> Array2<u8> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let range = hi - lo;
    values.mapv(|v| {
        if !(range > 0.) || !v.is_finite() {
            0
        } else {
            ((v - lo) / range * 255.) as u8
        }
    })
}

fn threshold_otsu(values: &Array2<f64>) -> Mask {
    let levels = levels(values);
    let mut histogram = [0usize; 256];
    for &l in levels.iter() {
        histogram[l as usize] += 1;
    }

    let total = levels.len() as f64;
    let weighted_total: f64 = histogram.iter().enumerate().map(|(l, &c)| l as f64 * c as f64).sum();
    let (mut below, mut weighted_below) = (0., 0.);
    let (mut best, mut best_variance) = (0u8, -1.);
    for (l, &c) in histogram.iter().enumerate() {
        below += c as f64;
        weighted_below += l as f64 * c as f64;
        let above = total - below;
        if below == 0. || above == 0. {
            continue;
        }
        let mean_below = weighted_below / below;
        let mean_above = (weighted_total - weighted_below) / above;
        let variance = below * above * (mean_below - mean_above).powi(2);
        if variance > best_variance {
            best_variance = variance;
            best = l as u8;
        }
    }
    debug!(level = best, "otsu threshold");
    levels.mapv(|l| l > best)
}

fn threshold_adaptive(values: &Array2<f64>) -> Mask {
    let levels = levels(values).mapv(f64::from);
    let local_mean = gaussian_blur(&levels, ADAPTIVE_BLOCK);
    Zip::from(&levels)
        .and(&local_mean)
        .map_collect(|&l, &m| l > m + ADAPTIVE_OFFSET)
}

/// Separable Gaussian blur with a `size`-tap kernel, edge
/// pixels replicated past the border.
fn gaussian_blur(image: &Array2<f64>, size: usize) -> Array2<f64> {
    let radius = (size / 2) as isize;
    let sigma = 0.3 * ((size as f64 - 1.) * 0.5 - 1.) + 0.8;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|i| (-((i * i) as f64) / (2. * sigma * sigma)).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);

    let (rows, cols) = image.dim();
    let clamp = |i: isize, n: usize| i.max(0).min(n as isize - 1) as usize;
    let horizontal = Array2::from_shape_fn((rows, cols), |(r, c)| {
        kernel
            .iter()
            .zip(-radius..=radius)
            .map(|(k, d)| k * image[(r, clamp(c as isize + d, cols))])
            .sum::<f64>()
    });
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        kernel
            .iter()
            .zip(-radius..=radius)
            .map(|(k, d)| k * horizontal[(clamp(r as isize + d, rows), c)])
            .sum::<f64>()
    })
}

/// Offsets `(dx, dy)` of a 5x5 disk: the full square minus
/// the corners of the top and bottom rows.
fn disk() -> impl Iterator<Item = (isize, isize)> {
    iproduct!(-2isize..=2, -2isize..=2).filter(|&(dy, dx)| dy.abs() < 2 || dx == 0).map(|(dy, dx)| (dx, dy))
}

/// Erosion (`all`) or dilation (`any`) of `mask` by the disk.
/// Neighbours past the border are ignored.
fn morph(mask: &Mask, erode: bool) -> Mask {
    let (rows, cols) = mask.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let mut neighbours = disk().filter_map(|(dx, dy)| {
            let (x, y) = (c as isize + dx, r as isize + dy);
            if x < 0 || y < 0 || x >= cols as isize || y >= rows as isize {
                None
            } else {
                Some(mask[(y as usize, x as usize)])
            }
        });
        if erode {
            neighbours.all(|b| b)
        } else {
            neighbours.any(|b| b)
        }
    })
}

fn open(mask: &Mask) -> Mask {
    morph(&morph(mask, true), false)
}

fn close(mask: &Mask) -> Mask {
    morph(&morph(mask, false), true)
}

/// 8-connected components of `mask`, each as its `(x, y)`
/// pixels in row-major order. Components are listed in the
/// row-major order of their first pixel.
fn components(mask: &Mask) -> Vec<Vec<(usize, usize)>> {
    let (rows, cols) = mask.dim();
    let mut seen = Array2::from_elem((rows, cols), false);
    let mut found = vec![];

    for (y, x) in iproduct!(0..rows, 0..cols) {
        if !mask[(y, x)] || seen[(y, x)] {
            continue;
        }
        seen[(y, x)] = true;
        let mut pixels = vec![];
        let mut queue = VecDeque::from(vec![(x, y)]);
        while let Some((x, y)) = queue.pop_front() {
            pixels.push((x, y));
            for (dy, dx) in iproduct!(-1isize..=1, -1isize..=1) {
                let (nx, ny) = (x as isize + dx, y as isize + dy);
                if nx < 0 || ny < 0 || nx >= cols as isize || ny >= rows as isize {
                    continue;
                }
                let (nx, ny) = (nx as usize, ny as usize);
                if mask[(ny, nx)] && !seen[(ny, nx)] {
                    seen[(ny, nx)] = true;
                    queue.push_back((nx, ny));
                }
            }
        }
        pixels.sort_unstable_by_key(|&(x, y)| (y, x));
        found.push(pixels);
    }
    found
}
