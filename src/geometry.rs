//! Region geometry and rasterization into pixel masks.
//!
//! Coordinates are integer pixel positions `(x, y)` with
//! the origin at the top-left corner of the image. A
//! geometry may extend past (or lie entirely outside) the
//! image; it is clipped when rasterized.
//!
//! # Fill rules
//!
//! - Rectangles include both corners.
//! - Ellipses include `(x, y)` iff
//!   `((x - cx) / rx)² + ((y - cy) / ry)² <= 1`.
//! - Polygons are filled with the even-odd rule, sampled at
//!   integer pixel coordinates. Pixels lying exactly on an
//!   edge are inside. Self-intersecting outlines therefore
//!   leave the doubly-covered parts empty.

use itertools::iproduct;
use ndarray::Array2;
use serde_derive::*;

use crate::error::{Error, Result};

/// Pixel membership mask, indexed `(row, col)` like
/// [`TemperatureField`][crate::field::TemperatureField].
pub type Mask = Array2<bool>;

/// A pixel position. Serialized as an `[x, y]` pair.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "(i32, i32)", into = "(i32, i32)")]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Point { x, y }
    }
}

impl From<Point> for (i32, i32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RegionGeometry {
    Polygon {
        points: Vec<Point>,
    },
    Rectangle {
        top_left: Point,
        bottom_right: Point,
    },
    Ellipse {
        center: Point,
        radius_x: u32,
        radius_y: u32,
    },
}

/// Inclusive pixel bounds `(x0, y0, x1, y1)`.
pub type Bounds = (i64, i64, i64, i64);

/// A validated geometry: its bounds and a membership test.
struct Region<'a> {
    bounds: Bounds,
    contains: Box<dyn Fn(i64, i64) -> bool + 'a>,
}

impl RegionGeometry {
    pub fn rectangle(top_left: (i32, i32), bottom_right: (i32, i32)) -> Self {
        RegionGeometry::Rectangle {
            top_left: top_left.into(),
            bottom_right: bottom_right.into(),
        }
    }

    pub fn ellipse(center: (i32, i32), radius_x: u32, radius_y: u32) -> Self {
        RegionGeometry::Ellipse {
            center: center.into(),
            radius_x,
            radius_y,
        }
    }

    pub fn polygon<I: IntoIterator<Item = (i32, i32)>>(points: I) -> Self {
        RegionGeometry::Polygon {
            points: points.into_iter().map(Point::from).collect(),
        }
    }

    /// Check the geometry encloses a non-zero area.
    pub fn validate(&self) -> Result<()> {
        self.region().map(|_| ())
    }

    /// Inclusive pixel bounds `(x0, y0, x1, y1)`, before
    /// clipping to an image.
    pub fn bounding_box(&self) -> Result<Bounds> {
        Ok(self.region()?.bounds)
    }

    /// Pixels `(x, y)` covered by the geometry, row by row,
    /// without clipping.
    pub fn pixels(&self) -> Result<impl Iterator<Item = (i64, i64)> + '_> {
        let region = self.region()?;
        let (x0, y0, x1, y1) = region.bounds;
        Ok(iproduct!(y0..=y1, x0..=x1)
            .filter(move |&(y, x)| (region.contains)(x, y))
            .map(|(y, x)| (x, y)))
    }

    /// Area of the continuous shape. Rectangles measure
    /// between their corners, so a `w x h` rectangle has area
    /// `w * h` but covers `(w + 1)(h + 1)` pixels; polygons
    /// use the shoelace formula.
    pub fn analytic_area(&self) -> f64 {
        match self {
            RegionGeometry::Rectangle {
                top_left,
                bottom_right,
            } => {
                let (x0, x1) = ordered(top_left.x, bottom_right.x);
                let (y0, y1) = ordered(top_left.y, bottom_right.y);
                (x1 - x0) as f64 * (y1 - y0) as f64
            }
            RegionGeometry::Ellipse {
                radius_x, radius_y, ..
            } => std::f64::consts::PI * *radius_x as f64 * *radius_y as f64,
            RegionGeometry::Polygon { points } => {
                let n = points.len();
                let twice: i128 = (0..n)
                    .map(|i| {
                        let (a, b) = (as_i64(&points[i]), as_i64(&points[(i + 1) % n]));
                        a.0 as i128 * b.1 as i128 - b.0 as i128 * a.1 as i128
                    })
                    .sum();
                twice.abs() as f64 / 2.
            }
        }
    }

    fn region(&self) -> Result<Region<'_>> {
        match self {
            RegionGeometry::Rectangle {
                top_left,
                bottom_right,
            } => {
                let (x0, x1) = ordered(top_left.x, bottom_right.x);
                let (y0, y1) = ordered(top_left.y, bottom_right.y);
                if x0 == x1 || y0 == y1 {
                    return Err(Error::InvalidGeometry(format!(
                        "rectangle {:?}-{:?} has zero area",
                        top_left, bottom_right
                    )));
                }
                Ok(Region {
                    bounds: (x0, y0, x1, y1),
                    contains: Box::new(|_, _| true),
                })
            }
            RegionGeometry::Ellipse {
                center,
                radius_x,
                radius_y,
            } => {
                if *radius_x == 0 || *radius_y == 0 {
                    return Err(Error::InvalidGeometry(format!(
                        "ellipse at {:?} has a zero radius",
                        center
                    )));
                }
                let (cx, cy) = (center.x as i64, center.y as i64);
                let (rx, ry) = (*radius_x as i64, *radius_y as i64);
                Ok(Region {
                    bounds: (cx - rx, cy - ry, cx + rx, cy + ry),
                    contains: Box::new(move |x, y| {
                        let dx = (x - cx) as f64 / rx as f64;
                        let dy = (y - cy) as f64 / ry as f64;
                        dx * dx + dy * dy <= 1.
                    }),
                })
            }
            RegionGeometry::Polygon { points } => {
                if points.len() < 3 {
                    return Err(Error::InvalidGeometry(format!(
                        "polygon needs at least 3 points, found {}",
                        points.len()
                    )));
                }
                if is_collinear(points) {
                    return Err(Error::InvalidGeometry(
                        "polygon points are collinear".into(),
                    ));
                }
                let x0 = points.iter().map(|p| p.x).min().unwrap_or_default() as i64;
                let x1 = points.iter().map(|p| p.x).max().unwrap_or_default() as i64;
                let y0 = points.iter().map(|p| p.y).min().unwrap_or_default() as i64;
                let y1 = points.iter().map(|p| p.y).max().unwrap_or_default() as i64;
                Ok(Region {
                    bounds: (x0, y0, x1, y1),
                    contains: Box::new(move |x, y| polygon_contains(points, x, y)),
                })
            }
        }
    }
}

/// Rasterize `geometry` over a `width` x `height` image.
///
/// Fails with [`Error::InvalidGeometry`] for degenerate
/// shapes. A geometry entirely outside the image yields an
/// all-`false` mask.
pub fn rasterize(geometry: &RegionGeometry, width: usize, height: usize) -> Result<Mask> {
    let region = geometry.region()?;
    let mut mask = Array2::from_elem((height, width), false);

    let (x0, y0, x1, y1) = region.bounds;
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(width as i64 - 1);
    let y1 = y1.min(height as i64 - 1);
    if x0 > x1 || y0 > y1 {
        return Ok(mask);
    }

    for (y, x) in iproduct!(y0..=y1, x0..=x1) {
        if (region.contains)(x, y) {
            mask[(y as usize, x as usize)] = true;
        }
    }
    Ok(mask)
}

fn ordered(a: i32, b: i32) -> (i64, i64) {
    let (a, b) = (a as i64, b as i64);
    (a.min(b), a.max(b))
}

/// Products of coordinate differences need 65 bits at the
/// extremes of `i32`, hence `i128`.
fn cross(o: (i64, i64), a: (i64, i64), b: (i64, i64)) -> i128 {
    let d = |p: i64, q: i64| (p - q) as i128;
    d(a.0, o.0) * d(b.1, o.1) - d(a.1, o.1) * d(b.0, o.0)
}

fn as_i64(p: &Point) -> (i64, i64) {
    (p.x as i64, p.y as i64)
}

fn is_collinear(points: &[Point]) -> bool {
    let origin = as_i64(&points[0]);
    let other = match points.iter().map(as_i64).find(|&p| p != origin) {
        Some(p) => p,
        None => return true,
    };
    points
        .iter()
        .all(|p| cross(origin, other, as_i64(p)) == 0)
}

fn on_segment(a: (i64, i64), b: (i64, i64), p: (i64, i64)) -> bool {
    cross(a, b, p) == 0
        && p.0 >= a.0.min(b.0)
        && p.0 <= a.0.max(b.0)
        && p.1 >= a.1.min(b.1)
        && p.1 <= a.1.max(b.1)
}

/// Even-odd crossing test, boundary inclusive. Exact
/// integer arithmetic, no rounding at vertices.
fn polygon_contains(points: &[Point], x: i64, y: i64) -> bool {
    let p = (x, y);
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let a = as_i64(&points[i]);
        let b = as_i64(&points[j]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.1 > y) != (b.1 > y) {
            // x < a.x + (y - a.y) * (b.x - a.x) / (b.y - a.y)
            let lhs = (x - a.0) as i128 * (b.1 - a.1) as i128;
            let rhs = (y - a.1) as i128 * (b.0 - a.0) as i128;
            let crosses = if b.1 > a.1 { lhs < rhs } else { lhs > rhs };
            if crosses {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;

    use super::*;

    fn count(mask: &Mask) -> usize {
        mask.iter().filter(|&&b| b).count()
    }

    #[test]
    fn rectangle_is_inclusive() -> anyhow::Result<()> {
        let mask = rasterize(&RegionGeometry::rectangle((10, 20), (19, 29)), 640, 480)?;
        assert_eq!(count(&mask), 100);
        assert!(mask[(20, 10)]);
        assert!(mask[(29, 19)]);
        assert!(!mask[(30, 19)]);
        Ok(())
    }

    #[test]
    fn rectangle_corners_may_be_swapped() -> anyhow::Result<()> {
        let a = rasterize(&RegionGeometry::rectangle((5, 5), (9, 8)), 20, 20)?;
        let b = rasterize(&RegionGeometry::rectangle((9, 8), (5, 5)), 20, 20)?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn rectangle_is_clipped() -> anyhow::Result<()> {
        let mask = rasterize(&RegionGeometry::rectangle((-5, -5), (4, 4)), 10, 10)?;
        assert_eq!(count(&mask), 25);
        Ok(())
    }

    #[test]
    fn ellipse_area_close_to_analytic() -> anyhow::Result<()> {
        for &(rx, ry) in &[(40u32, 25u32), (100, 100), (60, 150)] {
            let mask = rasterize(&RegionGeometry::ellipse((320, 240), rx, ry), 640, 480)?;
            let analytic = PI * rx as f64 * ry as f64;
            let relative = (count(&mask) as f64 - analytic).abs() / analytic;
            assert!(relative < 0.02, "rx={} ry={} count={}", rx, ry, count(&mask));
        }
        Ok(())
    }

    #[test]
    fn small_ellipse_membership() -> anyhow::Result<()> {
        let mask = rasterize(&RegionGeometry::ellipse((5, 5), 2, 1), 11, 11)?;
        // (3..=7, 5) plus (5, 4) and (5, 6)
        assert_eq!(count(&mask), 7);
        assert!(mask[(5, 3)] && mask[(5, 7)] && mask[(4, 5)] && mask[(6, 5)]);
        assert!(!mask[(4, 4)]);
        Ok(())
    }

    #[test]
    fn polygon_triangle() -> anyhow::Result<()> {
        let tri = RegionGeometry::polygon(vec![(0, 0), (10, 0), (0, 10)]);
        let mask = rasterize(&tri, 20, 20)?;
        // lattice points with x, y >= 0 and x + y <= 10
        assert_eq!(count(&mask), 66);
        Ok(())
    }

    #[test]
    fn polygon_matches_rectangle() -> anyhow::Result<()> {
        let poly = RegionGeometry::polygon(vec![(2, 3), (12, 3), (12, 8), (2, 8)]);
        let rect = RegionGeometry::rectangle((2, 3), (12, 8));
        assert_eq!(rasterize(&poly, 30, 30)?, rasterize(&rect, 30, 30)?);
        Ok(())
    }

    #[test]
    fn polygon_non_convex() -> anyhow::Result<()> {
        // U shape: notch between x = 4..6 above y = 4
        let poly = RegionGeometry::polygon(vec![
            (0, 0),
            (10, 0),
            (10, 10),
            (6, 10),
            (6, 4),
            (4, 4),
            (4, 10),
            (0, 10),
        ]);
        let mask = rasterize(&poly, 20, 20)?;
        assert!(mask[(8, 2)]);
        assert!(mask[(8, 8)]);
        assert!(!mask[(8, 5)]);
        assert!(mask[(2, 5)]);
        Ok(())
    }

    #[test]
    fn polygon_even_odd_self_intersection() -> anyhow::Result<()> {
        // Pentagram: the central pentagon is covered twice and
        // is therefore outside under the even-odd rule.
        let star = RegionGeometry::polygon(vec![(50, 0), (79, 90), (2, 35), (98, 35), (21, 90)]);
        let mask = rasterize(&star, 100, 100)?;
        assert!(!mask[(50, 50)]);
        assert!(mask[(10, 50)]);
        Ok(())
    }

    #[test]
    fn bowtie_is_not_degenerate() -> anyhow::Result<()> {
        let bowtie = RegionGeometry::polygon(vec![(0, 0), (10, 10), (10, 0), (0, 10)]);
        let mask = rasterize(&bowtie, 20, 20)?;
        assert!(mask[(5, 1)]);
        assert!(!mask[(1, 5)]);
        Ok(())
    }

    #[test]
    fn outside_is_empty_not_error() -> anyhow::Result<()> {
        let far = RegionGeometry::rectangle((700, 500), (720, 520));
        assert_eq!(count(&rasterize(&far, 640, 480)?), 0);
        let neg = RegionGeometry::polygon(vec![(-30, -30), (-10, -30), (-10, -10)]);
        assert_eq!(count(&rasterize(&neg, 640, 480)?), 0);
        Ok(())
    }

    #[test]
    fn degenerate_shapes_are_errors() {
        let cases = vec![
            RegionGeometry::rectangle((5, 5), (5, 10)),
            RegionGeometry::rectangle((5, 5), (10, 5)),
            RegionGeometry::ellipse((5, 5), 0, 3),
            RegionGeometry::polygon(vec![(0, 0), (5, 5)]),
            RegionGeometry::polygon(vec![(0, 0), (5, 5), (10, 10)]),
            RegionGeometry::polygon(vec![(3, 3), (3, 3), (3, 3)]),
        ];
        for geometry in cases {
            assert!(
                matches!(rasterize(&geometry, 20, 20), Err(Error::InvalidGeometry(_))),
                "{:?}",
                geometry
            );
        }
    }

    #[test]
    fn serde_shape_tag() -> anyhow::Result<()> {
        let geometry: RegionGeometry =
            serde_json::from_str(r#"{"shape": "polygon", "points": [[1, 2], [3, 4], [5, 0]]}"#)?;
        assert_eq!(
            geometry,
            RegionGeometry::polygon(vec![(1, 2), (3, 4), (5, 0)])
        );
        let json = serde_json::to_value(&RegionGeometry::ellipse((1, 2), 3, 4))?;
        assert_eq!(json["shape"], "ellipse");
        assert_eq!(json["center"], serde_json::json!([1, 2]));
        Ok(())
    }

    #[test]
    fn areas_and_pixels() -> anyhow::Result<()> {
        let rect = RegionGeometry::rectangle((10, 10), (20, 15));
        assert_eq!(rect.analytic_area(), 50.);
        assert_eq!(rect.bounding_box()?, (10, 10, 20, 15));
        assert_eq!(rect.pixels()?.count(), 66);

        let ellipse = RegionGeometry::ellipse((50, 50), 30, 20);
        assert!((ellipse.analytic_area() - 600. * PI).abs() < 1e-9);
        assert_eq!(
            ellipse.pixels()?.count(),
            count(&rasterize(&ellipse, 200, 200)?)
        );

        let triangle = RegionGeometry::polygon(vec![(0, 0), (10, 0), (0, 10)]);
        assert_eq!(triangle.analytic_area(), 50.);
        assert_eq!(triangle.pixels()?.next(), Some((0, 0)));

        assert!(RegionGeometry::ellipse((0, 0), 0, 3).pixels().is_err());
        Ok(())
    }

    #[test]
    fn rectangle_pixels_exceed_area_by_one_row_and_column() -> anyhow::Result<()> {
        for &((x0, y0), (x1, y1)) in &[((10, 10), (20, 15)), ((0, 0), (1, 1)), ((-3, 4), (7, 40))] {
            let rect = RegionGeometry::rectangle((x0, y0), (x1, y1));
            let (w, h) = ((x1 - x0) as usize, (y1 - y0) as usize);
            assert_eq!(rect.analytic_area(), (w * h) as f64);
            assert_eq!(rect.pixels()?.count(), (w + 1) * (h + 1));
        }
        Ok(())
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() -> anyhow::Result<()> {
        let (lo, hi) = (i32::MIN, i32::MAX);
        let span = hi as f64 - lo as f64;

        let triangle = RegionGeometry::polygon(vec![(lo, lo), (hi, lo), (0, hi)]);
        triangle.validate()?;
        assert_eq!(count(&rasterize(&triangle, 10, 10)?), 100);
        assert_relative_eq!(triangle.analytic_area(), span * span / 2., max_relative = 1e-12);

        let rect = RegionGeometry::rectangle((lo, lo), (hi, hi));
        assert_eq!(count(&rasterize(&rect, 10, 10)?), 100);
        assert_relative_eq!(rect.analytic_area(), span * span, max_relative = 1e-12);
        Ok(())
    }
}
