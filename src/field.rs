//! Per-pixel temperature fields.
//!
//! The field is produced upstream by whatever decodes the
//! camera's radiometric data; this crate only reads it. A
//! simple grid-CSV reader is provided so that fields dumped
//! by other tools can be fed to the binaries.

use std::{fs::File, io::BufRead, io::BufReader, path::Path};

use lazy_static::lazy_static;
use ndarray::{parallel::prelude::*, Array2};
use regex::Regex;

use crate::{
    error::{Error, Result},
    stats::Stats,
};

/// Temperatures in °C, indexed `(row, col)` i.e. `(y, x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureField {
    values: Array2<f64>,
}

impl TemperatureField {
    pub fn from_array(values: Array2<f64>) -> Self {
        TemperatureField { values }
    }

    /// Build a field from row-major values.
    pub fn from_shape_vec(width: usize, height: usize, values: Vec<f64>) -> Result<Self> {
        let len = values.len();
        let values = Array2::from_shape_vec((height, width), values).map_err(|e| {
            Error::MalformedField {
                line: 0,
                message: format!("{} values for a {}x{} field: {}", len, width, height, e),
            }
        })?;
        Ok(TemperatureField { values })
    }

    /// Parse a grid CSV: one image row per line, values
    /// separated by commas, semicolons or whitespace. Blank
    /// lines and lines starting with `#` are ignored.
    pub fn from_csv_reader<R: BufRead>(reader: R) -> Result<Self> {
        lazy_static! {
            static ref SEP: Regex = Regex::new(r"[,;\s]+").unwrap();
        }

        let mut width = None;
        let mut height = 0;
        let mut values = vec![];
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = idx + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut row_len = 0;
            for cell in SEP.split(trimmed).filter(|c| !c.is_empty()) {
                let val: f64 = cell.parse().map_err(|_| Error::MalformedField {
                    line: line_no,
                    message: format!("not a number: `{}`", cell),
                })?;
                if !val.is_finite() {
                    return Err(Error::MalformedField {
                        line: line_no,
                        message: format!("non-finite temperature: `{}`", cell),
                    });
                }
                values.push(val);
                row_len += 1;
            }

            match width {
                None => width = Some(row_len),
                Some(w) if w != row_len => {
                    return Err(Error::MalformedField {
                        line: line_no,
                        message: format!("expected {} values, found {}", w, row_len),
                    })
                }
                _ => (),
            }
            height += 1;
        }

        let width = width.ok_or_else(|| Error::MalformedField {
            line: 0,
            message: "no temperature rows".into(),
        })?;
        Self::from_shape_vec(width, height, values)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        Self::from_csv_reader(BufReader::new(File::open(path)?))
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (usize, usize) {
        (self.width(), self.height())
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        self.values.get((y, x)).copied()
    }

    /// Statistics over every pixel of the field.
    pub fn summary(&self) -> Stats {
        self.values
            .par_iter()
            .fold(Stats::default, |mut acc, &val| {
                acc += val;
                acc
            })
            .reduce(Stats::default, |mut acc, val| {
                acc += &val;
                acc
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn parse_grid_csv() -> anyhow::Result<()> {
        let csv = "# exported field\n30.5, 31.0,31.5\n\n32;32.5 33\n";
        let field = TemperatureField::from_csv_reader(Cursor::new(csv))?;
        assert_eq!(field.dimensions(), (3, 2));
        assert_eq!(field.get(2, 0), Some(31.5));
        assert_eq!(field.get(0, 1), Some(32.));
        assert_eq!(field.get(3, 0), None);
        Ok(())
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let csv = "1,2,3\n4,5\n";
        match TemperatureField::from_csv_reader(Cursor::new(csv)) {
            Err(Error::MalformedField { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn bad_cells_are_rejected() {
        assert!(TemperatureField::from_csv_reader(Cursor::new("1,abc\n")).is_err());
        assert!(TemperatureField::from_csv_reader(Cursor::new("1,NaN\n")).is_err());
        assert!(TemperatureField::from_csv_reader(Cursor::new("\n# only comments\n")).is_err());
    }

    #[test]
    fn shape_mismatch() {
        assert!(TemperatureField::from_shape_vec(3, 3, vec![0.; 8]).is_err());
    }

    #[test]
    fn summary_covers_all_pixels() -> anyhow::Result<()> {
        let values: Vec<f64> = (0..640 * 480).map(|i| 30. + (i % 7) as f64 * 0.1).collect();
        let field = TemperatureField::from_shape_vec(640, 480, values.clone())?;
        let summary = field.summary();
        let expected: Stats = values.into_iter().collect();
        assert_eq!(summary.count, 640 * 480);
        assert_relative_eq!(summary.mean, expected.mean, epsilon = 1e-9);
        assert_eq!(summary.min, 30.);
        assert_relative_eq!(summary.max, 30.6, epsilon = 1e-12);
        Ok(())
    }
}
