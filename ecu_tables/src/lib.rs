//! TuneTable — bilinear-interpolating lookup tables.
//!
//! Ported from `TuneTable3D`: a 2D table indexed by two monotonic axes
//! (RPM, load/MAP/TPS) with row-major values, used for VE, target AFR and
//! base spark advance.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Errors constructing or populating a [`TuneTable`].
#[derive(Debug, Error)]
pub enum TableError {
    /// An axis or values slice did not match the table's configured size.
    #[error("expected {expected} entries, got {got}")]
    SizeMismatch {
        /// Entries the table expected.
        expected: usize,
        /// Entries actually supplied.
        got: usize,
    },
    /// The table file could not be read.
    #[error("table file not found: {0}")]
    FileNotFound(String),
    /// The table file could not be parsed as TOML.
    #[error("failed to parse table: {0}")]
    ParseError(String),
}

/// On-disk shape of a `tables/<name>.toml` file.
#[derive(Debug, Deserialize)]
struct TuneTableFile {
    x_axis: Vec<f32>,
    y_axis: Vec<f32>,
    data: Vec<f32>,
}

/// A 2D interpolating lookup table over an x-axis (typically RPM) and a
/// y-axis (typically load/MAP/TPS), storing `x_size * y_size` values in
/// row-major (`y * x_size + x`) order.
#[derive(Debug, Clone)]
pub struct TuneTable {
    x_size: usize,
    y_size: usize,
    x_axis: Vec<f32>,
    y_axis: Vec<f32>,
    values: Vec<f32>,
}

impl TuneTable {
    /// Allocate a table of `x_size * y_size`, axes and values zeroed.
    pub fn init(x_size: usize, y_size: usize) -> Self {
        Self {
            x_size,
            y_size,
            x_axis: vec![0.0; x_size],
            y_axis: vec![0.0; y_size],
            values: vec![0.0; x_size * y_size],
        }
    }

    /// Replace the x-axis (must be monotonically non-decreasing).
    pub fn set_x_axis(&mut self, axis: &[f32]) -> Result<(), TableError> {
        if axis.len() != self.x_size {
            return Err(TableError::SizeMismatch { expected: self.x_size, got: axis.len() });
        }
        self.x_axis.copy_from_slice(axis);
        Ok(())
    }

    /// Replace the y-axis (must be monotonically non-decreasing).
    pub fn set_y_axis(&mut self, axis: &[f32]) -> Result<(), TableError> {
        if axis.len() != self.y_size {
            return Err(TableError::SizeMismatch { expected: self.y_size, got: axis.len() });
        }
        self.y_axis.copy_from_slice(axis);
        Ok(())
    }

    /// Replace the full value grid, row-major by y then x.
    pub fn set_values(&mut self, values: &[f32]) -> Result<(), TableError> {
        let expected = self.x_size * self.y_size;
        if values.len() != expected {
            return Err(TableError::SizeMismatch { expected, got: values.len() });
        }
        self.values.copy_from_slice(values);
        Ok(())
    }

    /// Read one cell by index, or 0.0 if out of range.
    pub fn get_value(&self, x: usize, y: usize) -> f32 {
        if x < self.x_size && y < self.y_size {
            self.values[y * self.x_size + x]
        } else {
            0.0
        }
    }

    /// Write one cell by index, silently ignored if out of range.
    pub fn set_value(&mut self, x: usize, y: usize, val: f32) {
        if x < self.x_size && y < self.y_size {
            self.values[y * self.x_size + x] = val;
        }
    }

    fn find_bin(axis: &[f32], size: usize, val: f32) -> usize {
        if size < 2 {
            return 0;
        }
        if val <= axis[0] {
            return 0;
        }
        for i in 1..size {
            if val <= axis[i] {
                return i - 1;
            }
        }
        size - 2
    }

    /// Bilinear-interpolated lookup at `(x, y)`, clamped to the table's
    /// edge bins outside the axis ranges. Degenerate 1x1 tables return
    /// their single value; zero-width bins on either axis fall back to
    /// the lower bin's value along that axis.
    pub fn lookup(&self, x: f32, y: f32) -> f32 {
        if self.x_size == 0 || self.y_size == 0 {
            return 0.0;
        }
        if self.x_size == 1 && self.y_size == 1 {
            return self.values[0];
        }

        let x_bin = Self::find_bin(&self.x_axis, self.x_size, x);
        let y_bin = Self::find_bin(&self.y_axis, self.y_size, y);
        let x_bin1 = (x_bin + 1).min(self.x_size - 1);
        let y_bin1 = (y_bin + 1).min(self.y_size - 1);

        let x0 = self.x_axis[x_bin];
        let x1 = self.x_axis[x_bin1];
        let y0 = self.y_axis[y_bin];
        let y1 = self.y_axis[y_bin1];

        let x_frac = if x1 - x0 > 0.001 { ((x - x0) / (x1 - x0)).clamp(0.0, 1.0) } else { 0.0 };
        let y_frac = if y1 - y0 > 0.001 { ((y - y0) / (y1 - y0)).clamp(0.0, 1.0) } else { 0.0 };

        let v00 = self.values[y_bin * self.x_size + x_bin];
        let v10 = self.values[y_bin * self.x_size + x_bin1];
        let v01 = self.values[y_bin1 * self.x_size + x_bin];
        let v11 = self.values[y_bin1 * self.x_size + x_bin1];

        let top = v00 + x_frac * (v10 - v00);
        let bottom = v01 + x_frac * (v11 - v01);
        top + y_frac * (bottom - top)
    }

    /// Load a table from `<dir>/tables/<name>.toml`, sizing itself from the file's axes.
    ///
    /// # Errors
    /// Returns [`TableError::FileNotFound`] or [`TableError::ParseError`] on
    /// I/O or TOML failure, or [`TableError::SizeMismatch`] if `data`'s
    /// length doesn't match `x_axis.len() * y_axis.len()`.
    pub fn load(dir: &Path, name: &str) -> Result<Self, TableError> {
        let path = dir.join("tables").join(format!("{name}.toml"));
        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TableError::FileNotFound(path.display().to_string())
            } else {
                TableError::ParseError(format!("{}: {e}", path.display()))
            }
        })?;
        let file: TuneTableFile =
            toml::from_str(&content).map_err(|e| TableError::ParseError(format!("{}: {e}", path.display())))?;

        let mut table = Self::init(file.x_axis.len(), file.y_axis.len());
        table.set_x_axis(&file.x_axis)?;
        table.set_y_axis(&file.y_axis)?;
        table.set_values(&file.data)?;
        Ok(table)
    }
}
