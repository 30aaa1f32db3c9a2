use nalgebra::DMatrix;
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use rand_distr::Normal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum TableError {
    #[error("Table must contain at least one row and one column")]
    Empty,

    #[error("Row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Column {column} has {found} rows, expected {expected}")]
    RaggedColumn {
        column: usize,
        expected: usize,
        found: usize,
    },

    #[error("Header count {found} does not match column count {expected}")]
    HeaderMismatch { expected: usize, found: usize },

    #[error("Table has {found} rows, expected {expected}")]
    RowCountMismatch { expected: usize, found: usize },

    #[error("Row index {row} is out of bounds for a table with {rows} rows")]
    RowOutOfBounds { row: usize, rows: usize },
}

/// Dense numeric table with a per-row enable mask.
///
/// Disabled rows keep their values but are excluded from residuals, degrees of
/// freedom and perturbation. Resampling engines disable rows instead of
/// removing them so that row indices stay stable across copies.
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    values: DMatrix<f64>,
    enabled: Vec<bool>,
    headers: Vec<String>,
}

impl DataTable {
    pub fn new(values: DMatrix<f64>) -> Self {
        let headers = (0..values.ncols()).map(|c| format!("col_{}", c + 1)).collect();
        Self {
            enabled: vec![true; values.nrows()],
            values,
            headers,
        }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, TableError> {
        let columns = rows.first().map(Vec::len).unwrap_or(0);
        if rows.is_empty() || columns == 0 {
            return Err(TableError::Empty);
        }
        if let Some((row, found)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns)
            .map(|(i, r)| (i, r.len()))
        {
            return Err(TableError::RaggedRow {
                row,
                expected: columns,
                found,
            });
        }
        let values = DMatrix::from_fn(rows.len(), columns, |r, c| rows[r][c]);
        Ok(Self::new(values))
    }

    pub fn from_columns(columns: &[Vec<f64>]) -> Result<Self, TableError> {
        let rows = columns.first().map(Vec::len).unwrap_or(0);
        if columns.is_empty() || rows == 0 {
            return Err(TableError::Empty);
        }
        if let Some((column, found)) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != rows)
            .map(|(i, c)| (i, c.len()))
        {
            return Err(TableError::RaggedColumn {
                column,
                expected: rows,
                found,
            });
        }
        let values = DMatrix::from_fn(rows, columns.len(), |r, c| columns[c][r]);
        Ok(Self::new(values))
    }

    pub fn with_headers(mut self, headers: Vec<String>) -> Result<Self, TableError> {
        if headers.len() != self.columns() {
            return Err(TableError::HeaderMismatch {
                expected: self.columns(),
                found: headers.len(),
            });
        }
        self.headers = headers;
        Ok(self)
    }

    #[inline]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    #[inline]
    pub fn columns(&self) -> usize {
        self.values.ncols()
    }

    #[inline]
    pub fn value(&self, row: usize, column: usize) -> f64 {
        self.values[(row, column)]
    }

    #[inline]
    pub fn set_value(&mut self, row: usize, column: usize, value: f64) {
        self.values[(row, column)] = value;
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        self.values.row(row).iter().copied().collect()
    }

    pub fn column(&self, column: usize) -> Vec<f64> {
        self.values.column(column).iter().copied().collect()
    }

    pub fn is_enabled(&self, row: usize) -> bool {
        self.enabled.get(row).copied().unwrap_or(false)
    }

    pub fn enabled_rows(&self) -> impl Iterator<Item = usize> + '_ {
        self.enabled
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
    }

    pub fn enabled_row_count(&self) -> usize {
        self.enabled.iter().filter(|&&on| on).count()
    }

    /// Disables `row` and returns the values it held.
    pub fn disable_row(&mut self, row: usize) -> Result<Vec<f64>, TableError> {
        let rows = self.rows();
        let slot = self
            .enabled
            .get_mut(row)
            .ok_or(TableError::RowOutOfBounds { row, rows })?;
        *slot = false;
        Ok(self.row(row))
    }

    pub fn enable_row(&mut self, row: usize) -> Result<(), TableError> {
        let rows = self.rows();
        let slot = self
            .enabled
            .get_mut(row)
            .ok_or(TableError::RowOutOfBounds { row, rows })?;
        *slot = true;
        Ok(())
    }

    pub fn enable_all(&mut self) {
        self.enabled.iter_mut().for_each(|on| *on = true);
    }

    /// Copies the enable mask of `other`, which must have the same row count.
    pub fn mirror_mask(&mut self, other: &DataTable) -> Result<(), TableError> {
        if other.rows() != self.rows() {
            return Err(TableError::RowCountMismatch {
                expected: self.rows(),
                found: other.rows(),
            });
        }
        self.enabled.clone_from(&other.enabled);
        Ok(())
    }

    /// Values of every enabled cell, row-major.
    pub fn enabled_values(&self) -> Vec<f64> {
        self.enabled_rows()
            .flat_map(|r| self.values.row(r).iter().copied().collect::<Vec<_>>())
            .collect()
    }

    /// Returns a copy with zero-mean gaussian noise added to the enabled rows.
    ///
    /// `noise` holds either a single distribution shared by all columns or one
    /// distribution per column. Columns with `None` are left untouched.
    pub fn perturb_gaussian<R: Rng + ?Sized>(
        &self,
        noise: &[Option<Normal<f64>>],
        rng: &mut R,
    ) -> DataTable {
        let mut out = self.clone();
        if noise.is_empty() {
            return out;
        }
        let rows: Vec<usize> = self.enabled_rows().collect();
        for row in rows {
            for column in 0..self.columns() {
                let slot = if noise.len() == 1 { 0 } else { column };
                if let Some(Some(dist)) = noise.get(slot) {
                    out.values[(row, column)] += dist.sample(rng);
                }
            }
        }
        out
    }

    /// Returns a copy where every enabled cell is shifted by a value drawn with
    /// replacement from `pool`.
    pub fn perturb_bootstrap<R: Rng + ?Sized>(&self, pool: &[f64], rng: &mut R) -> DataTable {
        let mut out = self.clone();
        if pool.is_empty() {
            return out;
        }
        let sampler = Uniform::new(0, pool.len());
        let rows: Vec<usize> = self.enabled_rows().collect();
        for row in rows {
            for column in 0..self.columns() {
                out.values[(row, column)] += pool[sampler.sample(rng)];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn sample_table() -> DataTable {
        DataTable::from_rows(&[
            vec![1.0, 10.0],
            vec![2.0, 20.0],
            vec![3.0, 30.0],
            vec![4.0, 40.0],
        ])
        .unwrap()
    }

    #[test]
    fn from_rows_rejects_empty_and_ragged_input() {
        assert_eq!(DataTable::from_rows(&[]), Err(TableError::Empty));
        assert_eq!(
            DataTable::from_rows(&[vec![1.0, 2.0], vec![3.0]]),
            Err(TableError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn from_columns_transposes_into_rows() {
        let table = DataTable::from_columns(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(table.rows(), 3);
        assert_eq!(table.columns(), 2);
        assert_eq!(table.row(1), vec![2.0, 5.0]);
    }

    #[test]
    fn with_headers_checks_column_count() {
        let table = sample_table();
        assert!(matches!(
            table.clone().with_headers(vec!["a".into()]),
            Err(TableError::HeaderMismatch {
                expected: 2,
                found: 1
            })
        ));
        let named = table.with_headers(vec!["x".into(), "y".into()]).unwrap();
        assert_eq!(named.headers(), &["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn disabled_rows_are_skipped_but_keep_their_values() {
        let mut table = sample_table();
        assert_eq!(table.disable_row(1).unwrap(), vec![2.0, 20.0]);
        table.disable_row(3).unwrap();
        assert_eq!(table.enabled_rows().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(table.enabled_row_count(), 2);
        assert_eq!(table.enabled_values(), vec![1.0, 10.0, 3.0, 30.0]);
        assert_eq!(table.value(1, 1), 20.0);

        table.enable_row(1).unwrap();
        assert_eq!(table.enabled_rows().collect::<Vec<_>>(), vec![0, 1, 2]);
        table.enable_all();
        assert_eq!(table.enabled_row_count(), 4);
    }

    #[test]
    fn disable_row_out_of_bounds_is_an_error() {
        let mut table = sample_table();
        assert_eq!(
            table.disable_row(9),
            Err(TableError::RowOutOfBounds { row: 9, rows: 4 })
        );
        assert_eq!(
            table.enable_row(4),
            Err(TableError::RowOutOfBounds { row: 4, rows: 4 })
        );
    }

    #[test]
    fn mirror_mask_copies_enable_state() {
        let mut source = sample_table();
        source.disable_row(0).unwrap();
        let mut target = sample_table();
        target.mirror_mask(&source).unwrap();
        assert!(!target.is_enabled(0));
        assert!(target.is_enabled(1));
    }

    #[test]
    fn perturb_gaussian_only_touches_enabled_rows_and_selected_columns() {
        let mut table = sample_table();
        table.disable_row(2).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let noise = [None, Some(Normal::new(0.0, 0.5).unwrap())];
        let perturbed = table.perturb_gaussian(&noise, &mut rng);

        assert_eq!(perturbed.column(0), table.column(0));
        assert_eq!(perturbed.value(2, 1), 30.0);
        assert_ne!(perturbed.value(0, 1), 10.0);
        assert!(perturbed.is_enabled(0) && !perturbed.is_enabled(2));
    }

    #[test]
    fn perturb_gaussian_is_reproducible_with_the_same_seed() {
        let table = sample_table();
        let noise = [Some(Normal::new(0.0, 1.0).unwrap())];
        let a = table.perturb_gaussian(&noise, &mut StdRng::seed_from_u64(3));
        let b = table.perturb_gaussian(&noise, &mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn perturb_bootstrap_draws_shifts_from_the_pool() {
        let table = sample_table();
        let pool = [0.25, -0.25];
        let perturbed = table.perturb_bootstrap(&pool, &mut StdRng::seed_from_u64(11));
        for row in 0..table.rows() {
            for column in 0..table.columns() {
                let shift = perturbed.value(row, column) - table.value(row, column);
                assert!((shift.abs() - 0.25).abs() < 1e-12);
            }
        }
    }
}
