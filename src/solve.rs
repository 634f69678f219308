use std::fmt::Display;

use thiserror::Error;

/// Pivots smaller than this in magnitude are treated as zero.
pub const EPSILON: f64 = 1e-10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("singular matrix: pivot {pivot:e} in column {column} is below 1e-10")]
    Singular { column: usize, pivot: f64 },

    #[error("a {rows}x{rows} system needs {rows} right-hand values, got {found}")]
    DimensionMismatch { rows: usize, found: usize },
}

/// Dense square matrix stored as rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: Vec<Vec<f64>>,
}

impl Matrix {
    /// Builds the matrix whose j-th column is `columns[j]`. Every column must
    /// have `columns.len()` entries.
    pub fn from_columns(columns: &[&[f64]]) -> Option<Self> {
        let n = columns.len();
        if columns.iter().any(|column| column.len() != n) {
            return None;
        }
        let rows = (0..n)
            .map(|i| columns.iter().map(|column| column[i]).collect())
            .collect();
        Some(Matrix { rows })
    }

    pub fn dim(&self) -> usize {
        self.rows.len()
    }

    pub fn mul_vec(&self, x: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(x).map(|(a, b)| a * b).sum())
            .collect()
    }
}

impl Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for row in &self.rows {
            for x in row {
                write!(f, "{x:8.3} ")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Solves `matrix * x = rhs` by Gaussian elimination with partial pivoting.
pub fn solve(matrix: Matrix, rhs: &[f64]) -> Result<Vec<f64>, SolveError> {
    let n = matrix.dim();
    if rhs.len() != n {
        return Err(SolveError::DimensionMismatch {
            rows: n,
            found: rhs.len(),
        });
    }

    let mut aug: Vec<Vec<f64>> = matrix
        .rows
        .into_iter()
        .zip(rhs)
        .map(|(mut row, &b)| {
            row.push(b);
            row
        })
        .collect();

    for i in 0..n {
        // first maximal row wins ties
        let mut pivot_row = i;
        for k in i + 1..n {
            if aug[k][i].abs() > aug[pivot_row][i].abs() {
                pivot_row = k;
            }
        }
        aug.swap(i, pivot_row);

        let pivot = aug[i][i];
        if pivot.abs() < EPSILON {
            return Err(SolveError::Singular { column: i, pivot });
        }

        for k in i + 1..n {
            let factor = aug[k][i] / pivot;
            for j in i..=n {
                aug[k][j] -= factor * aug[i][j];
            }
        }
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let pivot = aug[i][i];
        if pivot.abs() < EPSILON {
            return Err(SolveError::Singular { column: i, pivot });
        }
        x[i] = aug[i][n] / pivot;
        for k in 0..i {
            aug[k][n] -= aug[k][i] * x[i];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn identity_returns_rhs() {
        let m = Matrix::from_columns(&[&[1.0, 0.0], &[0.0, 1.0]]).unwrap();
        assert_close(&solve(m, &[3.0, 4.0]).unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn columns_are_basis_vectors() {
        // columns (1, 1) and (1, -1)
        let m = Matrix::from_columns(&[&[1.0, 1.0], &[1.0, -1.0]]).unwrap();
        assert_close(&solve(m, &[3.0, 1.0]).unwrap(), &[2.0, 1.0]);
    }

    #[test]
    fn needs_row_swap() {
        let m = Matrix::from_columns(&[&[0.0, 1.0], &[1.0, 0.0]]).unwrap();
        assert_close(&solve(m, &[5.0, 7.0]).unwrap(), &[7.0, 5.0]);
    }

    #[test]
    fn solution_reproduces_rhs() {
        let columns: [&[f64]; 3] = [&[2.0, -1.0, 0.0], &[1.0, 3.0, 2.0], &[-1.0, 0.5, 4.0]];
        let m = Matrix::from_columns(&columns).unwrap();
        let rhs = [1.0, -2.0, 6.5];
        let x = solve(m.clone(), &rhs).unwrap();
        assert_close(&m.mul_vec(&x), &rhs);
    }

    #[test]
    fn dependent_columns_are_singular() {
        let m = Matrix::from_columns(&[&[1.0, 2.0], &[2.0, 4.0]]).unwrap();
        let e = solve(m, &[1.0, 1.0]).unwrap_err();
        assert!(matches!(e, SolveError::Singular { column: 1, .. }));
    }

    #[test]
    fn zero_matrix_is_singular_at_first_column() {
        let m = Matrix::from_columns(&[&[0.0, 0.0], &[0.0, 0.0]]).unwrap();
        assert!(matches!(
            solve(m, &[0.0, 0.0]),
            Err(SolveError::Singular { column: 0, .. })
        ));
    }

    #[test]
    fn non_square_columns_are_rejected() {
        assert!(Matrix::from_columns(&[&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]]).is_none());
    }

    #[test]
    fn rhs_length_must_match() {
        let m = Matrix::from_columns(&[&[1.0, 0.0], &[0.0, 1.0]]).unwrap();
        assert_eq!(
            solve(m, &[1.0]),
            Err(SolveError::DimensionMismatch { rows: 2, found: 1 })
        );
    }
}
