//! Small dense matrix helpers for the Kalman filters.
//!
//! Transpose, product, sum and identity come straight from `ndarray`;
//! what lives here is the inversion used by the update and smoothing
//! steps. Matrices are row-major and at most 7x7.

use ndarray::Array2;

/// Pivot magnitude below which a matrix is treated as singular.
pub const SINGULAR_EPS: f64 = 1e-12;

/// Determinant of a 2x2 matrix.
pub fn det2(m: &Array2<f64>) -> f64 {
    m[[0, 0]] * m[[1, 1]] - m[[0, 1]] * m[[1, 0]]
}

/// Invert a square matrix.
///
/// 1x1 and 2x2 are closed-form; anything larger goes through
/// Gauss-Jordan elimination with partial pivoting. A singular input
/// yields the identity of the same size so the caller's step becomes a
/// no-update instead of an abort.
pub fn invert(m: &Array2<f64>) -> Array2<f64> {
    let (rows, cols) = m.dim();
    debug_assert_eq!(rows, cols, "invert expects a square matrix");

    match rows {
        0 => Array2::eye(0),
        1 => {
            if m[[0, 0]].abs() < SINGULAR_EPS {
                log::warn!("singular 1x1 matrix, substituting identity");
                return Array2::eye(1);
            }
            let mut inv = Array2::zeros((1, 1));
            inv[[0, 0]] = 1.0 / m[[0, 0]];
            inv
        }
        2 => {
            let det = det2(m);
            if det.abs() < SINGULAR_EPS {
                log::warn!("singular 2x2 matrix (det {det:e}), substituting identity");
                return Array2::eye(2);
            }
            let mut inv = Array2::zeros((2, 2));
            inv[[0, 0]] = m[[1, 1]] / det;
            inv[[0, 1]] = -m[[0, 1]] / det;
            inv[[1, 0]] = -m[[1, 0]] / det;
            inv[[1, 1]] = m[[0, 0]] / det;
            inv
        }
        n => gauss_jordan(m, n),
    }
}

fn gauss_jordan(m: &Array2<f64>, n: usize) -> Array2<f64> {
    // Augmented [A | I], reduced in place.
    let mut a = m.clone();
    let mut inv = Array2::eye(n);

    for col in 0..n {
        // Partial pivoting: largest magnitude in the remaining column.
        let mut pivot_row = col;
        let mut pivot_mag = a[[col, col]].abs();
        for row in (col + 1)..n {
            let mag = a[[row, col]].abs();
            if mag > pivot_mag {
                pivot_row = row;
                pivot_mag = mag;
            }
        }
        if pivot_mag < SINGULAR_EPS {
            log::warn!("singular {n}x{n} matrix (pivot {pivot_mag:e}), substituting identity");
            return Array2::eye(n);
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([col, k], [pivot_row, k]);
                inv.swap([col, k], [pivot_row, k]);
            }
        }

        let pivot = a[[col, col]];
        for k in 0..n {
            a[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = a[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                a[[row, k]] -= factor * a[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }

    inv
}
