use std::{fmt::Display, ops::Mul};

use nalgebra as na;

use crate::{FlatError, Result, SolverConfig};

/// Matrix pseudo-inverse
///
/// The pseudo-inverse is computed from the SVD decomposition of the matrix
/// and the condition number of the matrix is kept alongside.
#[derive(Debug, Clone, PartialEq)]
pub struct Pinv {
    pub(crate) mat: na::DMatrix<f64>,
    pub(crate) cond: f64,
}

impl Pinv {
    /// Computes the Moore-Penrose pseudo-inverse of `mat`
    ///
    /// Singular values smaller than `rcond` times the largest singular value are
    /// discarded. An ill-conditioned matrix is reported with a warning but the
    /// minimum-norm least-squares inverse is still returned.
    ///
    /// ```
    /// use dmflat::{Pinv, SolverConfig};
    /// use nalgebra as na;
    ///
    /// let mat = na::DMatrix::<f64>::identity(3, 2);
    /// let pinv = Pinv::new(&mat, &SolverConfig::default()).unwrap();
    /// assert!((pinv.cond() - 1f64).abs() < 1e-12);
    /// assert_eq!(pinv.shape(), (2, 3));
    /// ```
    pub fn new(mat: &na::DMatrix<f64>, config: &SolverConfig) -> Result<Self> {
        if mat.is_empty() {
            return Err(FlatError::mismatch(
                format!("{}x{} matrix pseudo-inverse", mat.nrows(), mat.ncols()),
                1,
                0,
            ));
        }
        let svd = mat.clone().svd(true, true);
        let (s_min, s_max) = svd
            .singular_values
            .iter()
            .fold((f64::INFINITY, 0f64), |(lo, hi), &s| (lo.min(s), hi.max(s)));
        let cond = if s_min > 0f64 {
            s_max / s_min
        } else {
            f64::INFINITY
        };
        if cond > config.cond_threshold {
            log::warn!(
                "ill-conditioned {}x{} matrix (cond: {:6.3E} > {:6.3E})",
                mat.nrows(),
                mat.ncols(),
                cond,
                config.cond_threshold
            );
        }
        let mat = svd
            .pseudo_inverse(config.rcond * s_max)
            .map_err(FlatError::PseudoInverse)?;
        Ok(Self { mat, cond })
    }
    /// Returns the condition number of the inverted matrix
    #[inline]
    pub fn cond(&self) -> f64 {
        self.cond
    }
    pub fn shape(&self) -> (usize, usize) {
        self.mat.shape()
    }
    pub fn as_matrix(&self) -> &na::DMatrix<f64> {
        &self.mat
    }
    pub fn into_matrix(self) -> na::DMatrix<f64> {
        self.mat
    }
}

impl Mul<&na::DVector<f64>> for &Pinv {
    type Output = na::DVector<f64>;
    fn mul(self, rhs: &na::DVector<f64>) -> Self::Output {
        &self.mat * rhs
    }
}

impl Mul<&na::DMatrix<f64>> for &Pinv {
    type Output = na::DMatrix<f64>;
    fn mul(self, rhs: &na::DMatrix<f64>) -> Self::Output {
        &self.mat * rhs
    }
}

impl Display for Pinv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (n, m) = self.shape();
        write!(f, "pseudo-inverse {n}x{m} ; cond: {:6.3E}", self.cond)
    }
}
