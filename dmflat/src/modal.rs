use std::fmt::Display;

use nalgebra as na;

use crate::{ChannelMask, FlatError, Pinv, Result, SolverConfig};

/// Modal correction
///
/// The slopes are first converted into Zernike modal coefficients and the DM
/// command is derived from the pseudo-inverse of the modal response matrix.
#[derive(Debug, Default, Clone)]
pub struct ModalSolver {
    config: SolverConfig,
}

/// Slopes to modes to DM command matrices for a given channel mask
#[derive(Debug, Clone)]
pub struct ModalControl {
    /// Mask the calibration matrices were reduced with
    pub mask: ChannelMask,
    /// Upper triangular Cholesky factor of the reduced Zernike Gram matrix (`Z x Z`)
    pub p_matrix: na::DMatrix<f64>,
    /// Reduced slopes to modal coefficients (`Z x (2N-k)`)
    pub conv_matrix: na::DMatrix<f64>,
    /// DM actuators to modal coefficients (`Z x M`)
    pub response_matrix_modal: na::DMatrix<f64>,
    /// Modal coefficients to DM actuators (`M x Z`)
    pub control_matrix_modal: Pinv,
}

/// Modal correction result
#[derive(Debug, Clone)]
pub struct ModalSolution {
    pub control: ModalControl,
    /// Modal coefficients (`Z`)
    pub modal_coeff: Vec<f64>,
    /// DM command vector (`M`)
    pub dm_command: Vec<f64>,
}

impl ModalSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
    /// Computes the DM command from the slopes, the zero slopes being discarded
    pub fn solve(
        &self,
        slope: &[f64],
        zern_matrix: &na::DMatrix<f64>,
        zern_grad_matrix: &na::DMatrix<f64>,
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<ModalSolution> {
        self.solve_masked(
            slope,
            &ChannelMask::from_slopes(slope),
            zern_matrix,
            zern_grad_matrix,
            response_matrix_slopes,
        )
    }
    /// Computes the DM command from the slopes selected with `mask`
    pub fn solve_masked(
        &self,
        slope: &[f64],
        mask: &ChannelMask,
        zern_matrix: &na::DMatrix<f64>,
        zern_grad_matrix: &na::DMatrix<f64>,
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<ModalSolution> {
        mask.check_len("slopes vs. mask", slope.len())?;
        let control = self.control(mask, zern_matrix, zern_grad_matrix, response_matrix_slopes)?;
        let (modal_coeff, dm_command) = control.apply(slope)?;
        Ok(ModalSolution {
            control,
            modal_coeff,
            dm_command,
        })
    }
    /// Derives the conversion, modal response and modal control matrices
    ///
    /// The matrices depend only on the calibration and on the mask.
    pub fn control(
        &self,
        mask: &ChannelMask,
        zern_matrix: &na::DMatrix<f64>,
        zern_grad_matrix: &na::DMatrix<f64>,
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<ModalControl> {
        mask.check_len("mask vs. Zernike matrix rows", zern_matrix.nrows())?;
        mask.check_len(
            "mask vs. Zernike gradient matrix rows",
            zern_grad_matrix.nrows(),
        )?;
        mask.check_len(
            "mask vs. slope response matrix rows",
            response_matrix_slopes.nrows(),
        )?;
        if zern_grad_matrix.ncols() != zern_matrix.ncols() {
            return Err(FlatError::mismatch(
                "Zernike matrix vs. Zernike gradient matrix modes",
                zern_matrix.ncols(),
                zern_grad_matrix.ncols(),
            ));
        }
        FlatError::check_columns("Zernike matrix columns (modes)", zern_matrix.ncols())?;
        FlatError::check_columns(
            "slope response matrix columns (actuators)",
            response_matrix_slopes.ncols(),
        )?;
        mask.check_area()?;
        if mask.area() < zern_matrix.ncols() {
            return Err(FlatError::SingularGramMatrix {
                n_valid: mask.area(),
                n_mode: zern_matrix.ncols(),
            });
        }
        log::debug!("modal solver: {mask}, {} modes", zern_matrix.ncols());

        let reduced_zern = mask.reduce_rows(zern_matrix);
        let reduced_zern_grad = mask.reduce_rows(zern_grad_matrix);

        let gram = reduced_zern.tr_mul(&reduced_zern);
        let p_matrix = self.cholesky_factor(gram, mask.area())?;

        let conv_matrix = &p_matrix * Pinv::new(&reduced_zern_grad, &self.config)?.into_matrix();

        let reduced_response = mask.reduce_rows(response_matrix_slopes);
        let response_matrix_modal = &conv_matrix * reduced_response;
        let control_matrix_modal = Pinv::new(&response_matrix_modal, &self.config)?;

        Ok(ModalControl {
            mask: mask.clone(),
            p_matrix,
            conv_matrix,
            response_matrix_modal,
            control_matrix_modal,
        })
    }
    /// Returns the upper triangular factor `P` of the Gram matrix `G=P^T P`
    ///
    /// The rank test is applied to the pivots `P_kk^2 / G_kk` of the unit
    /// diagonal Gram matrix `D^-1/2 G D^-1/2`.
    fn cholesky_factor(&self, gram: na::DMatrix<f64>, n_valid: usize) -> Result<na::DMatrix<f64>> {
        let n_mode = gram.nrows();
        let singular = move || FlatError::SingularGramMatrix { n_valid, n_mode };
        let diagonal = gram.diagonal();
        let p_matrix = upper_triangular(gram.cholesky().ok_or_else(singular)?.l());
        let pivot_min = p_matrix
            .diagonal()
            .iter()
            .zip(diagonal.iter())
            .map(|(p, g)| if *g > 0f64 { p * p / g } else { 0f64 })
            .fold(f64::INFINITY, f64::min);
        if pivot_min <= self.config.gram_tolerance {
            log::debug!(
                "normalized Cholesky pivot {:6.3E} below tolerance {:6.3E}",
                pivot_min,
                self.config.gram_tolerance
            );
            return Err(singular());
        }
        Ok(p_matrix)
    }
}

/// Orients a triangular Cholesky factor as an upper triangular matrix
///
/// A factor equal to its own lower triangular part is transposed, any other
/// factor is returned as is.
pub fn upper_triangular(p_matrix: na::DMatrix<f64>) -> na::DMatrix<f64> {
    let lower = p_matrix.lower_triangle();
    let is_lower = p_matrix
        .iter()
        .zip(lower.iter())
        .all(|(a, b)| (a - b).abs() <= 1e-8 + 1e-5 * b.abs());
    if is_lower {
        p_matrix.transpose()
    } else {
        p_matrix
    }
}

impl ModalControl {
    /// Number of Zernike modes
    pub fn n_mode(&self) -> usize {
        self.conv_matrix.nrows()
    }
    /// Number of DM actuators
    pub fn n_actuator(&self) -> usize {
        self.response_matrix_modal.ncols()
    }
    /// Converts the slopes into modal coefficients and DM command
    ///
    /// The slopes are reduced with the same mask than the calibration matrices.
    pub fn apply(&self, slope: &[f64]) -> Result<(Vec<f64>, Vec<f64>)> {
        self.mask.check_len("slopes vs. mask", slope.len())?;
        let reduced_slope = self.mask.reduce_vector(slope);
        let modal_coeff = &self.conv_matrix * reduced_slope;
        let dm_command = &self.control_matrix_modal * &modal_coeff;
        Ok((
            modal_coeff.as_slice().to_vec(),
            dm_command.as_slice().to_vec(),
        ))
    }
}

impl ModalSolution {
    pub fn conv_matrix(&self) -> &na::DMatrix<f64> {
        &self.control.conv_matrix
    }
    pub fn control_matrix_modal(&self) -> &Pinv {
        &self.control.control_matrix_modal
    }
    pub fn p_matrix(&self) -> &na::DMatrix<f64> {
        &self.control.p_matrix
    }
}

impl Display for ModalControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "MODAL CONTROL ({}, {} modes, {} actuators):",
            self.mask,
            self.n_mode(),
            self.n_actuator()
        )?;
        write!(f, " * modal control matrix: {}", self.control_matrix_modal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_to_upper() {
        let l = na::DMatrix::from_row_slice(2, 2, &[2., 0., 1., 3.]);
        let p = upper_triangular(l.clone());
        assert_eq!(p, l.transpose());
        assert_eq!(upper_triangular(p.clone()), p);
    }

    #[test]
    fn singular_gram() {
        // 2 identical modes
        let zern = na::DMatrix::from_row_slice(3, 2, &[1., 1., 2., 2., -1., -1.]);
        let zern_grad = na::DMatrix::from_row_slice(3, 2, &[1., 0., 0., 1., 1., 1.]);
        let response = na::DMatrix::<f64>::identity(3, 3);
        let err = ModalSolver::default()
            .solve(&[0.1, 0.2, 0.3], &zern, &zern_grad, &response)
            .unwrap_err();
        assert!(matches!(
            err,
            FlatError::SingularGramMatrix {
                n_valid: 3,
                n_mode: 2
            }
        ));
    }

    #[test]
    fn rescaled_mode() {
        let zern = na::DMatrix::from_row_slice(4, 2, &[1., 0., 0., 1e-7, 1., 1e-7, 2., -1e-7]);
        let zern_grad = na::DMatrix::from_row_slice(4, 2, &[1., 0., 0., 1., 1., 1., 2., -1.]);
        let response = na::DMatrix::<f64>::identity(4, 3);
        let solution = ModalSolver::default()
            .solve(&[0.1, -0.2, 0.05, 0.3], &zern, &zern_grad, &response)
            .unwrap();
        let gram = zern.tr_mul(&zern);
        let p = solution.p_matrix();
        assert_eq!(p[(1, 0)], 0.);
        let ptp = p.tr_mul(p);
        assert!((ptp[(0, 0)] - gram[(0, 0)]).abs() < 1e-12);
        assert!((ptp[(1, 1)] / gram[(1, 1)] - 1.).abs() < 1e-9);
    }

    #[test]
    fn fewer_channels_than_modes() {
        let zern = na::DMatrix::<f64>::identity(2, 3);
        let response = na::DMatrix::<f64>::identity(2, 2);
        let err = ModalSolver::default()
            .solve(&[0.1, 0.2], &zern, &zern, &response)
            .unwrap_err();
        assert!(matches!(
            err,
            FlatError::SingularGramMatrix {
                n_valid: 2,
                n_mode: 3
            }
        ));
    }

    #[test]
    fn no_mode() {
        let zern = na::DMatrix::<f64>::zeros(3, 0);
        let response = na::DMatrix::<f64>::identity(3, 3);
        let err = ModalSolver::default()
            .solve(&[0.1, 0.2, 0.3], &zern, &zern, &response)
            .unwrap_err();
        assert!(matches!(
            err,
            FlatError::DimensionMismatch {
                expected: 1,
                found: 0,
                ..
            }
        ));
    }

    #[test]
    fn modes_mismatch() {
        let zern = na::DMatrix::<f64>::identity(3, 2);
        let zern_grad = na::DMatrix::<f64>::identity(3, 3);
        let response = na::DMatrix::<f64>::identity(3, 3);
        let err = ModalSolver::default()
            .solve(&[0.1, 0.2, 0.3], &zern, &zern_grad, &response)
            .unwrap_err();
        assert!(matches!(
            err,
            FlatError::DimensionMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }
}
