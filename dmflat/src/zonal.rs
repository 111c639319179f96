use std::fmt::Display;

use nalgebra as na;

use crate::{ChannelMask, FlatError, Pinv, Result, SolverConfig};

/// Zonal correction
///
/// The DM command is derived directly from the slopes with the pseudo-inverse of
/// the slope response matrix restricted to the valid channels.
#[derive(Debug, Default, Clone)]
pub struct ZonalSolver {
    config: SolverConfig,
}

/// Zonal correction result
#[derive(Debug, Clone)]
pub struct ZonalSolution {
    /// Mask the slopes and the response matrix were reduced with
    pub mask: ChannelMask,
    /// Pseudo-inverse of the reduced slope response matrix (`M x (2N-k)`)
    pub control_matrix_slopes: Pinv,
    /// DM command vector (`M`)
    pub dm_command: Vec<f64>,
}

impl ZonalSolver {
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
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<ZonalSolution> {
        self.solve_masked(slope, &ChannelMask::from_slopes(slope), response_matrix_slopes)
    }
    /// Computes the DM command from the slopes selected with `mask`
    pub fn solve_masked(
        &self,
        slope: &[f64],
        mask: &ChannelMask,
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<ZonalSolution> {
        mask.check_len("slopes vs. mask", slope.len())?;
        mask.check_len(
            "slopes vs. slope response matrix rows",
            response_matrix_slopes.nrows(),
        )?;
        mask.check_area()?;
        log::debug!("zonal solver: {mask}");

        let control_matrix_slopes = self.control_matrix(mask, response_matrix_slopes)?;
        let reduced_slope = mask.reduce_vector(slope);
        let dm_command = (&control_matrix_slopes * &reduced_slope).as_slice().to_vec();

        Ok(ZonalSolution {
            mask: mask.clone(),
            control_matrix_slopes,
            dm_command,
        })
    }
    /// Returns the pseudo-inverse of the slope response matrix restricted to the valid channels
    ///
    /// The control matrix depends only on the calibration and on the mask.
    pub fn control_matrix(
        &self,
        mask: &ChannelMask,
        response_matrix_slopes: &na::DMatrix<f64>,
    ) -> Result<Pinv> {
        mask.check_len(
            "mask vs. slope response matrix rows",
            response_matrix_slopes.nrows(),
        )?;
        FlatError::check_columns(
            "slope response matrix columns (actuators)",
            response_matrix_slopes.ncols(),
        )?;
        mask.check_area()?;
        let reduced_response = mask.reduce_rows(response_matrix_slopes);
        Pinv::new(&reduced_response, &self.config)
    }
}

impl ZonalSolution {
    pub fn n_actuator(&self) -> usize {
        self.dm_command.len()
    }
}

impl Display for ZonalSolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "ZONAL SOLUTION ({}):", self.mask)?;
        writeln!(f, " * control matrix: {}", self.control_matrix_slopes)?;
        write!(f, " * DM command: {} actuators", self.n_actuator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FlatError;

    fn response() -> na::DMatrix<f64> {
        na::DMatrix::from_row_slice(4, 2, &[1., 0., 0., 1., 1., 0., 0., 1.])
    }

    #[test]
    fn mismatch() {
        let solver = ZonalSolver::default();
        let err = solver
            .solve(&[0.1, 0.2, 0.3], &response())
            .unwrap_err();
        assert!(matches!(
            err,
            FlatError::DimensionMismatch {
                expected: 3,
                found: 4,
                ..
            }
        ));
    }

    #[test]
    fn all_invalid() {
        let solver = ZonalSolver::default();
        let err = solver.solve(&[0.; 4], &response()).unwrap_err();
        assert!(matches!(err, FlatError::AllChannelsInvalid));
    }

    #[test]
    fn identity_like() {
        let solver = ZonalSolver::default();
        let solution = solver.solve(&[0.1, -0.2, 0.3, -0.4], &response()).unwrap();
        assert_eq!(solution.control_matrix_slopes.shape(), (2, 4));
        assert!((solution.dm_command[0] - 0.2).abs() < 1e-12);
        assert!((solution.dm_command[1] + 0.3).abs() < 1e-12);
    }
}
