use std::{
    fmt::Display,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use nalgebra as na;
use serde::{Deserialize, Serialize};

use crate::{FlatError, Result};

/// Zernike basis sampled over the wavefront sensor subapertures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZernikeBasis {
    /// Zernike polynomials per channel (`2N x Z`)
    pub zern_matrix: na::DMatrix<f64>,
    /// Zernike polynomials x and y gradients per channel (`2N x Z`)
    pub zern_grad_matrix: na::DMatrix<f64>,
}

/// Calibration matrices
///
/// All the matrices share the same row space: the slope channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// DM slope response matrix (`2N x M`)
    pub response_matrix_slopes: na::DMatrix<f64>,
    /// Zernike basis, only required by the modal correction
    pub zernike: Option<ZernikeBasis>,
}

impl Calibration {
    /// Creates a calibration for the zonal correction
    pub fn zonal(response_matrix_slopes: na::DMatrix<f64>) -> Self {
        Self {
            response_matrix_slopes,
            zernike: None,
        }
    }
    /// Creates a calibration for both the zonal and modal corrections
    pub fn modal(
        response_matrix_slopes: na::DMatrix<f64>,
        zern_matrix: na::DMatrix<f64>,
        zern_grad_matrix: na::DMatrix<f64>,
    ) -> Result<Self> {
        let this = Self {
            response_matrix_slopes,
            zernike: Some(ZernikeBasis {
                zern_matrix,
                zern_grad_matrix,
            }),
        };
        this.validate()?;
        Ok(this)
    }
    /// Number of slope channels
    pub fn n_channel(&self) -> usize {
        self.response_matrix_slopes.nrows()
    }
    /// Number of DM actuators
    pub fn n_actuator(&self) -> usize {
        self.response_matrix_slopes.ncols()
    }
    /// Number of Zernike modes
    pub fn n_mode(&self) -> Option<usize> {
        self.zernike.as_ref().map(|z| z.zern_matrix.ncols())
    }
    /// Checks that all the matrices share the same channels and modes
    pub fn validate(&self) -> Result<()> {
        FlatError::check_columns(
            "slope response matrix columns (actuators)",
            self.response_matrix_slopes.ncols(),
        )?;
        let Some(ZernikeBasis {
            zern_matrix,
            zern_grad_matrix,
        }) = &self.zernike
        else {
            return Ok(());
        };
        let n = self.n_channel();
        if zern_matrix.nrows() != n {
            return Err(FlatError::mismatch(
                "slope response matrix vs. Zernike matrix rows",
                n,
                zern_matrix.nrows(),
            ));
        }
        if zern_grad_matrix.nrows() != n {
            return Err(FlatError::mismatch(
                "slope response matrix vs. Zernike gradient matrix rows",
                n,
                zern_grad_matrix.nrows(),
            ));
        }
        if zern_grad_matrix.ncols() != zern_matrix.ncols() {
            return Err(FlatError::mismatch(
                "Zernike matrix vs. Zernike gradient matrix modes",
                zern_matrix.ncols(),
                zern_grad_matrix.ncols(),
            ));
        }
        FlatError::check_columns("Zernike matrix columns (modes)", zern_matrix.ncols())
    }
    /// Loads the calibration from a pickle file
    pub fn from_pickle<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("loading calibration from {path:?}");
        let this: Self =
            serde_pickle::from_reader(BufReader::new(File::open(path)?), Default::default())?;
        this.validate()?;
        Ok(this)
    }
    /// Saves the calibration into a pickle file
    pub fn to_pickle<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        log::info!("saving calibration to {path:?}");
        serde_pickle::to_writer(
            &mut BufWriter::new(File::create(path)?),
            self,
            Default::default(),
        )?;
        Ok(())
    }
}

impl Display for Calibration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CALIBRATION: {} channels, {} actuators",
            self.n_channel(),
            self.n_actuator()
        )?;
        if let Some(n_mode) = self.n_mode() {
            write!(f, ", {n_mode} Zernike modes")?;
        }
        Ok(())
    }
}
