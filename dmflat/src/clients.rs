//! Actors clients
//!
//! [Controller] reads [Slopes] and writes the [DmCommand] computed with either the
//! [Zonal] or the [Modal] correction.
//! The control matrices are derived again only when the set of valid slopes changes.

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use interface::{Data, Read, Update, Write, UID};
use nalgebra as na;

use crate::{
    Calibration, ChannelMask, FlatError, ModalControl, ModalSolver, Pinv, Result, ZonalSolver,
};

/// Wavefront sensor slopes, obscured subapertures set to zero
#[derive(UID)]
#[uid(port = 55_001)]
pub enum Slopes {}

/// DM actuators command
#[derive(UID)]
#[uid(port = 55_002)]
pub enum DmCommand {}

/// Zernike modal coefficients of the modal correction
#[derive(UID)]
#[uid(port = 55_003)]
pub enum ModalCoefficients {}

/// Slopes to DM command correction interface
pub trait Correction {
    fn correct(&mut self, slope: &[f64]) -> Result<Vec<f64>>;
}

/// Zonal correction with the control matrix kept between frames
#[derive(Debug, Clone)]
pub struct Zonal {
    solver: ZonalSolver,
    response_matrix_slopes: na::DMatrix<f64>,
    control: Option<(ChannelMask, Pinv)>,
}

impl Zonal {
    pub fn new(solver: ZonalSolver, calibration: &Calibration) -> Self {
        Self {
            solver,
            response_matrix_slopes: calibration.response_matrix_slopes.clone(),
            control: None,
        }
    }
    /// Returns the last control matrix and the mask it was derived for
    pub fn control(&self) -> Option<&(ChannelMask, Pinv)> {
        self.control.as_ref()
    }
}

impl Correction for Zonal {
    fn correct(&mut self, slope: &[f64]) -> Result<Vec<f64>> {
        let mask = ChannelMask::from_slopes(slope);
        mask.check_len(
            "slopes vs. slope response matrix rows",
            self.response_matrix_slopes.nrows(),
        )?;
        let (mask, pinv) = match self.control.take() {
            Some((cached, pinv)) if cached == mask => (cached, pinv),
            _ => {
                log::info!("zonal control matrix update ({mask})");
                let pinv = self
                    .solver
                    .control_matrix(&mask, &self.response_matrix_slopes)?;
                (mask, pinv)
            }
        };
        let dm_command = (&pinv * &mask.reduce_vector(slope)).as_slice().to_vec();
        self.control = Some((mask, pinv));
        Ok(dm_command)
    }
}

/// Modal correction with the conversion and control matrices kept between frames
#[derive(Debug, Clone)]
pub struct Modal {
    solver: ModalSolver,
    calibration: Calibration,
    control: Option<ModalControl>,
    modal_coeff: Vec<f64>,
}

impl Modal {
    /// Creates a new modal correction
    ///
    /// Fails if the calibration has no Zernike basis
    pub fn new(solver: ModalSolver, calibration: &Calibration) -> Result<Self> {
        calibration.validate()?;
        if calibration.zernike.is_none() {
            return Err(FlatError::MissingZernikeBasis);
        }
        Ok(Self {
            solver,
            calibration: calibration.clone(),
            control: None,
            modal_coeff: Vec::new(),
        })
    }
    pub fn control(&self) -> Option<&ModalControl> {
        self.control.as_ref()
    }
}

impl Correction for Modal {
    fn correct(&mut self, slope: &[f64]) -> Result<Vec<f64>> {
        let mask = ChannelMask::from_slopes(slope);
        let control = match self.control.take() {
            Some(control) if control.mask == mask => control,
            _ => {
                log::info!("modal control matrices update ({mask})");
                let Some(zernike) = &self.calibration.zernike else {
                    return Err(FlatError::MissingZernikeBasis);
                };
                self.solver.control(
                    &mask,
                    &zernike.zern_matrix,
                    &zernike.zern_grad_matrix,
                    &self.calibration.response_matrix_slopes,
                )?
            }
        };
        let (modal_coeff, dm_command) = control.apply(slope)?;
        self.modal_coeff = modal_coeff;
        self.control = Some(control);
        Ok(dm_command)
    }
}

/// Actor client wrapping a [Correction]
#[derive(Debug)]
pub struct Controller<C: Correction> {
    correction: C,
    slopes: Arc<Vec<f64>>,
    dm_command: Option<Arc<Vec<f64>>>,
}

pub type ZonalController = Controller<Zonal>;
pub type ModalController = Controller<Modal>;

impl<C: Correction> From<C> for Controller<C> {
    fn from(correction: C) -> Self {
        Self {
            correction,
            slopes: Default::default(),
            dm_command: None,
        }
    }
}

impl<C: Correction> Controller<C> {
    /// Returns the last DM command, if the last correction succeeded
    pub fn dm_command(&self) -> Option<&[f64]> {
        self.dm_command.as_ref().map(|c| c.as_slice())
    }
}

impl<C: Correction> Deref for Controller<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.correction
    }
}

impl<C: Correction> DerefMut for Controller<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.correction
    }
}

impl<C: Correction + Send + Sync> Update for Controller<C> {
    fn update(&mut self) {
        let slopes = Arc::clone(&self.slopes);
        self.dm_command = match self.correction.correct(&slopes) {
            Ok(dm_command) => Some(Arc::new(dm_command)),
            Err(e) => {
                log::error!("DM command not updated: {e}");
                None
            }
        };
    }
}

impl<C: Correction + Send + Sync> Read<Slopes> for Controller<C> {
    fn read(&mut self, data: Data<Slopes>) {
        self.slopes = data.into_arc();
    }
}

impl<C: Correction + Send + Sync> Write<DmCommand> for Controller<C> {
    fn write(&mut self) -> Option<Data<DmCommand>> {
        self.dm_command.as_ref().map(Data::from)
    }
}

impl Write<ModalCoefficients> for Controller<Modal> {
    fn write(&mut self) -> Option<Data<ModalCoefficients>> {
        self.dm_command
            .as_ref()
            .map(|_| Data::new(self.correction.modal_coeff.clone()))
    }
}
