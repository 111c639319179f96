use std::env;

use dmflat::{
    clients::{Controller, Correction, DmCommand, Modal, Slopes, Zonal},
    Calibration, ModalSolver, SolverConfig, ZonalSolver,
};
use interface::{Data, Read, Update, Write};
use nalgebra as na;
use nanorand::{Rng, WyRand};

const N_SIDE_LENSLET: usize = 10;
const N_SIDE_ACTUATOR: usize = 7;
const N_MODE: usize = 6;
const N_STEP: usize = 20;
const GAIN: f64 = 0.5;

/*
METHOD=modal RUST_LOG=info cargo run --release
*/

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let calibration = toy_calibration()?;
    println!("{calibration}");
    let Some(zernike) = calibration.zernike.as_ref() else {
        anyhow::bail!("the toy calibration is missing the Zernike basis");
    };

    // Wavefront aberration
    let mut rng = WyRand::new_seed(4237);
    let aberration =
        na::DVector::from_fn(N_MODE, |_, _| (2. * rng.generate::<f64>() - 1.) * 1e-1);
    let wavefront_slopes = &zernike.zern_grad_matrix * aberration;

    // Central obscuration & outer pupil edge
    let valid = lenslet_centers()
        .map(|(x, y)| x.hypot(y))
        .map(|r| r > 0.25 && r < 1.)
        .collect::<Vec<bool>>();
    println!(
        "{}/{} valid lenslets",
        valid.iter().filter(|&&v| v).count(),
        valid.len()
    );

    let config = SolverConfig::default();
    let method = env::var("METHOD").unwrap_or_else(|_| "zonal".into());
    let rms = match method.as_str() {
        "zonal" => {
            let mut controller: Controller<_> =
                Zonal::new(ZonalSolver::new(config), &calibration).into();
            run(&mut controller, &calibration, &wavefront_slopes, &valid, &mut rng)
        }
        "modal" => {
            let mut controller: Controller<_> =
                Modal::new(ModalSolver::new(config), &calibration)?.into();
            run(&mut controller, &calibration, &wavefront_slopes, &valid, &mut rng)
        }
        _ => anyhow::bail!("unknown correction method: {method} (zonal|modal)"),
    };
    rms.iter()
        .enumerate()
        .for_each(|(i, x)| println!("#{i:02}: slopes rms: {x:.3e}"));

    Ok(())
}

/// Integrates the DM command with the measured slopes and returns the slopes rms
fn run<C: Correction + Send + Sync>(
    controller: &mut Controller<C>,
    calibration: &Calibration,
    wavefront_slopes: &na::DVector<f64>,
    valid: &[bool],
    rng: &mut WyRand,
) -> Vec<f64> {
    let mut dm = na::DVector::<f64>::zeros(calibration.n_actuator());
    let mut rms = Vec::with_capacity(N_STEP);
    for _ in 0..N_STEP {
        let residual = wavefront_slopes + &calibration.response_matrix_slopes * &dm;
        let slopes: Vec<f64> = residual
            .iter()
            .zip(valid.iter().cycle())
            .map(|(s, &v)| {
                if v {
                    s + (2. * rng.generate::<f64>() - 1.) * 1e-4
                } else {
                    0f64
                }
            })
            .collect();
        let n = slopes.iter().filter(|s| **s != 0f64).count();
        rms.push((slopes.iter().map(|s| s * s).sum::<f64>() / n as f64).sqrt());

        <Controller<C> as Read<Slopes>>::read(controller, Data::new(slopes));
        controller.update();
        match <Controller<C> as Write<DmCommand>>::write(controller) {
            Some(command) => dm
                .iter_mut()
                .zip(command.iter())
                .for_each(|(dm, c)| *dm -= GAIN * c),
            None => {
                log::warn!("DM command not available, keeping the DM shape");
            }
        }
    }
    rms
}

/// Lenslet centers in the unit square, row major
fn lenslet_centers() -> impl Iterator<Item = (f64, f64)> {
    let d = 2. / N_SIDE_LENSLET as f64;
    (0..N_SIDE_LENSLET * N_SIDE_LENSLET).map(move |k| {
        let (i, j) = (k / N_SIDE_LENSLET, k % N_SIDE_LENSLET);
        (-1. + d * (j as f64 + 0.5), -1. + d * (i as f64 + 0.5))
    })
}

/// Low order Zernike polynomials (tip, tilt, focus, astigmatisms, coma) and their gradients
fn zernike(x: f64, y: f64) -> [(f64, f64, f64); N_MODE] {
    let r2 = x * x + y * y;
    [
        (2. * x, 2., 0.),
        (2. * y, 0., 2.),
        (
            3f64.sqrt() * (2. * r2 - 1.),
            3f64.sqrt() * 4. * x,
            3f64.sqrt() * 4. * y,
        ),
        (
            6f64.sqrt() * 2. * x * y,
            6f64.sqrt() * 2. * y,
            6f64.sqrt() * 2. * x,
        ),
        (
            6f64.sqrt() * (x * x - y * y),
            6f64.sqrt() * 2. * x,
            -6f64.sqrt() * 2. * y,
        ),
        (
            8f64.sqrt() * (3. * r2 - 2.) * x,
            8f64.sqrt() * (9. * x * x + 3. * y * y - 2.),
            8f64.sqrt() * 6. * x * y,
        ),
    ]
}

/// Gaussian influence functions DM with the slope channels ordered x then y
fn toy_calibration() -> anyhow::Result<Calibration> {
    let n_lenslet = N_SIDE_LENSLET * N_SIDE_LENSLET;
    let n_actuator = N_SIDE_ACTUATOR * N_SIDE_ACTUATOR;
    let pitch = 2. / (N_SIDE_ACTUATOR - 1) as f64;
    let actuators: Vec<(f64, f64)> = (0..n_actuator)
        .map(|k| {
            let (i, j) = (k / N_SIDE_ACTUATOR, k % N_SIDE_ACTUATOR);
            (-1. + pitch * j as f64, -1. + pitch * i as f64)
        })
        .collect();
    let centers: Vec<_> = lenslet_centers().collect();

    let response = na::DMatrix::<f64>::from_fn(2 * n_lenslet, n_actuator, |i, j| {
        let (x, y) = centers[i % n_lenslet];
        let (xa, ya) = actuators[j];
        let w2 = pitch * pitch;
        let influence = (-((x - xa).powi(2) + (y - ya).powi(2)) / (2. * w2)).exp();
        if i < n_lenslet {
            -(x - xa) / w2 * influence
        } else {
            -(y - ya) / w2 * influence
        }
    });
    let zern = na::DMatrix::<f64>::from_fn(2 * n_lenslet, N_MODE, |i, j| {
        let (x, y) = centers[i % n_lenslet];
        zernike(x, y)[j].0
    });
    let zern_grad = na::DMatrix::<f64>::from_fn(2 * n_lenslet, N_MODE, |i, j| {
        let (x, y) = centers[i % n_lenslet];
        let (_, dx, dy) = zernike(x, y)[j];
        if i < n_lenslet {
            dx
        } else {
            dy
        }
    });

    Ok(Calibration::modal(response, zern, zern_grad)?)
}
