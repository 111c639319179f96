use std::{
    env,
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

use dmflat::{Calibration, ModalSolver, SolverConfig, ZonalSolver};

/*
CALIBRATION=calibration.pkl SLOPES=slopes.pkl METHOD=modal cargo run --release
*/

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let data_repo = env::var("DATA_REPO").unwrap_or_else(|_| ".".into());
    let data_path = Path::new(&data_repo);

    let config = match env::var("DMFLAT_CONFIG") {
        Ok(path) => SolverConfig::from_path(path)?,
        Err(_) => SolverConfig::default(),
    };
    log::info!("{config:?}");

    let calibration = Calibration::from_pickle(
        data_path.join(env::var("CALIBRATION").unwrap_or_else(|_| "calibration.pkl".into())),
    )?;
    println!("{calibration}");

    let slope: Vec<f64> = serde_pickle::from_reader(
        BufReader::new(File::open(
            data_path.join(env::var("SLOPES").unwrap_or_else(|_| "slopes.pkl".into())),
        )?),
        Default::default(),
    )?;

    let dm_command = match env::var("METHOD").as_deref() {
        Ok("modal") => {
            let Some(zernike) = &calibration.zernike else {
                anyhow::bail!("modal correction requires a Zernike basis in the calibration");
            };
            let solution = ModalSolver::new(config).solve(
                &slope,
                &zernike.zern_matrix,
                &zernike.zern_grad_matrix,
                &calibration.response_matrix_slopes,
            )?;
            println!("{}", solution.control);
            solution.dm_command
        }
        Ok("zonal") | Err(_) => {
            let solution =
                ZonalSolver::new(config).solve(&slope, &calibration.response_matrix_slopes)?;
            println!("{solution}");
            solution.dm_command
        }
        Ok(method) => anyhow::bail!("unknown correction method: {method} (zonal|modal)"),
    };

    let path = data_path.join("dm_command.pkl");
    serde_pickle::to_writer(
        &mut BufWriter::new(File::create(&path)?),
        &dm_command,
        Default::default(),
    )?;
    log::info!("DM command saved to {path:?}");

    Ok(())
}
