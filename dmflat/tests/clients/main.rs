use dmflat::{
    clients::{
        DmCommand, Modal, ModalCoefficients, ModalController, Slopes, Zonal, ZonalController,
    },
    Calibration, FlatError, ModalSolver, ZonalSolver,
};
use interface::{Data, Read, Update, Write};
use nalgebra as na;
use nanorand::{Rng, WyRand};

fn calibration(rng: &mut WyRand) -> anyhow::Result<Calibration> {
    let mut random = |n_rows, n_cols| {
        na::DMatrix::<f64>::from_fn(n_rows, n_cols, |_, _| 2. * rng.generate::<f64>() - 1.)
    };
    Ok(Calibration::modal(
        random(24, 10),
        random(24, 4),
        random(24, 4),
    )?)
}

fn slopes(rng: &mut WyRand, obscured: &[usize]) -> Vec<f64> {
    (0..24)
        .map(|i| {
            if obscured.contains(&i) {
                0.
            } else {
                0.5 + rng.generate::<f64>()
            }
        })
        .collect()
}

#[test]
fn zonal() -> anyhow::Result<()> {
    let mut rng = WyRand::new_seed(17);
    let calib = calibration(&mut rng)?;
    let mut controller: ZonalController = Zonal::new(ZonalSolver::default(), &calib).into();
    assert!(controller.control().is_none());

    let data = slopes(&mut rng, &[1, 7]);
    <ZonalController as Read<Slopes>>::read(&mut controller, Data::new(data.clone()));
    controller.update();
    let dm_command = <ZonalController as Write<DmCommand>>::write(&mut controller)
        .map(|data| data.to_vec())
        .unwrap();
    let expected = ZonalSolver::default().solve(&data, &calib.response_matrix_slopes)?;
    assert_eq!(dm_command, expected.dm_command);
    let (mask, pinv) = controller.control().cloned().unwrap();
    assert_eq!(mask.area(), 22);

    // same obscuration: the control matrix is kept
    let data = slopes(&mut rng, &[1, 7]);
    <ZonalController as Read<Slopes>>::read(&mut controller, Data::new(data.clone()));
    controller.update();
    assert_eq!(controller.control().map(|(_, p)| p), Some(&pinv));
    let expected = ZonalSolver::default().solve(&data, &calib.response_matrix_slopes)?;
    assert_eq!(controller.dm_command(), Some(expected.dm_command.as_slice()));

    // new obscuration: the control matrix is updated
    let data = slopes(&mut rng, &[1, 7, 12]);
    <ZonalController as Read<Slopes>>::read(&mut controller, Data::new(data));
    controller.update();
    let (mask, _) = controller.control().unwrap();
    assert_eq!(mask.area(), 21);
    Ok(())
}

#[test]
fn modal() -> anyhow::Result<()> {
    let mut rng = WyRand::new_seed(23);
    let calib = calibration(&mut rng)?;
    let mut controller: ModalController = Modal::new(ModalSolver::default(), &calib)?.into();

    let data = slopes(&mut rng, &[0, 3, 20]);
    <ModalController as Read<Slopes>>::read(&mut controller, Data::new(data.clone()));
    controller.update();

    let zernike = calib.zernike.as_ref().unwrap();
    let expected = ModalSolver::default().solve(
        &data,
        &zernike.zern_matrix,
        &zernike.zern_grad_matrix,
        &calib.response_matrix_slopes,
    )?;
    let modal_coeff = <ModalController as Write<ModalCoefficients>>::write(&mut controller)
        .map(|data| data.to_vec())
        .unwrap();
    assert_eq!(modal_coeff, expected.modal_coeff);
    assert_eq!(controller.dm_command(), Some(expected.dm_command.as_slice()));
    assert_eq!(controller.control().unwrap().n_mode(), 4);
    Ok(())
}

#[test]
fn no_command_without_valid_slopes() -> anyhow::Result<()> {
    let mut rng = WyRand::new_seed(29);
    let calib = calibration(&mut rng)?;
    let mut controller: ZonalController = Zonal::new(ZonalSolver::default(), &calib).into();

    <ZonalController as Read<Slopes>>::read(&mut controller, Data::new(slopes(&mut rng, &[])));
    controller.update();
    assert!(<ZonalController as Write<DmCommand>>::write(&mut controller).is_some());

    <ZonalController as Read<Slopes>>::read(&mut controller, Data::new(vec![0f64; 24]));
    controller.update();
    assert!(<ZonalController as Write<DmCommand>>::write(&mut controller).is_none());
    Ok(())
}

#[test]
fn modal_without_zernike() {
    let calib = Calibration::zonal(na::DMatrix::identity(4, 4));
    assert!(matches!(
        Modal::new(ModalSolver::default(), &calib),
        Err(FlatError::MissingZernikeBasis)
    ));
}
