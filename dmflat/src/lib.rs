/*!
# dmflat

Deformable mirror command that flattens the wavefront measured by a Shack-Hartmann
wavefront sensor.

The wavefront sensor slopes of obscured subapertures are set to zero by the
centroiding, these slopes are discarded together with the matching rows of the
calibration matrices before solving for the DM command.

Two corrections are available:
 * [ZonalSolver]: the DM command is the least-squares solution of the slope response matrix,
 * [ModalSolver]: the slopes are first converted into Zernike modal coefficients
   and the DM command is the least-squares solution of the modal response matrix.

```
use dmflat::ZonalSolver;
use nalgebra as na;

let response = na::DMatrix::from_row_slice(4, 2, &[1., 0., 0., 1., 1., 0., 0., 1.]);
let solution = ZonalSolver::default().solve(&[0., -0.2, 0.1, -0.2], &response)?;
assert_eq!(solution.mask.area(), 3);
assert!((solution.dm_command[0] - 0.1).abs() < 1e-12);
# Ok::<(), dmflat::FlatError>(())
```
*/

mod calibration;
pub mod clients;
mod config;
mod error;
mod mask;
mod modal;
mod pinv;
mod zonal;

pub use calibration::{Calibration, ZernikeBasis};
pub use config::SolverConfig;
pub use error::{FlatError, Result};
pub use mask::{invalid_indices, ChannelMask};
pub use modal::{upper_triangular, ModalControl, ModalSolution, ModalSolver};
pub use pinv::Pinv;
pub use zonal::{ZonalSolution, ZonalSolver};
