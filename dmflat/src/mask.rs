use std::{collections::BTreeSet, fmt::Display};

use nalgebra as na;

use crate::{FlatError, Result};

/// Returns the indices of the slopes set to zero by the centroiding
///
/// ```
/// let invalid = dmflat::invalid_indices(&[0.1, 0., -0.2, 0.]);
/// assert_eq!(invalid.into_iter().collect::<Vec<_>>(), vec![1, 3]);
/// ```
pub fn invalid_indices(slope: &[f64]) -> BTreeSet<usize> {
    slope
        .iter()
        .enumerate()
        .filter_map(|(i, s)| if *s == 0f64 { Some(i) } else { None })
        .collect()
}

/// Measurement channels validity mask
///
/// A `true` entry flags a valid channel.
/// The same mask must be used to reduce the slopes and every calibration matrix
/// that shares the slope channels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelMask {
    mask: Vec<bool>,
    valid: Vec<usize>,
}

impl ChannelMask {
    /// Creates a mask from an explicit list of channel validity flags
    pub fn new(mask: Vec<bool>) -> Self {
        let valid = mask
            .iter()
            .enumerate()
            .filter_map(|(i, b)| if *b { Some(i) } else { None })
            .collect();
        Self { mask, valid }
    }
    /// Creates a mask where the slopes exactly equal to zero are invalid
    pub fn from_slopes(slope: &[f64]) -> Self {
        slope.iter().map(|s| *s != 0f64).collect::<Vec<_>>().into()
    }
    /// Number of channels
    pub fn len(&self) -> usize {
        self.mask.len()
    }
    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }
    /// Number of valid channels
    pub fn area(&self) -> usize {
        self.valid.len()
    }
    pub fn as_slice(&self) -> &[bool] {
        &self.mask
    }
    pub fn valid_indices(&self) -> &[usize] {
        &self.valid
    }
    pub fn invalid_indices(&self) -> BTreeSet<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter_map(|(i, b)| if *b { None } else { Some(i) })
            .collect()
    }
    /// Fails if there is not a single valid channel left
    pub fn check_area(&self) -> Result<()> {
        if self.valid.is_empty() {
            Err(FlatError::AllChannelsInvalid)
        } else {
            Ok(())
        }
    }
    /// Fails if `n` channels do not match the mask length
    pub fn check_len<S: Into<String>>(&self, what: S, n: usize) -> Result<()> {
        if n == self.len() {
            Ok(())
        } else {
            Err(FlatError::mismatch(what, self.len(), n))
        }
    }
    /// Returns the valid entries of `data`
    pub fn reduce_vector(&self, data: &[f64]) -> na::DVector<f64> {
        na::DVector::from_iterator(self.valid.len(), self.valid.iter().map(|&i| data[i]))
    }
    /// Returns a copy of `mat` without the rows of the invalid channels
    pub fn reduce_rows(&self, mat: &na::DMatrix<f64>) -> na::DMatrix<f64> {
        mat.select_rows(&self.valid)
    }
}

impl From<Vec<bool>> for ChannelMask {
    fn from(mask: Vec<bool>) -> Self {
        Self::new(mask)
    }
}

impl Display for ChannelMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mask: {}/{} valid channels", self.area(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_zero_slope() {
        let slope = vec![0.3, -0.1, 1e-12, -2.];
        assert!(invalid_indices(&slope).is_empty());
        let mask = ChannelMask::from_slopes(&slope);
        assert_eq!(mask.area(), 4);
        let mat = na::DMatrix::<f64>::from_fn(4, 3, |i, j| (i * 3 + j) as f64);
        assert_eq!(mask.reduce_rows(&mat), mat);
        assert_eq!(mask.reduce_vector(&slope).as_slice(), slope.as_slice());
    }

    #[test]
    fn empty_slope() {
        assert!(invalid_indices(&[]).is_empty());
        let mask = ChannelMask::from_slopes(&[]);
        assert!(mask.is_empty());
        assert!(matches!(mask.check_area(), Err(FlatError::AllChannelsInvalid)));
    }

    #[test]
    fn zero_sentinel() {
        let slope = vec![0., 0.5, 0., -0.5, 0.25];
        let mask = ChannelMask::from_slopes(&slope);
        assert_eq!(mask.invalid_indices(), invalid_indices(&slope));
        assert_eq!(mask.valid_indices(), &[1, 3, 4]);
        assert_eq!(mask.reduce_vector(&slope).as_slice(), &[0.5, -0.5, 0.25]);
        let mat = na::DMatrix::<f64>::from_fn(5, 2, |i, j| (10 * i + j) as f64);
        let reduced = mask.reduce_rows(&mat);
        assert_eq!(reduced.shape(), (3, 2));
        assert_eq!(reduced.row(0)[1], 11.);
        assert_eq!(reduced.row(2)[0], 40.);
    }

    #[test]
    fn explicit_mask() {
        let mask: ChannelMask = vec![true, false, true].into();
        assert_eq!(mask.to_string(), "mask: 2/3 valid channels");
        assert!(mask.check_len("slopes", 4).is_err());
        assert!(mask.check_len("slopes", 3).is_ok());
    }
}
