#[derive(thiserror::Error, Debug)]
pub enum FlatError {
    #[error("dimension mismatch: {what} (expected {expected}, found {found})")]
    DimensionMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("all the slope channels are invalid, no measurement left to solve for")]
    AllChannelsInvalid,
    #[error(
        "singular Gram matrix: {n_valid} valid channels cannot support {n_mode} Zernike modes"
    )]
    SingularGramMatrix { n_valid: usize, n_mode: usize },
    #[error("the calibration is missing the Zernike basis of the modal correction")]
    MissingZernikeBasis,
    #[error("pseudo-inverse failed: {0}")]
    PseudoInverse(&'static str),
    #[error("failed to open file")]
    Io(#[from] std::io::Error),
    #[error("pickle (de)serialization failed")]
    Pickle(#[from] serde_pickle::Error),
    #[error("failed to parse configuration")]
    Toml(#[from] toml::de::Error),
}
pub type Result<T> = std::result::Result<T, FlatError>;

impl FlatError {
    pub(crate) fn mismatch<S: Into<String>>(what: S, expected: usize, found: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            found,
        }
    }
    /// Fails on a matrix without any column
    pub(crate) fn check_columns<S: Into<String>>(what: S, n_cols: usize) -> Result<()> {
        if n_cols == 0 {
            Err(Self::mismatch(what, 1, 0))
        } else {
            Ok(())
        }
    }
}
