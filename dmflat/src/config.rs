use std::{fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{FlatError, Result};

/// Solvers configuration
///
/// ```
/// use dmflat::SolverConfig;
///
/// let config: SolverConfig = "cond_threshold = 1e3".parse().unwrap();
/// assert_eq!(config.cond_threshold, 1e3);
/// assert_eq!(config.rcond, 1e-15);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Singular values below `rcond` times the largest one are discarded by the pseudo-inverse
    pub rcond: f64,
    /// Condition number above which a pseudo-inverse is reported as ill-conditioned
    pub cond_threshold: f64,
    /// Smallest admissible squared pivot of the Cholesky factor, relative to the largest one
    pub gram_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            rcond: 1e-15,
            cond_threshold: 1e6,
            gram_tolerance: 1e-12,
        }
    }
}

impl SolverConfig {
    /// Sets the relative cutoff of the pseudo-inverse singular values
    pub fn rcond(mut self, rcond: f64) -> Self {
        self.rcond = rcond;
        self
    }
    /// Sets the condition number warning threshold
    pub fn cond_threshold(mut self, cond_threshold: f64) -> Self {
        self.cond_threshold = cond_threshold;
        self
    }
    /// Sets the Gram matrix singularity tolerance
    pub fn gram_tolerance(mut self, gram_tolerance: f64) -> Self {
        self.gram_tolerance = gram_tolerance;
        self
    }
    /// Loads the configuration from a TOML file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        fs::read_to_string(path)?.parse()
    }
}

impl FromStr for SolverConfig {
    type Err = FlatError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml() {
        let config: SolverConfig = r#"
        rcond = 1e-10
        gram_tolerance = 1e-9
        "#
        .parse()
        .unwrap();
        assert_eq!(
            config,
            SolverConfig::default().rcond(1e-10).gram_tolerance(1e-9)
        );
    }

    #[test]
    fn bad_toml() {
        let config = "rcond = \"small\"".parse::<SolverConfig>();
        assert!(matches!(config, Err(FlatError::Toml(_))));
    }
}
