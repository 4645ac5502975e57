use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use clap::ValueEnum;
use log::info;
use serde::{Deserialize, Serialize};

/// Which family of scheduler commands this cluster speaks
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Slurm,
    Torque,
}

impl Dialect {
    /// Pick a dialect from the submit commands on `PATH`, preferring torque's `qsub`
    pub fn detect() -> Self {
        let dialect = if on_path("qsub") {
            Dialect::Torque
        } else {
            Dialect::Slurm
        };
        info!("Detected {dialect} scheduler");
        dialect
    }

    /// Environment variable the scheduler sets inside a running job
    pub fn job_id_variable(&self) -> &'static str {
        match self {
            Dialect::Slurm => "SLURM_JOB_ID",
            Dialect::Torque => "PBS_JOBID",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dialect::Slurm => write!(f, "slurm"),
            Dialect::Torque => write!(f, "torque"),
        }
    }
}

fn on_path(program: &str) -> bool {
    env::var_os("PATH")
        .map(|paths| env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
        .unwrap_or(false)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn only_executable_files_count() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("qsub");
        fs::write(&program, "#!/bin/sh\n").unwrap();

        fs::set_permissions(&program, fs::Permissions::from_mode(0o644)).unwrap();
        assert!(!is_executable(&program));

        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();
        assert!(is_executable(&program));
        assert!(!is_executable(dir.path()));
    }
}
