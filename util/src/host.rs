//! Host platform utility functions

use std::path::PathBuf;

/// Name of the environment variable pointing at the software root.
pub const SW_ROOT_ENV_VAR: &str = "GPG_EDGE_SW_ROOT";

/// Get the root directory of the software installation.
///
/// This is read from the `GPG_EDGE_SW_ROOT` environment variable, which must
/// be set before any executable is run.
pub fn get_sw_root() -> Result<PathBuf, std::env::VarError> {
    std::env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}
