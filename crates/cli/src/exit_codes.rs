//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract — scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Code | Domain    | Description                                   |
//! |------|-----------|-----------------------------------------------|
//! | 0    | Universal | Success                                       |
//! | 1    | Universal | General error (unspecified)                   |
//! | 2    | Universal | CLI usage error (bad args, missing file)      |
//! | 3    | recon     | Config failed to parse or validate            |
//! | 4    | recon     | Runtime failure (IO, CSV structure)           |
//! | 5    | recon     | Significant differences found under --strict  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use ffb_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code on its own parse failures.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (3-9)
// =============================================================================

/// Config file parsed but is invalid, or is not valid TOML.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 3;

/// Source or employee file could not be read, or its header is unusable.
pub const EXIT_RECON_RUNTIME: u8 = 4;

/// `--strict` was given and at least one verified transaction differs by
/// more than the significance threshold.
pub const EXIT_SIGNIFICANT_DIFFS: u8 = 5;

/// Map an engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) | ReconError::InvalidPolicy(_) => {
            EXIT_RECON_INVALID_CONFIG
        }
        ReconError::MissingColumn { .. } | ReconError::Csv { .. } | ReconError::Io(_) => EXIT_RECON_RUNTIME,
        ReconError::KeyMismatch { .. } => EXIT_ERROR,
    }
}
