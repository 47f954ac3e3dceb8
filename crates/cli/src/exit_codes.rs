//! CLI Exit Code Registry
//!
//! Single source of truth for `migcheck` exit codes. Scripts and schedulers
//! branch on these, so they are part of the shell contract.
//!
//! | Code | Meaning                                               |
//! |------|-------------------------------------------------------|
//! | 0    | Every key and aggregate matched                       |
//! | 1    | Differences found (keys, totals, windows, partitions) |
//! | 2    | Usage error (bad arguments, no input file given)      |
//! | 3    | Invalid config (TOML syntax or validation)            |
//! | 4    | Runtime failure (IO, CSV, engine failure)             |

/// Run completed and nothing differs.
pub const EXIT_SUCCESS: u8 = 0;

/// Run completed and found differences. Like `diff(1)`, 1 means "inputs differ."
pub const EXIT_DIFFERENCES: u8 = 1;

/// Bad arguments or missing required inputs.
pub const EXIT_USAGE: u8 = 2;

/// Config could not be parsed or failed validation.
pub const EXIT_INVALID_CONFIG: u8 = 3;

/// Reading inputs, writing outputs or the engine itself failed.
pub const EXIT_RUNTIME: u8 = 4;
