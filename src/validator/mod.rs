//! Build validation: probing a sandbox's served output and turning failures
//! into retry decisions.

mod classify;
mod probe;

pub use classify::{
    calculate_retry_delay, classify_error, extract_missing_packages, retry_delay_with_base,
    ErrorKind, RETRY_BASE_MS,
};
pub use probe::{
    inspect_document, BuildValidation, BuildValidator, GENERIC_BUNDLER_ERROR, NOT_RENDERING_ERROR,
};
