//! Prelude for common imports used throughout all Blinds Control crates

pub use crate::error::{Error, Result, ResultExt};
pub use tracing::{debug, error, info, trace, warn};
