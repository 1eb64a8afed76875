#![forbid(unsafe_code)]

//! Logging facade.
//!
//! Re-exports the tracing macros so call sites stay terse. Library code in
//! this workspace only emits events; subscriber installation belongs to the
//! binary.

pub use tracing::{debug, error, info, trace, warn};
