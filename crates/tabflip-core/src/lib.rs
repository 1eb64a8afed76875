//! Core: key event types, raw-input decoding, and modifier polling.

pub mod decoder;
pub mod event;
pub mod logging;
pub mod modifier_oracle;
