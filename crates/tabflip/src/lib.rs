//! tabflip: a hold-to-cycle tab switcher for kitty.
//!
//! Hold the trigger modifier and tap Tab to walk an MRU-ordered row of
//! cards, each showing a live half-block preview of that tab's screen;
//! release to switch, Escape to cancel. The binary in `main.rs` wires these
//! modules to a real terminal and a real kitty; everything here is testable
//! against fakes.

pub mod cli;
pub mod command_socket;
pub mod host;
pub mod layout;
pub mod logging;
pub mod mru;
pub mod session;
pub mod store;
pub mod switcher;
pub mod theme;
