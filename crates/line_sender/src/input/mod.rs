//! Text input for the focused UI field
//!
//! Direct key injection cannot represent multi-script text or symbols, so
//! text goes through the clipboard bridge and a paste key event.

mod clipboard;

pub use clipboard::{
    bridge_available, InjectionReport, TextInjector, BRIDGE_ACK, METHOD_CLIPBOARD_PASTE,
    SCRATCH_PATH,
};
