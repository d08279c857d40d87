//! Editing, execution and chat logic behind the PyEdit.rs window.
//!
//! Everything here is free of GTK so it can be tested headless; the `gui`
//! feature builds the desktop binary on top of it.

pub mod api;
pub mod brackets;
pub mod completion;
pub mod config;
pub mod constants;
pub mod files;
pub mod formatter;
pub mod highlight;
pub mod history;
pub mod indent;
pub mod process;
pub mod runner;
pub mod search;
pub mod syntax_check;
