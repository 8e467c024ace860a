//! Command interpreter and line-editing core for conch.
//!
//! The shell is a registry-based dispatch system. Commands implement the
//! `Command` trait and are registered by name. The interpreter parses input
//! lines, resolves the command name, and dispatches `execute()`. The line
//! buffer and completer back the front-end's line editing.

mod commands;
mod complete;
mod interpreter;
mod line;
mod palette;

/// Register all built-in commands into a registry.
pub use commands::register_builtins;
/// Autocompletion over command and alias names.
pub use complete::{Completer, Completion};
/// A single executable command trait.
pub use interpreter::Command;
/// Output produced by a command (text or display/session signals).
pub use interpreter::CommandOutput;
/// Registry of available commands with dispatch.
pub use interpreter::CommandRegistry;
/// Mutable session state handed to each command.
pub use interpreter::Environment;
/// Terminal geometry service provided by the front-end.
pub use interpreter::TermService;
/// The editable command line with cursor.
pub use line::LineBuffer;
/// Named colors and the active text/background pair.
pub use palette::{Color, Palette};
