//! Built-in commands for the conch shell.

use conch_types::error::Result;

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};
use crate::palette::Color;

/// Register all built-in commands into a registry.
///
/// The registry additionally intercepts `help`, `info`, `history`, `which`,
/// `set`, `unset`, `env`, `alias`, and `unalias`, which need access to its
/// own state.
pub fn register_builtins(reg: &mut CommandRegistry) {
    reg.register(Box::new(EchoCmd));
    reg.register(Box::new(ClearCmd));
    reg.register(Box::new(HomeCmd));
    reg.register(Box::new(ColorCmd));
    reg.register(Box::new(VersionCmd));
    reg.register(Box::new(ExitCmd));
    reg.register(Box::new(QuitCmd));
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

struct EchoCmd;
impl Command for EchoCmd {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Print text"
    }
    fn usage(&self) -> &str {
        "echo [text...]"
    }
    fn execute(&self, args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(args.join(" ")))
    }
}

// ---------------------------------------------------------------------------
// clear
// ---------------------------------------------------------------------------

struct ClearCmd;
impl Command for ClearCmd {
    fn name(&self) -> &str {
        "clear"
    }
    fn description(&self) -> &str {
        "Clear the output area"
    }
    fn usage(&self) -> &str {
        "clear"
    }
    fn category(&self) -> &str {
        "display"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Clear)
    }
}

// ---------------------------------------------------------------------------
// home
// ---------------------------------------------------------------------------

/// Returns the display to its startup state: screen cleared, cursor at the
/// origin, colors back to the configured defaults, banner reprinted. Session
/// data (history, variables, aliases) is untouched.
struct HomeCmd;
impl Command for HomeCmd {
    fn name(&self) -> &str {
        "home"
    }
    fn description(&self) -> &str {
        "Reset the display to its startup state"
    }
    fn usage(&self) -> &str {
        "home"
    }
    fn category(&self) -> &str {
        "display"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Home)
    }
}

// ---------------------------------------------------------------------------
// color
// ---------------------------------------------------------------------------

struct ColorCmd;
impl Command for ColorCmd {
    fn name(&self) -> &str {
        "color"
    }
    fn description(&self) -> &str {
        "List colors or set text/background colors"
    }
    fn usage(&self) -> &str {
        "color [list|<text> [background]]"
    }
    fn category(&self) -> &str {
        "display"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        match args {
            [] | ["list"] => {
                let mut lines = String::from("Colors:\n");
                for name in Color::all_names() {
                    lines.push_str(&format!("  {name}\n"));
                }
                lines.push_str(&format!(
                    "\nActive: text={} background={}",
                    env.palette.text.name(),
                    env.palette.background.name()
                ));
                Ok(CommandOutput::Text(lines))
            },
            [text] => Ok(CommandOutput::ColorSet {
                text: Color::parse(text)?,
                background: env.palette.background,
            }),
            [text, background, ..] => {
                // Validate both before emitting so a bad pair changes nothing.
                let text = Color::parse(text)?;
                let background = Color::parse(background)?;
                Ok(CommandOutput::ColorSet { text, background })
            },
        }
    }
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

struct VersionCmd;
impl Command for VersionCmd {
    fn name(&self) -> &str {
        "version"
    }
    fn description(&self) -> &str {
        "Show the conch version"
    }
    fn usage(&self) -> &str {
        "version"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(format!(
            "conch {}",
            env!("CARGO_PKG_VERSION")
        )))
    }
}

// ---------------------------------------------------------------------------
// exit / quit
// ---------------------------------------------------------------------------

struct ExitCmd;
impl Command for ExitCmd {
    fn name(&self) -> &str {
        "exit"
    }
    fn description(&self) -> &str {
        "End the session"
    }
    fn usage(&self) -> &str {
        "exit"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Exit)
    }
}

struct QuitCmd;
impl Command for QuitCmd {
    fn name(&self) -> &str {
        "quit"
    }
    fn description(&self) -> &str {
        "End the session"
    }
    fn usage(&self) -> &str {
        "quit"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Exit)
    }
}
