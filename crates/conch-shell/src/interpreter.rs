//! The command registry and its dispatch pipeline.
//!
//! A line goes through history expansion, chain splitting (`;`, `&&`, `||`),
//! variable expansion, quote-aware tokenization, and alias expansion before
//! the name lookup. Names are case-insensitive.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::time::Instant;

use conch_types::error::{ConchError, Result};

use crate::palette::{Color, Palette};

/// Output produced by a command.
///
/// Variants other than `Text` and `None` are signals: the front-end owns the
/// screen and the process, so commands request those effects through their
/// output instead of performing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Plain text lines.
    Text(String),
    /// Command produced no visible output.
    None,
    /// Signal to clear the visible output area.
    Clear,
    /// Signal to return the display to its startup state.
    Home,
    /// Signal to recolor subsequent output.
    ColorSet { text: Color, background: Color },
    /// Signal to end the session.
    Exit,
}

/// Terminal geometry, provided by the front-end. Absent under test.
pub trait TermService {
    /// Current terminal size as (columns, rows).
    fn size(&self) -> Result<(u16, u16)>;
}

/// Mutable session state handed to each command on execution.
pub struct Environment<'a> {
    /// Active text/background colors.
    pub palette: Palette,
    /// Terminal geometry service.
    pub term: Option<&'a dyn TermService>,
    /// When the session began.
    pub started: Instant,
}

/// A single executable command.
pub trait Command {
    /// Name the user types to invoke the command.
    fn name(&self) -> &str;

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Usage string (e.g. "color [list|<text> [background]]").
    fn usage(&self) -> &str;

    /// Grouping key for the `help` listing.
    fn category(&self) -> &str {
        "general"
    }

    /// Run the command against the session environment.
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput>;
}

/// History keeps at most this many entries.
const MAX_HISTORY: usize = 100;

/// Built-ins dispatched before registry lookup because they need registry
/// access: (name, category, description, usage).
const INTERCEPTED: &[(&str, &str, &str, &str)] = &[
    (
        "help",
        "general",
        "List commands or show usage for one",
        "help [command]",
    ),
    (
        "info",
        "general",
        "Show session and application status",
        "info",
    ),
    (
        "history",
        "general",
        "Show or clear command history",
        "history [clear]",
    ),
    (
        "which",
        "general",
        "Identify what a name resolves to",
        "which <command>",
    ),
    (
        "set",
        "config",
        "Set or show a shell variable",
        "set [VAR=value|VAR]",
    ),
    ("unset", "config", "Remove a shell variable", "unset <VAR>..."),
    ("env", "config", "List all shell variables", "env"),
    (
        "alias",
        "config",
        "Define or list command aliases",
        "alias [name=command|name]",
    ),
    (
        "unalias",
        "config",
        "Remove a command alias",
        "unalias <name>...",
    ),
];

/// The command table plus the session state that outlives any one command:
/// variables, aliases, history, and the last exit code.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
    variables: RefCell<HashMap<String, String>>,
    aliases: RefCell<HashMap<String, String>>,
    history: RefCell<Vec<String>>,
    last_exit_code: Cell<i32>,
    commands_run: Cell<u32>,
}

impl CommandRegistry {
    /// Create an empty command registry.
    pub fn new() -> Self {
        let mut vars = HashMap::new();
        vars.insert("SHELL".to_string(), "conch".to_string());
        vars.insert("USER".to_string(), "user".to_string());
        Self {
            commands: HashMap::new(),
            variables: RefCell::new(vars),
            aliases: RefCell::new(HashMap::new()),
            history: RefCell::new(Vec::new()),
            last_exit_code: Cell::new(0),
            commands_run: Cell::new(0),
        }
    }

    /// Register a command, displacing any earlier one with the same name.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    // -- Shell variable API --

    /// Set a shell variable.
    pub fn set_variable(&self, name: &str, value: &str) {
        self.variables
            .borrow_mut()
            .insert(name.to_string(), value.to_string());
    }

    /// Get a shell variable value.
    pub fn get_variable(&self, name: &str) -> Option<String> {
        self.variables.borrow().get(name).cloned()
    }

    /// Remove a shell variable.
    pub fn unset_variable(&self, name: &str) {
        self.variables.borrow_mut().remove(name);
    }

    // -- Alias API --

    /// Set a command alias.
    pub fn set_alias(&self, name: &str, expansion: &str) {
        self.aliases
            .borrow_mut()
            .insert(name.to_string(), expansion.to_string());
    }

    /// Get all aliases.
    pub fn aliases(&self) -> HashMap<String, String> {
        self.aliases.borrow().clone()
    }

    /// Remove a command alias.
    pub fn unset_alias(&self, name: &str) {
        self.aliases.borrow_mut().remove(name);
    }

    // -- History API --

    /// Get command history.
    pub fn history(&self) -> Vec<String> {
        self.history.borrow().clone()
    }

    /// Push a command to history.
    fn push_history(&self, line: &str) {
        let mut hist = self.history.borrow_mut();
        // Don't duplicate the last entry.
        if hist.last().is_none_or(|last| last != line) {
            hist.push(line.to_string());
            if hist.len() > MAX_HISTORY {
                hist.remove(0);
            }
        }
    }

    /// Parse and execute a command line.
    ///
    /// Supports quoting, variable expansion, aliases, history expansion
    /// (`!!`, `!n`), and command chaining (`;`, `&&`, `||`). Command names
    /// are case-insensitive.
    pub fn execute(&self, line: &str, env: &mut Environment<'_>) -> Result<CommandOutput> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(CommandOutput::None);
        }

        // History expansion: !! and !n
        let line = self.expand_history(trimmed)?;

        // History records the expanded form, whether or not execution succeeds.
        self.push_history(&line);
        self.commands_run.set(self.commands_run.get() + 1);

        let segments = split_chains(&line)?;
        let single_command = segments.len() == 1;
        let mut combined_output = Vec::new();
        let mut last_signal: Option<CommandOutput> = None;
        // Track text produced after the most recent signal command so that
        // `echo hi ; clear ; echo bye` returns "bye" instead of the Clear
        // signal (which would silently discard the post-clear text).
        let mut output_after_signal = Vec::new();

        for segment in &segments {
            // Check chain condition.
            let should_run = match segment.chain_op {
                ChainOp::Always => true,
                ChainOp::And => self.last_exit_code.get() == 0,
                ChainOp::Or => self.last_exit_code.get() != 0,
            };
            if !should_run {
                continue;
            }

            match self.execute_single_cmd(&segment.command, env) {
                Ok(output) => {
                    self.last_exit_code.set(0);
                    self.set_variable("?", "0");
                    match output {
                        CommandOutput::Text(ref text) => {
                            if !text.is_empty() {
                                combined_output.push(text.clone());
                                if last_signal.is_some() {
                                    output_after_signal.push(text.clone());
                                }
                            }
                        },
                        // Once the session is over, nothing later in the
                        // chain matters.
                        CommandOutput::Exit => return Ok(CommandOutput::Exit),
                        CommandOutput::Clear
                        | CommandOutput::Home
                        | CommandOutput::ColorSet { .. } => {
                            last_signal = Some(output);
                            output_after_signal.clear();
                        },
                        CommandOutput::None => {},
                    }
                },
                Err(e) => {
                    self.last_exit_code.set(1);
                    self.set_variable("?", "1");
                    // An unchained line surfaces its error to the caller.
                    if single_command {
                        return Err(e);
                    }
                    combined_output.push(format!("error: {e}"));
                    if last_signal.is_some() {
                        output_after_signal.push(format!("error: {e}"));
                    }
                },
            }
        }

        // A signal only survives to the caller when no text came after it;
        // later text supersedes the display effect.
        if let Some(signal) = last_signal {
            if output_after_signal.is_empty() {
                return Ok(signal);
            }
            return Ok(CommandOutput::Text(output_after_signal.join("\n")));
        }

        if combined_output.is_empty() {
            Ok(CommandOutput::None)
        } else {
            Ok(CommandOutput::Text(combined_output.join("\n")))
        }
    }

    /// Execute a single command (after chain splitting).
    fn execute_single_cmd(
        &self,
        cmd_str: &str,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        let trimmed = cmd_str.trim();
        if trimmed.is_empty() {
            return Ok(CommandOutput::None);
        }

        let expanded = self.expand_variables(trimmed);

        let tokens = tokenize(&expanded)?;
        if tokens.is_empty() {
            return Ok(CommandOutput::None);
        }

        // Aliases apply to the first token only.
        let tokens = self.expand_alias(tokens);
        if tokens.is_empty() {
            return Ok(CommandOutput::None);
        }

        let name_lower = tokens[0].to_ascii_lowercase();
        let arg_strings: Vec<String> = tokens[1..].to_vec();
        let args: Vec<&str> = arg_strings.iter().map(|s| s.as_str()).collect();

        log::debug!("dispatch: {name_lower}");

        // Built-ins that read or mutate registry state bypass the table.
        match name_lower.as_str() {
            "help" => return self.execute_help(&args),
            "info" => return self.execute_info(env),
            "history" => return self.execute_history_cmd(&args),
            "which" => return self.execute_which(&args),
            "set" => return self.execute_set(&args),
            "unset" => return self.execute_unset(&args),
            "env" => return self.execute_env(),
            "alias" => return self.execute_alias(&args),
            "unalias" => return self.execute_unalias(&args),
            _ => {},
        }

        match self.commands.get(name_lower.as_str()) {
            Some(cmd) => cmd.execute(&args, env),
            None => Err(ConchError::Command(format!(
                "unknown command: {}",
                tokens[0]
            ))),
        }
    }

    // -- History expansion --

    fn expand_history(&self, input: &str) -> Result<String> {
        if input == "!!" {
            let hist = self.history.borrow();
            return hist
                .last()
                .cloned()
                .ok_or_else(|| ConchError::Command("!!: no previous command".to_string()));
        }
        if let Some(n_str) = input.strip_prefix('!')
            && let Ok(n) = n_str.parse::<usize>()
        {
            let hist = self.history.borrow();
            if n == 0 || n > hist.len() {
                return Err(ConchError::Command(format!("!{n}: event not found")));
            }
            return Ok(hist[n - 1].clone());
        }
        Ok(input.to_string())
    }

    // -- Variable expansion --

    fn expand_variables(&self, input: &str) -> String {
        let vars = self.variables.borrow();
        let mut result = String::with_capacity(input.len());
        let chars: Vec<char> = input.chars().collect();
        let mut i = 0;

        while i < chars.len() {
            if chars[i] == '$' && i + 1 < chars.len() {
                // Check for $? (last exit code).
                if chars[i + 1] == '?' {
                    result.push_str(&self.last_exit_code.get().to_string());
                    i += 2;
                    continue;
                }
                // Check for ${VAR} syntax.
                if chars[i + 1] == '{'
                    && let Some(end) = chars[i + 2..].iter().position(|&c| c == '}')
                {
                    let name: String = chars[i + 2..i + 2 + end].iter().collect();
                    result.push_str(vars.get(&name).map(String::as_str).unwrap_or(""));
                    i += 3 + end;
                    continue;
                }
                // Bare $VAR.
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                if end > start {
                    let name: String = chars[start..end].iter().collect();
                    result.push_str(vars.get(&name).map(String::as_str).unwrap_or(""));
                    i = end;
                    continue;
                }
                result.push('$');
                i += 1;
            } else {
                result.push(chars[i]);
                i += 1;
            }
        }
        result
    }

    // -- Alias expansion --

    fn expand_alias(&self, mut tokens: Vec<String>) -> Vec<String> {
        if tokens.is_empty() {
            return tokens;
        }
        let aliases = self.aliases.borrow();
        if let Some(expansion) = aliases.get(&tokens[0]) {
            let expanded_tokens = match tokenize(expansion) {
                Ok(t) => t,
                Err(_) => return tokens,
            };
            tokens.splice(0..1, expanded_tokens);
        }
        tokens
    }

    // -- Intercepted commands --

    /// `help` and `help <command>`.
    fn execute_help(&self, args: &[&str]) -> Result<CommandOutput> {
        if let Some(&name) = args.first() {
            let name_lower = name.to_ascii_lowercase();
            if let Some((name, category, description, usage)) = INTERCEPTED
                .iter()
                .find(|(n, ..)| *n == name_lower)
                .copied()
            {
                return Ok(CommandOutput::Text(format!(
                    "{name} ({category})\n  {description}\n  Usage: {usage}"
                )));
            }
            match self.commands.get(name_lower.as_str()) {
                Some(cmd) => {
                    let mut out = cmd.name().to_string();
                    out.push_str(&format!(" ({})\n", cmd.category()));
                    out.push_str(&format!("  {}\n", cmd.description()));
                    out.push_str(&format!("  Usage: {}", cmd.usage()));
                    Ok(CommandOutput::Text(out))
                },
                None => Err(ConchError::Command(format!("unknown command: {name}"))),
            }
        } else {
            // Group commands by category.
            let mut categories: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
            for &(name, category, description, _) in INTERCEPTED {
                categories
                    .entry(category)
                    .or_default()
                    .push((name, description));
            }
            for cmd in self.commands.values() {
                categories
                    .entry(cmd.category())
                    .or_default()
                    .push((cmd.name(), cmd.description()));
            }

            let mut cats: Vec<&str> = categories.keys().copied().collect();
            cats.sort();

            let total: usize = categories.values().map(|v| v.len()).sum();
            let mut out = format!("Commands ({total}):\n");
            for cat in &cats {
                let mut cmds = categories[cat].clone();
                cmds.sort_by_key(|(name, _)| *name);
                out.push_str(&format!("\n  [{cat}]\n"));
                for (name, desc) in &cmds {
                    out.push_str(&format!("    {name:12} {desc}\n"));
                }
            }
            out.push_str("\nType 'help <command>' for details.");
            Ok(CommandOutput::Text(out))
        }
    }

    /// `info`: session and application status report.
    fn execute_info(&self, env: &mut Environment<'_>) -> Result<CommandOutput> {
        let mut lines = Vec::new();
        lines.push(format!("conch v{}", env!("CARGO_PKG_VERSION")));

        let uptime = env.started.elapsed().as_secs();
        let hours = uptime / 3600;
        let mins = (uptime % 3600) / 60;
        let secs = uptime % 60;
        lines.push(format!("uptime: {hours}h {mins}m {secs}s"));

        lines.push(format!("commands run: {}", self.commands_run.get()));
        lines.push(format!("history entries: {}", self.history.borrow().len()));
        lines.push(format!(
            "variables: {}  aliases: {}",
            self.variables.borrow().len(),
            self.aliases.borrow().len()
        ));
        lines.push(format!(
            "colors: text={} background={}",
            env.palette.text.name(),
            env.palette.background.name()
        ));
        match env.term.map(|t| t.size()) {
            Some(Ok((cols, rows))) => lines.push(format!("terminal: {cols}x{rows}")),
            _ => lines.push("terminal: (size unavailable)".to_string()),
        }
        Ok(CommandOutput::Text(lines.join("\n")))
    }

    /// `which <name>`: built-in, registered command, or alias.
    fn execute_which(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.is_empty() {
            return Err(ConchError::Command("usage: which <command>".to_string()));
        }
        let name = args[0].to_ascii_lowercase();
        if INTERCEPTED.iter().any(|(n, ..)| *n == name) {
            return Ok(CommandOutput::Text(format!("{name}: shell built-in")));
        }
        match self.commands.get(name.as_str()) {
            Some(cmd) => Ok(CommandOutput::Text(format!(
                "{}: {} ({})",
                cmd.name(),
                cmd.description(),
                cmd.category()
            ))),
            None => {
                // Check aliases.
                let aliases = self.aliases.borrow();
                if let Some(expansion) = aliases.get(&name) {
                    Ok(CommandOutput::Text(format!(
                        "{name}: aliased to '{expansion}'"
                    )))
                } else {
                    Err(ConchError::Command(format!("{name}: not found")))
                }
            },
        }
    }

    /// `history` and `history clear`.
    fn execute_history_cmd(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.first() == Some(&"clear") {
            self.history.borrow_mut().clear();
            return Ok(CommandOutput::Text("History cleared.".to_string()));
        }
        let hist = self.history.borrow();
        if hist.is_empty() {
            return Ok(CommandOutput::Text("(no history)".to_string()));
        }
        let mut out = String::new();
        for (i, entry) in hist.iter().enumerate() {
            out.push_str(&format!("  {:4}  {entry}\n", i + 1));
        }
        Ok(CommandOutput::Text(out.trim_end().to_string()))
    }

    /// `set VAR=value`, `set VAR`, or bare `set` (same as `env`).
    fn execute_set(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.is_empty() {
            return self.execute_env();
        }
        let assignment = args.join(" ");
        if let Some((name, value)) = assignment.split_once('=') {
            let name = name.trim();
            let value = value.trim();
            if name.is_empty() {
                return Err(ConchError::Command("usage: set VAR=value".to_string()));
            }
            self.set_variable(name, value);
            Ok(CommandOutput::None)
        } else {
            // Just show the variable value.
            match self.get_variable(args[0]) {
                Some(val) => Ok(CommandOutput::Text(format!("{}={val}", args[0]))),
                None => Ok(CommandOutput::Text(format!("{}: not set", args[0]))),
            }
        }
    }

    /// `unset VAR...`.
    fn execute_unset(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.is_empty() {
            return Err(ConchError::Command("usage: unset <VAR>".to_string()));
        }
        for name in args {
            self.unset_variable(name);
        }
        Ok(CommandOutput::None)
    }

    /// `env`: every variable, sorted by name.
    fn execute_env(&self) -> Result<CommandOutput> {
        let vars = self.variables.borrow();
        let mut entries: Vec<(&str, &str)> =
            vars.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        entries.sort_by_key(|(k, _)| *k);
        let mut out = String::new();
        for (k, v) in &entries {
            out.push_str(&format!("{k}={v}\n"));
        }
        Ok(CommandOutput::Text(out.trim_end().to_string()))
    }

    /// `alias name=command`, `alias name`, or bare `alias` to list.
    fn execute_alias(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.is_empty() {
            let aliases = self.aliases.borrow();
            if aliases.is_empty() {
                return Ok(CommandOutput::Text("(no aliases defined)".to_string()));
            }
            let mut entries: Vec<(&str, &str)> = aliases
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            entries.sort_by_key(|(k, _)| *k);
            let mut out = String::new();
            for (k, v) in &entries {
                out.push_str(&format!("alias {k}='{v}'\n"));
            }
            return Ok(CommandOutput::Text(out.trim_end().to_string()));
        }
        let assignment = args.join(" ");
        if let Some((name, value)) = assignment.split_once('=') {
            let name = name.trim();
            let value = value.trim().trim_matches('\'').trim_matches('"');
            if name.is_empty() {
                return Err(ConchError::Command(
                    "usage: alias <name>=<command>".to_string(),
                ));
            }
            self.set_alias(name, value);
            Ok(CommandOutput::None)
        } else {
            // Show alias value.
            let aliases = self.aliases.borrow();
            match aliases.get(args[0]) {
                Some(val) => Ok(CommandOutput::Text(format!("alias {}='{val}'", args[0]))),
                None => Ok(CommandOutput::Text(format!("{}: not aliased", args[0]))),
            }
        }
    }

    /// `unalias name...`.
    fn execute_unalias(&self, args: &[&str]) -> Result<CommandOutput> {
        if args.is_empty() {
            return Err(ConchError::Command("usage: unalias <name>".to_string()));
        }
        for name in args {
            self.unset_alias(name);
        }
        Ok(CommandOutput::None)
    }

    // -- Introspection for help/autocomplete --

    /// Return a sorted list of every dispatchable name (registered commands
    /// plus intercepted built-ins).
    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.extend(INTERCEPTED.iter().map(|(n, ..)| n.to_string()));
        names.sort();
        names.dedup();
        names
    }

    /// Names starting with the given (case-insensitive) prefix.
    pub fn completions(&self, partial: &str) -> Vec<String> {
        let lower = partial.to_ascii_lowercase();
        self.command_names()
            .into_iter()
            .filter(|name| name.starts_with(&lower))
            .collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split a line into words, honoring quotes and backslash escapes.
///
/// Single quotes are fully literal; double quotes recognize `\"`, `\\`, and
/// `\$`; an unquoted backslash escapes whatever follows it.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
        } else if in_double {
            if ch == '"' {
                in_double = false;
            } else if ch == '\\'
                && let Some(&next) = chars.peek()
            {
                match next {
                    '"' | '\\' | '$' => {
                        chars.next();
                        current.push(next);
                    },
                    _ => current.push('\\'),
                }
            } else {
                current.push(ch);
            }
        } else {
            match ch {
                '\'' => in_single = true,
                '"' => in_double = true,
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                },
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                },
                _ => current.push(ch),
            }
        }
    }

    if in_single {
        return Err(ConchError::Command("unterminated single quote".to_string()));
    }
    if in_double {
        return Err(ConchError::Command("unterminated double quote".to_string()));
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Chain splitting
// ---------------------------------------------------------------------------

/// How a segment's execution depends on the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainOp {
    /// First segment, or one after `;`.
    Always,
    /// After `&&`: only when the previous segment succeeded.
    And,
    /// After `||`: only when the previous segment failed.
    Or,
}

struct ChainSegment {
    command: String,
    chain_op: ChainOp,
}

/// Cut a line into chain segments at `;`, `&&`, and `||`, leaving quoted
/// operators alone.
fn split_chains(input: &str) -> Result<Vec<ChainSegment>> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chain_op = ChainOp::Always;
    let mut chars = input.chars().peekable();
    let mut in_single = false;
    let mut in_double = false;

    let push_segment =
        |current: &mut String, segments: &mut Vec<ChainSegment>, chain_op: ChainOp| {
            let cmd = current.trim().to_string();
            if !cmd.is_empty() {
                segments.push(ChainSegment {
                    command: cmd,
                    chain_op,
                });
            }
            current.clear();
        };

    while let Some(ch) = chars.next() {
        if in_single {
            current.push(ch);
            if ch == '\'' {
                in_single = false;
            }
            continue;
        }
        if in_double {
            current.push(ch);
            if ch == '"' {
                in_double = false;
            } else if ch == '\\'
                && let Some(next) = chars.next()
            {
                current.push(next);
            }
            continue;
        }

        match ch {
            '\'' => {
                in_single = true;
                current.push(ch);
            },
            '"' => {
                in_double = true;
                current.push(ch);
            },
            '\\' => {
                current.push(ch);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            },
            ';' => {
                push_segment(&mut current, &mut segments, chain_op);
                chain_op = ChainOp::Always;
            },
            '&' if chars.peek() == Some(&'&') => {
                chars.next();
                push_segment(&mut current, &mut segments, chain_op);
                chain_op = ChainOp::And;
            },
            '|' if chars.peek() == Some(&'|') => {
                chars.next();
                push_segment(&mut current, &mut segments, chain_op);
                chain_op = ChainOp::Or;
            },
            _ => current.push(ch),
        }
    }

    push_segment(&mut current, &mut segments, chain_op);

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::register_builtins;

    fn setup() -> CommandRegistry {
        let mut reg = CommandRegistry::new();
        register_builtins(&mut reg);
        reg
    }

    fn exec(reg: &CommandRegistry, line: &str) -> Result<CommandOutput> {
        let mut env = Environment {
            palette: Palette::default(),
            term: None,
            started: Instant::now(),
        };
        reg.execute(line, &mut env)
    }

    fn exec_text(reg: &CommandRegistry, line: &str) -> String {
        match exec(reg, line).unwrap() {
            CommandOutput::Text(s) => s,
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn empty_input_is_none() {
        let reg = setup();
        assert!(matches!(exec(&reg, "").unwrap(), CommandOutput::None));
        assert!(matches!(exec(&reg, "   ").unwrap(), CommandOutput::None));
    }

    #[test]
    fn unknown_command_errors() {
        let reg = setup();
        let err = exec(&reg, "frobnicate").unwrap_err();
        assert!(format!("{err}").contains("unknown command: frobnicate"));
    }

    #[test]
    fn command_names_are_case_insensitive() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "ECHO hi"), "hi");
        assert_eq!(exec_text(&reg, "Echo hi"), "hi");
    }

    #[test]
    fn echo_joins_args() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo hello world"), "hello world");
    }

    #[test]
    fn double_quotes_group_args() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo \"a  b\" c"), "a  b c");
    }

    #[test]
    fn expansion_happens_before_tokenization() {
        let reg = setup();
        reg.set_variable("X", "value");
        // Expansion runs on the whole line before quote handling, so even a
        // single-quoted $VAR expands.
        assert_eq!(exec_text(&reg, "echo '$X'"), "value");
    }

    #[test]
    fn unterminated_quote_errors() {
        let reg = setup();
        assert!(exec(&reg, "echo \"oops").is_err());
        assert!(exec(&reg, "echo 'oops").is_err());
    }

    #[test]
    fn set_and_expand_variable() {
        let reg = setup();
        exec(&reg, "set NAME=world").unwrap();
        assert_eq!(exec_text(&reg, "echo hello $NAME"), "hello world");
        assert_eq!(exec_text(&reg, "echo hello ${NAME}!"), "hello world!");
    }

    #[test]
    fn undefined_variable_expands_empty() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo a $NOPE b"), "a b");
    }

    #[test]
    fn exit_code_variable() {
        let reg = setup();
        assert!(exec(&reg, "frobnicate").is_err());
        assert_eq!(exec_text(&reg, "echo $?"), "1");
        exec(&reg, "echo ok").unwrap();
        assert_eq!(exec_text(&reg, "echo $?"), "0");
    }

    #[test]
    fn seeded_variables_present() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo $SHELL"), "conch");
    }

    #[test]
    fn alias_expansion() {
        let reg = setup();
        exec(&reg, "alias greet=echo hello").unwrap();
        assert_eq!(exec_text(&reg, "greet world"), "hello world");
    }

    #[test]
    fn unalias_removes() {
        let reg = setup();
        exec(&reg, "alias g=echo").unwrap();
        exec(&reg, "unalias g").unwrap();
        assert!(exec(&reg, "g hi").is_err());
    }

    #[test]
    fn alias_list_and_show() {
        let reg = setup();
        exec(&reg, "alias ll=help").unwrap();
        assert!(exec_text(&reg, "alias").contains("alias ll='help'"));
        assert_eq!(exec_text(&reg, "alias ll"), "alias ll='help'");
    }

    #[test]
    fn which_classifies_names() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "which help"), "help: shell built-in");
        assert!(exec_text(&reg, "which echo").contains("echo:"));
        exec(&reg, "alias e=echo").unwrap();
        assert_eq!(exec_text(&reg, "which e"), "e: aliased to 'echo'");
        assert!(exec(&reg, "which nothere").is_err());
    }

    #[test]
    fn history_records_lines() {
        let reg = setup();
        exec(&reg, "echo one").unwrap();
        exec(&reg, "echo two").unwrap();
        let listing = exec_text(&reg, "history");
        assert!(listing.contains("1  echo one"));
        assert!(listing.contains("2  echo two"));
    }

    #[test]
    fn history_dedups_consecutive() {
        let reg = setup();
        exec(&reg, "echo one").unwrap();
        exec(&reg, "echo one").unwrap();
        assert_eq!(reg.history().len(), 1);
    }

    #[test]
    fn history_expansion_bang_bang() {
        let reg = setup();
        exec(&reg, "echo again").unwrap();
        assert_eq!(exec_text(&reg, "!!"), "again");
    }

    #[test]
    fn history_expansion_bang_n() {
        let reg = setup();
        exec(&reg, "echo first").unwrap();
        exec(&reg, "echo second").unwrap();
        assert_eq!(exec_text(&reg, "!1"), "first");
    }

    #[test]
    fn history_expansion_bad_index_errors() {
        let reg = setup();
        assert!(exec(&reg, "!!").is_err());
        assert!(exec(&reg, "!7").is_err());
    }

    #[test]
    fn history_clear() {
        let reg = setup();
        exec(&reg, "echo x").unwrap();
        exec(&reg, "history clear").unwrap();
        assert!(reg.history().is_empty());
    }

    #[test]
    fn chain_semicolon_joins_output() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo a ; echo b"), "a\nb");
    }

    #[test]
    fn chain_and_runs_on_success() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo a && echo b"), "a\nb");
    }

    #[test]
    fn chain_and_skips_after_failure() {
        let reg = setup();
        let out = exec_text(&reg, "nosuch && echo skipped");
        assert!(out.contains("error:"));
        assert!(!out.contains("skipped"));
    }

    #[test]
    fn chain_or_runs_after_failure() {
        let reg = setup();
        let out = exec_text(&reg, "frobnicate || echo rescued");
        assert!(out.contains("rescued"));
    }

    #[test]
    fn chain_or_skips_after_success() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo a || echo b"), "a");
    }

    #[test]
    fn signal_returned_when_last() {
        let reg = setup();
        assert!(matches!(
            exec(&reg, "echo hi ; clear").unwrap(),
            CommandOutput::Clear
        ));
    }

    #[test]
    fn text_after_signal_wins() {
        let reg = setup();
        assert_eq!(exec_text(&reg, "echo hi ; clear ; echo bye"), "bye");
    }

    #[test]
    fn exit_stops_the_chain() {
        let reg = setup();
        assert!(matches!(
            exec(&reg, "exit ; echo bye").unwrap(),
            CommandOutput::Exit
        ));
    }

    #[test]
    fn help_lists_commands_by_category() {
        let reg = setup();
        let out = exec_text(&reg, "help");
        assert!(out.contains("[general]"));
        assert!(out.contains("[display]"));
        assert!(out.contains("[config]"));
        assert!(out.contains("color"));
        assert!(out.contains("Type 'help <command>' for details."));
    }

    #[test]
    fn help_single_command_shows_usage() {
        let reg = setup();
        let out = exec_text(&reg, "help color");
        assert!(out.contains("color"));
        assert!(out.contains("Usage:"));
    }

    #[test]
    fn help_unknown_command_errors() {
        let reg = setup();
        assert!(exec(&reg, "help frobnicate").is_err());
    }

    #[test]
    fn info_reports_session_state() {
        let reg = setup();
        exec(&reg, "echo warmup").unwrap();
        let out = exec_text(&reg, "info");
        assert!(out.contains("conch v"));
        assert!(out.contains("commands run: 2"));
        assert!(out.contains("colors: text=default background=default"));
        assert!(out.contains("terminal: (size unavailable)"));
    }

    #[test]
    fn info_uses_term_service() {
        struct FixedTerm;
        impl TermService for FixedTerm {
            fn size(&self) -> Result<(u16, u16)> {
                Ok((120, 40))
            }
        }
        let reg = setup();
        let term = FixedTerm;
        let mut env = Environment {
            palette: Palette::default(),
            term: Some(&term),
            started: Instant::now(),
        };
        match reg.execute("info", &mut env).unwrap() {
            CommandOutput::Text(s) => assert!(s.contains("terminal: 120x40")),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn set_without_equals_shows_value() {
        let reg = setup();
        exec(&reg, "set LANG=en").unwrap();
        assert_eq!(exec_text(&reg, "set LANG"), "LANG=en");
        assert_eq!(exec_text(&reg, "set MISSING"), "MISSING: not set");
    }

    #[test]
    fn env_lists_sorted_variables() {
        let reg = setup();
        exec(&reg, "set AAA=1").unwrap();
        let out = exec_text(&reg, "env");
        assert!(out.lines().any(|l| l == "AAA=1"));
        assert!(out.lines().any(|l| l == "SHELL=conch"));
        let aaa = out.find("AAA=").unwrap();
        let shell = out.find("SHELL=").unwrap();
        assert!(aaa < shell);
    }

    #[test]
    fn unset_removes_variable() {
        let reg = setup();
        exec(&reg, "set TMP=x").unwrap();
        exec(&reg, "unset TMP").unwrap();
        assert_eq!(exec_text(&reg, "set TMP"), "TMP: not set");
    }

    #[test]
    fn failed_command_preserves_session_state() {
        let reg = setup();
        exec(&reg, "set KEEP=me").unwrap();
        exec(&reg, "alias k=echo").unwrap();
        assert!(exec(&reg, "frobnicate").is_err());
        assert_eq!(reg.get_variable("KEEP").as_deref(), Some("me"));
        assert!(reg.aliases().contains_key("k"));
        assert_eq!(reg.history().len(), 3);
    }

    #[test]
    fn completions_filter_by_prefix() {
        let reg = setup();
        let c = reg.completions("he");
        assert_eq!(c, vec!["help".to_string()]);
        assert!(reg.completions("zzz").is_empty());
    }

    #[test]
    fn command_names_include_intercepted() {
        let reg = setup();
        let names = reg.command_names();
        assert!(names.contains(&"help".to_string()));
        assert!(names.contains(&"echo".to_string()));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    // -- Tokenizer --

    #[test]
    fn tokenize_plain_words() {
        assert_eq!(tokenize("a b  c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn tokenize_double_quotes() {
        assert_eq!(tokenize("say \"a b\"").unwrap(), vec!["say", "a b"]);
    }

    #[test]
    fn tokenize_single_quotes() {
        assert_eq!(tokenize("say '$a b'").unwrap(), vec!["say", "$a b"]);
    }

    #[test]
    fn tokenize_escapes_in_double_quotes() {
        assert_eq!(tokenize(r#""a\"b""#).unwrap(), vec![r#"a"b"#]);
        assert_eq!(tokenize(r#""a\$b""#).unwrap(), vec!["a$b"]);
        assert_eq!(tokenize(r#""a\nb""#).unwrap(), vec![r"a\nb"]);
    }

    #[test]
    fn tokenize_backslash_outside_quotes() {
        assert_eq!(tokenize(r"a\ b").unwrap(), vec!["a b"]);
    }

    #[test]
    fn tokenize_empty_is_empty() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    // -- Chain splitting --

    #[test]
    fn split_chains_semicolons_and_ops() {
        let segs = split_chains("a ; b && c || d").unwrap();
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].chain_op, ChainOp::Always);
        assert_eq!(segs[1].chain_op, ChainOp::Always);
        assert_eq!(segs[2].chain_op, ChainOp::And);
        assert_eq!(segs[3].chain_op, ChainOp::Or);
    }

    #[test]
    fn split_chains_respects_quotes() {
        let segs = split_chains("echo \"a ; b\"").unwrap();
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].command, "echo \"a ; b\"");
    }

    #[test]
    fn split_chains_skips_empty_segments() {
        let segs = split_chains("a ;; b ;").unwrap();
        assert_eq!(segs.len(), 2);
    }
}
