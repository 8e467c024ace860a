//! Interactive read-eval-print loop over a raw-mode terminal.
//!
//! Key events edit a `LineBuffer`; Enter dispatches the line through the
//! command registry; signal outputs (`Clear`, `Home`, `ColorSet`, `Exit`)
//! are applied here, since the front-end owns the screen and the process.

use std::io::{self, Stdout, Write};
use std::time::Instant;

use crossterm::cursor::{MoveTo, MoveToColumn};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::{Color as TermColor, Colors, ResetColor, SetColors};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::{execute, queue};

use conch_shell::{
    Color, CommandOutput, CommandRegistry, Completer, Completion, Environment, LineBuffer,
    Palette, TermService,
};
use conch_types::error::Result as ConchResult;

use crate::config::ConchConfig;

/// Terminal geometry for the `info` command.
struct CrosstermTerm;

impl TermService for CrosstermTerm {
    fn size(&self) -> ConchResult<(u16, u16)> {
        Ok(terminal::size()?)
    }
}

/// Map a shell color onto a crossterm color. `Default` resets the slot.
fn term_color(c: Color) -> TermColor {
    match c {
        Color::Default => TermColor::Reset,
        Color::Black => TermColor::Black,
        Color::Red => TermColor::DarkRed,
        Color::Green => TermColor::DarkGreen,
        Color::Yellow => TermColor::DarkYellow,
        Color::Blue => TermColor::DarkBlue,
        Color::Magenta => TermColor::DarkMagenta,
        Color::Cyan => TermColor::DarkCyan,
        Color::White => TermColor::Grey,
        Color::BrightBlack => TermColor::DarkGrey,
        Color::BrightRed => TermColor::Red,
        Color::BrightGreen => TermColor::Green,
        Color::BrightYellow => TermColor::Yellow,
        Color::BrightBlue => TermColor::Blue,
        Color::BrightMagenta => TermColor::Magenta,
        Color::BrightCyan => TermColor::Cyan,
        Color::BrightWhite => TermColor::White,
    }
}

/// Restores cooked mode on every exit path.
struct RawGuard;

impl RawGuard {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

/// Walks the history list while keeping the in-progress line recoverable.
#[derive(Default)]
struct HistoryCursor {
    pos: Option<usize>,
    stash: String,
}

impl HistoryCursor {
    fn reset(&mut self) {
        self.pos = None;
        self.stash.clear();
    }

    fn up(&mut self, hist: &[String], line: &mut LineBuffer) {
        match self.pos {
            None => {
                if hist.is_empty() {
                    return;
                }
                self.stash = line.text().to_string();
                self.pos = Some(hist.len() - 1);
                line.set_text(&hist[hist.len() - 1]);
            },
            Some(p) if p > 0 => {
                self.pos = Some(p - 1);
                line.set_text(&hist[p - 1]);
            },
            Some(_) => {},
        }
    }

    fn down(&mut self, hist: &[String], line: &mut LineBuffer) {
        match self.pos {
            Some(p) if p + 1 < hist.len() => {
                self.pos = Some(p + 1);
                line.set_text(&hist[p + 1]);
            },
            Some(_) => {
                self.pos = None;
                let stash = std::mem::take(&mut self.stash);
                line.set_text(&stash);
            },
            None => {},
        }
    }
}

enum LineAction {
    Submit(String),
    EndOfInput,
}

/// The interactive session.
pub struct Repl {
    registry: CommandRegistry,
    config: ConchConfig,
    startup: Palette,
    palette: Palette,
    line: LineBuffer,
    hist_nav: HistoryCursor,
    started: Instant,
}

impl Repl {
    pub fn new(registry: CommandRegistry, config: ConchConfig, startup: Palette) -> Self {
        Self {
            registry,
            config,
            startup,
            palette: startup,
            line: LineBuffer::new(),
            hist_nav: HistoryCursor::default(),
            started: Instant::now(),
        }
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut out = io::stdout();
        self.apply_palette(&mut out)?;
        if self.config.banner {
            print_banner();
        }

        loop {
            match self.read_line(&mut out)? {
                LineAction::Submit(line) => {
                    if !self.dispatch(&mut out, &line)? {
                        break;
                    }
                },
                LineAction::EndOfInput => break,
            }
        }

        execute!(out, ResetColor)?;
        println!("Goodbye!");
        Ok(())
    }

    /// Edit one input line in raw mode until Enter or end-of-input.
    fn read_line(&mut self, out: &mut Stdout) -> anyhow::Result<LineAction> {
        let _guard = RawGuard::enable()?;
        self.hist_nav.reset();
        self.redraw(out)?;

        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }

            match key.code {
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    write!(out, "^C\r\n")?;
                    self.line = LineBuffer::new();
                    self.hist_nav.reset();
                    self.redraw(out)?;
                },
                KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    if self.line.is_empty() {
                        write!(out, "\r\n")?;
                        out.flush()?;
                        return Ok(LineAction::EndOfInput);
                    }
                },
                KeyCode::Char('l') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
                    self.redraw(out)?;
                },
                KeyCode::Enter => {
                    write!(out, "\r\n")?;
                    out.flush()?;
                    return Ok(LineAction::Submit(self.line.take()));
                },
                KeyCode::Tab => {
                    self.handle_tab(out)?;
                },
                KeyCode::Backspace => {
                    self.line.backspace();
                    self.redraw(out)?;
                },
                KeyCode::Delete => {
                    self.line.delete();
                    self.redraw(out)?;
                },
                KeyCode::Left => {
                    self.line.move_left();
                    self.redraw(out)?;
                },
                KeyCode::Right => {
                    self.line.move_right();
                    self.redraw(out)?;
                },
                KeyCode::Home => {
                    self.line.move_home();
                    self.redraw(out)?;
                },
                KeyCode::End => {
                    self.line.move_end();
                    self.redraw(out)?;
                },
                KeyCode::Up => {
                    let hist = self.registry.history();
                    self.hist_nav.up(&hist, &mut self.line);
                    self.redraw(out)?;
                },
                KeyCode::Down => {
                    let hist = self.registry.history();
                    self.hist_nav.down(&hist, &mut self.line);
                    self.redraw(out)?;
                },
                KeyCode::Char(ch)
                    if !key.modifiers.contains(KeyModifiers::CONTROL)
                        && !key.modifiers.contains(KeyModifiers::ALT) =>
                {
                    self.line.insert(ch);
                    self.redraw(out)?;
                },
                _ => {},
            }
        }
    }

    /// Complete the token at the cursor; list candidates on ambiguity.
    fn handle_tab(&mut self, out: &mut Stdout) -> io::Result<()> {
        // Rebuilt per keypress so alias changes are always visible.
        let completer = Completer::for_registry(&self.registry);
        match completer.complete(&mut self.line) {
            Completion::Partial(names) => {
                write!(out, "\r\n{}\r\n", names.join("  "))?;
            },
            Completion::Full(_) | Completion::None => {},
        }
        self.redraw(out)
    }

    /// Repaint the prompt line and place the terminal cursor.
    fn redraw(&self, out: &mut Stdout) -> io::Result<()> {
        queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        write!(out, "{}{}", self.config.prompt, self.line.text())?;
        let col = (self.config.prompt.chars().count() + self.line.cursor()) as u16;
        queue!(out, MoveToColumn(col))?;
        out.flush()
    }

    /// Execute a submitted line and apply its output. Returns `false` when
    /// the session should end.
    fn dispatch(&mut self, out: &mut Stdout, line: &str) -> anyhow::Result<bool> {
        let term = CrosstermTerm;
        let mut env = Environment {
            palette: self.palette,
            term: Some(&term),
            started: self.started,
        };
        match self.registry.execute(line, &mut env) {
            Ok(CommandOutput::Text(text)) => {
                for l in text.lines() {
                    println!("{l}");
                }
            },
            Ok(CommandOutput::None) => {},
            Ok(CommandOutput::Clear) => {
                execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
            },
            Ok(CommandOutput::Home) => {
                self.palette = self.startup;
                self.apply_palette(out)?;
                execute!(out, Clear(ClearType::All), MoveTo(0, 0))?;
                if self.config.banner {
                    print_banner();
                }
            },
            Ok(CommandOutput::ColorSet { text, background }) => {
                self.palette = Palette { text, background };
                self.apply_palette(out)?;
            },
            Ok(CommandOutput::Exit) => return Ok(false),
            Err(e) => println!("error: {e}"),
        }
        Ok(true)
    }

    fn apply_palette(&self, out: &mut Stdout) -> io::Result<()> {
        execute!(
            out,
            SetColors(Colors::new(
                term_color(self.palette.text),
                term_color(self.palette.background)
            ))
        )
    }
}

fn print_banner() {
    println!(
        "conch v{} -- type 'help' for commands, Tab to complete",
        env!("CARGO_PKG_VERSION")
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist(entries: &[&str]) -> Vec<String> {
        entries.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn history_up_walks_backwards() {
        let h = hist(&["echo one", "echo two"]);
        let mut nav = HistoryCursor::default();
        let mut line = LineBuffer::new();
        nav.up(&h, &mut line);
        assert_eq!(line.text(), "echo two");
        nav.up(&h, &mut line);
        assert_eq!(line.text(), "echo one");
        // Pinned at the oldest entry.
        nav.up(&h, &mut line);
        assert_eq!(line.text(), "echo one");
    }

    #[test]
    fn history_down_restores_stash() {
        let h = hist(&["echo one", "echo two"]);
        let mut nav = HistoryCursor::default();
        let mut line = LineBuffer::new();
        line.set_text("draft");
        nav.up(&h, &mut line);
        nav.up(&h, &mut line);
        nav.down(&h, &mut line);
        assert_eq!(line.text(), "echo two");
        nav.down(&h, &mut line);
        assert_eq!(line.text(), "draft");
        // Below the newest entry nothing changes.
        nav.down(&h, &mut line);
        assert_eq!(line.text(), "draft");
    }

    #[test]
    fn history_up_on_empty_history_is_noop() {
        let h = hist(&[]);
        let mut nav = HistoryCursor::default();
        let mut line = LineBuffer::new();
        line.set_text("draft");
        nav.up(&h, &mut line);
        assert_eq!(line.text(), "draft");
        assert!(nav.pos.is_none());
    }

    #[test]
    fn history_reset_clears_position() {
        let h = hist(&["echo one"]);
        let mut nav = HistoryCursor::default();
        let mut line = LineBuffer::new();
        nav.up(&h, &mut line);
        nav.reset();
        assert!(nav.pos.is_none());
        assert!(nav.stash.is_empty());
    }

    #[test]
    fn default_color_maps_to_reset() {
        assert_eq!(term_color(Color::Default), TermColor::Reset);
    }

    #[test]
    fn bright_colors_map_to_high_intensity() {
        assert_eq!(term_color(Color::BrightRed), TermColor::Red);
        assert_eq!(term_color(Color::Red), TermColor::DarkRed);
        assert_eq!(term_color(Color::BrightWhite), TermColor::White);
    }
}
