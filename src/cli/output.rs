//! Human-readable progress output.
//!
//! Progress lines go to stdout, warnings and errors to stderr. Line markers
//! are coloured when the stream is a terminal and plain text otherwise.
//! Diagnostics that only matter when debugging go through `log` instead.

use std::io::{self, IsTerminal, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Output manager for colored terminal output.
#[derive(Debug, Clone, Copy)]
pub struct OutputManager {
    quiet: bool,
    stdout_color: ColorChoice,
    stderr_color: ColorChoice,
}

impl OutputManager {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            stdout_color: color_choice(io::stdout().is_terminal()),
            stderr_color: color_choice(io::stderr().is_terminal()),
        }
    }

    /// Output manager that prints nothing
    pub fn quiet() -> Self {
        Self::new(true)
    }

    fn out(&self, marker: Option<(&str, Color)>, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        write_line(&mut StandardStream::stdout(self.stdout_color), marker, message)
    }

    fn err(&self, marker: (&str, Color), message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        write_line(
            &mut StandardStream::stderr(self.stderr_color),
            Some(marker),
            message,
        )
    }

    /// Section header, e.g. the start of a pipeline phase
    pub fn section(&self, title: &str) -> io::Result<()> {
        self.out(Some(("==>", Color::Blue)), title)
    }

    pub fn progress(&self, message: &str) -> io::Result<()> {
        self.out(None, message)
    }

    pub fn indent(&self, message: &str) -> io::Result<()> {
        self.out(None, &format!("    {message}"))
    }

    pub fn success(&self, message: &str) -> io::Result<()> {
        self.out(Some(("✓", Color::Green)), message)
    }

    pub fn warn(&self, message: &str) -> io::Result<()> {
        self.err(("WARNING:", Color::Yellow), message)
    }

    pub fn error(&self, message: &str) -> io::Result<()> {
        self.err(("ERROR:", Color::Red), message)
    }
}

/// Colour only streams attached to a terminal; `Auto` still honours
/// `NO_COLOR` and `TERM=dumb`.
fn color_choice(is_terminal: bool) -> ColorChoice {
    if is_terminal {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    }
}

fn write_line(
    out: &mut impl WriteColor,
    marker: Option<(&str, Color)>,
    message: &str,
) -> io::Result<()> {
    if let Some((marker, color)) = marker {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        out.set_color(&spec)?;
        write!(out, "{marker}")?;
        out.reset()?;
        write!(out, " ")?;
    }
    writeln!(out, "{message}")?;
    out.flush()
}
