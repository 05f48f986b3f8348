//! Shared colored output for CLI commands.
//!
//! Uses `termcolor` for cross-platform colored terminal output.
//! Respects the `NO_COLOR` environment variable and the `--color` flag.

use serde::Serialize;
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from CLI flag and environment.
///
/// Priority: `NO_COLOR` env > `--color` flag > auto-detect TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

/// Print `value` as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Styled writer for terminal output
pub struct StyledOutput {
    stdout: StandardStream,
}

impl StyledOutput {
    /// Create a new styled output with the given color choice
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stdout: StandardStream::stdout(choice),
        }
    }

    fn write_styled(&mut self, text: &str, color: Option<Color>, bold: bool) {
        let mut spec = ColorSpec::new();
        spec.set_fg(color).set_bold(bold);
        let _ = self.stdout.set_color(&spec);
        let _ = write!(self.stdout, "{}", text);
        let _ = self.stdout.reset();
    }

    /// Bold heading line
    pub fn heading(&mut self, text: &str) {
        self.write_styled(text, None, true);
        let _ = writeln!(self.stdout);
    }

    /// `key: value` line with a dimmed key
    pub fn field(&mut self, key: &str, value: &str) {
        self.write_styled(&format!("  {key}: "), Some(Color::Cyan), false);
        let _ = writeln!(self.stdout, "{}", value);
    }

    /// Indented list item
    pub fn item(&mut self, text: &str) {
        let _ = writeln!(self.stdout, "    {}", text);
    }

    /// Green status tag followed by text
    pub fn ok(&mut self, text: &str) {
        self.write_styled("ok    ", Some(Color::Green), true);
        let _ = writeln!(self.stdout, "{}", text);
    }

    /// Red status tag followed by text
    pub fn failed(&mut self, text: &str) {
        self.write_styled("error ", Some(Color::Red), true);
        let _ = writeln!(self.stdout, "{}", text);
    }
}
