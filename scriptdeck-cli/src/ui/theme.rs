//! UI theme: palette tokens and style helpers for the dashboard

use ratatui::style::{Color, Modifier, Style};

use scriptdeck_core::ansi::AnsiColor;
use scriptdeck_core::connection::ConnectionState;
use scriptdeck_core::model::ScriptStatus;
use scriptdeck_core::notify::Severity;

/// Color palette tokens for the theme
#[derive(Clone, Debug)]
pub struct Palette {
    /// Panel border color
    pub panel_border: Color,
    /// Primary text color
    pub text: Color,
    /// Dimmed text (secondary info)
    pub text_dim: Color,
    /// Muted text (stopped scripts, placeholders)
    pub text_muted: Color,
    /// Accent color (highlights, focus)
    pub accent: Color,
    pub success: Color,
    pub warn: Color,
    pub error: Color,
    pub info: Color,
    pub selection_bg: Color,
    pub selection_fg: Color,
    pub key_hint: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self::dark()
    }
}

impl Palette {
    pub fn dark() -> Self {
        Self {
            panel_border: Color::Rgb(60, 60, 60),
            text: Color::Rgb(212, 212, 212),
            text_dim: Color::Rgb(150, 150, 150),
            text_muted: Color::Rgb(100, 100, 100),
            accent: Color::Rgb(79, 193, 255),
            success: Color::Rgb(78, 201, 176),
            warn: Color::Rgb(220, 180, 100),
            error: Color::Rgb(244, 135, 113),
            info: Color::Rgb(156, 220, 254),
            selection_bg: Color::Rgb(38, 79, 120),
            selection_fg: Color::White,
            key_hint: Color::Rgb(206, 145, 120),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Theme {
    pub palette: Palette,
}

impl Theme {
    pub fn status_style(&self, status: &ScriptStatus) -> Style {
        let color = if status.is_running() {
            self.palette.success
        } else {
            self.palette.text_muted
        };
        Style::default().fg(color)
    }

    pub fn status_icon(&self, status: &ScriptStatus) -> &'static str {
        if status.is_running() { "●" } else { "○" }
    }

    pub fn connection_style(&self, state: ConnectionState) -> Style {
        let color = match state {
            ConnectionState::Push => self.palette.success,
            ConnectionState::PollOnly => self.palette.warn,
            ConnectionState::Disconnected => self.palette.error,
        };
        Style::default().fg(color).add_modifier(Modifier::BOLD)
    }

    pub fn severity_style(&self, severity: Severity) -> Style {
        let color = match severity {
            Severity::Success => self.palette.success,
            Severity::Info => self.palette.info,
            Severity::Warning => self.palette.warn,
            Severity::Error => self.palette.error,
        };
        Style::default().fg(color)
    }

    pub fn tab_style(&self, active: bool) -> Style {
        if active {
            Style::default()
                .fg(self.palette.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.palette.text_dim)
        }
    }

    pub fn border_style(&self, focused: bool) -> Style {
        let color = if focused {
            self.palette.accent
        } else {
            self.palette.panel_border
        };
        Style::default().fg(color)
    }

    pub fn selection_style(&self) -> Style {
        Style::default()
            .bg(self.palette.selection_bg)
            .fg(self.palette.selection_fg)
            .add_modifier(Modifier::BOLD)
    }
}

/// Terminal color for an SGR color, matching the web palette
pub fn ansi_color(color: AnsiColor) -> Color {
    let css = color.css();
    match css.strip_prefix('#') {
        Some(hex) if hex.len() == 6 => {
            let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
            Color::Rgb(channel(0), channel(2), channel(4))
        }
        _ => match color {
            AnsiColor::Black => Color::Black,
            _ => Color::Gray,
        },
    }
}

static DEFAULT_THEME: std::sync::OnceLock<Theme> = std::sync::OnceLock::new();

pub fn theme() -> &'static Theme {
    DEFAULT_THEME.get_or_init(Theme::default)
}

/// Shorthands over the default theme
pub mod styles {
    use super::*;

    pub fn status(status: &ScriptStatus) -> Style {
        theme().status_style(status)
    }

    pub fn status_icon(status: &ScriptStatus) -> &'static str {
        theme().status_icon(status)
    }

    pub fn connection(state: ConnectionState) -> Style {
        theme().connection_style(state)
    }

    pub fn severity(severity: Severity) -> Style {
        theme().severity_style(severity)
    }

    pub fn tab(active: bool) -> Style {
        theme().tab_style(active)
    }

    pub fn border(focused: bool) -> Style {
        theme().border_style(focused)
    }

    pub fn selection() -> Style {
        theme().selection_style()
    }

    pub fn key_hint() -> Style {
        Style::default().fg(theme().palette.key_hint)
    }

    pub fn text() -> Style {
        Style::default().fg(theme().palette.text)
    }

    pub fn text_dim() -> Style {
        Style::default().fg(theme().palette.text_dim)
    }

    pub fn text_muted() -> Style {
        Style::default().fg(theme().palette.text_muted)
    }

    pub fn accent_bold() -> Style {
        Style::default()
            .fg(theme().palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    pub fn error() -> Style {
        Style::default().fg(theme().palette.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi_color_uses_web_palette() {
        assert_eq!(ansi_color(AnsiColor::Red), Color::Rgb(0xff, 0x4d, 0x4f));
        assert_eq!(ansi_color(AnsiColor::BrightWhite), Color::Rgb(255, 255, 255));
        assert_eq!(ansi_color(AnsiColor::Black), Color::Black);
        assert_eq!(ansi_color(AnsiColor::BrightBlack), Color::Gray);
    }
}
