//! ANSI SGR → markup transcoding for log lines
//!
//! A line is scanned left to right into a token stream of scope opens, text
//! runs and scope closes. The scope stack belongs to the line: whatever is
//! still open at the end of the line is closed there, so the output is always
//! balanced and nothing leaks into the next line.
//!
//! Two renderings are built on the same tokens: HTML-style `<span>` markup and
//! flattened [`StyledSegment`]s for terminal widgets.

use std::fmt::Write as _;

const ESC: char = '\u{1b}';

/// The sixteen SGR foreground/background colors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl AnsiColor {
    const NORMAL: [AnsiColor; 8] = [
        AnsiColor::Black,
        AnsiColor::Red,
        AnsiColor::Green,
        AnsiColor::Yellow,
        AnsiColor::Blue,
        AnsiColor::Magenta,
        AnsiColor::Cyan,
        AnsiColor::White,
    ];
    const BRIGHT: [AnsiColor; 8] = [
        AnsiColor::BrightBlack,
        AnsiColor::BrightRed,
        AnsiColor::BrightGreen,
        AnsiColor::BrightYellow,
        AnsiColor::BrightBlue,
        AnsiColor::BrightMagenta,
        AnsiColor::BrightCyan,
        AnsiColor::BrightWhite,
    ];

    /// CSS color used in markup output
    pub fn css(&self) -> &'static str {
        match self {
            AnsiColor::Black => "black",
            AnsiColor::Red => "#ff4d4f",
            AnsiColor::Green => "#52c41a",
            AnsiColor::Yellow => "#faad14",
            AnsiColor::Blue => "#1890ff",
            AnsiColor::Magenta => "#eb2f96",
            AnsiColor::Cyan => "#13c2c2",
            AnsiColor::White => "#d9d9d9",
            AnsiColor::BrightBlack => "gray",
            AnsiColor::BrightRed => "#ff7875",
            AnsiColor::BrightGreen => "#95de64",
            AnsiColor::BrightYellow => "#ffc53d",
            AnsiColor::BrightBlue => "#69c0ff",
            AnsiColor::BrightMagenta => "#ff85c0",
            AnsiColor::BrightCyan => "#5cdbd3",
            AnsiColor::BrightWhite => "#ffffff",
        }
    }
}

/// One entry of the per-line scope stack
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StyleScope {
    Bold,
    Fg(AnsiColor),
    Bg(AnsiColor),
}

impl StyleScope {
    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(StyleScope::Bold),
            30..=37 => Some(StyleScope::Fg(AnsiColor::NORMAL[(code - 30) as usize])),
            90..=97 => Some(StyleScope::Fg(AnsiColor::BRIGHT[(code - 90) as usize])),
            40..=47 => Some(StyleScope::Bg(AnsiColor::NORMAL[(code - 40) as usize])),
            100..=107 => Some(StyleScope::Bg(AnsiColor::BRIGHT[(code - 100) as usize])),
            _ => None,
        }
    }

    pub fn css(&self) -> String {
        match self {
            StyleScope::Bold => "font-weight:bold".to_string(),
            StyleScope::Fg(color) => format!("color:{}", color.css()),
            StyleScope::Bg(color) => format!("background-color:{}", color.css()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Open(StyleScope),
    Text(String),
    Close,
}

/// Drop exactly one trailing line terminator
pub fn strip_terminator(line: &str) -> &str {
    line.strip_suffix("\r\n")
        .or_else(|| line.strip_suffix('\n'))
        .or_else(|| line.strip_suffix('\r'))
        .unwrap_or(line)
}

/// Scan one line into balanced tokens
pub fn tokenize(line: &str) -> Vec<Token> {
    let line = strip_terminator(line);
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut text = String::new();
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != ESC {
            text.push(ch);
            continue;
        }

        // A lone ESC or a non-CSI escape is dropped.
        if chars.peek() != Some(&'[') {
            continue;
        }
        chars.next();

        // Parameter bytes, then intermediate bytes, then one final byte.
        // Anything else ends the sequence and stays in the text.
        let mut params = String::new();
        let mut intermediate = false;
        let mut final_byte = None;
        while let Some(&c) = chars.peek() {
            match c {
                '\u{30}'..='\u{3f}' if !intermediate => params.push(c),
                '\u{20}'..='\u{2f}' => intermediate = true,
                '\u{40}'..='\u{7e}' => {
                    chars.next();
                    final_byte = Some(c);
                    break;
                }
                _ => break,
            }
            chars.next();
        }

        // Only SGR sequences carry style; other CSI sequences vanish.
        if intermediate || final_byte != Some('m') {
            continue;
        }

        if !text.is_empty() {
            tokens.push(Token::Text(std::mem::take(&mut text)));
        }
        apply_sgr(&params, &mut tokens, &mut depth);
    }

    if !text.is_empty() {
        tokens.push(Token::Text(text));
    }
    tokens.extend(std::iter::repeat_n(Token::Close, depth));
    tokens
}

fn apply_sgr(params: &str, tokens: &mut Vec<Token>, depth: &mut usize) {
    let mut codes = params.split(';').map(|p| {
        if p.is_empty() {
            Some(0)
        } else {
            p.parse::<u32>().ok()
        }
    });

    while let Some(code) = codes.next() {
        match code {
            Some(0) => {
                tokens.extend(std::iter::repeat_n(Token::Close, *depth));
                *depth = 0;
            }
            // Extended colors: skip their arguments so they are not read as codes.
            Some(38) | Some(48) => match codes.next() {
                Some(Some(5)) => {
                    codes.next();
                }
                Some(Some(2)) => {
                    codes.by_ref().take(3).for_each(drop);
                }
                _ => {}
            },
            Some(code) => {
                if let Some(scope) = StyleScope::from_code(code) {
                    tokens.push(Token::Open(scope));
                    *depth += 1;
                }
            }
            None => {}
        }
    }
}

/// Escape characters that are significant in markup
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Transcode one raw log line into balanced `<span>` markup (no line break)
pub fn to_markup(line: &str) -> String {
    let mut out = String::new();
    for token in tokenize(line) {
        match token {
            Token::Open(scope) => {
                let _ = write!(out, "<span style=\"{}\">", scope.css());
            }
            Token::Text(text) => out.push_str(&escape_markup(&text)),
            Token::Close => out.push_str("</span>"),
        }
    }
    out
}

/// A text run with the effective style of every scope open around it
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StyledSegment {
    pub text: String,
    pub bold: bool,
    pub fg: Option<AnsiColor>,
    pub bg: Option<AnsiColor>,
}

/// Flatten a line into styled runs; inner scopes override outer ones
pub fn segments(line: &str) -> Vec<StyledSegment> {
    let mut stack: Vec<StyleScope> = Vec::new();
    let mut out = Vec::new();
    for token in tokenize(line) {
        match token {
            Token::Open(scope) => stack.push(scope),
            Token::Close => {
                stack.pop();
            }
            Token::Text(text) => {
                let mut seg = StyledSegment {
                    text,
                    ..Default::default()
                };
                for scope in &stack {
                    match scope {
                        StyleScope::Bold => seg.bold = true,
                        StyleScope::Fg(c) => seg.fg = Some(*c),
                        StyleScope::Bg(c) => seg.bg = Some(*c),
                    }
                }
                out.push(seg);
            }
        }
    }
    out
}

/// Plain text with every escape sequence removed
pub fn strip_ansi(line: &str) -> String {
    tokenize(line)
        .into_iter()
        .filter_map(|t| match t {
            Token::Text(text) => Some(text),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced(tokens: &[Token]) -> bool {
        let mut depth: i64 = 0;
        for t in tokens {
            match t {
                Token::Open(_) => depth += 1,
                Token::Close => depth -= 1,
                Token::Text(_) => {}
            }
            if depth < 0 {
                return false;
            }
        }
        depth == 0
    }

    #[test]
    fn test_single_color_scope() {
        let tokens = tokenize("\x1b[31mERROR\x1b[0m");
        assert_eq!(
            tokens,
            vec![
                Token::Open(StyleScope::Fg(AnsiColor::Red)),
                Token::Text("ERROR".into()),
                Token::Close,
            ]
        );
        assert_eq!(
            to_markup("\x1b[31mERROR\x1b[0m"),
            "<span style=\"color:#ff4d4f\">ERROR</span>"
        );
    }

    #[test]
    fn test_nested_scopes_closed_by_one_reset() {
        let tokens = tokenize("\x1b[1m\x1b[31mX\x1b[0m");
        assert_eq!(
            tokens,
            vec![
                Token::Open(StyleScope::Bold),
                Token::Open(StyleScope::Fg(AnsiColor::Red)),
                Token::Text("X".into()),
                Token::Close,
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_unclosed_scope_is_forced_closed() {
        let markup = to_markup("\x1b[32mOK");
        assert_eq!(markup, "<span style=\"color:#52c41a\">OK</span>");
        assert!(balanced(&tokenize("\x1b[32mOK")));
    }

    #[test]
    fn test_empty_params_reset() {
        let tokens = tokenize("\x1b[33mwarn\x1b[m tail");
        assert_eq!(tokens[2], Token::Close);
        assert_eq!(tokens[3], Token::Text(" tail".into()));
        assert!(balanced(&tokens));
    }

    #[test]
    fn test_escape_before_scopes() {
        assert_eq!(
            to_markup("<b>a & b</b>"),
            "&lt;b&gt;a &amp; b&lt;/b&gt;"
        );
        assert_eq!(
            to_markup("\x1b[1m<tag>\x1b[0m"),
            "<span style=\"font-weight:bold\">&lt;tag&gt;</span>"
        );
    }

    #[test]
    fn test_one_trailing_terminator_stripped() {
        assert_eq!(to_markup("line\n"), "line");
        assert_eq!(to_markup("line\r\n"), "line");
        assert_eq!(to_markup("line\n\n"), "line\n");
    }

    #[test]
    fn test_unknown_codes_ignored() {
        let tokens = tokenize("\x1b[4mx\x1b[0m");
        assert_eq!(tokens, vec![Token::Text("x".into())]);
        let tokens = tokenize("\x1b[99;5mx");
        assert_eq!(tokens, vec![Token::Text("x".into())]);
        let tokens = tokenize("\x1b[1:3mx");
        assert_eq!(tokens, vec![Token::Text("x".into())]);
    }

    #[test]
    fn test_combined_params_in_one_sequence() {
        let tokens = tokenize("\x1b[1;91;44mhot\x1b[0m");
        assert_eq!(
            &tokens[..3],
            &[
                Token::Open(StyleScope::Bold),
                Token::Open(StyleScope::Fg(AnsiColor::BrightRed)),
                Token::Open(StyleScope::Bg(AnsiColor::Blue)),
            ]
        );
        assert!(balanced(&tokens));
    }

    #[test]
    fn test_extended_color_arguments_skipped() {
        let tokens = tokenize("\x1b[38;5;31mx");
        assert_eq!(tokens, vec![Token::Text("x".into())]);
        let tokens = tokenize("\x1b[48;2;1;2;3;32mx");
        assert_eq!(
            tokens,
            vec![
                Token::Open(StyleScope::Fg(AnsiColor::Green)),
                Token::Text("x".into()),
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_non_sgr_csi_removed() {
        assert_eq!(strip_ansi("\x1b[2Kprogress\x1b[1G"), "progress");
        assert_eq!(strip_ansi("a\x1bb"), "ab");
    }

    #[test]
    fn test_broken_csi_keeps_following_text() {
        assert_eq!(to_markup("\x1b[日本 message"), "日本 message");
        assert_eq!(strip_ansi("x\x1b[\ty"), "x\ty");
        assert_eq!(strip_ansi("\x1b[31\nmore"), "\nmore");
        // An intermediate byte makes it a non-SGR sequence.
        assert_eq!(strip_ansi("\x1b[1 mok"), "ok");
    }

    #[test]
    fn test_reset_then_color_in_one_sequence() {
        let tokens = tokenize("\x1b[31ma\x1b[0;32mb");
        assert_eq!(
            tokens,
            vec![
                Token::Open(StyleScope::Fg(AnsiColor::Red)),
                Token::Text("a".into()),
                Token::Close,
                Token::Open(StyleScope::Fg(AnsiColor::Green)),
                Token::Text("b".into()),
                Token::Close,
            ]
        );
    }

    #[test]
    fn test_segments_inherit_outer_scopes() {
        let segs = segments("\x1b[1mA\x1b[36mB\x1b[0mC");
        assert_eq!(segs.len(), 3);
        assert!(segs[0].bold && segs[0].fg.is_none());
        assert!(segs[1].bold && segs[1].fg == Some(AnsiColor::Cyan));
        assert_eq!(segs[2], StyledSegment { text: "C".into(), ..Default::default() });
    }
}
