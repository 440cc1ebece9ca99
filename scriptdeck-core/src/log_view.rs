//! Log stream renderer
//!
//! Holds the rendered lines for the currently selected log target plus a
//! line-unit viewport. A fetched window replaces the buffer; live lines are
//! appended one at a time with sticky-tail scrolling.

use tracing::debug;

use crate::ansi;
use crate::api::{DEFAULT_LOG_LINES, MANAGER_LOG_ID};
use crate::backend::Backend;
use crate::error::ClientError;
use crate::model::ScriptId;

/// Text shown instead of an empty buffer
pub const NO_LOGS_PLACEHOLDER: &str = "No logs";

/// Upper bound on buffered lines while appending live output
pub const DEFAULT_MAX_LINES: usize = 10_000;

/// Whose log is on screen
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogTarget {
    /// The process manager's own log
    #[default]
    Manager,
    Script(ScriptId),
}

impl LogTarget {
    /// Parse a target id, honouring the manager sentinel
    pub fn from_id(id: &str) -> Self {
        if id == MANAGER_LOG_ID {
            LogTarget::Manager
        } else {
            LogTarget::Script(id.to_string())
        }
    }

    pub fn id(&self) -> &str {
        match self {
            LogTarget::Manager => MANAGER_LOG_ID,
            LogTarget::Script(id) => id,
        }
    }

    pub fn script_id(&self) -> Option<&str> {
        match self {
            LogTarget::Manager => None,
            LogTarget::Script(id) => Some(id),
        }
    }
}

/// Scroll state measured in lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Viewport {
    pub scroll_top: usize,
    pub client_height: usize,
    pub scroll_height: usize,
}

impl Viewport {
    pub fn max_offset(&self) -> usize {
        self.scroll_height.saturating_sub(self.client_height)
    }

    /// Within one line of the maximum offset
    pub fn is_at_bottom(&self) -> bool {
        self.max_offset().saturating_sub(self.scroll_top) <= 1
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll_top = self.max_offset();
    }

    pub fn scroll_by(&mut self, delta: isize) {
        let target = self.scroll_top.saturating_add_signed(delta);
        self.scroll_top = target.min(self.max_offset());
    }

    pub fn set_client_height(&mut self, height: usize) {
        let was_bottom = self.is_at_bottom();
        self.client_height = height;
        if was_bottom {
            self.scroll_to_bottom();
        } else {
            self.scroll_top = self.scroll_top.min(self.max_offset());
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedLine {
    /// Raw text with the trailing terminator removed
    pub raw: String,
}

impl RenderedLine {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: ansi::strip_terminator(raw).to_string(),
        }
    }

    /// Escaped text with SGR styles as spans; built on demand
    pub fn markup(&self) -> String {
        ansi::to_markup(&self.raw)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogContent {
    /// A fetch for the current target has not landed yet
    Loading,
    /// Fetched window was empty
    Placeholder,
    Lines(Vec<RenderedLine>),
}

#[derive(Clone, Debug)]
pub struct LogRenderer {
    target: LogTarget,
    content: LogContent,
    viewport: Viewport,
    error: Option<String>,
    max_lines: usize,
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::with_max_lines(DEFAULT_MAX_LINES)
    }

    pub fn with_max_lines(max_lines: usize) -> Self {
        Self {
            target: LogTarget::Manager,
            content: LogContent::Loading,
            viewport: Viewport::default(),
            error: None,
            max_lines: max_lines.max(1),
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    pub fn content(&self) -> &LogContent {
        &self.content
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn lines(&self) -> &[RenderedLine] {
        match &self.content {
            LogContent::Lines(lines) => lines,
            _ => &[],
        }
    }

    /// Switch to another target; the buffer goes back to loading.
    /// Returns false when the target did not change.
    pub fn select(&mut self, target: LogTarget) -> bool {
        if self.target == target && self.content != LogContent::Loading {
            return false;
        }
        self.target = target;
        self.content = LogContent::Loading;
        self.error = None;
        self.viewport.scroll_top = 0;
        self.viewport.scroll_height = 0;
        true
    }

    /// Replace everything on screen with a fetched window
    pub fn render<S: AsRef<str>>(&mut self, lines: &[S]) {
        self.error = None;
        if lines.is_empty() {
            self.content = LogContent::Placeholder;
            self.viewport.scroll_height = 1;
        } else {
            let start = lines.len().saturating_sub(self.max_lines);
            let rendered: Vec<RenderedLine> = lines[start..]
                .iter()
                .map(|l| RenderedLine::new(l.as_ref()))
                .collect();
            self.viewport.scroll_height = rendered.len();
            self.content = LogContent::Lines(rendered);
        }
        self.viewport.scroll_to_bottom();
    }

    /// Add one line without re-rendering the buffer.
    ///
    /// The viewport follows the new tail only if it was at the bottom before
    /// the line arrived.
    pub fn append(&mut self, line: &str) {
        let stick = self.viewport.is_at_bottom();

        let rendered = RenderedLine::new(line);
        match &mut self.content {
            LogContent::Lines(lines) => {
                lines.push(rendered);
                if lines.len() > self.max_lines {
                    let excess = lines.len() - self.max_lines;
                    lines.drain(..excess);
                }
                self.viewport.scroll_height = lines.len();
            }
            _ => {
                self.content = LogContent::Lines(vec![rendered]);
                self.viewport.scroll_height = 1;
            }
        }

        if stick {
            self.viewport.scroll_to_bottom();
        }
    }

    /// Append the part of a freshly fetched window that is not on screen yet.
    ///
    /// The overlap is the longest suffix of the buffer that equals a prefix of
    /// the window. Returns how many lines were appended.
    pub fn merge_tail<S: AsRef<str>>(&mut self, window: &[S]) -> usize {
        let fresh: Vec<&str> = window
            .iter()
            .map(|l| ansi::strip_terminator(l.as_ref()))
            .collect();
        let overlap = {
            let current = self.lines();
            let max = current.len().min(fresh.len());
            (0..=max)
                .rev()
                .find(|&k| {
                    current[current.len() - k..]
                        .iter()
                        .zip(&fresh[..k])
                        .all(|(a, b)| a.raw == *b)
                })
                .unwrap_or(0)
        };

        if fresh.is_empty() && self.content == LogContent::Loading {
            self.render(&fresh);
            return 0;
        }

        let added = fresh.len() - overlap;
        for line in &fresh[overlap..] {
            self.append(line);
        }
        added
    }

    /// Record a failed fetch; whatever is on screen stays
    pub fn fetch_failed(&mut self, err: &ClientError) {
        debug!(target_id = %self.target.id(), error = %err, "log fetch failed");
        self.error = Some(err.to_string());
    }

    /// Apply the outcome of a full fetch for `target`.
    ///
    /// Results for a target that is no longer selected are dropped.
    pub fn apply_fetch(&mut self, target: &LogTarget, result: Result<Vec<String>, ClientError>) {
        if *target != self.target {
            return;
        }
        match result {
            Ok(lines) => self.render(&lines),
            Err(err) => self.fetch_failed(&err),
        }
    }

    /// Fetch the most recent `line_limit` lines for `target` and render them.
    ///
    /// Never fails: on error the previous content is kept and [`Self::error`]
    /// is set.
    pub async fn fetch<B: Backend + ?Sized>(
        &mut self,
        backend: &B,
        target: LogTarget,
        line_limit: Option<usize>,
    ) -> bool {
        if target != self.target {
            self.select(target.clone());
        }
        let result = backend
            .fetch_logs(&target, line_limit.unwrap_or(DEFAULT_LOG_LINES))
            .await;
        let ok = result.is_ok();
        self.apply_fetch(&target, result);
        ok
    }

    /// Whole buffer as markup, one `<br>` per line
    pub fn html(&self) -> String {
        match &self.content {
            LogContent::Loading => "<div class=\"log-loading\">Loading...</div>".to_string(),
            LogContent::Placeholder => {
                format!("<div class=\"log-empty\">{}</div>", NO_LOGS_PLACEHOLDER)
            }
            LogContent::Lines(lines) => lines
                .iter()
                .map(|l| format!("{}<br>", l.markup()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer_with(lines: usize, height: usize) -> LogRenderer {
        let mut r = LogRenderer::new();
        let window: Vec<String> = (0..lines).map(|i| format!("line {}", i)).collect();
        r.viewport_mut().client_height = height;
        r.render(&window);
        r
    }

    #[test]
    fn test_render_empty_shows_placeholder() {
        let mut r = LogRenderer::new();
        r.render::<String>(&[]);
        assert_eq!(r.content(), &LogContent::Placeholder);
        assert!(r.html().contains(NO_LOGS_PLACEHOLDER));
        assert!(!r.html().is_empty());
    }

    #[test]
    fn test_render_replaces_buffer() {
        let mut r = renderer_with(5, 3);
        r.render(&["only"]);
        assert_eq!(r.lines().len(), 1);
        assert_eq!(r.lines()[0].raw, "only");
    }

    #[test]
    fn test_append_sticks_to_bottom() {
        let mut r = renderer_with(10, 4);
        assert_eq!(r.viewport().scroll_top, 6);

        r.append("new");
        assert_eq!(r.viewport().scroll_height, 11);
        assert_eq!(r.viewport().scroll_top, 7);
    }

    #[test]
    fn test_append_within_one_line_counts_as_bottom() {
        let mut r = renderer_with(10, 4);
        r.viewport_mut().scroll_top = 5;
        r.append("new");
        assert_eq!(r.viewport().scroll_top, 7);
    }

    #[test]
    fn test_append_scrolled_up_keeps_offset() {
        let mut r = renderer_with(10, 4);
        r.viewport_mut().scroll_top = 2;
        r.append("new");
        assert_eq!(r.viewport().scroll_top, 2);
        assert_eq!(r.lines().len(), 11);
    }

    #[test]
    fn test_append_replaces_placeholder() {
        let mut r = LogRenderer::new();
        r.render::<String>(&[]);
        r.append("\x1b[31mboom\x1b[0m\n");
        assert_eq!(r.lines().len(), 1);
        assert_eq!(r.lines()[0].raw, "\x1b[31mboom\x1b[0m");
        assert_eq!(r.html(), "<span style=\"color:#ff4d4f\">boom</span><br>");
    }

    #[test]
    fn test_append_respects_line_cap() {
        let mut r = LogRenderer::with_max_lines(3);
        r.render(&["a", "b", "c"]);
        r.append("d");
        let raws: Vec<&str> = r.lines().iter().map(|l| l.raw.as_str()).collect();
        assert_eq!(raws, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_failed_fetch_keeps_content() {
        let mut r = renderer_with(3, 10);
        let target = r.target().clone();
        r.apply_fetch(&target, Err(ClientError::network("connection refused")));
        assert_eq!(r.lines().len(), 3);
        assert!(r.error().unwrap().contains("connection refused"));

        r.apply_fetch(&target, Ok(vec!["x".into()]));
        assert!(r.error().is_none());
    }

    #[test]
    fn test_stale_fetch_for_other_target_dropped() {
        let mut r = LogRenderer::new();
        r.select(LogTarget::Script("a".into()));
        r.apply_fetch(&LogTarget::Manager, Ok(vec!["manager line".into()]));
        assert_eq!(r.content(), &LogContent::Loading);
    }

    #[test]
    fn test_merge_tail_appends_only_new_lines() {
        let mut r = LogRenderer::new();
        r.render(&["1", "2", "3"]);
        assert_eq!(r.merge_tail(&["2", "3", "4", "5"]), 2);
        let raws: Vec<&str> = r.lines().iter().map(|l| l.raw.as_str()).collect();
        assert_eq!(raws, vec!["1", "2", "3", "4", "5"]);

        assert_eq!(r.merge_tail(&["3", "4", "5"]), 0);
        assert_eq!(r.lines().len(), 5);
    }

    #[test]
    fn test_merge_tail_without_overlap_appends_window() {
        let mut r = LogRenderer::new();
        r.render(&["a"]);
        assert_eq!(r.merge_tail(&["x\n", "y\n"]), 2);
        assert_eq!(r.lines().len(), 3);
    }

    #[test]
    fn test_target_sentinel() {
        assert_eq!(LogTarget::from_id("manager"), LogTarget::Manager);
        assert_eq!(LogTarget::from_id("etl").script_id(), Some("etl"));
        assert_eq!(LogTarget::Manager.id(), MANAGER_LOG_ID);
    }

    #[test]
    fn test_viewport_resize_keeps_tail() {
        let mut r = renderer_with(20, 5);
        r.viewport_mut().set_client_height(10);
        assert_eq!(r.viewport().scroll_top, 10);
        r.viewport_mut().scroll_by(-4);
        assert_eq!(r.viewport().scroll_top, 6);
        r.viewport_mut().scroll_by(100);
        assert_eq!(r.viewport().scroll_top, 10);
    }
}
