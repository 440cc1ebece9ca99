//! `scriptdeck logs` - print, and optionally follow, a log stream

use std::time::Duration;

use scriptdeck_core::ansi;
use scriptdeck_core::backend::Backend;
use scriptdeck_core::error::ClientError;
use scriptdeck_core::log_view::{
    LogContent, LogRenderer, LogTarget, NO_LOGS_PLACEHOLDER, RenderedLine,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Raw SGR sequences passed through to the terminal
    Color,
    Plain,
    /// Escaped markup with style spans, one `<br>` per line
    Html,
}

fn format_line(format: LogFormat, line: &RenderedLine) -> String {
    match format {
        LogFormat::Color => format!("{}\x1b[0m", line.raw),
        LogFormat::Plain => ansi::strip_ansi(&line.raw),
        LogFormat::Html => format!("{}<br>", line.markup()),
    }
}

pub async fn run_logs(
    backend: &dyn Backend,
    target: LogTarget,
    lines: usize,
    follow: Option<Duration>,
    format: LogFormat,
) -> Result<(), ClientError> {
    let mut renderer = LogRenderer::new();
    if !renderer.fetch(backend, target.clone(), Some(lines)).await {
        return Err(ClientError::network(
            renderer.error().unwrap_or("log fetch failed").to_string(),
        ));
    }
    match (format, renderer.content()) {
        (LogFormat::Html, _) => println!("{}", renderer.html()),
        (_, LogContent::Placeholder) => println!("{}", NO_LOGS_PLACEHOLDER),
        _ => renderer
            .lines()
            .iter()
            .for_each(|l| println!("{}", format_line(format, l))),
    }

    let Some(period) = follow else {
        return Ok(());
    };

    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                match backend.fetch_logs(&target, lines).await {
                    Ok(window) => {
                        let added = renderer.merge_tail(&window);
                        let shown = renderer.lines();
                        shown[shown.len() - added.min(shown.len())..]
                            .iter()
                            .for_each(|l| println!("{}", format_line(format, l)));
                    }
                    Err(err) => renderer.fetch_failed(&err),
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line() {
        let line = RenderedLine::new("\x1b[31mfail & <retry>\x1b[0m\n");
        assert_eq!(
            format_line(LogFormat::Color, &line),
            "\x1b[31mfail & <retry>\x1b[0m\x1b[0m"
        );
        assert_eq!(format_line(LogFormat::Plain, &line), "fail & <retry>");
        let html = format_line(LogFormat::Html, &line);
        assert!(html.starts_with("<span style="));
        assert!(html.contains("fail &amp; &lt;retry&gt;</span>"));
        assert!(html.ends_with("<br>"));
    }
}
