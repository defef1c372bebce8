use anyhow::{Context, Result};
use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt::{self, Write as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    EnvFilter,
};

/// Installs the console subscriber. `RUST_LOG` wins over `default_directive`.
pub fn setup_logger(default_directive: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .context("Invalid log filter")?;

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(ConsoleFormat);

    tracing_subscriber::registry()
        .with(console.with_filter(filter))
        .try_init()
        .context("Failed to set global subscriber")?;

    Ok(())
}

/// Message plus any extra `key=value` fields of an event.
#[derive(Default)]
struct EventText {
    message: String,
    fields: String,
}

impl Visit for EventText {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

const OUTCOME_MARKERS: [(&str, Color); 3] = [
    ("SUCCESS", Color::LightGreen),
    ("FAILED", Color::LightRed),
    ("REVERTED", Color::LightRed),
];

/// Paints submission outcome markers so they stand out in a busy log.
fn highlight_outcome(msg: String) -> String {
    OUTCOME_MARKERS
        .iter()
        .find(|(marker, _)| msg.contains(marker))
        .map(|(marker, color)| {
            let painted = Style::new().fg(*color).bold().paint(*marker).to_string();
            msg.replace(marker, &painted)
        })
        .unwrap_or(msg)
}

fn level_label(level: Level) -> nu_ansi_term::AnsiString<'static> {
    match level {
        Level::ERROR => Color::Red.paint("ERROR"),
        Level::WARN => Color::Yellow.paint("WARN "),
        Level::INFO => Color::Green.paint("INFO "),
        Level::DEBUG => Color::Blue.paint("DEBUG"),
        Level::TRACE => Color::Purple.paint("TRACE"),
    }
}

/// `HH:MM:SS LEVEL [span>span] message key=value`
pub struct ConsoleFormat;

impl<S, N> FormatEvent<S, N> for ConsoleFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut text = EventText::default();
        event.record(&mut text);

        write!(
            writer,
            "{} {} ",
            Local::now().format("%H:%M:%S"),
            level_label(*event.metadata().level())
        )?;

        if let Some(scope) = ctx.event_scope() {
            let names: Vec<&str> = scope.from_root().map(|span| span.name()).collect();
            if !names.is_empty() {
                write!(writer, "[{}] ", names.join(">"))?;
            }
        }

        writeln!(writer, "{}{}", highlight_outcome(text.message), text.fields)
    }
}
