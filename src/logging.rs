use colored::*;
use std::fmt;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;

/// Event formatter for operator-facing benchmark output.
///
/// Sweep progress is what the operator watches for minutes at a time, so the
/// format stays minimal: a colored level tag and the message, no timestamps
/// or targets.
pub struct SweepFormatter;

impl<S, N> FormatEvent<S, N> for SweepFormatter
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
        let mut message = String::new();
        ctx.format_fields(Writer::new(&mut message), event)?;

        let level = *event.metadata().level();
        let tag = match level {
            Level::ERROR => "error".red().bold(),
            Level::WARN => "warn".yellow(),
            Level::INFO => "info".green(),
            Level::DEBUG => "debug".blue(),
            Level::TRACE => "trace".dimmed(),
        };
        let body = match level {
            Level::DEBUG | Level::TRACE => message.dimmed(),
            _ => message.normal(),
        };
        writeln!(writer, "{tag}: {body}")
    }
}
