//! Logging through the runner's workflow commands.
//!
//! Errors and warnings become annotations, debug output is only shown when
//! step debug logging is enabled, and info lines are printed as they are.

use crate::actions::command::issue_command;
use std::fmt;
use tracing::subscriber::{self, SetGlobalDefaultError};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub const DEFAULT_LOG_FILTER: &str = "warn,configure_aws_credentials=debug";

pub struct WorkflowCommandFormat;

impl<S, N> FormatEvent<S, N> for WorkflowCommandFormat
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

        let line = match *event.metadata().level() {
            Level::ERROR => issue_command("error", &[], &message),
            Level::WARN => issue_command("warning", &[], &message),
            Level::INFO => message,
            _ => issue_command("debug", &[], &message),
        };
        writeln!(writer, "{line}")
    }
}

pub fn init_logging() -> Result<(), SetGlobalDefaultError> {
    // RUST_LOG overrides the default filter
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .event_format(WorkflowCommandFormat)
        .finish();

    subscriber::set_global_default(subscriber)
}
