//! Structured logging contract used by the [`Reader`](crate::Reader).
//!
//! Fetchers and processors log through `tracing` directly. The reader takes an
//! injectable [`Logger`] so embedding services can route its stage reports wherever
//! they like; [`NoopLogger`] is always an acceptable substitute.

use std::fmt::{self, Display};

/// A key/value pair attached to a log record.
pub type Field<'a> = (&'a str, &'a dyn Display);

/// Leveled, side-effect-only logging.
pub trait Logger: Send + Sync {
    fn info(&self, msg: &str, fields: &[Field<'_>]);
    fn error(&self, msg: &str, fields: &[Field<'_>]);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn info(&self, _msg: &str, _fields: &[Field<'_>]) {}
    fn error(&self, _msg: &str, _fields: &[Field<'_>]) {}
}

/// Forwards records to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, msg: &str, fields: &[Field<'_>]) {
        tracing::info!(fields = %Fields(fields), "{msg}");
    }

    fn error(&self, msg: &str, fields: &[Field<'_>]) {
        tracing::error!(fields = %Fields(fields), "{msg}");
    }
}

/// Renders fields as `key=value` pairs.
struct Fields<'a, 'b>(&'a [Field<'b>]);

impl Display for Fields<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{key}={value}")?;
        }
        Ok(())
    }
}
