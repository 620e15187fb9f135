//! JSON payloads for stdout.

use std::io::Write;

use serde::Serialize;

use crate::error::Result;

/// Pretty-printed JSON and a trailing newline, flushed.
///
/// Serialization failures surface as [`crate::Error::Json`], write failures
/// (a closed pipe, a full disk) as [`crate::Error::Io`].
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    writeln!(writer, "{}", json)?;
    writer.flush()?;
    Ok(())
}
