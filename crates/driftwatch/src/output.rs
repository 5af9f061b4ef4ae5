use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

pub fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).context("failed to serialize JSON output")?;
    serde_json::to_writer_pretty(&mut *out, &value).context("failed to write JSON output")?;
    writeln!(out).context("failed to write trailing newline")?;
    Ok(())
}

/// Bullet list with a `- ` prefix per item.
pub fn write_bullets(out: &mut dyn Write, items: &[String]) -> Result<()> {
    for item in items {
        writeln!(out, "- {item}").context("failed to write output")?;
    }
    Ok(())
}

pub fn write_warnings(out: &mut dyn Write, warnings: &[String]) -> Result<()> {
    if warnings.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nWarnings:").context("failed to write output")?;
    write_bullets(out, warnings)
}
