//! `migrate-config`: convert configuration files to the current layout.

use anyhow::{Context, Result};
use mdchunk_core::{SourceFormat, migrate};
use std::path::{Path, PathBuf};
use tracing::info;

/// Migrate `file` and print (or write) the resulting TOML.
///
/// Notes and warnings go to stderr.
pub fn migrate_config(file: &Path, output: Option<&PathBuf>) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let migration =
        migrate(&input).with_context(|| format!("Failed to migrate {}", file.display()))?;

    let format = match migration.source_format {
        SourceFormat::Toml => "toml",
        SourceFormat::Json => "json",
        SourceFormat::LegacyJson => "legacy json",
    };
    info!(file = %file.display(), format, "Migrating configuration");

    for note in &migration.notes {
        eprintln!("note: {note}");
    }
    for warning in &migration.warnings {
        eprintln!("warning: {warning}");
    }

    match output {
        Some(path) => {
            migration
                .config
                .save(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        },
        None => print!("{}", migration.config.to_toml_string()?),
    }
    Ok(())
}
