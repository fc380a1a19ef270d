//! Inspect command implementation.

use super::{format_size, CliResult, Target};
use fleetstore_storage::{list_backups, list_residuals, ResidualKind};
use serde::Serialize;
use std::collections::BTreeMap;

/// Document inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Document path.
    pub path: String,
    /// File size in bytes.
    pub size: u64,
    /// Whether the file is sealed with the passphrase.
    pub encrypted: bool,
    /// Schema version stamp.
    pub schema_version: String,
    /// Service id, empty when none was assigned yet.
    pub service_id: String,
    /// Records per collection.
    pub collections: BTreeMap<&'static str, usize>,
    /// Backup and residual files beside the document (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<FileListing>,
}

/// Files found next to the document.
#[derive(Debug, Serialize)]
pub struct FileListing {
    /// Rotating backups, oldest first.
    pub backups: Vec<String>,
    /// Residual files keyed by extension.
    pub residuals: BTreeMap<&'static str, Vec<String>>,
}

/// Runs the inspect command.
pub fn run(target: &Target, show_files: bool, format: &str) -> CliResult<()> {
    let result = inspect(target, show_files)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Reads the document without taking the store lock.
pub fn inspect(target: &Target, show_files: bool) -> CliResult<InspectResult> {
    let (document, encrypted) = target.read_document()?;
    let file = target.file();

    let files = if show_files {
        let mut residuals = BTreeMap::new();
        for kind in ResidualKind::RECOVERY_ORDER {
            residuals.insert(kind.extension(), names(list_residuals(&file, kind)?));
        }
        Some(FileListing {
            backups: names(list_backups(&file)?),
            residuals,
        })
    } else {
        None
    };

    Ok(InspectResult {
        path: target.path().display().to_string(),
        size: file.size()?,
        encrypted,
        schema_version: document.schema.version.clone(),
        service_id: document
            .configuration
            .as_ref()
            .map(|c| c.id.clone())
            .unwrap_or_default(),
        collections: document.collection_counts(),
        files,
    })
}

fn names(paths: Vec<std::path::PathBuf>) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}

fn print_text_output(result: &InspectResult) {
    println!("fleetstore Document Inspection");
    println!("==============================");
    println!();
    println!("Path:       {}", result.path);
    println!("Size:       {}", format_size(result.size));
    println!("Encrypted:  {}", if result.encrypted { "yes" } else { "no" });
    println!("Schema:     {}", result.schema_version);
    if !result.service_id.is_empty() {
        println!("Service id: {}", result.service_id);
    }
    println!();
    println!("Collections:");
    for (name, count) in &result.collections {
        println!("  {name:<26} {count}");
    }

    if let Some(files) = &result.files {
        println!();
        println!("Backups ({}):", files.backups.len());
        for name in &files.backups {
            println!("  {name}");
        }
        for (ext, list) in &files.residuals {
            if list.is_empty() {
                continue;
            }
            println!("Residual *.{ext} ({}):", list.len());
            for name in list {
                println!("  {name}");
            }
        }
    }
}
