//! Backup command implementation.
//!
//! Opens the store so the backup goes through the same rotation the service
//! uses, then closes it again.

use super::{cli_context, format_size, CliResult, Target};
use fleetstore_storage::DataFile;
use std::path::PathBuf;
use tracing::info;

/// Takes a rotating backup, or lists the existing ones when `list_only`.
pub fn run(target: &Target, list_only: bool) -> CliResult<()> {
    let backups = if list_only {
        list(target)?
    } else {
        info!("Creating backup of {}", target.path().display());
        let (created, backups) = create(target)?;
        println!("✓ Backup created successfully");
        println!("  Path: {}", created.display());
        println!("  Size: {}", format_size(DataFile::new(&created).size()?));
        println!();
        backups
    };

    println!("Backups ({}):", backups.len());
    for path in &backups {
        println!("  {}", path.display());
    }
    Ok(())
}

/// Creates one backup and returns it with the rotation left afterwards.
pub fn create(target: &Target) -> CliResult<(PathBuf, Vec<PathBuf>)> {
    let ctx = cli_context();
    let db = target.open(&ctx)?;
    let created = db.backup(&ctx)?;
    let backups = db.backups(&ctx)?;
    db.close(&ctx)?;
    Ok((created, backups))
}

/// Lists the rotating backups, oldest first.
pub fn list(target: &Target) -> CliResult<Vec<PathBuf>> {
    Ok(fleetstore_storage::list_backups(&target.file())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstore_core::models::Document;
    use fleetstore_storage::write_durable;

    #[test]
    fn backups_rotate_to_the_configured_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        write_durable(&path, &Document::new().to_json_pretty().unwrap()).unwrap();
        let target = Target::new(path, None, Some(2));

        assert!(list(&target).unwrap().is_empty());
        for _ in 0..4 {
            create(&target).unwrap();
        }
        let backups = list(&target).unwrap();
        assert_eq!(backups.len(), 2);
        assert!(backups.iter().all(|p| p.exists()));
    }
}
