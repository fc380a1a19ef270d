//! Recover command implementation.

use super::{cli_context, CliResult, Target};
use fleetstore_core::StatsSnapshot;
use fleetstore_storage::ResidualKind;
use std::path::Path;
use tracing::{info, warn};

/// How the document was recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A residual file of this kind was loaded.
    Residual(ResidualKind),
    /// The newest readable backup was loaded.
    Backup(String),
    /// The given file was loaded.
    Restored(String),
    /// Nothing to recover from.
    Nothing,
}

/// Runs the recover command.
pub fn run(target: &Target, from_backup: bool, restore: Option<&Path>) -> CliResult<()> {
    info!("Recovering {}", target.path().display());
    let (outcome, stats) = recover(target, from_backup, restore)?;

    match &outcome {
        Outcome::Residual(kind) => println!("✓ Recovered from residual {kind} file"),
        Outcome::Backup(path) => println!("✓ Recovered from backup {path}"),
        Outcome::Restored(path) => println!("✓ Restored from {path}"),
        Outcome::Nothing => println!("No recovery candidate found; document left as is"),
    }
    println!();
    println!("Store statistics:");
    println!("  Disk writes:   {}", stats.disk_writes);
    println!("  Bytes written: {}", stats.bytes_written);
    println!("  Bytes read:    {}", stats.bytes_read);
    println!("  Recoveries:    {}", stats.recoveries);
    println!("  Errors:        {}", stats.errors);

    Ok(())
}

/// Opens the store and applies the requested recovery.
///
/// Without options the residual files are tried in recovery order.
pub fn recover(
    target: &Target,
    from_backup: bool,
    restore: Option<&Path>,
) -> CliResult<(Outcome, StatsSnapshot)> {
    let ctx = cli_context();
    let db = target.open(&ctx)?;

    let outcome = if let Some(path) = restore {
        db.restore_backup(&ctx, path)?;
        Outcome::Restored(path.display().to_string())
    } else if from_backup {
        match db.recover_from_backup_file(&ctx)? {
            Some(path) => Outcome::Backup(path.display().to_string()),
            None => {
                warn!("No readable backup found");
                Outcome::Nothing
            }
        }
    } else {
        let mut outcome = Outcome::Nothing;
        for kind in ResidualKind::RECOVERY_ORDER {
            if db.recover_from_residual_files(&ctx, kind)? {
                outcome = Outcome::Residual(kind);
                break;
            }
        }
        outcome
    };

    let stats = db.stats().snapshot();
    db.close(&ctx)?;
    Ok((outcome, stats))
}
