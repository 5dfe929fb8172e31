//! Rename-based table replacement

use tracing::{debug, error, info};

use super::log_store_warning;
use crate::config::DiagnosticPolicy;
use crate::error::{IngestError, Result};
use crate::store::{StoreError, StoreResult, TargetStore};

/// Drop a table, treating store notices (such as the table being absent)
/// as non-fatal
pub fn drop_table_quietly<S: TargetStore + ?Sized>(
    store: &mut S,
    name: &str,
    policy: &DiagnosticPolicy,
) -> StoreResult<()> {
    match store.drop_table_if_exists(name) {
        Err(StoreError::Warning { class, message }) => {
            log_store_warning(policy, class, &message);
            Ok(())
        }
        other => other,
    }
}

/// Replace `target` with `new_table`.
///
/// The live table is parked under `backup` while the new table is renamed
/// into place. If that second rename fails the backup is renamed back so
/// the previous contents stay reachable under the target name; if that
/// rename fails too, [`IngestError::SwapRollback`] names where they are.
pub fn swap_into_place<S: TargetStore + ?Sized>(
    store: &mut S,
    new_table: &str,
    target: &str,
    backup: &str,
    policy: &DiagnosticPolicy,
) -> Result<()> {
    let swap_error = |source: StoreError| IngestError::Swap {
        target: target.to_string(),
        source,
    };

    drop_table_quietly(store, backup, policy).map_err(swap_error)?;

    let had_target = store.table_exists(target).map_err(swap_error)?;
    if had_target {
        store.rename_table(target, backup).map_err(swap_error)?;
    }

    if let Err(err) = store.rename_table(new_table, target) {
        if had_target {
            if let Err(rollback) = store.rename_table(backup, target) {
                error!("Could not restore {} from {}: {}", target, backup, rollback);
                return Err(IngestError::SwapRollback {
                    target: target.to_string(),
                    backup: backup.to_string(),
                    rollback,
                    source: err,
                });
            }
            info!("Restored previous {} after failed swap", target);
        }
        return Err(swap_error(err));
    }

    if let Err(err) = drop_table_quietly(store, backup, policy) {
        error!("Swap into {} succeeded but {} could not be dropped: {}", target, backup, err);
    }

    debug!("Swapped {} into {}", new_table, target);
    Ok(())
}
