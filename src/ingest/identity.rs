use wavesexchange_log::{debug, error};

use crate::db::repo::{Session, StorageOperations};
use crate::error::{Error, Result};

/// Returns the id of `address`, inserting it on first sight.
///
/// Two consumers may miss the same new address and both try to insert it.
/// The loser's insert hits the unique constraint, its transaction rolls back
/// and the winner's row is read instead.
pub async fn resolve_or_create<S: Session>(session: &mut S, address: &str) -> Result<i64> {
    match try_resolve(session, address).await {
        Ok(id) => Ok(id),
        Err(err) => {
            error!("failed to resolve address {}: {}", address, err);
            Err(Error::ResolutionFailed(format!("{}: {}", address, err)))
        }
    }
}

async fn try_resolve<S: Session>(session: &mut S, address: &str) -> Result<i64> {
    let owned = address.to_owned();
    if let Some(id) = session
        .execute(move |ops| ops.find_address_id(&owned))
        .await?
    {
        return Ok(id);
    }

    let owned = address.to_owned();
    match session
        .transaction(move |ops| ops.insert_address(&owned))
        .await
    {
        Ok(id) => Ok(id),
        Err(err) if err.is_unique_violation() => {
            debug!("address {} was inserted concurrently, reading it back", address);
            let owned = address.to_owned();
            session
                .execute(move |ops| ops.find_address_id(&owned))
                .await?
                .ok_or_else(|| {
                    Error::ResolutionFailed(format!("{} conflicted but is not readable", address))
                })
        }
        Err(err) => Err(err),
    }
}
