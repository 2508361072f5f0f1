//! Scoped MongoDB transactions.
//!
//! `run_in_transaction` starts a session, runs the unit of work, commits on
//! `Ok` and aborts on `Err`. The unit of work borrows the session for the
//! duration of the returned future only, so it cannot leak past the commit.

use futures::future::BoxFuture;
use mongodb::{Client, ClientSession};

use super::error::ServiceError;

pub async fn run_in_transaction<T, F>(client: &Client, work: F) -> Result<T, ServiceError>
where
    T: Send,
    F: for<'s> FnOnce(&'s mut ClientSession) -> BoxFuture<'s, Result<T, ServiceError>>,
{
    let mut session = client.start_session(None).await?;
    session.start_transaction(None).await?;

    match work(&mut session).await {
        Ok(value) => {
            session.commit_transaction().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(abort_err) = session.abort_transaction().await {
                tracing::warn!(error = %abort_err, "Failed to abort transaction");
            }
            Err(err.normalize())
        }
    }
}
