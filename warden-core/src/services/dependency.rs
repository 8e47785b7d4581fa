//! Bounded calls into the counter store and the failure policy applied
//! when they do not complete.

use std::{future::Future, time::Duration};

use crate::{Error, config::FailurePolicy, error::DependencyError};

/// Run a counter store call under `timeout`.
///
/// Timeouts and store errors both come back as `Error::Dependency`, so the
/// caller applies one policy to every way the store can let it down.
pub(crate) async fn call_store<T>(
    timeout: Duration,
    component: &str,
    call: impl Future<Output = Result<T, Error>>,
) -> Result<T, Error> {
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DependencyError::Unavailable(component.to_string(), e.to_string()).into()),
        Err(_) => Err(DependencyError::Timeout(component.to_string()).into()),
    }
}

/// Resolve a failed store call according to `policy`.
///
/// `Open` logs the degradation and yields `open_value`; `Closed` propagates the error.
pub(crate) fn apply_failure_policy<T>(
    policy: FailurePolicy,
    component: &str,
    error: Error,
    open_value: T,
) -> Result<T, Error> {
    match policy {
        FailurePolicy::Open => {
            tracing::warn!(
                component = component,
                error = %error,
                "Counter store unavailable, failing open"
            );
            Ok(open_value)
        }
        FailurePolicy::Closed => {
            tracing::error!(
                component = component,
                error = %error,
                "Counter store unavailable, failing closed"
            );
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[tokio::test(start_paused = true)]
    async fn test_call_store_times_out() {
        let result: Result<(), Error> = call_store(Duration::from_millis(50), "rate limiter", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Dependency(DependencyError::Timeout(_)))
        ));
    }

    #[tokio::test]
    async fn test_call_store_wraps_store_errors() {
        let result: Result<(), Error> = call_store(Duration::from_secs(1), "lockout", async {
            Err(StorageError::Connection("refused".to_string()).into())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Dependency(DependencyError::Unavailable(_, _)))
        ));
    }

    #[test]
    fn test_policy() {
        let err = || Error::Dependency(DependencyError::Timeout("x".to_string()));

        assert!(apply_failure_policy(FailurePolicy::Open, "x", err(), true).unwrap());
        assert!(apply_failure_policy(FailurePolicy::Closed, "x", err(), true).is_err());
    }
}
