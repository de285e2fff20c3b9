//! Create-then-verify loop shared by every provisioning step

use calrissian_kube::{ClusterError, ClusterResult, ResourceKind};
use calrissian_resilience::{RetryError, RetryExecutor, RetryPolicy, Retryable};
use std::fmt;
use std::future::Future;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};

/// Outcome of one provisioning attempt that warrants a decision
#[derive(Debug)]
enum AttemptError {
    /// Created (or already present) but not yet returned by a read
    NotVisible,
    Cluster(ClusterError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::NotVisible => f.write_str("not yet visible"),
            AttemptError::Cluster(e) => write!(f, "{}", e),
        }
    }
}

impl Retryable for AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::NotVisible => true,
            // 404 right after a create means the object is not visible yet
            AttemptError::Cluster(e) => e.is_retryable() || e.is_not_found(),
        }
    }
}

/// Probe for `name`; if absent create it and poll until a read returns it.
///
/// A 409 on create counts as success. Transient errors and 404s are retried
/// under `policy`; any other client error is returned at once.
pub(crate) async fn ensure<T, P, PF, C, CF>(
    policy: &RetryPolicy,
    kind: ResourceKind,
    name: &str,
    probe: P,
    create: C,
) -> ContextResult<T>
where
    P: Fn() -> PF,
    PF: Future<Output = ClusterResult<Option<T>>>,
    C: Fn() -> CF,
    CF: Future<Output = ClusterResult<T>>,
{
    if let Some(existing) = probe().await? {
        debug!("{} '{}' exists, skipping creation", kind, name);
        return Ok(existing);
    }

    create_verified(policy, kind, name, probe, create).await
}

/// Create `name` and poll until a read returns it, without probing first
pub(crate) async fn create_verified<T, P, PF, C, CF>(
    policy: &RetryPolicy,
    kind: ResourceKind,
    name: &str,
    probe: P,
    create: C,
) -> ContextResult<T>
where
    P: Fn() -> PF,
    PF: Future<Output = ClusterResult<Option<T>>>,
    C: Fn() -> CF,
    CF: Future<Output = ClusterResult<T>>,
{
    info!("Creating {} '{}'", kind, name);
    let executor = RetryExecutor::new(policy.clone());
    let (probe, create) = (&probe, &create);
    let result = executor
        .execute(move || {
            let created = create();
            async move {
                match created.await {
                    Ok(_) => {}
                    Err(e) if e.is_conflict() => debug!("{} '{}' already exists", kind, name),
                    Err(e) => return Err(AttemptError::Cluster(e)),
                }
                match probe().await {
                    Ok(Some(object)) => Ok(object),
                    Ok(None) => Err(AttemptError::NotVisible),
                    Err(e) => Err(AttemptError::Cluster(e)),
                }
            }
        })
        .await;

    match result {
        Ok(object) => {
            info!("{} '{}' created", kind, name);
            Ok(object)
        }
        Err(RetryError::NonRetryableError(AttemptError::Cluster(e))) => Err(e.into()),
        Err(RetryError::NonRetryableError(AttemptError::NotVisible)) => {
            Err(provisioning_failed(kind, name, "not yet visible"))
        }
        Err(RetryError::MaxAttemptsExceeded {
            last_error: AttemptError::NotVisible,
            ..
        }) if kind == ResourceKind::PersistentVolumeClaim => Err(ContextError::ProvisioningTimeout {
            kind,
            name: name.to_string(),
        }),
        Err(RetryError::MaxAttemptsExceeded {
            attempts,
            last_error,
        }) => Err(provisioning_failed(
            kind,
            name,
            &format!("{} after {} attempts", last_error, attempts),
        )),
    }
}

/// Poll until `probe` returns the object, without creating anything
pub(crate) async fn wait_for<T, P, PF>(
    policy: &RetryPolicy,
    kind: ResourceKind,
    name: &str,
    probe: P,
) -> ContextResult<T>
where
    P: Fn() -> PF,
    PF: Future<Output = ClusterResult<Option<T>>>,
{
    let executor = RetryExecutor::new(policy.clone());
    let result = executor
        .execute(|| {
            let probed = probe();
            async move {
                match probed.await {
                    Ok(Some(object)) => Ok(object),
                    Ok(None) => Err(AttemptError::NotVisible),
                    Err(e) => Err(AttemptError::Cluster(e)),
                }
            }
        })
        .await;

    result.map_err(|e| match e {
        RetryError::NonRetryableError(AttemptError::Cluster(e)) => e.into(),
        other => provisioning_failed(kind, name, &other.into_inner().to_string()),
    })
}

fn provisioning_failed(kind: ResourceKind, name: &str, reason: &str) -> ContextError {
    ContextError::ProvisioningFailed {
        kind,
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
