/// Covers every failure the bundle operations can surface to a caller.
///
/// Platform-side variants always carry the object kind, name and namespace of
/// the resource involved so that callers (or operators) can reconcile the
/// cluster manually when an operation stops halfway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or incomplete user input, typically a missing companion field.
    #[error("invalid bundle configuration: {0}")]
    Validation(String),

    /// A resource quantity string that does not parse as `<number><suffix>`.
    #[error("malformed resource quantity: {quantity:?}")]
    ResourceParse { quantity: String },

    /// Resource requests are derived by dividing limits; the divisor must be positive.
    #[error("resource split divisor must be positive, got {divisor}")]
    InvalidDivisor { divisor: i64 },

    /// A required object is absent on the cluster.
    #[error("{object_kind} {namespace}/{name} not found")]
    PlatformNotFound {
        object_kind: String,
        name: String,
        namespace: String,
    },

    /// The cluster rejected an update because the object changed underneath us.
    /// Callers should re-fetch and retry; this layer does not retry on its own.
    #[error("concurrent modification of {object_kind} {namespace}/{name}")]
    PlatformConflict {
        object_kind: String,
        name: String,
        namespace: String,
    },

    /// Transient failure reaching the cluster, including an exceeded deadline.
    #[error("platform unavailable for {object_kind} {namespace}/{name}: {reason}")]
    PlatformUnavailable {
        object_kind: String,
        name: String,
        namespace: String,
        reason: String,
    },

    /// Any other error reported by the Kubernetes API.
    #[error("platform rejected request for {object_kind} {namespace}/{name}: {source}")]
    Platform {
        object_kind: String,
        name: String,
        namespace: String,
        #[source]
        source: kube::Error,
    },

    /// A multi-step operation failed partway and the compensating cleanup of an
    /// already-created object failed too. The leftover object is named so it
    /// can be removed out of band; `source` is the error that aborted the
    /// operation in the first place.
    #[error("orphaned {object_kind} {namespace}/{name} left behind after failed cleanup: {source}")]
    Orphan {
        object_kind: String,
        name: String,
        namespace: String,
        #[source]
        source: Box<Error>,
    },
}
