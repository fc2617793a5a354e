//! Translation of access verdicts into transport responses.
//!
//! The adapter is the only place rejection kinds meet status codes. It also
//! owns the read that follows a successful check, and the optional API key
//! gate in front of the guard.

use std::path::PathBuf;
use std::sync::Arc;

use access::{PolicyConfig, Rejection, RejectionKind, SafePath, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::keys::ApiKeyStore;

/// Error message returned when a presented key is unknown or missing.
pub const INVALID_API_KEY: &str = "Invalid API key";

/// Error message returned when a key lacks the required permission.
pub const INSUFFICIENT_PERMISSIONS: &str = "API key lacks the required permission";

/// Status code for a rejection kind.
pub fn status_for(kind: RejectionKind) -> u16 {
    match kind {
        RejectionKind::MissingPath => 400,
        RejectionKind::PathEscape => 403,
        RejectionKind::NotFound => 404,
        RejectionKind::InvalidFileType => 400,
        RejectionKind::ExtensionNotAllowed => 403,
        RejectionKind::FileTooLarge => 413,
        RejectionKind::PermissionDenied => 403,
        RejectionKind::InternalError => 500,
    }
}

/// JSON error payload, `{"error": "<reason>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Payload of an [`AccessResponse`].
///
/// Serializes to what a caller may see: a size on success, the reason on
/// refusal. Resolved paths and file contents are never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    /// The file passed every check. Produced by metadata-only queries.
    Granted {
        #[serde(skip_serializing)]
        path: PathBuf,
        size: u64,
    },
    /// The file passed every check and was read.
    File {
        #[serde(skip_serializing)]
        path: PathBuf,
        size: u64,
        #[serde(skip_serializing)]
        bytes: Vec<u8>,
    },
    /// The request was refused.
    Error(ErrorBody),
}

/// A status code plus body, ready for whatever transport sits in front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessResponse {
    pub status: u16,
    pub body: ResponseBody,
}

impl AccessResponse {
    fn granted(safe: SafePath) -> Self {
        let size = safe.size();
        Self {
            status: 200,
            body: ResponseBody::Granted {
                path: safe.into_path_buf(),
                size,
            },
        }
    }

    fn file(path: PathBuf, bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            body: ResponseBody::File {
                path,
                size: bytes.len() as u64,
                bytes,
            },
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ResponseBody::Error(ErrorBody {
                error: message.into(),
            }),
        }
    }

    /// Response for a rejection. The body carries only the reason.
    pub fn rejected(rejection: &Rejection) -> Self {
        Self::error(status_for(rejection.kind()), rejection.reason())
    }

    /// True for 2xx responses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The error payload, if this is a refusal.
    pub fn error_body(&self) -> Option<&ErrorBody> {
        match &self.body {
            ResponseBody::Error(body) => Some(body),
            _ => None,
        }
    }

    /// The served bytes, if the file was read.
    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::File { bytes, .. } => Some(bytes),
            _ => None,
        }
    }

    /// JSON rendering of the body, e.g. `{"error": "File not found"}`.
    ///
    /// The status travels separately, in whatever way the transport
    /// carries it.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.body)
    }
}

struct KeyGate {
    store: Arc<ApiKeyStore>,
    required_permission: String,
}

/// Serves files under a fixed policy.
///
/// Cloning is cheap; clones share the policy and key store.
#[derive(Clone)]
pub struct AccessAdapter {
    policy: Arc<PolicyConfig>,
    gate: Option<Arc<KeyGate>>,
}

impl AccessAdapter {
    /// Creates an adapter with no key requirement.
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy: Arc::new(policy),
            gate: None,
        }
    }

    /// Require a key carrying `required_permission` on
    /// [`serve_with_key`](Self::serve_with_key).
    pub fn with_key_store(
        mut self,
        store: Arc<ApiKeyStore>,
        required_permission: impl Into<String>,
    ) -> Self {
        self.gate = Some(Arc::new(KeyGate {
            store,
            required_permission: required_permission.into(),
        }));
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    /// Run the guard without reading the file.
    pub fn check(&self, requested: &str) -> AccessResponse {
        match access::check(requested, &self.policy) {
            Ok(safe) => AccessResponse::granted(safe),
            Err(rejection) => AccessResponse::rejected(&rejection),
        }
    }

    /// Run the guard, then read the file.
    pub async fn serve(&self, requested: &str) -> AccessResponse {
        let safe = match self.verdict(requested).await {
            Ok(safe) => safe,
            Err(rejection) => return AccessResponse::rejected(&rejection),
        };

        match tokio::fs::read(safe.as_path()).await {
            Ok(bytes) => {
                debug!(path = %safe, len = bytes.len(), "served file");
                AccessResponse::file(safe.into_path_buf(), bytes)
            }
            Err(e) => {
                error!(path = %safe, error = %e, "failed to read checked file");
                AccessResponse::rejected(&Rejection::new(RejectionKind::InternalError))
            }
        }
    }

    /// Like [`serve`](Self::serve), but first authenticates `credential`
    /// when a key store is attached.
    pub async fn serve_with_key(&self, credential: Option<&str>, requested: &str) -> AccessResponse {
        if let Some(gate) = &self.gate {
            if let Some(refusal) = authorize(gate, credential) {
                return refusal;
            }
        }
        self.serve(requested).await
    }

    async fn verdict(&self, requested: &str) -> Verdict {
        let policy = Arc::clone(&self.policy);
        let requested = requested.to_owned();
        match tokio::task::spawn_blocking(move || access::check(&requested, &policy)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "access check task failed");
                Err(Rejection::new(RejectionKind::InternalError))
            }
        }
    }
}

/// Returns a refusal, or `None` if the credential may proceed.
fn authorize(gate: &KeyGate, credential: Option<&str>) -> Option<AccessResponse> {
    let Some(credential) = credential else {
        debug!("request without API key");
        return Some(AccessResponse::error(401, INVALID_API_KEY));
    };

    match gate.store.permissions_of(credential) {
        Ok(Some(permissions)) if permissions.contains(&gate.required_permission) => None,
        Ok(Some(_)) => {
            warn!(
                permission = %gate.required_permission,
                "API key lacks required permission"
            );
            Some(AccessResponse::error(403, INSUFFICIENT_PERMISSIONS))
        }
        Ok(None) => {
            warn!("rejected unknown API key");
            Some(AccessResponse::error(401, INVALID_API_KEY))
        }
        Err(e) => {
            error!(error = %e, "key store unavailable");
            Some(AccessResponse::rejected(&Rejection::new(
                RejectionKind::InternalError,
            )))
        }
    }
}
