#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("invalid resource key {0:?}: expected <namespace>/<name>")]
    InvalidKey(String),
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    #[error("invalid object: {0}")]
    InvalidObject(String),
    #[error("cache lookup failed: {0}")]
    Cache(String),
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

impl ControllerError {
    /// True when the error means "the object is absent", a valid state for
    /// reconciliation rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            ControllerError::NotFound { .. } => true,
            ControllerError::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Permanent errors cannot be fixed by retrying the same key.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ControllerError::InvalidKey(_) | ControllerError::InvalidObject(_)
        )
    }
}
