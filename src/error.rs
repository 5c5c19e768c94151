#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed, missing or invalid fields: {}", .0.join(", "))]
    Validation(Vec<String>),
    #[error("illegal transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("entity is already finalized in terminal status {0}")]
    AlreadyFinalized(String),
    #[error("share token has been revoked or is inactive")]
    TokenInvalid,
    #[error("share token has expired")]
    TokenExpired,
    #[error("share token access limit reached ({used} of {max})")]
    TokenExhausted { used: u32, max: u32 },
    #[error("share token requires a password")]
    PasswordRequired,
    #[error("share token password does not match")]
    PasswordMismatch,
    #[error("concurrent modification of {0}, reload and retry")]
    ConcurrentModification(String),
}
