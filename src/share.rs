//! Time- and count-limited share tokens gating non-owner access
use chrono::Utc;

use crate::error::EngineError;
use crate::timestamp::TimeStamp;
use crate::utils::TOKEN_LEN;

pub const DEFAULT_MAX_ACCESS: u32 = 100;

/// An opaque credential granting read access to a certificate or
/// document. Never deleted; revocation only clears the active flag so
/// the audit history survives. The access counter is monotonic: once a
/// token is exhausted or past its expiry it stays unusable no matter
/// what happens to `is_active`.
#[derive(Debug, Clone, PartialEq, Eq, minicbor::Encode, minicbor::Decode)]
pub struct ShareToken {
    #[n(0)]
    pub token: String,
    #[n(1)]
    pub certificate_id: String,
    #[n(2)]
    pub created_by: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
    #[n(4)]
    pub expires_at: TimeStamp<Utc>,
    #[n(5)]
    pub password: Option<String>,
    #[n(6)]
    pub max_access: u32,
    #[n(7)]
    pub current_access: u32,
    #[n(8)]
    pub is_active: bool,
}

impl ShareToken {
    /// Mint a token. The opaque string itself comes from the caller
    /// (see `utils::new_share_token`); a non-positive ttl is rejected.
    pub fn issue(
        token: String,
        certificate_id: &str,
        created_by: &str,
        now: TimeStamp<Utc>,
        ttl_seconds: i64,
        max_access: Option<u32>,
        password: Option<String>,
    ) -> Result<Self, EngineError> {
        let mut invalid = Vec::new();
        if ttl_seconds <= 0 {
            invalid.push("ttl".to_string());
        }
        if token.len() != TOKEN_LEN {
            invalid.push("token".to_string());
        }
        if !invalid.is_empty() {
            return Err(EngineError::Validation(invalid));
        }

        Ok(Self {
            token,
            certificate_id: certificate_id.into(),
            created_by: created_by.into(),
            expires_at: now.plus_seconds(ttl_seconds),
            created_at: now,
            password,
            max_access: max_access.unwrap_or(DEFAULT_MAX_ACCESS),
            current_access: 0,
            is_active: true,
        })
    }

    pub fn is_expired(&self, now: &TimeStamp<Utc>) -> bool {
        now.is_at_or_after(&self.expires_at)
    }

    pub fn is_exhausted(&self) -> bool {
        self.current_access >= self.max_access
    }

    pub fn is_valid(&self, now: &TimeStamp<Utc>) -> bool {
        self.is_active && !self.is_expired(now) && !self.is_exhausted()
    }

    /// Run every gate in order, then consume one access slot. Returns
    /// the incremented token together with the certificate id it is
    /// bound to. The caller must persist the returned value under a
    /// compare-and-swap so two concurrent consumers cannot both take
    /// the last slot.
    pub fn validate_and_consume(
        &self,
        now: &TimeStamp<Utc>,
        supplied_password: Option<&str>,
    ) -> Result<(Self, String), EngineError> {
        if !self.is_active {
            return Err(EngineError::TokenInvalid);
        }
        if self.is_expired(now) {
            return Err(EngineError::TokenExpired);
        }
        if self.is_exhausted() {
            return Err(EngineError::TokenExhausted {
                used: self.current_access,
                max: self.max_access,
            });
        }
        match (&self.password, supplied_password) {
            (Some(_), None) => return Err(EngineError::PasswordRequired),
            (Some(expected), Some(supplied)) if expected != supplied => {
                return Err(EngineError::PasswordMismatch);
            }
            _ => {}
        }

        let mut next = self.clone();
        next.current_access += 1;
        let certificate_id = next.certificate_id.clone();
        Ok((next, certificate_id))
    }

    /// Deactivate without deleting (audit retention).
    pub fn revoke(&self) -> Self {
        let mut next = self.clone();
        next.is_active = false;
        next
    }
}
