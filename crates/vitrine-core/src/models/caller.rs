use serde::{Deserialize, Serialize};

use crate::error::CallableError;

/// Identity of whoever invoked a callable operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    pub uid: Option<String>,
}

impl CallerContext {
    pub fn authenticated(uid: impl Into<String>) -> Self {
        Self {
            uid: Some(uid.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self { uid: None }
    }

    /// Returns the caller uid or `unauthenticated`.
    pub fn require_uid(&self) -> Result<&str, CallableError> {
        match self.uid.as_deref() {
            Some(uid) if !uid.trim().is_empty() => Ok(uid),
            _ => Err(CallableError::unauthenticated()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn blank_uid_is_unauthenticated() {
        let caller = CallerContext::authenticated("  ");
        assert_eq!(
            caller.require_uid().unwrap_err().code,
            ErrorCode::Unauthenticated
        );
        assert_eq!(CallerContext::authenticated("u1").require_uid().unwrap(), "u1");
    }
}
