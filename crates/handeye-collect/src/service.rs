/// Failure of a blocking remote call (motion or solver service).
///
/// `Unreachable` means the call never produced an answer; `Rejected` means the
/// service answered with an explicit failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service `{service}` unreachable: {reason}")]
    Unreachable { service: String, reason: String },
    #[error("service `{service}` rejected the call: {reason}")]
    Rejected { service: String, reason: String },
}

impl ServiceError {
    pub fn unreachable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            service: service.into(),
            reason: reason.into(),
        }
    }

    pub fn rejected(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            service: service.into(),
            reason: reason.into(),
        }
    }

    /// Name of the service that failed.
    pub fn service(&self) -> &str {
        match self {
            Self::Unreachable { service, .. } | Self::Rejected { service, .. } => service,
        }
    }

    #[inline]
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_failing_service() {
        let err = ServiceError::unreachable("AXXBsolver", "connection refused");
        assert_eq!(err.service(), "AXXBsolver");
        assert!(err.is_unreachable());
        assert_eq!(
            err.to_string(),
            "service `AXXBsolver` unreachable: connection refused"
        );
        assert!(!ServiceError::rejected("calibration_move_random", "no IK").is_unreachable());
    }
}
