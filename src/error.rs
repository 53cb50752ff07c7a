use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvsdbErrorCode {
    DuplicateUuidName,
    ConstraintViolation,
    DomainError,
    RangeError,
    TimedOut,
    NotSupported,
    Aborted,
    NotOwner,
    ReferentialIntegrity,
    ResourcesExhausted,
    Io,
    DuplicateUuid,
    Internal,
    Ovsdb,
    Permission,
    Syntax,
}

impl OvsdbErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OvsdbErrorCode::DuplicateUuidName => "duplicate_uuid_name",
            OvsdbErrorCode::ConstraintViolation => "constraint_violation",
            OvsdbErrorCode::DomainError => "domain_error",
            OvsdbErrorCode::RangeError => "range_error",
            OvsdbErrorCode::TimedOut => "timed_out",
            OvsdbErrorCode::NotSupported => "not_supported",
            OvsdbErrorCode::Aborted => "aborted",
            OvsdbErrorCode::NotOwner => "not_owner",
            OvsdbErrorCode::ReferentialIntegrity => "referential_integrity",
            OvsdbErrorCode::ResourcesExhausted => "resources_exhausted",
            OvsdbErrorCode::Io => "io",
            OvsdbErrorCode::DuplicateUuid => "duplicate_uuid",
            OvsdbErrorCode::Internal => "internal",
            OvsdbErrorCode::Ovsdb => "ovsdb",
            OvsdbErrorCode::Permission => "permission",
            OvsdbErrorCode::Syntax => "syntax",
        }
    }
}

/// Transaction-engine error. The `Display` form of every variant is a stable
/// OVSDB wire string and is transported verbatim in `TransactResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OvsdbError {
    #[error("duplicate uuid-name")]
    DuplicateUuidName,
    #[error("constraint violation")]
    ConstraintViolation,
    #[error("domain error")]
    DomainError,
    #[error("range error")]
    RangeError,
    #[error("timed out")]
    TimedOut,
    #[error("not supported")]
    NotSupported,
    #[error("aborted")]
    Aborted,
    #[error("not owner")]
    NotOwner,
    #[error("referential integrity violation")]
    ReferentialIntegrity,
    #[error("resources exhausted")]
    ResourcesExhausted,
    #[error("I/O error")]
    Io,
    #[error("duplicate uuid")]
    DuplicateUuid,
    #[error("internal error")]
    Internal,
    #[error("ovsdb error")]
    Ovsdb,
    #[error("permission error")]
    Permission,
    #[error("syntax error or unknown column")]
    Syntax,
}

impl OvsdbError {
    pub fn code(self) -> OvsdbErrorCode {
        match self {
            OvsdbError::DuplicateUuidName => OvsdbErrorCode::DuplicateUuidName,
            OvsdbError::ConstraintViolation => OvsdbErrorCode::ConstraintViolation,
            OvsdbError::DomainError => OvsdbErrorCode::DomainError,
            OvsdbError::RangeError => OvsdbErrorCode::RangeError,
            OvsdbError::TimedOut => OvsdbErrorCode::TimedOut,
            OvsdbError::NotSupported => OvsdbErrorCode::NotSupported,
            OvsdbError::Aborted => OvsdbErrorCode::Aborted,
            OvsdbError::NotOwner => OvsdbErrorCode::NotOwner,
            OvsdbError::ReferentialIntegrity => OvsdbErrorCode::ReferentialIntegrity,
            OvsdbError::ResourcesExhausted => OvsdbErrorCode::ResourcesExhausted,
            OvsdbError::Io => OvsdbErrorCode::Io,
            OvsdbError::DuplicateUuid => OvsdbErrorCode::DuplicateUuid,
            OvsdbError::Internal => OvsdbErrorCode::Internal,
            OvsdbError::Ovsdb => OvsdbErrorCode::Ovsdb,
            OvsdbError::Permission => OvsdbErrorCode::Permission,
            OvsdbError::Syntax => OvsdbErrorCode::Syntax,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::OvsdbError;

    #[test]
    fn wire_strings_are_stable() {
        assert_eq!(OvsdbError::DuplicateUuidName.to_string(), "duplicate uuid-name");
        assert_eq!(OvsdbError::ConstraintViolation.to_string(), "constraint violation");
        assert_eq!(OvsdbError::Io.to_string(), "I/O error");
        assert_eq!(
            OvsdbError::ReferentialIntegrity.to_string(),
            "referential integrity violation"
        );
        assert_eq!(OvsdbError::Syntax.to_string(), "syntax error or unknown column");
    }
}
