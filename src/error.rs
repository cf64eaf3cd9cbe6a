use anyhow::anyhow;

pub type Result<T> = std::result::Result<T, LibError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Database,
    Invariant,
    InvalidInput,
    NotFound,
    Unknown,
}

#[derive(Debug)]
pub struct LibError {
    pub kind: ErrorKind,
    pub code: &'static str,
    pub public: &'static str,
    pub source: anyhow::Error,
}

impl LibError {
    pub fn database(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Database,
            code: "database_error",
            public,
            source,
        }
    }

    /// A broken edge invariant. These indicate a bug upstream and are never
    /// recovered from inside the crate.
    pub fn invariant(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Invariant,
            code: "family_invariant_violation",
            public,
            source,
        }
    }

    pub fn invariant_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::Invariant,
            code,
            public,
            source,
        }
    }

    pub fn invalid(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code: "invalid_input",
            public,
            source,
        }
    }

    pub fn invalid_with_code(
        code: &'static str,
        public: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self {
            kind: ErrorKind::InvalidInput,
            code,
            public,
            source,
        }
    }

    pub fn not_found(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            code: "not_found",
            public,
            source,
        }
    }

    pub fn unknown(public: &'static str, source: anyhow::Error) -> Self {
        Self {
            kind: ErrorKind::Unknown,
            code: "unknown_error",
            public,
            source,
        }
    }

    pub fn message(public: &'static str) -> Self {
        Self::unknown(public, anyhow!(public))
    }

    pub fn is_invariant(&self) -> bool {
        self.kind == ErrorKind::Invariant
    }
}

impl std::fmt::Display for LibError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.public, self.code, self.source)
    }
}

impl std::error::Error for LibError {}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for LibError {
    fn from(value: sqlx::Error) -> Self {
        Self::database("Database request failed", anyhow!(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_public_message_code_and_source() {
        let err = LibError::invariant_with_code(
            "family_ancestry_cycle",
            "Family graph contains an ancestry cycle",
            anyhow!("a is its own ancestor"),
        );
        assert!(err.is_invariant());
        assert_eq!(
            err.to_string(),
            "Family graph contains an ancestry cycle (family_ancestry_cycle): a is its own ancestor"
        );
    }

    #[test]
    fn message_errors_are_unknown_kind() {
        let err = LibError::message("Layout failed");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(!err.is_invariant());
    }
}
