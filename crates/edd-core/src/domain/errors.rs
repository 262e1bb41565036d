use std::error::Error;
use std::fmt::{Display, Formatter};

pub type EddResult<T> = Result<T, EddError>;
pub type ConfigResult<T> = EddResult<T>;
pub type StoreResult<T> = EddResult<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EddErrorCategory {
    Success,
    ConfigurationError,
    StorageError,
    ComputationError,
    InternalError,
}

impl EddErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Success => 0,
            Self::ConfigurationError => 2,
            Self::StorageError => 3,
            Self::ComputationError => 4,
            Self::InternalError => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConfigurationError => "ConfigurationError",
            Self::StorageError => "StorageError",
            Self::ComputationError => "ComputationError",
            Self::InternalError => "InternalError",
        }
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EddError {
    category: EddErrorCategory,
    code: &'static str,
    message: String,
}

impl EddError {
    pub fn new(category: EddErrorCategory, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            category,
            code,
            message: message.into(),
        }
    }

    pub fn configuration(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(EddErrorCategory::ConfigurationError, code, message)
    }

    pub fn storage(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(EddErrorCategory::StorageError, code, message)
    }

    pub fn computation(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(EddErrorCategory::ComputationError, code, message)
    }

    pub fn internal(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(EddErrorCategory::InternalError, code, message)
    }

    pub const fn category(&self) -> EddErrorCategory {
        self.category
    }

    pub const fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn is_configuration(&self) -> bool {
        self.category == EddErrorCategory::ConfigurationError
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.code, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for EddError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.code,
            self.message
        )
    }
}

impl Error for EddError {}

#[cfg(test)]
mod tests {
    use super::{EddError, EddErrorCategory};

    #[test]
    fn exit_mapping_is_stable() {
        let cases = [
            (EddErrorCategory::Success, 0, "Success"),
            (EddErrorCategory::ConfigurationError, 2, "ConfigurationError"),
            (EddErrorCategory::StorageError, 3, "StorageError"),
            (EddErrorCategory::ComputationError, 4, "ComputationError"),
            (EddErrorCategory::InternalError, 5, "InternalError"),
        ];

        for (category, exit_code, name) in cases {
            assert_eq!(category.exit_code(), exit_code);
            assert_eq!(category.as_str(), name);
        }
    }

    #[test]
    fn fatal_error_renders_diagnostic_lines() {
        let error = EddError::configuration(
            "INPUT.SCAN_NUMBER",
            "unrecognized scan number specification '3-6'",
        );

        assert!(error.is_configuration());
        assert_eq!(error.exit_code(), 2);
        assert_eq!(
            error.diagnostic_line(),
            "ERROR: [INPUT.SCAN_NUMBER] unrecognized scan number specification '3-6'"
        );
        assert_eq!(
            error.fatal_exit_line().as_deref(),
            Some("FATAL EXIT CODE: 2")
        );
        assert_eq!(
            error.to_string(),
            "ConfigurationError [INPUT.SCAN_NUMBER] unrecognized scan number specification '3-6'"
        );
    }

    #[test]
    fn success_category_has_no_fatal_line() {
        let info = EddError::new(EddErrorCategory::Success, "RUN.DONE", "nothing to report");
        assert_eq!(info.diagnostic_line(), "INFO: [RUN.DONE] nothing to report");
        assert!(info.fatal_exit_line().is_none());
    }
}
