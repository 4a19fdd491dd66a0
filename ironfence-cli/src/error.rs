//! CLI-specific error types and exit code mapping

use ironfence_core::error::IronfenceError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to standard Unix exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// A rule file failed to load or compile.
    #[error("rule error: {0}")]
    Rule(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from ironfence-core.
    #[error("{0}")]
    Core(#[from] IronfenceError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                     |
    /// |------|-----------------------------|
    /// | 0    | Success                     |
    /// | 1    | General / command error     |
    /// | 2    | Configuration error         |
    /// | 3    | Rule file invalid           |
    /// | 10   | IO error                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Core(IronfenceError::Config(_)) => 2,
            Self::Rule(_) => 3,
            Self::Io(_) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironfence_core::error::{ConfigError, EngineError};

    #[test]
    fn test_exit_code_config_error() {
        let err = CliError::Config("test error".to_owned());
        assert_eq!(err.exit_code(), 2, "config error should return exit code 2");
    }

    #[test]
    fn test_exit_code_core_config_error() {
        let err: CliError = IronfenceError::Config(ConfigError::FileNotFound {
            path: "ironfence.toml".to_owned(),
        })
        .into();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_core_engine_error() {
        let err: CliError = IronfenceError::Engine(EngineError::Rule("bad".to_owned())).into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_rule_error() {
        let err = CliError::Rule("acl[0].ipv4: /0 prefix is not allowed".to_owned());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        assert_eq!(CliError::Io(io_err).exit_code(), 10);
    }

    #[test]
    fn test_exit_code_command_error() {
        assert_eq!(CliError::Command("x".to_owned()).exit_code(), 1);
    }

    #[test]
    fn test_error_display_rule() {
        let err = CliError::Rule("too many rules".to_owned());
        assert_eq!(err.to_string(), "rule error: too many rules");
    }

    #[test]
    fn test_error_display_command_is_bare() {
        let err = CliError::Command("execution failed".to_owned());
        assert_eq!(err.to_string(), "execution failed");
    }
}
