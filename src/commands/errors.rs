use crate::aggregate::AggregateError;
use crate::config::ConfigError;
use crate::extract::ExtractError;
use crate::regulation::RegulationError;
use crate::retry::Retryable;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Timeout(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Regulation(#[from] RegulationError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    /// 2 for bad input, 1 for everything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::InvalidArgs(_)
            | CommandError::Config(_)
            | CommandError::Aggregate(_)
            | CommandError::Extract(_)
            | CommandError::Regulation(RegulationError::InvalidCitation(_)) => 2,
            _ => 1,
        }
    }

    /// Suffix hinting that the same command may succeed later.
    pub fn retry_hint(&self) -> Option<&'static str> {
        match self {
            CommandError::Timeout(_) => Some("(retriable)"),
            CommandError::Regulation(RegulationError::Upstream(e)) if e.is_retryable() => {
                Some("(retriable)")
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryError;

    #[test]
    fn input_errors_exit_with_two() {
        assert_eq!(CommandError::InvalidArgs("x".into()).exit_code(), 2);
        assert_eq!(
            CommandError::from(AggregateError::UnknownSource("fda".into())).exit_code(),
            2
        );
        assert_eq!(
            CommandError::from(RegulationError::InvalidCitation("abc".into())).exit_code(),
            2
        );
    }

    #[test]
    fn upstream_errors_exit_with_one() {
        let err = CommandError::from(RegulationError::Upstream(RegistryError::RateLimited));
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.retry_hint(), Some("(retriable)"));
        assert_eq!(CommandError::Timeout("slow".into()).retry_hint(), Some("(retriable)"));
        let terminal = CommandError::from(RegulationError::NotFound("872.1".into()));
        assert_eq!(terminal.retry_hint(), None);
    }
}
