use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DailyAggregate, ExerciseEntry, MealEntry, WeightEntry};

/// Classified failure of a remote call. Every variant resolves to a status
/// flag plus a human-readable message; none of them escape as a fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,
    /// The remote understood the request and refused it (4xx other than auth).
    #[error("rejected (HTTP {0})")]
    Rejected(u16),
    #[error("server error (HTTP {0})")]
    ServerError(u16),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl GatewayError {
    /// No route to the remote. The request was never delivered.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::TransportFailure(_))
    }

    /// The remote is unreachable or temporarily unable to answer.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::ServerError(_) | Self::TransportFailure(_))
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized => {
                "Your session has expired. Please sign in again to re-authenticate.".to_string()
            }
            Self::Rejected(code) => format!(
                "The server rejected this request (HTTP {code}). Check the entry and try again."
            ),
            Self::ServerError(code) => format!(
                "The service is temporarily unavailable (HTTP {code}). Using cached data."
            ),
            Self::MalformedResponse(_) => {
                "Received data in an unexpected format. Showing last saved data.".to_string()
            }
            Self::TransportFailure(_) => "You appear to be offline. Using cached data.".to_string(),
        }
    }

    /// Rank used to pick the headline error of a batch: the one the user has
    /// to act on comes first.
    #[must_use]
    pub fn severity(&self) -> u8 {
        match self {
            Self::Unauthorized => 4,
            Self::Rejected(_) => 3,
            Self::ServerError(_) => 2,
            Self::MalformedResponse(_) => 1,
            Self::TransportFailure(_) => 0,
        }
    }
}

/// The remote authoritative store.
///
/// The CLI implements this over HTTP with reqwest; tests use scripted fakes.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn submit_meal(&self, entry: &MealEntry) -> Result<String, GatewayError>;
    async fn submit_exercise(&self, entry: &ExerciseEntry) -> Result<String, GatewayError>;
    async fn submit_weight(&self, entry: &WeightEntry) -> Result<String, GatewayError>;
    async fn fetch_daily_aggregate(&self) -> Result<DailyAggregate, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(GatewayError::TransportFailure("dns".into()).is_connectivity());
        assert!(!GatewayError::ServerError(503).is_connectivity());
        assert!(GatewayError::ServerError(503).is_unavailable());
        assert!(!GatewayError::Unauthorized.is_unavailable());
        assert!(!GatewayError::MalformedResponse("x".into()).is_unavailable());
        assert!(!GatewayError::Rejected(422).is_unavailable());
        assert!(!GatewayError::Rejected(422).is_connectivity());
    }

    #[test]
    fn test_user_messages() {
        assert!(GatewayError::Unauthorized
            .user_message()
            .contains("re-authenticate"));
        assert!(GatewayError::ServerError(503).user_message().contains("503"));
        let rejected = GatewayError::Rejected(422).user_message();
        assert!(rejected.contains("422"));
        assert!(!rejected.contains("unavailable"));
        assert!(GatewayError::TransportFailure("refused".into())
            .user_message()
            .contains("offline"));
    }

    #[test]
    fn test_severity_order() {
        let mut errors = vec![
            GatewayError::TransportFailure(String::new()),
            GatewayError::Unauthorized,
            GatewayError::MalformedResponse(String::new()),
            GatewayError::ServerError(500),
            GatewayError::Rejected(422),
        ];
        errors.sort_by_key(GatewayError::severity);
        assert_eq!(errors.last(), Some(&GatewayError::Unauthorized));
        assert_eq!(errors[3], GatewayError::Rejected(422));
        assert!(errors[0].is_connectivity());
    }
}
