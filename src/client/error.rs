use thiserror::Error;

pub use crate::messenger::RequestError;
pub use crate::protocol::error::Error as ProtocolError;

/// Which entity a failed request was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// Request related to a topic.
    Topic(String),

    /// Request related to a single partition.
    Partition(String, i32),

    /// Request related to a consumer group.
    Group(String),
}

impl std::fmt::Display for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Topic(topic) => write!(f, "topic \"{topic}\""),
            Self::Partition(topic, partition) => {
                write!(f, "partition {partition} of topic \"{topic}\"")
            }
            Self::Group(group) => write!(f, "group \"{group}\""),
        }
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(#[from] crate::connection::Error),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Server error {protocol_error:?} with message \"{}\" for {request}", error_message.as_deref().unwrap_or(""))]
    ServerError {
        protocol_error: ProtocolError,
        error_message: Option<String>,
        request: RequestContext,
    },
}

impl Error {
    pub(crate) fn exactly_one_topic(len: usize) -> Self {
        Self::InvalidResponse(format!("Expected a single topic in response, got {len}"))
    }

    pub(crate) fn exactly_one_partition(len: usize) -> Self {
        Self::InvalidResponse(format!(
            "Expected a single partition in response, got {len}"
        ))
    }

    /// The broker error code, if this is a server-side error.
    pub fn protocol_error(&self) -> Option<ProtocolError> {
        match self {
            Self::ServerError { protocol_error, .. } => Some(*protocol_error),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_display() {
        let err = Error::ServerError {
            protocol_error: ProtocolError::GroupIdNotFound,
            error_message: None,
            request: RequestContext::Group("payments".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Server error GroupIdNotFound with message \"\" for group \"payments\""
        );
        assert_eq!(err.protocol_error(), Some(ProtocolError::GroupIdNotFound));

        let err = Error::ServerError {
            protocol_error: ProtocolError::NotLeaderOrFollower,
            error_message: Some("moved".to_string()),
            request: RequestContext::Partition("orders".to_string(), 3),
        };
        assert_eq!(
            err.to_string(),
            "Server error NotLeaderOrFollower with message \"moved\" for partition 3 of topic \"orders\""
        );
    }
}
