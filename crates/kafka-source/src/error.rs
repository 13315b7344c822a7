use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Consumer error: {0}")]
    Consumer(String),

    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl Error {
    /// Whether retrying the same operation may succeed.
    ///
    /// Only broker connectivity and leadership problems qualify; an
    /// exhausted retry budget is itself fatal.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kafka(e) => e.rdkafka_error_code().is_some_and(is_transient_code),
            Error::Unavailable(_) => true,
            Error::Consumer(_) | Error::InvalidConfig(_) | Error::RetriesExhausted { .. } => false,
        }
    }
}

/// librdkafka error codes caused by broker availability or leader movement.
pub fn is_transient_code(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::BrokerTransportFailure
            | RDKafkaErrorCode::Resolve
            | RDKafkaErrorCode::AllBrokersDown
            | RDKafkaErrorCode::OperationTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::LeaderNotAvailable
            | RDKafkaErrorCode::NotLeaderForPartition
            | RDKafkaErrorCode::BrokerNotAvailable
            | RDKafkaErrorCode::NetworkException
    )
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        assert!(is_transient_code(RDKafkaErrorCode::AllBrokersDown));
        assert!(is_transient_code(RDKafkaErrorCode::NotLeaderForPartition));
        assert!(!is_transient_code(RDKafkaErrorCode::TopicAuthorizationFailed));
        assert!(!is_transient_code(RDKafkaErrorCode::UnknownTopicOrPartition));
    }

    #[test]
    fn test_error_classification() {
        let broker_down = Error::Kafka(KafkaError::MessageConsumption(
            RDKafkaErrorCode::BrokerTransportFailure,
        ));
        assert!(broker_down.is_transient());

        let denied = Error::Kafka(KafkaError::MessageConsumption(
            RDKafkaErrorCode::TopicAuthorizationFailed,
        ));
        assert!(!denied.is_transient());

        assert!(Error::Unavailable("broker restarting".to_string()).is_transient());
        assert!(!Error::RetriesExhausted {
            attempts: 5,
            last: "all brokers down".to_string()
        }
        .is_transient());
    }
}
