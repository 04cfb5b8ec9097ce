/// Error taxonomy for the scanner. The `Display` strings are part of the RPC
/// contract: clients match on them, so they must not drift.
#[derive(Debug, thiserror::Error)]
pub enum RadarError {
    #[error("requestId is required")]
    RequestIdRequired,
    #[error("maxMutations must be >= 1")]
    MaxMutationsTooSmall,
    #[error("maxMutations must be <= 256")]
    MaxMutationsTooLarge,
    #[error("persistenceDelayMs must be >= 0")]
    PersistenceDelayNegative,
    #[error("persistenceDelayMs must be <= 10000")]
    PersistenceDelayTooLarge,
    #[error("candidateFields is too large")]
    CandidateFieldsTooLarge,
    #[error("verification.delayMs must be >= 0")]
    VerificationDelayNegative,
    #[error("verification.delayMs must be <= 10000")]
    VerificationDelayTooLarge,
    #[error("limit must be >= 1")]
    LimitTooSmall,
    #[error("limit must be <= 5000")]
    LimitTooLarge,
    #[error("findings is empty")]
    FindingsEmpty,
    #[error("too many findings")]
    TooManyFindings,
    #[error("host is required")]
    HostRequired,
    #[error("port is invalid")]
    PortInvalid,
    #[error("request is empty")]
    RequestEmpty,
    #[error("invalid request line")]
    InvalidRequestLine,
    #[error("verification url is required")]
    VerificationUrlRequired,
    #[error("baseline url is invalid")]
    BaselineUrlInvalid,
    #[error("raw request is empty")]
    RawRequestEmpty,
    #[error("request {0} not found")]
    RequestNotFound(String),
    #[error("request Content-Type is not application/json")]
    NotJsonContentType,
    #[error("request body is empty")]
    BodyEmpty,
    #[error("body is not valid JSON")]
    BodyNotJson,
    #[error("request JSON body must be an object")]
    BodyNotObject,
    #[error("no mutations generated (all candidate fields already exist in request body)")]
    NoMutations,
    #[error("failed to send baseline request")]
    BaselineSendFailed,
    #[error("failed to send verification request")]
    VerificationSendFailed,
    #[error("verification request has no response")]
    VerificationNoResponse,
    #[error("scan already running")]
    ScanAlreadyRunning,
    #[error("failed to create findings: {0}")]
    SinkFailed(String),
    #[error("{0}")]
    Store(String),
}

#[cfg(test)]
mod tests {
    use super::RadarError;

    #[test]
    fn contract_strings_are_stable() {
        assert_eq!(
            RadarError::RequestNotFound("req-1".to_string()).to_string(),
            "request req-1 not found"
        );
        assert_eq!(
            RadarError::NoMutations.to_string(),
            "no mutations generated (all candidate fields already exist in request body)"
        );
        assert_eq!(
            RadarError::SinkFailed("disk full".to_string()).to_string(),
            "failed to create findings: disk full"
        );
        assert_eq!(
            RadarError::VerificationDelayTooLarge.to_string(),
            "verification.delayMs must be <= 10000"
        );
    }
}
