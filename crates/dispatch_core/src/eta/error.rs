/// Failures talking to a routing backend. These stay inside the ETA layer.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("routing provider answered with HTTP {0}")]
    Status(u16),
    #[error("malformed routing response: {0}")]
    Payload(String),
    #[error("routing provider error: {0}")]
    Api(String),
    #[error("routing request timed out")]
    Timeout,
    #[error("no route between the requested points")]
    NoRoute,
    #[error("invalid routing configuration: {0}")]
    Config(String),
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RoutingError::Timeout
        } else {
            RoutingError::Http(err)
        }
    }
}
