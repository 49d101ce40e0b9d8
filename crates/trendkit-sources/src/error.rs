use thiserror::Error;
use trendkit_core::ErrorClass;

/// Errors raised while talking to an upstream source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {url}")]
    RateLimited {
        url: String,
        retry_after_secs: Option<u64>,
    },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Payload could not be interpreted, even leniently.
    #[error("unparseable payload from {context}")]
    Unparseable { context: String },

    /// The upstream answered but reported an application-level error.
    #[error("upstream API error: {0}")]
    Api(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("invalid endpoint \"{endpoint}\": {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The source has nothing to serve right now (e.g. no cached snapshot).
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Returns `true` for errors worth retrying after a back-off delay.
    ///
    /// **Retriable:** timeouts, connection failures, 5xx responses and 429.
    ///
    /// **Not retriable:** any other 4xx, payloads that do not parse,
    /// upstream application errors and missing credentials.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            SourceError::RateLimited { .. } => true,
            SourceError::UnexpectedStatus { status, .. } => *status >= 500,
            SourceError::Deserialize { .. }
            | SourceError::Xml(_)
            | SourceError::Unparseable { .. }
            | SourceError::Api(_)
            | SourceError::MissingCredentials(_)
            | SourceError::InvalidEndpoint { .. }
            | SourceError::Unavailable(_) => false,
        }
    }

    /// Classification recorded against the source when this error ends an attempt.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            SourceError::Http(e) if e.is_decode() => ErrorClass::Parse,
            SourceError::Deserialize { .. }
            | SourceError::Xml(_)
            | SourceError::Unparseable { .. } => ErrorClass::Parse,
            SourceError::MissingCredentials(_)
            | SourceError::InvalidEndpoint { .. }
            | SourceError::Unavailable(_) => ErrorClass::Unavailable,
            SourceError::Api(_) => ErrorClass::Permanent,
            other if other.is_transient() => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let e = SourceError::UnexpectedStatus {
            status: 503,
            url: "https://api.github.com/graphql".to_string(),
        };
        assert!(e.is_transient());
        assert_eq!(e.class(), ErrorClass::Transient);

        let e = SourceError::RateLimited {
            url: "https://www.reddit.com/r/rust/top.json".to_string(),
            retry_after_secs: Some(30),
        };
        assert!(e.is_transient());
        assert_eq!(e.class(), ErrorClass::Transient);
    }

    #[test]
    fn client_errors_are_permanent() {
        let e = SourceError::UnexpectedStatus {
            status: 404,
            url: "https://example.com".to_string(),
        };
        assert!(!e.is_transient());
        assert_eq!(e.class(), ErrorClass::Permanent);
    }

    #[test]
    fn parse_failures_classify_as_parse() {
        let src = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e = SourceError::Deserialize {
            context: "listing".to_string(),
            source: src,
        };
        assert!(!e.is_transient());
        assert_eq!(e.class(), ErrorClass::Parse);
        assert_eq!(
            SourceError::Unparseable {
                context: "feed".to_string()
            }
            .class(),
            ErrorClass::Parse
        );
    }

    #[test]
    fn missing_credentials_is_unavailable() {
        let e = SourceError::MissingCredentials("GITHUB_TOKEN".to_string());
        assert!(!e.is_transient());
        assert_eq!(e.class(), ErrorClass::Unavailable);
    }
}
