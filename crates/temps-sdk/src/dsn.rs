//! Data Source Name parsing
//!
//! Format: `protocol://PUBLIC_KEY@HOST[:PORT]/PROJECT_ID`

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::SdkError;

/// Parsed DSN components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    pub public_key: String,
    pub project_id: i32,
    pub host: String,
    pub port: Option<u16>,
    pub protocol: String,
}

impl Dsn {
    pub fn parse(dsn: &str) -> Result<Self, SdkError> {
        let invalid = |reason: &str| SdkError::InvalidDsn {
            dsn: dsn.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(dsn).map_err(|e| invalid(&e.to_string()))?;

        let protocol = url.scheme().to_string();
        if protocol != "http" && protocol != "https" {
            return Err(invalid("protocol must be http or https"));
        }

        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host"))?
            .to_string();

        let public_key = url.username().to_string();
        if public_key.is_empty() {
            return Err(invalid("missing public key"));
        }

        let project_id = url
            .path()
            .trim_start_matches('/')
            .trim_end_matches('/')
            .parse::<i32>()
            .map_err(|_| invalid("path must be a numeric project id"))?;

        tracing::debug!(
            "Parsed DSN - public_key: {}, project_id: {}, host: {}",
            public_key,
            project_id,
            host
        );

        Ok(Self {
            public_key,
            project_id,
            host,
            port: url.port(),
            protocol,
        })
    }

    fn host_with_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Ingestion endpoint for this DSN
    ///
    /// The public key travels as the `sentry_key` query parameter because
    /// beacon-style requests cannot carry custom auth headers.
    pub fn endpoint(&self) -> String {
        format!(
            "{}://{}/api/{}/store/?sentry_key={}",
            self.protocol,
            self.host_with_port(),
            self.project_id,
            self.public_key
        )
    }
}

impl FromStr for Dsn {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Dsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}@{}/{}",
            self.protocol,
            self.public_key,
            self.host_with_port(),
            self.project_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dsn() {
        let dsn = Dsn::parse("https://abc123@temps.example.com/42").unwrap();
        assert_eq!(dsn.public_key, "abc123");
        assert_eq!(dsn.project_id, 42);
        assert_eq!(dsn.host, "temps.example.com");
        assert_eq!(dsn.port, None);
        assert_eq!(dsn.protocol, "https");
    }

    #[test]
    fn test_parse_dsn_with_port() {
        let dsn: Dsn = "http://key@localhost:8080/7".parse().unwrap();
        assert_eq!(dsn.port, Some(8080));
        assert_eq!(
            dsn.endpoint(),
            "http://localhost:8080/api/7/store/?sentry_key=key"
        );
        assert_eq!(dsn.to_string(), "http://key@localhost:8080/7");
    }

    #[test]
    fn test_parse_dsn_rejects_missing_key() {
        let err = Dsn::parse("https://temps.example.com/42").unwrap_err();
        assert!(matches!(err, SdkError::InvalidDsn { .. }));
    }

    #[test]
    fn test_parse_dsn_rejects_non_numeric_project() {
        assert!(Dsn::parse("https://key@temps.example.com/my-project").is_err());
    }

    #[test]
    fn test_parse_dsn_rejects_unknown_protocol() {
        assert!(Dsn::parse("ftp://key@temps.example.com/1").is_err());
    }
}
