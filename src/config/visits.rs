//! Visit reporting configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::placeholders::Replacer;

/// The default address for the Dark Visitors agent analytics API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.darkvisitors.com/visits";

/// Settings for reporting visit events to the Dark Visitors API.
///
/// Deserializes from the `[darkvisitors]` table of the proxy config or from
/// the equivalent JSON object (`{"endpoint": ..., "access_token": ...}`).
#[derive(Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VisitsConfig {
    /// Address of the agent analytics endpoint.
    ///
    /// Defaults to [`DEFAULT_ENDPOINT`] if unspecified.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,

    /// Access token used to authenticate to the endpoint.
    #[serde(default)]
    pub access_token: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VisitsConfigError {
    #[error("missing access token")]
    MissingAccessToken,

    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

impl VisitsConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            endpoint: String::new(),
            access_token: access_token.into(),
        }
    }

    /// Fill in defaults, expand placeholders and check the result.
    ///
    /// The returned config is the one handed to the reporter; it is never
    /// mutated afterwards.
    pub fn provision(mut self, replacer: &Replacer) -> Result<Self, VisitsConfigError> {
        if self.endpoint.is_empty() {
            self.endpoint = DEFAULT_ENDPOINT.to_string();
        } else {
            self.endpoint = replacer.replace_all(&self.endpoint);
        }
        self.access_token = replacer.replace_all(&self.access_token);

        if self.access_token.is_empty() {
            return Err(VisitsConfigError::MissingAccessToken);
        }

        let url = Url::parse(&self.endpoint).map_err(|e| VisitsConfigError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(VisitsConfigError::InvalidEndpoint {
                endpoint: self.endpoint.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(self)
    }

    /// Parse the structured JSON form.
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }
}

impl std::fmt::Debug for VisitsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitsConfig")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn empty_replacer() -> Replacer {
        Replacer::with_source(HashMap::new())
    }

    #[test]
    fn test_default_endpoint_applied() {
        let config = VisitsConfig::new("token").provision(&empty_replacer()).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.access_token, "token");
    }

    #[test]
    fn test_placeholders_expanded() {
        let mut values = HashMap::new();
        values.insert("env.DV_TOKEN".to_string(), "from-env".to_string());
        values.insert("env.DV_HOST".to_string(), "collector.internal".to_string());
        let replacer = Replacer::with_source(values);

        let config = VisitsConfig {
            endpoint: "http://{env.DV_HOST}/visits".into(),
            access_token: "{env.DV_TOKEN}".into(),
        }
        .provision(&replacer)
        .unwrap();

        assert_eq!(config.endpoint, "http://collector.internal/visits");
        assert_eq!(config.access_token, "from-env");
    }

    #[test]
    fn test_missing_token_rejected() {
        let err = VisitsConfig::default().provision(&empty_replacer()).unwrap_err();
        assert_eq!(err, VisitsConfigError::MissingAccessToken);

        // A placeholder that expands to nothing is still missing.
        let err = VisitsConfig::new("{env.UNSET}")
            .provision(&empty_replacer())
            .unwrap_err();
        assert_eq!(err, VisitsConfigError::MissingAccessToken);
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let config = VisitsConfig {
            endpoint: "not a url".into(),
            access_token: "t".into(),
        };
        assert!(matches!(
            config.provision(&empty_replacer()),
            Err(VisitsConfigError::InvalidEndpoint { .. })
        ));

        let config = VisitsConfig {
            endpoint: "ftp://example.com/visits".into(),
            access_token: "t".into(),
        };
        assert!(matches!(
            config.provision(&empty_replacer()),
            Err(VisitsConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_json_rejects_unknown_fields() {
        let ok = VisitsConfig::from_json(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(ok.access_token, "abc");
        assert!(ok.endpoint.is_empty());

        let err = VisitsConfig::from_json(r#"{"access_token": "abc", "verbose": true}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unknown field `verbose`"));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", VisitsConfig::new("super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
