use crate::model::schema::SecondaryIndex;

use indexmap::IndexMap;
use serde::Deserialize;
use std::env;

/// Static credentials used instead of the default provider chain.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct Credentials {
    /// Access key id.
    pub key: String,
    /// Secret access key.
    pub secret: String,
}

/// Values every model definition falls back to.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Defaults {
    /// Strongly consistent reads against the base table.
    pub consistent_read: bool,
    /// Log every outgoing request at `info` (needs the `tracing` feature).
    pub log_queries: bool,
    /// Partition key attribute.
    pub partition_key: String,
    /// Secondary indexes, by index name.
    pub secondary_indexes: IndexMap<String, SecondaryIndex>,
    /// Sort key attribute.
    pub sort_key: String,
    /// Table name.
    pub table: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            consistent_read: true,
            log_queries: false,
            partition_key: "pk".to_string(),
            secondary_indexes: IndexMap::from([(
                "gsi1".to_string(),
                SecondaryIndex::new("gsi1_pk", "gsi1_sk"),
            )]),
            sort_key: "sk".to_string(),
            table: "default".to_string(),
        }
    }
}

/// Connection settings and model defaults.
///
/// ```rust
/// use dynamodb_model::config::Config;
///
/// let config: Config = serde_json::from_str(r#"{"defaults": {"table": "app"}}"#).unwrap();
/// assert_eq!(config.defaults.table, "app");
/// assert_eq!(config.defaults.partition_key, "pk");
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Static credentials, if any.
    pub credentials: Option<Credentials>,
    /// Model defaults.
    pub defaults: Defaults,
    /// Endpoint override, e.g. a local DynamoDB.
    pub endpoint: Option<String>,
    /// AWS region.
    pub region: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: None,
            defaults: Defaults::default(),
            endpoint: None,
            region: "us-east-1".to_string(),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

impl Config {
    /// Default configuration overlaid with `DYNAMODB_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Overlay `DYNAMODB_*` environment variables onto this configuration.
    pub fn with_env(self) -> Self {
        self.with_vars(|name| env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(region) = var("DYNAMODB_REGION") {
            self.region = region;
        }
        if let Some(endpoint) = var("DYNAMODB_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let (Some(key), Some(secret)) = (var("DYNAMODB_KEY"), var("DYNAMODB_SECRET")) {
            self.credentials = Some(Credentials { key, secret });
        }
        if let Some(table) = var("DYNAMODB_TABLE") {
            self.defaults.table = table;
        }
        if let Some(consistent_read) = var("DYNAMODB_CONSISTENT_READ") {
            self.defaults.consistent_read = parse_flag(&consistent_read);
        }
        if let Some(log_queries) = var("DYNAMODB_LOG_QUERIES") {
            self.defaults.log_queries = parse_flag(&log_queries);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use std::collections;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.defaults.table, "default");
        assert_eq!(config.defaults.sort_key, "sk");
        assert!(config.defaults.consistent_read);
        assert!(!config.defaults.log_queries);
        assert_eq!(
            config.defaults.secondary_indexes.get("gsi1"),
            Some(&SecondaryIndex::new("gsi1_pk", "gsi1_sk"))
        );
    }

    #[test]
    fn test_env_overlay() {
        let vars = collections::HashMap::from([
            ("DYNAMODB_REGION", "eu-west-1"),
            ("DYNAMODB_ENDPOINT", "http://localhost:8000"),
            ("DYNAMODB_KEY", "key"),
            ("DYNAMODB_SECRET", "secret"),
            ("DYNAMODB_TABLE", "app"),
            ("DYNAMODB_CONSISTENT_READ", "false"),
            ("DYNAMODB_LOG_QUERIES", "1"),
        ]);
        let config = Config::default()
            .with_vars(|name| vars.get(name).map(|value| value.to_string()));
        assert_eq!(config.region, "eu-west-1");
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:8000"));
        assert_eq!(
            config.credentials,
            Some(Credentials {
                key: "key".to_string(),
                secret: "secret".to_string(),
            })
        );
        assert_eq!(config.defaults.table, "app");
        assert!(!config.defaults.consistent_read);
        assert!(config.defaults.log_queries);
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let config = Config::default().with_vars(|name| {
            (name == "DYNAMODB_KEY").then(|| "key".to_string())
        });
        assert_eq!(config.credentials, None);
    }

    #[rstest]
    #[case::one("1", true)]
    #[case::true_upper("TRUE", true)]
    #[case::on(" on ", true)]
    #[case::zero("0", false)]
    #[case::garbage("maybe", false)]
    fn test_parse_flag(#[case] value: &str, #[case] expected: bool) {
        assert_eq!(parse_flag(value), expected);
    }
}
