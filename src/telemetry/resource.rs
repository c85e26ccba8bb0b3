//! Process-wide service identity.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ServiceConfig;
use crate::telemetry::span::AttributeValue;

/// Environment variable carrying `key=value,key=value` resource attributes.
pub const RESOURCE_ATTRIBUTES_ENV: &str = "OTEL_RESOURCE_ATTRIBUTES";

/// Static description of the service instance producing spans.
///
/// Built once at startup and shared by every span through an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    attributes: BTreeMap<String, AttributeValue>,
}

impl Resource {
    /// Build the resource from configuration merged over the process environment.
    pub fn from_config(service: &ServiceConfig) -> Self {
        let env = std::env::var(RESOURCE_ATTRIBUTES_ENV).unwrap_or_default();
        Self::from_parts(service, &env)
    }

    /// Build from configuration and a raw `OTEL_RESOURCE_ATTRIBUTES` value.
    ///
    /// Precedence, lowest first: detected defaults, environment pairs,
    /// `service.attributes`, the three service identity keys.
    pub fn from_parts(service: &ServiceConfig, env: &str) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("telemetry.sdk.name".to_string(), "echo-trace".into());
        attributes.insert("telemetry.sdk.language".to_string(), "rust".into());
        attributes.insert(
            "telemetry.sdk.version".to_string(),
            env!("CARGO_PKG_VERSION").into(),
        );
        attributes.insert(
            "process.pid".to_string(),
            AttributeValue::Int(i64::from(std::process::id())),
        );

        for (key, value) in parse_env_attributes(env) {
            attributes.insert(key, AttributeValue::String(value));
        }
        for (key, value) in &service.attributes {
            attributes.insert(key.clone(), AttributeValue::String(value.clone()));
        }

        attributes.insert("service.name".to_string(), service.name.as_str().into());
        attributes.insert("service.version".to_string(), service.version.as_str().into());
        attributes.insert(
            "deployment.environment".to_string(),
            service.environment.as_str().into(),
        );

        Self { attributes }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn service_name(&self) -> &str {
        match self.attributes.get("service.name") {
            Some(AttributeValue::String(name)) => name,
            _ => "unknown_service",
        }
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }
}

/// Parse `k1=v1,k2=v2`. Malformed pairs are skipped.
fn parse_env_attributes(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}
