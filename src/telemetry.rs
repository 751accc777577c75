//! Logging and metrics bootstrap for chunktable binaries.
//!
//! Library code only emits `tracing` events and records through the global
//! OpenTelemetry meter; both are no-ops until a binary installs
//! [`Telemetry`].

use crate::{Error, Result};

use opentelemetry::global;
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::Resource;
use std::collections::BTreeMap;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

const ATTR_SERVICE_NAME: &str = "service.name";
const ATTR_SERVICE_NAMESPACE: &str = "service.namespace";

/// Telemetry settings read from the environment.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub resource_attributes: Vec<KeyValue>,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str) -> Result<Self> {
        let service_name =
            std::env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| default_service_name.to_string());
        let attrs = std::env::var("OTEL_RESOURCE_ATTRIBUTES").ok();
        Self::build(&service_name, attrs.as_deref())
    }

    fn build(service_name: &str, resource_attributes: Option<&str>) -> Result<Self> {
        let service_name = service_name.trim();
        if service_name.is_empty() {
            return Err(Error::Config("OTEL_SERVICE_NAME cannot be empty".to_string()));
        }

        let mut attr_map: BTreeMap<String, String> = BTreeMap::new();
        if let Some(raw) = resource_attributes {
            attr_map.extend(parse_resource_attributes(raw)?);
        }
        attr_map.insert(ATTR_SERVICE_NAME.to_string(), service_name.to_string());
        attr_map
            .entry(ATTR_SERVICE_NAMESPACE.to_string())
            .or_insert_with(|| "chunktable".to_string());

        Ok(Self {
            service_name: service_name.to_string(),
            resource_attributes: attr_map
                .into_iter()
                .map(|(k, v)| KeyValue::new(k, v))
                .collect(),
        })
    }
}

/// Keeps the meter provider alive for the life of the process.
pub struct Telemetry {
    config: TelemetryConfig,
    meter_provider: SdkMeterProvider,
}

impl Telemetry {
    /// Install the JSON log subscriber and the global meter provider.
    ///
    /// `RUST_LOG`, when set, takes precedence over `log_level`.
    pub fn init(default_service_name: &str, log_level: &str) -> Result<Self> {
        let config = TelemetryConfig::from_env(default_service_name)?;
        let level = parse_log_level(log_level)?;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .json()
            .try_init()
            .map_err(|e| Error::Config(format!("failed to initialize log subscriber: {e}")))?;

        let resource = Resource::default().merge(&Resource::new(config.resource_attributes.clone()));
        let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
        global::set_meter_provider(meter_provider.clone());

        info!(service_name = %config.service_name, "Telemetry initialized");
        Ok(Self {
            config,
            meter_provider,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.config.service_name
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let _ = self.meter_provider.shutdown();
    }
}

pub fn parse_log_level(raw: &str) -> Result<Level> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(Error::Config(format!(
            "invalid log level '{other}', expected one of [trace, debug, info, warn, error]"
        ))),
    }
}

fn parse_resource_attributes(raw: &str) -> Result<Vec<(String, String)>> {
    let mut attrs = Vec::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            return Err(Error::Config(format!(
                "OTEL_RESOURCE_ATTRIBUTES entry '{pair}' is invalid, expected key=value"
            )));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::Config(
                "OTEL_RESOURCE_ATTRIBUTES contains an empty attribute key".to_string(),
            ));
        }
        attrs.push((key.to_string(), value.trim().to_string()));
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels() {
        assert_eq!(parse_log_level(" Debug ").unwrap(), Level::DEBUG);
        assert!(parse_log_level("loud").is_err());
    }

    #[test]
    fn service_name_overrides_resource_attribute() {
        let config =
            TelemetryConfig::build("migrate", Some("service.name=other, deployment=dev")).unwrap();
        let get = |key: &str| {
            config
                .resource_attributes
                .iter()
                .find(|kv| kv.key.as_str() == key)
                .map(|kv| kv.value.as_str().into_owned())
        };
        assert_eq!(get("service.name").as_deref(), Some("migrate"));
        assert_eq!(get("deployment").as_deref(), Some("dev"));
        assert_eq!(get("service.namespace").as_deref(), Some("chunktable"));
    }

    #[test]
    fn malformed_resource_attributes_are_rejected() {
        let err = TelemetryConfig::build("svc", Some("broken")).unwrap_err();
        assert!(err.to_string().contains("key=value"));
        assert!(TelemetryConfig::build("  ", None).is_err());
    }
}
