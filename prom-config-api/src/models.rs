use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A monitored endpoint, unique by alias within its host type.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Host {
    #[serde(alias = "Alias")]
    pub alias: String,
    #[serde(alias = "Address")]
    pub address: String, // hostname or IP, no port
}

/// One entry of a Prometheus file_sd target file.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub targets: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn for_host(host: &Host, port: u16) -> Self {
        Self {
            targets: vec![format!("{}:{}", host.address, port)],
            labels: BTreeMap::from([("alias".to_string(), host.alias.clone())]),
        }
    }
}

/// Host type ("os", "mysql", ...) -> hosts in insertion order.
pub type Registry = BTreeMap<String, Vec<Host>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_yaml_shape() {
        let host = Host { alias: "db1".into(), address: "10.0.0.3".into() };
        let yaml = serde_yaml::to_string(&vec![Endpoint::for_host(&host, 9104)]).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc[0]["targets"][0].as_str(), Some("10.0.0.3:9104"));
        assert_eq!(doc[0]["labels"]["alias"].as_str(), Some("db1"));
        assert!(yaml.starts_with("- targets:"));
    }

    #[test]
    fn test_host_accepts_capitalized_fields() {
        let host: Host = serde_json::from_str(r#"{"Alias":"h1","Address":"10.0.0.1"}"#).unwrap();
        assert_eq!(host, Host { alias: "h1".into(), address: "10.0.0.1".into() });
    }
}
