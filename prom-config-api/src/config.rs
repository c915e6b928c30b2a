use crate::store::{TargetDescriptor, TargetsConfig};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const DEFAULT_BASEDIR: &str = "/opt/prometheus";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:9003";
pub const HOSTS_FILE: &str = "hosts.yml";

#[derive(Parser, Debug)]
#[command(name = "prom-config-api", version)]
#[command(about = "REST API for Prometheus file-based service discovery targets")]
pub struct Args {
    /// Dir to use for hosts.yml and target files
    #[arg(long, env = "PROM_CONFIG_API_BASEDIR", default_value = DEFAULT_BASEDIR)]
    pub basedir: PathBuf,

    /// IP:port to listen on
    #[arg(long, env = "PROM_CONFIG_API_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// YAML file mapping host types to scrape ports
    #[arg(long, env = "PROM_CONFIG_API_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", .path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid config {}: {source}", .path.display())]
    Parse { path: PathBuf, source: serde_yaml::Error },
    #[error("host type {0} has no ports")]
    NoPorts(String),
    #[error("port {port} configured for both {first} and {second}")]
    DuplicatePort { port: u16, first: String, second: String },
}

/// Ports scraped per host type, e.g. `targets: {os: [9100]}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    pub targets: BTreeMap<String, Vec<u16>>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            targets: BTreeMap::from([
                ("os".to_string(), vec![9100]),
                ("mysql".to_string(), vec![9104, 9105, 9106]),
            ]),
        }
    }
}

impl ApiConfig {
    /// One `targets_<port>.yml` under `basedir` per configured port.
    ///
    /// Target files are named by port only, so a port may belong to one host type.
    pub fn target_descriptors(&self, basedir: &Path) -> Result<TargetsConfig, ConfigError> {
        let mut owners: HashMap<u16, &str> = HashMap::new();
        let mut descriptors = TargetsConfig::new();

        for (host_type, ports) in &self.targets {
            if ports.is_empty() {
                return Err(ConfigError::NoPorts(host_type.clone()));
            }
            for &port in ports {
                if let Some(first) = owners.insert(port, host_type) {
                    return Err(ConfigError::DuplicatePort {
                        port,
                        first: first.to_string(),
                        second: host_type.clone(),
                    });
                }
            }
            let list = ports
                .iter()
                .map(|&port| TargetDescriptor {
                    port,
                    path: basedir.join(format!("targets_{port}.yml")),
                })
                .collect();
            descriptors.insert(host_type.clone(), list);
        }

        Ok(descriptors)
    }
}

pub async fn load_config(path: Option<&Path>) -> Result<ApiConfig, ConfigError> {
    let Some(path) = path else {
        info!("no config file given, using default targets");
        return Ok(ApiConfig::default());
    };
    if !path.exists() {
        warn!("config {} not found, using default targets", path.display());
        return Ok(ApiConfig::default());
    }

    let txt = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    if txt.trim().is_empty() {
        return Ok(ApiConfig::default());
    }
    serde_yaml::from_str(&txt).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_descriptors() {
        let descriptors = ApiConfig::default().target_descriptors(Path::new("/opt/prometheus")).unwrap();
        assert_eq!(
            descriptors["os"],
            vec![TargetDescriptor { port: 9100, path: PathBuf::from("/opt/prometheus/targets_9100.yml") }]
        );
        let mysql: Vec<u16> = descriptors["mysql"].iter().map(|d| d.port).collect();
        assert_eq!(mysql, [9104, 9105, 9106]);
    }

    #[test]
    fn test_port_shared_between_types_is_rejected() {
        let cfg: ApiConfig = serde_yaml::from_str("targets:\n  os: [9100]\n  node: [9100]\n").unwrap();
        let err = cfg.target_descriptors(Path::new("/tmp")).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePort { port: 9100, .. }));
    }

    #[test]
    fn test_type_without_ports_is_rejected() {
        let cfg: ApiConfig = serde_yaml::from_str("targets:\n  os: []\n").unwrap();
        assert!(matches!(cfg.target_descriptors(Path::new("/tmp")), Err(ConfigError::NoPorts(_))));
    }

    #[tokio::test]
    async fn test_load_config_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("prom-config-api.yml");
        tokio::fs::write(&path, "targets:\n  redis: [9121]\n").await.unwrap();

        let cfg = load_config(Some(path.as_path())).await.unwrap();
        assert_eq!(cfg.targets, BTreeMap::from([("redis".to_string(), vec![9121])]));

        let missing = load_config(Some(dir.path().join("nope.yml").as_path())).await.unwrap();
        assert_eq!(missing, ApiConfig::default());

        tokio::fs::write(&path, "targets: [oops\n").await.unwrap();
        assert!(matches!(load_config(Some(path.as_path())).await, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["prom-config-api"]).unwrap();
        assert_eq!(args.listen, DEFAULT_LISTEN);
        assert!(args.config.is_none());
    }
}
