//! Host registry store
//!
//! Owns `hosts.yml` (host type -> hosts) and every Prometheus file_sd target
//! file derived from it. Each call reloads the registry from disk, applies its
//! change and, for mutations, rewrites the registry followed by every
//! configured target file. One mutex serializes all calls, reads included,
//! so a list never sees a half-applied mutation.
//!
//! Files are replaced whole through a temporary file and a rename. A failure
//! while writing target files leaves the registry committed and the remaining
//! target files stale until the next successful mutation.

use crate::models::{Endpoint, Host, Registry};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot decode {}: {source}", .path.display())]
    Decode { path: PathBuf, source: serde_yaml::Error },
    #[error("cannot encode YAML: {0}")]
    Encode(#[from] serde_yaml::Error),
    #[error("duplicate host: {alias} already registered as {host_type}")]
    DuplicateHost { host_type: String, alias: String },
    #[error("host not found: no {host_type} host with alias {alias}")]
    HostNotFound { host_type: String, alias: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::HostNotFound { .. })
    }

    fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io { path: path.to_path_buf(), source }
    }
}

/// One target file to generate for a host type: every host of that type
/// scraped on `port`, written to `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub port: u16,
    pub path: PathBuf,
}

/// Host type -> target files to keep in sync. Fixed for the process lifetime.
pub type TargetsConfig = BTreeMap<String, Vec<TargetDescriptor>>;

pub struct RegistryStore {
    registry_path: PathBuf,
    targets: TargetsConfig,
    lock: Mutex<()>,
}

impl RegistryStore {
    pub fn new<P: Into<PathBuf>>(registry_path: P, targets: TargetsConfig) -> Self {
        Self {
            registry_path: registry_path.into(),
            targets,
            lock: Mutex::new(()),
        }
    }

    pub fn registry_path(&self) -> &Path {
        &self.registry_path
    }

    /// Full registry as currently persisted. Never writes.
    pub fn list(&self) -> Result<Registry, StoreError> {
        let _guard = self.lock.lock();
        self.load()
    }

    /// Appends `host` under `host_type`, then rewrites the registry and all target files.
    pub fn add(&self, host_type: &str, host: Host) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut registry = self.load()?;

        let hosts = registry.entry(host_type.to_string()).or_default();
        if hosts.iter().any(|h| h.alias == host.alias) {
            return Err(StoreError::DuplicateHost {
                host_type: host_type.to_string(),
                alias: host.alias,
            });
        }
        hosts.push(host);

        self.commit(&registry)
    }

    /// Removes the host `alias` from `host_type`, keeping the order of the others.
    pub fn remove(&self, host_type: &str, alias: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut registry = self.load()?;

        let position = registry
            .get(host_type)
            .and_then(|hosts| hosts.iter().position(|h| h.alias == alias));
        let (Some(index), Some(hosts)) = (position, registry.get_mut(host_type)) else {
            return Err(StoreError::HostNotFound {
                host_type: host_type.to_string(),
                alias: alias.to_string(),
            });
        };
        hosts.remove(index);

        self.commit(&registry)
    }

    fn load(&self) -> Result<Registry, StoreError> {
        let data = fs::read(&self.registry_path).map_err(|e| StoreError::io(&self.registry_path, e))?;
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Registry::new());
        }

        // `os:` with no hosts decodes as null, not as an empty list
        let raw: Option<BTreeMap<String, Option<Vec<Host>>>> = serde_yaml::from_slice(&data)
            .map_err(|source| StoreError::Decode { path: self.registry_path.clone(), source })?;

        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .map(|(host_type, hosts)| (host_type, hosts.unwrap_or_default()))
            .collect())
    }

    /// Registry first, then every target file of every configured type.
    /// Stops at the first failure.
    fn commit(&self, registry: &Registry) -> Result<(), StoreError> {
        write_yaml(&self.registry_path, registry)?;

        for (host_type, descriptors) in &self.targets {
            let hosts = registry.get(host_type).map(Vec::as_slice).unwrap_or_default();
            for descriptor in descriptors {
                write_yaml(&descriptor.path, &endpoints(hosts, descriptor.port))?;
            }
        }

        Ok(())
    }
}

/// Scrape targets for `hosts` on `port`, in host order.
pub fn endpoints(hosts: &[Host], port: u16) -> Vec<Endpoint> {
    hosts.iter().map(|host| Endpoint::for_host(host, port)).collect()
}

fn write_yaml<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(value)?;
    replace_file(path, yaml.as_bytes()).map_err(|e| StoreError::io(path, e))
}

/// Writes a sibling temp file and renames it over `path`.
fn replace_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let result = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}
