use crate::core::RoutingConfiguration;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("failed to serialize routing configuration: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writes routing configurations to the file the routing process reads.
///
/// Each publish replaces the file atomically: the document is written to a
/// temporary file in the same directory, synced, and renamed over the target.
/// A reader never observes a partially written configuration, and a failed
/// publish leaves the previous file in place.
#[derive(Clone, Debug)]
pub struct Publisher {
    path: PathBuf,
}

// === impl Publisher ===

impl Publisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn publish(&self, config: &RoutingConfiguration) -> Result<(), PersistenceError> {
        let mut bytes = serde_json::to_vec_pretty(config)?;
        bytes.push(b'\n');
        self.write(&bytes).map_err(|source| PersistenceError::Write {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), mappings = config.len(), "published");
        Ok(())
    }

    fn write(&self, bytes: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BackendPort, IpMapping, Scheme};

    fn config(ip: &str) -> RoutingConfiguration {
        RoutingConfiguration {
            ip_mappings: vec![IpMapping {
                ip_addresses: vec![ip.to_string()],
                port: BackendPort::Number(80),
                path: "/".to_string(),
                scheme: Scheme::Http,
            }],
        }
    }

    #[test]
    fn writes_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("Ingress").join("ingress.json"));

        publisher.publish(&config("10.0.0.5")).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(publisher.path()).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ipMappings": [{
                    "ipAddresses": ["10.0.0.5"],
                    "port": 80,
                    "path": "/",
                    "scheme": "http",
                }]
            })
        );
    }

    #[test]
    fn replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("ingress.json"));

        publisher.publish(&config("10.0.0.5")).unwrap();
        publisher.publish(&config("10.0.0.6")).unwrap();

        let written: RoutingConfiguration =
            serde_json::from_slice(&std::fs::read(publisher.path()).unwrap()).unwrap();
        assert_eq!(written, config("10.0.0.6"));

        // No temporary files are left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn identical_configurations_produce_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = Publisher::new(dir.path().join("ingress.json"));

        publisher.publish(&config("10.0.0.5")).unwrap();
        let first = std::fs::read(publisher.path()).unwrap();
        publisher.publish(&config("10.0.0.5")).unwrap();
        let second = std::fs::read(publisher.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn failed_publish_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ingress.json");
        let publisher = Publisher::new(&path);
        publisher.publish(&config("10.0.0.5")).unwrap();

        // The target's parent is a regular file, so the directory cannot be
        // created.
        let blocked = Publisher::new(path.join("nested.json"));
        let err = blocked
            .publish(&config("10.0.0.6"))
            .expect_err("publish must fail");
        assert!(matches!(err, PersistenceError::Write { .. }));

        let written: RoutingConfiguration =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written, config("10.0.0.5"));
    }
}
