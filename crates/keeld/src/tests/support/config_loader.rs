//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use ortho_config::OrthoError;
use tempfile::TempDir;

use keel_config::{Config, SocketEndpoint};

use crate::bootstrap::ConfigLoader;

use super::fixtures::demo_seed;

/// Loader that provisions a Unix socket path under a temporary directory.
pub struct TestConfigLoader {
    dir: TempDir,
    seed: Option<PathBuf>,
}

impl TestConfigLoader {
    /// Loader with no state seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temporary directory for socket"),
            seed: None,
        }
    }

    /// Writes the demo seed next to the socket and points the config at it.
    #[must_use]
    pub fn seeded() -> Self {
        let mut loader = Self::new();
        let path = loader.dir.path().join("seed.json");
        let text = serde_json::to_string(&demo_seed()).expect("seed serialises");
        fs::write(&path, text).expect("write seed");
        loader.seed = Some(path);
        loader
    }

    /// Points the config at a seed file that does not exist.
    #[must_use]
    pub fn with_missing_seed() -> Self {
        let mut loader = Self::new();
        loader.seed = Some(loader.dir.path().join("absent.json"));
        loader
    }

    fn socket_path(&self) -> String {
        let path = self.dir.path().join("keeld.sock");
        path.to_str()
            .expect("temporary socket path was not valid UTF-8")
            .to_owned()
    }
}

impl Default for TestConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(Config {
            daemon_socket: SocketEndpoint::unix(self.socket_path()),
            state_seed: self
                .seed
                .as_ref()
                .map(|path| path.to_str().expect("utf8 seed path").to_owned()),
            ..Config::default()
        })
    }
}

/// Loader that intentionally fails by passing an unknown CLI flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("keeld"),
            OsString::from("--no-such-flag"),
        ];
        Config::load_from_iter(args)
    }
}
