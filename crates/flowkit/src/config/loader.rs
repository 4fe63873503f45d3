//! Loading and saving layered configuration files.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{Config, JsonParser, Substitutions};
use crate::error::ConfigError;
use crate::rw::{DEFAULT_FILE_MODE, SharedReaderWriter};

/// Default local configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "flow.json";

/// Global configuration path, `flow.json` in the user config directory.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(DEFAULT_CONFIG_FILE))
}

/// Maps a configuration file format to the in-memory model.
pub trait Parser: Send + Sync {
    /// Whether this parser handles `path`.
    fn supports(&self, path: &Path) -> bool;

    /// Parse `raw`, resolving `$VAR` references in string values through
    /// `vars`.
    fn parse(&self, path: &Path, raw: &[u8], vars: &mut Substitutions) -> Result<Config, ConfigError>;

    /// Serialize `config`, writing resolved values back as the references
    /// `vars` recorded for them.
    fn serialize(&self, config: &Config, vars: &Substitutions) -> Result<Vec<u8>, ConfigError>;
}

/// Loads and layers configuration files, and writes edits back.
pub struct Loader {
    rw: SharedReaderWriter,
    parsers: Vec<Box<dyn Parser>>,
    paths: Vec<PathBuf>,
    explicit: bool,
    vars: Substitutions,
}

impl Loader {
    /// Loader over the default paths: the global file, then `./flow.json`.
    pub fn new(rw: SharedReaderWriter) -> Self {
        let mut paths: Vec<PathBuf> = global_config_path().into_iter().collect();
        paths.push(PathBuf::from(DEFAULT_CONFIG_FILE));
        Self {
            rw,
            parsers: vec![Box::new(JsonParser)],
            paths,
            explicit: false,
            vars: Substitutions::from_env(),
        }
    }

    /// Loader over explicit paths, layered in order.
    pub fn with_paths(rw: SharedReaderWriter, paths: Vec<PathBuf>) -> Self {
        Self {
            rw,
            parsers: vec![Box::new(JsonParser)],
            paths,
            explicit: true,
            vars: Substitutions::from_env(),
        }
    }

    /// Resolve `$VAR` references with `lookup` instead of the process
    /// environment.
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.vars = Substitutions::new(lookup);
        self
    }

    /// Register an additional format.
    pub fn add_parser(&mut self, parser: Box<dyn Parser>) {
        self.parsers.push(parser);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn parser_for(&self, path: &Path) -> Result<&dyn Parser, ConfigError> {
        self.parsers
            .iter()
            .find(|p| p.supports(path))
            .map(|p| p.as_ref())
            .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))
    }

    /// Load every existing path, later files overriding earlier ones.
    ///
    /// Fails with [`ConfigError::NotFound`] only if none of the paths exist.
    pub fn load(&mut self) -> Result<Config, ConfigError> {
        let mut merged: Option<Config> = None;

        for path in &self.paths {
            if !self.rw.exists(path) {
                debug!(path = %path.display(), "config file not present");
                continue;
            }
            let raw = self.rw.read_file(path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let parser = self
                .parsers
                .iter()
                .find(|p| p.supports(path))
                .ok_or_else(|| ConfigError::UnsupportedFormat(path.to_path_buf()))?;
            let config = parser.parse(path, &raw, &mut self.vars)?;
            info!(path = %path.display(), "loaded configuration");

            match merged.as_mut() {
                Some(base) => base.merge(config),
                None => merged = Some(config),
            }
        }

        merged.ok_or_else(|| ConfigError::NotFound(self.paths.clone()))
    }

    /// Choose where edits are written.
    ///
    /// Explicit loaders must name exactly one file. With the default paths
    /// the local file wins; the global file is only written when it is the
    /// one the user named.
    pub fn save_path(&self) -> Result<PathBuf, ConfigError> {
        if self.explicit {
            return match self.paths.as_slice() {
                [single] => Ok(single.clone()),
                _ => Err(ConfigError::MultipleSavePaths),
            };
        }

        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if self.rw.exists(&local) {
            return Ok(local);
        }
        match global_config_path() {
            Some(global) if self.rw.exists(&global) => {
                Err(ConfigError::GlobalSaveWithoutLocal(global))
            }
            _ => Ok(local),
        }
    }

    /// Serialize `config` to `path`.
    pub fn save(&self, config: &Config, path: &Path) -> Result<(), ConfigError> {
        let data = self.parser_for(path)?.serialize(config, &self.vars)?;
        self.rw
            .write_file(path, &data, DEFAULT_FILE_MODE)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), "saved configuration");
        Ok(())
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("paths", &self.paths)
            .field("explicit", &self.explicit)
            .field("vars", &self.vars)
            .finish()
    }
}
