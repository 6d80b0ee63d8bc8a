//! Ordered registry of component configurations backed by `service.json`.

use std::any::Any;
use std::fmt;
use std::fs::{self, DirBuilder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tempfile::Builder;
use thiserror::Error;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

use crate::components::{
    ClusterConfig, DiskInformerConfig, IpfsHttpConfig, MapTrackerConfig, MonitorConfig,
    NumpinInformerConfig, RaftConfig, RestApiConfig, SharderConfig,
};

/// Top-level section of the configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    /// Peer identity and membership; stored flat under `cluster`.
    Cluster,
    /// Consensus layer.
    Consensus,
    /// Public API.
    Api,
    /// Connector to the IPFS daemon.
    IpfsConnector,
    /// Pin tracker.
    PinTracker,
    /// Peer monitor.
    Monitor,
    /// Metric informers.
    Informer,
    /// Content sharder.
    Sharder,
}

impl Section {
    /// Key used for the section in the document.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cluster => "cluster",
            Self::Consensus => "consensus",
            Self::Api => "api",
            Self::IpfsConnector => "ipfs_connector",
            Self::PinTracker => "pin_tracker",
            Self::Monitor => "monitor",
            Self::Informer => "informer",
            Self::Sharder => "sharder",
        }
    }
}

/// Identifies one registered component: its section and component name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentKey {
    /// Section holding the component.
    pub section: Section,
    /// Component name within the section.
    pub name: &'static str,
}

impl ComponentKey {
    /// Builds a key.
    #[must_use]
    pub const fn new(section: Section, name: &'static str) -> Self {
        Self { section, name }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.section {
            Section::Cluster => formatter.write_str(self.section.as_str()),
            section => write!(formatter, "{}.{}", section.as_str(), self.name),
        }
    }
}

/// Constraint violated by a component configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ConstraintError(String);

impl ConstraintError {
    /// Creates a violation with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Human-readable description of the violation.
    #[must_use]
    pub fn message(&self) -> &str {
        self.0.as_str()
    }
}

/// Contract implemented by each component's configuration type.
pub trait ComponentConfig:
    Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static
{
    /// Location of the component in the document.
    const KEY: ComponentKey;

    /// Generates a fresh default configuration.
    fn default_config() -> Result<Self, ConstraintError>;

    /// Checks component-specific constraints.
    fn validate(&self) -> Result<(), ConstraintError> {
        Ok(())
    }

    /// Receives the directory holding the loaded file.
    fn set_base_dir(&mut self, _dir: &Path) {}
}

/// Errors raised by the registry.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file '{path}' not found; run 'init' first")]
    NotFound {
        /// Expected file location.
        path: PathBuf,
    },
    /// The file is not a JSON object.
    #[error("configuration file '{path}' is malformed: {source}")]
    Malformed {
        /// File location.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },
    /// A registered component has no entry in the file.
    #[error("configuration for '{key}' is missing")]
    MissingSection {
        /// Component lacking an entry.
        key: ComponentKey,
    },
    /// A component entry could not be decoded.
    #[error("configuration for '{key}' is malformed: {source}")]
    Section {
        /// Component whose entry failed.
        key: ComponentKey,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },
    /// A component entry violated its constraints.
    #[error("configuration for '{key}' is invalid: {source}")]
    Invalid {
        /// Offending component.
        key: ComponentKey,
        /// Violated constraint.
        #[source]
        source: ConstraintError,
    },
    /// Generating defaults failed for a component.
    #[error("generating default configuration for '{key}' failed: {source}")]
    Defaults {
        /// Component whose defaults failed.
        key: ComponentKey,
        /// Reported failure.
        #[source]
        source: ConstraintError,
    },
    /// The destination exists and overwriting was not requested.
    #[error("{path} exists")]
    AlreadyExists {
        /// Existing file.
        path: PathBuf,
    },
    /// Reading or writing the file failed.
    #[error("configuration file '{path}' could not be accessed: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Encoding the document failed.
    #[error("failed to encode configuration: {source}")]
    Encode {
        /// Underlying encode error.
        #[source]
        source: serde_json::Error,
    },
    /// The component was never registered.
    #[error("component '{key}' is not registered")]
    Unregistered {
        /// Requested component.
        key: ComponentKey,
    },
    /// The component holds no value yet.
    #[error("component '{key}' has not been populated; load or generate defaults first")]
    Unpopulated {
        /// Requested component.
        key: ComponentKey,
    },
    /// The component was registered twice.
    #[error("component '{key}' is already registered")]
    Duplicate {
        /// Component registered twice.
        key: ComponentKey,
    },
    /// Several components failed at once.
    #[error("multiple configuration errors: {}", join_errors(.0))]
    Aggregate(Vec<ConfigError>),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

type Staged = Box<dyn Any + Send>;

trait RegisteredEntry: Send + Sync {
    fn key(&self) -> ComponentKey;
    fn populate_defaults(&mut self) -> Result<(), ConfigError>;
    fn stage(&self, value: Value, base_dir: &Path) -> Result<Staged, ConfigError>;
    fn commit(&mut self, staged: Staged);
    fn to_value(&self) -> Result<Value, ConfigError>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct Slot<T>(Option<T>);

impl<T: ComponentConfig> RegisteredEntry for Slot<T> {
    fn key(&self) -> ComponentKey {
        T::KEY
    }

    fn populate_defaults(&mut self) -> Result<(), ConfigError> {
        let config = T::default_config()
            .and_then(|config| config.validate().map(|()| config))
            .map_err(|source| ConfigError::Defaults {
                key: T::KEY,
                source,
            })?;
        self.0 = Some(config);
        Ok(())
    }

    fn stage(&self, value: Value, base_dir: &Path) -> Result<Staged, ConfigError> {
        let mut config: T = serde_json::from_value(value)
            .map_err(|source| ConfigError::Section { key: T::KEY, source })?;
        config.set_base_dir(base_dir);
        config
            .validate()
            .map_err(|source| ConfigError::Invalid { key: T::KEY, source })?;
        Ok(Box::new(config))
    }

    fn commit(&mut self, staged: Staged) {
        if let Ok(config) = staged.downcast::<T>() {
            self.0 = Some(*config);
        }
    }

    fn to_value(&self) -> Result<Value, ConfigError> {
        let config = self
            .0
            .as_ref()
            .ok_or(ConfigError::Unpopulated { key: T::KEY })?;
        config
            .validate()
            .map_err(|source| ConfigError::Invalid { key: T::KEY, source })?;
        serde_json::to_value(config).map_err(|source| ConfigError::Encode { source })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Component configurations in registration order.
#[derive(Default)]
pub struct ConfigRegistry {
    entries: Vec<Box<dyn RegisteredEntry>>,
}

impl fmt::Debug for ConfigRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_list()
            .entries(self.entries.iter().map(|entry| entry.key()))
            .finish()
    }
}

impl ConfigRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every component a peer needs, unpopulated.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.push::<ClusterConfig>();
        registry.push::<RestApiConfig>();
        registry.push::<IpfsHttpConfig>();
        registry.push::<RaftConfig>();
        registry.push::<MapTrackerConfig>();
        registry.push::<MonitorConfig>();
        registry.push::<DiskInformerConfig>();
        registry.push::<NumpinInformerConfig>();
        registry.push::<SharderConfig>();
        registry
    }

    fn push<T: ComponentConfig>(&mut self) {
        self.entries.push(Box::new(Slot::<T>(None)));
    }

    /// Registers a component type.
    pub fn register<T: ComponentConfig>(&mut self) -> Result<(), ConfigError> {
        if self.contains(T::KEY) {
            return Err(ConfigError::Duplicate { key: T::KEY });
        }
        self.push::<T>();
        Ok(())
    }

    /// Returns `true` when a component is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: ComponentKey) -> bool {
        self.entries.iter().any(|entry| entry.key() == key)
    }

    /// Keys of all registered components, in registration order.
    pub fn keys(&self) -> impl Iterator<Item = ComponentKey> + '_ {
        self.entries.iter().map(|entry| entry.key())
    }

    /// Populates every entry with its defaults.
    ///
    /// Every entry is attempted even after a failure, so unrelated entries
    /// still end up defaulted; any failure is reported.
    pub fn populate_defaults(&mut self) -> Result<(), ConfigError> {
        let mut errors: Vec<ConfigError> = self
            .entries
            .iter_mut()
            .filter_map(|entry| entry.populate_defaults().err())
            .collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::Aggregate(errors)),
        }
    }

    /// Loads every registered entry from `path`.
    ///
    /// Nothing is applied unless the whole document decodes and validates.
    pub fn load(&mut self, path: &Path) -> Result<(), ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        let document: Map<String, Value> =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));

        let staged = self
            .entries
            .iter()
            .map(|entry| {
                let key = entry.key();
                let value = lookup(&document, key).ok_or(ConfigError::MissingSection { key })?;
                entry.stage(value.clone(), base_dir)
            })
            .collect::<Result<Vec<_>, _>>()?;

        for (entry, config) in self.entries.iter_mut().zip(staged) {
            entry.commit(config);
        }
        Ok(())
    }

    /// Writes every entry to `path`.
    ///
    /// Fails with [`ConfigError::AlreadyExists`] when the file exists and
    /// `overwrite` is false. Parent directories are created as needed and the
    /// file is replaced atomically.
    pub fn save(&self, path: &Path, overwrite: bool) -> Result<(), ConfigError> {
        if path.exists() && !overwrite {
            return Err(ConfigError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }
        let document = self.to_document()?;
        let mut bytes =
            serde_json::to_vec_pretty(&document).map_err(|source| ConfigError::Encode { source })?;
        bytes.push(b'\n');

        let directory = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        create_private_dir(directory).map_err(|source| ConfigError::Io {
            path: directory.to_path_buf(),
            source,
        })?;
        atomic_write(path, &bytes).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the document for all entries.
    pub fn to_document(&self) -> Result<Value, ConfigError> {
        let mut document = Map::new();
        for entry in &self.entries {
            let key = entry.key();
            let value = entry.to_value()?;
            match key.section {
                Section::Cluster => {
                    document.insert(key.section.as_str().to_owned(), value);
                }
                section => {
                    let nested = document
                        .entry(section.as_str().to_owned())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(components) = nested {
                        components.insert(key.name.to_owned(), value);
                    }
                }
            }
        }
        Ok(Value::Object(document))
    }

    /// Borrows a populated component configuration.
    pub fn get<T: ComponentConfig>(&self) -> Result<&T, ConfigError> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.key() == T::KEY)
            .ok_or(ConfigError::Unregistered { key: T::KEY })?;
        entry
            .as_any()
            .downcast_ref::<Slot<T>>()
            .and_then(|slot| slot.0.as_ref())
            .ok_or(ConfigError::Unpopulated { key: T::KEY })
    }

    /// Mutably borrows a populated component configuration.
    pub fn get_mut<T: ComponentConfig>(&mut self) -> Result<&mut T, ConfigError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|entry| entry.key() == T::KEY)
            .ok_or(ConfigError::Unregistered { key: T::KEY })?;
        entry
            .as_any_mut()
            .downcast_mut::<Slot<T>>()
            .and_then(|slot| slot.0.as_mut())
            .ok_or(ConfigError::Unpopulated { key: T::KEY })
    }
}

fn lookup(document: &Map<String, Value>, key: ComponentKey) -> Option<&Value> {
    let section = document.get(key.section.as_str())?;
    match key.section {
        Section::Cluster => Some(section),
        _ => section.get(key.name),
    }
}

fn create_private_dir(directory: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(directory)
}

/// Writes the bytes through a temporary sibling that is renamed into place.
fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("service.json"),
    );
    #[cfg(unix)]
    {
        use std::fs::Permissions;
        builder.permissions(Permissions::from_mode(0o600));
    }
    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}
