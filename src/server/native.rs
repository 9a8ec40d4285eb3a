//! File-based repository.

use super::{DEFAULT_ORDER, EnvironmentRepository};
use crate::environment::{Environment, PropertySource, flatten, normalize, split_list};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use config::File;
use serde_json::Value as JsonValue;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const SHARED_NAME: &str = "application";
const DEFAULT_PROFILE: &str = "default";
const EXTENSIONS: [&str; 4] = ["yml", "yaml", "toml", "json"];

/// Serves configuration files from local search locations.
///
/// For application `app` and profiles `p1,p2` each location is searched for
/// `app-p2`, `application-p2`, `app-p1`, `application-p1`, `app` and
/// `application`, in that order of precedence (an empty profile list means
/// `default`), with any of the extensions
/// `yml`, `yaml`, `toml` and `json`. When a label is given, the
/// `{location}/{label}` subdirectory is searched before the location itself.
/// Labels must name a directory inside the location: absolute labels and
/// labels with `..` segments are rejected.
///
/// # Examples
///
/// ```rust,no_run
/// use confhub::server::{EnvironmentRepository, NativeEnvironmentRepository};
///
/// # async fn example() -> confhub::error::Result<()> {
/// let repository = NativeEnvironmentRepository::new(vec!["config".into()]);
/// let environment = repository.find_one("billing", "prod", Some("v2")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct NativeEnvironmentRepository {
    search_locations: Vec<PathBuf>,
    default_label: Option<String>,
    order: i32,
}

impl NativeEnvironmentRepository {
    /// Create a repository over `search_locations`, highest precedence first.
    pub fn new(search_locations: Vec<PathBuf>) -> Self {
        Self {
            search_locations,
            default_label: None,
            order: DEFAULT_ORDER,
        }
    }

    /// Label used when a request names none.
    pub fn with_default_label(mut self, label: impl Into<String>) -> Self {
        self.default_label = Some(label.into());
        self
    }

    /// Set the repository order.
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Candidate files, highest precedence first. Files need not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the label is not a relative path below the
    /// search locations.
    pub fn candidate_files(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let mut profiles = split_list(profile);
        profiles.reverse();
        if profiles.is_empty() {
            profiles.push(DEFAULT_PROFILE.to_string());
        }

        let mut names: Vec<String> = split_list(application)
            .into_iter()
            .rev()
            .filter(|name| name != SHARED_NAME)
            .collect();
        names.push(SHARED_NAME.to_string());

        let directories = self.directories(label)?;
        let mut stems = Vec::new();
        for profile in &profiles {
            for name in &names {
                stems.push(format!("{}-{}", name, profile));
            }
        }
        stems.extend(names.iter().cloned());

        let mut files = Vec::new();
        for stem in &stems {
            for directory in &directories {
                for extension in EXTENSIONS {
                    files.push(directory.join(format!("{}.{}", stem, extension)));
                }
            }
        }
        Ok(files)
    }

    fn effective_label<'a>(&'a self, label: Option<&'a str>) -> Option<&'a str> {
        label
            .filter(|l| !l.trim().is_empty())
            .or(self.default_label.as_deref())
    }

    fn directories(&self, label: Option<&str>) -> Result<Vec<PathBuf>> {
        let relative = self.effective_label(label).map(label_path).transpose()?;
        let mut directories = Vec::new();
        for location in &self.search_locations {
            if let Some(relative) = &relative {
                let labelled = location.join(relative);
                if labelled.is_dir() && is_within(location, &labelled) {
                    directories.push(labelled);
                }
            }
            directories.push(location.clone());
        }
        Ok(directories)
    }
}

/// The label as a path relative to a search location.
fn label_path(label: &str) -> Result<PathBuf> {
    let path = PathBuf::from(normalize(label));
    if path
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        Ok(path)
    } else {
        Err(ConfigError::InvalidConfiguration(format!(
            "Label '{}' does not name a directory inside the search locations",
            label
        )))
    }
}

/// Whether `directory` resolves to a path below `location`, following symlinks.
fn is_within(location: &Path, directory: &Path) -> bool {
    match (location.canonicalize(), directory.canonicalize()) {
        (Ok(root), Ok(resolved)) => resolved.starts_with(root),
        _ => false,
    }
}

#[async_trait]
impl EnvironmentRepository for NativeEnvironmentRepository {
    async fn find_one(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Environment> {
        let files = self.candidate_files(application, profile, label)?;
        let label = label.or(self.default_label.as_deref());
        let mut environment = Environment::new(application, split_list(profile)).with_label(label);

        for path in files {
            if !path.is_file() {
                continue;
            }
            let source = load_file(&path)?;
            debug!(path = %path.display(), properties = source.len(), "Loaded property file");
            environment.add(PropertySource::new(format!("file:{}", path.display()), source));
        }
        Ok(environment)
    }

    fn name(&self) -> String {
        format!("native[{}]", self.search_locations.len())
    }

    fn order(&self) -> i32 {
        self.order
    }
}

fn load_file(path: &Path) -> Result<serde_json::Map<String, JsonValue>> {
    let document = config::Config::builder()
        .add_source(File::from(path).required(true))
        .build()
        .map_err(|e| ConfigError::LoadError(format!("Failed to load {}: {}", path.display(), e)))?
        .try_deserialize::<JsonValue>()
        .map_err(|e| {
            ConfigError::ParseError(format!("Failed to parse {}: {}", path.display(), e))
        })?;
    Ok(flatten(document))
}
