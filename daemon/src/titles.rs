//! Title metadata used to enrich outgoing notifications.
//!
//! The host implementation reads a TOML catalog keyed by 16-digit hex
//! application id:
//!
//! ```toml
//! [titles."0100000000010000"]
//! name = "MyGame"
//! version = "1.2.0"
//! ```
//!
//! The catalog is read on every lookup and re-parsed only when its contents
//! differ from the last parse, so titles can be added while the daemon is
//! running.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Display name and version of an installed title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TitleInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("no metadata for title {0:016X}")]
    NotFound(u64),
    #[error("title metadata unavailable: {0}")]
    Unavailable(String),
}

/// Looks up display metadata for an application id.
pub trait TitleMetadata {
    fn lookup(&mut self, application_id: u64) -> Result<TitleInfo, MetadataError>;
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    titles: HashMap<String, TitleInfo>,
}

/// File-backed [`TitleMetadata`].
#[derive(Debug)]
pub struct TitleCatalog {
    path: PathBuf,
    /// Raw file contents of the last successful parse, with its titles.
    loaded: Option<(String, HashMap<u64, TitleInfo>)>,
}

impl TitleCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-parses the catalog if the file changed since the last load.
    fn refresh(&mut self) -> Result<&HashMap<u64, TitleInfo>, MetadataError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            self.loaded = None;
            MetadataError::Unavailable(format!("{}: {e}", self.path.display()))
        })?;

        let stale = !matches!(&self.loaded, Some((loaded, _)) if *loaded == content);
        if stale {
            self.loaded = None;
            let titles = parse_catalog(&self.path, &content)?;
            tracing::debug!(path = %self.path.display(), titles = titles.len(), "Title catalog loaded");
            self.loaded = Some((content, titles));
        }

        match &self.loaded {
            Some((_, titles)) => Ok(titles),
            None => Err(MetadataError::Unavailable("catalog not loaded".to_string())),
        }
    }
}

impl TitleMetadata for TitleCatalog {
    fn lookup(&mut self, application_id: u64) -> Result<TitleInfo, MetadataError> {
        self.refresh()?
            .get(&application_id)
            .cloned()
            .ok_or(MetadataError::NotFound(application_id))
    }
}

fn parse_catalog(path: &Path, content: &str) -> Result<HashMap<u64, TitleInfo>, MetadataError> {
    let file: CatalogFile = toml::from_str(content)
        .map_err(|e| MetadataError::Unavailable(format!("{}: {e}", path.display())))?;

    let mut titles = HashMap::with_capacity(file.titles.len());
    for (key, info) in file.titles {
        match u64::from_str_radix(key.trim_start_matches("0x"), 16) {
            Ok(id) => {
                titles.insert(id, info);
            }
            Err(_) => tracing::warn!(key = %key, "Skipping title catalog entry with a non-hex id"),
        }
    }
    Ok(titles)
}
