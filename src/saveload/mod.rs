//! Save/load framework (C11): a versioned TOML root document
//! (`svs_config.toml`) plus relative sidecar binary blobs.
//!
//! Every saveable type declares a `(schema, save_version)` pair and a
//! `save`/`load` method pair operating on a [`table::Table`]. The root
//! document wraps one type's table with `__schema__`/`__version__` and a
//! top-level `__version__` checked against [`crate::version::CURRENT_GLOBAL_VERSION`].

pub mod table;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::version::{check_global_version, Version};
use table::Table;

/// Generates unique relative sidecar filenames and writes/reads blobs
/// under one artifact directory. Never hands out or accepts absolute
/// paths, preserving the relocatability invariant (§4.11).
pub struct SaveContext {
    root: PathBuf,
    counters: std::collections::HashMap<String, u64>,
}

impl SaveContext {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| Error::io(Some(root.clone()), e))?;
        Ok(Self { root, counters: std::collections::HashMap::new() })
    }

    /// Yield a unique relative path `"<prefix>_<n>.<extension>"` within this
    /// directory.
    pub fn generate_name(&mut self, prefix: &str, extension: &str) -> String {
        let counter = self.counters.entry(prefix.to_string()).or_insert(0);
        let name = format!("{prefix}_{counter}.{extension}");
        *counter += 1;
        name
    }

    pub fn write_blob(&self, relative_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(relative_name);
        fs::write(&path, bytes).map_err(|e| Error::io(Some(path), e))
    }

    /// A nested save context rooted at `<self.root>/<name>`, used by
    /// composite artifacts (Vamana's `vamana_config`/`vamana_graph`/
    /// `vamana_data` split, §6).
    pub fn subdirectory(&mut self, name: &str) -> Result<SaveContext> {
        SaveContext::new(self.root.join(name))
    }
}

/// The read-side counterpart of [`SaveContext`].
pub struct LoadContext {
    root: PathBuf,
}

impl LoadContext {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn read_blob(&self, relative_name: &str) -> Result<Vec<u8>> {
        let path = self.root.join(relative_name);
        fs::read(&path).map_err(|e| Error::io(Some(path), e))
    }

    pub fn subdirectory(&self, name: &str) -> LoadContext {
        LoadContext::new(self.root.join(name))
    }
}

/// A type that can serialize itself to (and reconstruct itself from) a
/// [`Table`], optionally using sidecar files through the save/load
/// contexts (§4.11).
pub trait Saveable: Sized {
    fn schema() -> &'static str;
    fn save_version() -> Version;

    fn save(&self, ctx: &mut SaveContext) -> Result<Table>;
    fn load(table: &Table, ctx: &LoadContext) -> Result<Self>;

    /// Whether a table tagged `(schema, version)` is loadable as `Self`.
    /// The default requires an exact schema and version match; types that
    /// tolerate older schemas (e.g. build parameters missing `prune_to`
    /// at `v0.0.0`) override this.
    fn check_load_compatibility(schema: &str, version: Version) -> bool {
        schema == Self::schema() && version == Self::save_version()
    }
}

/// Write `obj` as a complete artifact directory: `<dir>/svs_config.toml`
/// plus whatever sidecar files `obj.save` generates.
pub fn save_to_directory<T: Saveable>(dir: impl AsRef<Path>, obj: &T) -> Result<()> {
    let dir = dir.as_ref();
    let mut ctx = SaveContext::new(dir)?;
    let mut object = obj.save(&mut ctx)?;
    object.insert_str("__schema__", T::schema());
    object.insert_str("__version__", T::save_version().to_string());

    let mut root = Table::new();
    root.insert_str("__version__", crate::version::CURRENT_GLOBAL_VERSION.to_string());
    root.insert_table("object", object);

    let rendered = toml::to_string_pretty(&root.into_toml())
        .map_err(|e| Error::serialization(Some(dir.to_path_buf()), format!("failed to render root table: {e}")))?;
    let config_path = dir.join("svs_config.toml");
    fs::write(&config_path, rendered).map_err(|e| Error::io(Some(config_path), e))
}

/// Read an artifact directory written by [`save_to_directory`].
pub fn load_from_directory<T: Saveable>(dir: impl AsRef<Path>) -> Result<T> {
    let dir = dir.as_ref();
    let config_path = dir.join("svs_config.toml");
    let contents = fs::read_to_string(&config_path).map_err(|e| Error::io(Some(config_path.clone()), e))?;
    let root: toml::Table = toml::from_str(&contents)
        .map_err(|e| Error::serialization(Some(config_path.clone()), format!("malformed root document: {e}")))?;
    let root = Table::from_toml(root);

    let root_version: Version = root
        .get_str("__version__")?
        .parse()
        .map_err(|_: Error| Error::serialization(Some(config_path.clone()), "malformed root __version__"))?;
    check_global_version(root_version).map_err(|e| match e {
        Error::Serialization { message, .. } => Error::serialization(Some(config_path.clone()), message),
        other => other,
    })?;

    let object = root.get_table("object")?;
    let schema = object.get_str("__schema__")?.to_string();
    let version: Version = object
        .get_str("__version__")?
        .parse()
        .map_err(|_: Error| Error::serialization(Some(config_path.clone()), "malformed object __version__"))?;

    if !T::check_load_compatibility(&schema, version) {
        return Err(Error::serialization(
            Some(config_path),
            format!("schema/version mismatch: artifact is ({schema}, {version}), loader expects {}", T::schema()),
        ));
    }

    let ctx = LoadContext::new(dir);
    T::load(&object, &ctx)
}

mod impls;
