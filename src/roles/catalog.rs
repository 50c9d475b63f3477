//! File-backed role catalog.
//!
//! The store is a single JSON array of `{id, name}` objects (plus an optional
//! `figure` path). `save` always rewrites the whole file.
//!
//! Imported figures are stored as `role_<id>.<ext>` inside the figure
//! directory, so renaming a role never touches its figure and a name can
//! never address a file outside that directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::RoleError;

/// One assignable role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub figure: Option<PathBuf>,
}

/// In-memory role list bound to its backing file.
#[derive(Clone, Debug)]
pub struct RoleCatalog {
    path: PathBuf,
    figure_dir: PathBuf,
    entries: Vec<RoleEntry>,
}

fn default_figure_dir(path: &Path) -> PathBuf {
    path.parent()
        .map(|dir| dir.join("figures"))
        .unwrap_or_else(|| PathBuf::from("figures"))
}

impl RoleCatalog {
    /// Create an empty catalog bound to `path` (nothing is read or written).
    pub fn new(path: PathBuf) -> Self {
        Self {
            figure_dir: default_figure_dir(&path),
            path,
            entries: Vec::new(),
        }
    }

    /// Read the catalog from `path`. A missing or unparsable store is an error.
    pub fn load(path: &Path) -> Result<Self, RoleError> {
        let data = std::fs::read(path)
            .map_err(|e| RoleError::Load(format!("{}: {}", path.display(), e)))?;
        let entries: Vec<RoleEntry> = serde_json::from_slice(&data)
            .map_err(|e| RoleError::Load(format!("{}: {}", path.display(), e)))?;

        {
            let mut ids = HashSet::new();
            let mut names = HashSet::new();
            for entry in &entries {
                if !ids.insert(entry.id) {
                    return Err(RoleError::Load(format!("duplicate role id {}", entry.id)));
                }
                if !names.insert(entry.name.as_str()) {
                    return Err(RoleError::Load(format!("duplicate role name {:?}", entry.name)));
                }
            }
        }

        log::info!("Loaded {} roles from {}", entries.len(), path.display());
        Ok(Self {
            figure_dir: default_figure_dir(path),
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Override where imported figures are copied.
    pub fn with_figure_dir(mut self, figure_dir: PathBuf) -> Self {
        self.figure_dir = figure_dir;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the backing file with the current entries.
    pub fn save(&self) -> Result<(), RoleError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| RoleError::Persist(e.to_string()))?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| RoleError::Persist(e.to_string()))?;
        std::fs::write(&self.path, json).map_err(|e| RoleError::Persist(e.to_string()))?;
        log::debug!("Saved {} roles to {}", self.entries.len(), self.path.display());
        Ok(())
    }

    pub fn entries(&self) -> &[RoleEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&RoleEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.get(id).is_some()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.get(id).map(|e| e.name.as_str())
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.id)
    }

    /// One past the highest id in use, or the smallest free id once the top
    /// of the id space is taken.
    fn next_id(&self) -> Result<u32, RoleError> {
        match self.entries.iter().map(|e| e.id).max() {
            None => Ok(1),
            Some(max) => match max.checked_add(1) {
                Some(id) => Ok(id),
                None => (1..=u32::MAX)
                    .find(|id| !self.contains(*id))
                    .ok_or(RoleError::NoFreeId),
            },
        }
    }

    fn validate_name(&self, name: &str, except: Option<u32>) -> Result<String, RoleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RoleError::InvalidName(name.to_string()));
        }
        if let Some(existing) = self.id_of(name) {
            if Some(existing) != except {
                return Err(RoleError::AlreadyExists(format!("role {:?}", name)));
            }
        }
        Ok(name.to_string())
    }

    /// Add a role under the next unused id and return that id.
    pub fn add(&mut self, name: &str) -> Result<u32, RoleError> {
        let name = self.validate_name(name, None)?;
        let id = self.next_id()?;
        self.entries.push(RoleEntry { id, name, figure: None });
        Ok(id)
    }

    pub fn rename(&mut self, id: u32, new_name: &str) -> Result<(), RoleError> {
        let name = self.validate_name(new_name, Some(id))?;
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| RoleError::NotFound(format!("role {}", id)))?;
        entry.name = name;
        Ok(())
    }

    /// Remove a role and return its entry. The figure file is left on disk;
    /// pass the entry to [`discard_figure`] once the removal is persisted.
    pub fn remove(&mut self, id: u32) -> Result<RoleEntry, RoleError> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| RoleError::NotFound(format!("role {}", id)))?;
        Ok(self.entries.remove(index))
    }

    /// Copy an image into the figure directory as `role_<id>.<ext>` and
    /// attach it to the role, replacing any earlier figure.
    pub fn import_figure(&mut self, id: u32, source: &Path) -> Result<PathBuf, RoleError> {
        if !self.contains(id) {
            return Err(RoleError::NotFound(format!("role {}", id)));
        }

        let file_name = match source.extension().and_then(|ext| ext.to_str()) {
            Some(ext) => format!("role_{}.{}", id, ext),
            None => format!("role_{}", id),
        };
        let dest = self.figure_dir.join(file_name);

        std::fs::create_dir_all(&self.figure_dir)
            .map_err(|e| RoleError::Asset(format!("{}: {}", self.figure_dir.display(), e)))?;
        std::fs::copy(source, &dest)
            .map_err(|e| RoleError::Asset(format!("{}: {}", source.display(), e)))?;

        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            if let Some(old) = entry.figure.replace(dest.clone()) {
                if old != dest {
                    remove_figure_file(&old);
                }
            }
        }
        Ok(dest)
    }
}

fn remove_figure_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("Failed to delete figure {}: {}", path.display(), e);
        }
    }
}

/// Delete the figure file of a removed role, if it had one.
pub fn discard_figure(entry: &RoleEntry) {
    if let Some(figure) = &entry.figure {
        remove_figure_file(figure);
    }
}
