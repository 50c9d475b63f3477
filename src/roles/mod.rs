//! Role catalog: the named categories a PLU can be assigned.
//!
//! Roles live in a small JSON file that survives restarts and is edited only
//! through explicit management actions, independently of device runtime state.

pub mod catalog;

pub use catalog::{discard_figure, RoleCatalog, RoleEntry};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RoleError {
    #[error("Failed to load role catalog: {0}")]
    Load(String),

    #[error("Failed to persist role catalog: {0}")]
    Persist(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid role name: {0:?}")]
    InvalidName(String),

    #[error("Figure asset error: {0}")]
    Asset(String),

    #[error("No free role id")]
    NoFreeId,
}
