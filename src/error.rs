//! Error types for quadpave.
//!
//! Every fallible operation in the crate returns [`Result`]. The variants are
//! grouped by how a caller is expected to react:
//!
//! - [`MeshError::NoRoom`]: storage for the current region is exhausted. The
//!   driver grows the capacity and re-meshes the region from scratch.
//! - [`MeshError::Topology`], [`MeshError::Classification`],
//!   [`MeshError::InvalidRegion`]: the current region is unprocessable and is
//!   skipped; other regions continue.
//! - [`MeshError::NotImplemented`]: a configuration that is deliberately not
//!   supported (holes of dimension other than one, 9-node quads).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// The kind of storage that ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Node slots.
    Nodes,
    /// Line slots.
    Lines,
    /// Element slots.
    Elements,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Nodes => f.write_str("nodes"),
            Resource::Lines => f.write_str("lines"),
            Resource::Elements => f.write_str("elements"),
        }
    }
}

/// Errors that can occur while meshing a region.
#[derive(Error, Debug)]
pub enum MeshError {
    /// Capacity for one entity kind is exhausted.
    #[error("no room for more {resource} (capacity {capacity})")]
    NoRoom {
        /// Which storage ran out.
        resource: Resource,
        /// The capacity that was exceeded.
        capacity: usize,
    },

    /// Growing the capacity did not make the region fit.
    #[error("region {region} still out of room after {attempts} capacity increases")]
    CapacityExhausted {
        /// The region id.
        region: u32,
        /// Number of growth attempts made.
        attempts: usize,
    },

    /// The mesh topology is inconsistent, or an edit would make it so.
    #[error("topology error: {0}")]
    Topology(String),

    /// The region perimeter does not fit the requested primitive shape.
    #[error("classification error: {0}")]
    Classification(String),

    /// The region boundary description itself is unusable.
    #[error("invalid region {region}: {reason}")]
    InvalidRegion {
        /// The region id.
        region: u32,
        /// Why the region was rejected.
        reason: String,
    },

    /// A configuration that is explicitly unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error loading regions from file.
    #[error("failed to load regions from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a topology error from anything printable.
    pub fn topology(message: impl Into<String>) -> Self {
        MeshError::Topology(message.into())
    }

    /// Create a classification error from anything printable.
    pub fn classification(message: impl Into<String>) -> Self {
        MeshError::Classification(message.into())
    }

    /// Whether the error asks for a capacity increase and a restart.
    pub fn is_no_room(&self) -> bool {
        matches!(self, MeshError::NoRoom { .. })
    }
}
