// src/resources/spec.rs

//! Resource spec file parsing.
//!
//! The spec file is a JSON document declaring the resource capacity of the
//! machine:
//!
//! ```json
//! {
//!   "version": { "major": 1, "minor": 0 },
//!   "local": [
//!     {
//!       "gpus": [ { "id": "0", "slots": 2 }, { "id": "1" } ],
//!       "crypto_chips": [ { "id": "card0", "slots": 4 } ]
//!     }
//!   ]
//! }
//! ```
//!
//! Every structural deviation maps to a distinct [`ResourceSpecError`] so the
//! caller can report exactly what is wrong.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static RESOURCE_TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z_][a-z0-9_]*$").expect("valid resource type regex"));

static RESOURCE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^[a-z0-9_]+$").expect("valid resource id regex"));

/// Why a resource spec could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpecError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("root element must be a JSON object")]
    InvalidRoot,

    #[error("\"version\" field is required")]
    NoVersion,

    #[error("\"version\" must be an object with integer \"major\" and \"minor\" fields")]
    InvalidVersion,

    #[error("unsupported version {major}.{minor} (only 1.0 is supported)")]
    UnsupportedVersion { major: i64, minor: i64 },

    #[error("\"local\" must be an array containing at most one socket object")]
    InvalidSocketSpec,

    #[error("resource type \"{0}\" must map to an array of resources")]
    InvalidResourceType(String),

    #[error("invalid resource of type \"{0}\": {1}")]
    InvalidResource(String, String),
}

/// One resource instance of a type, e.g. `gpus` id `"0"` with 2 slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecResource {
    pub id: String,
    pub capacity: u32,
}

/// The resources of a single socket, keyed by resource type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Socket {
    pub resources: BTreeMap<String, Vec<SpecResource>>,
}

/// A validated, immutable resource capacity declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceSpec {
    pub local_socket: Socket,
}

impl ResourceSpec {
    /// Read and validate a resource spec from a JSON file on disk.
    pub fn read_from_json_file(path: impl AsRef<Path>) -> Result<Self, ResourceSpecError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|_| ResourceSpecError::FileNotFound(path.display().to_string()))?;
        Self::from_json_str(&contents)
    }

    /// Parse and validate a resource spec from JSON text.
    pub fn from_json_str(contents: &str) -> Result<Self, ResourceSpecError> {
        let root: Value = serde_json::from_str(contents)
            .map_err(|e| ResourceSpecError::JsonParse(e.to_string()))?;
        Self::from_json_value(&root)
    }

    fn from_json_value(root: &Value) -> Result<Self, ResourceSpecError> {
        let root = root.as_object().ok_or(ResourceSpecError::InvalidRoot)?;

        check_version(root)?;

        let local_socket = match root.get("local") {
            None => Socket::default(),
            Some(local) => {
                let sockets = local.as_array().ok_or(ResourceSpecError::InvalidSocketSpec)?;
                match sockets.as_slice() {
                    [] => Socket::default(),
                    [socket] => parse_socket(socket)?,
                    _ => return Err(ResourceSpecError::InvalidSocketSpec),
                }
            }
        };

        Ok(Self { local_socket })
    }
}

fn check_version(root: &Map<String, Value>) -> Result<(), ResourceSpecError> {
    let version = root.get("version").ok_or(ResourceSpecError::NoVersion)?;
    let version = version.as_object().ok_or(ResourceSpecError::InvalidVersion)?;

    let major = version
        .get("major")
        .and_then(Value::as_i64)
        .ok_or(ResourceSpecError::InvalidVersion)?;
    let minor = version
        .get("minor")
        .and_then(Value::as_i64)
        .ok_or(ResourceSpecError::InvalidVersion)?;

    if (major, minor) != (1, 0) {
        return Err(ResourceSpecError::UnsupportedVersion { major, minor });
    }
    Ok(())
}

fn parse_socket(socket: &Value) -> Result<Socket, ResourceSpecError> {
    let socket = socket.as_object().ok_or(ResourceSpecError::InvalidSocketSpec)?;

    let mut resources = BTreeMap::new();
    for (type_name, entries) in socket {
        // Keys that are not resource type identifiers are reserved for
        // future extensions and ignored.
        if !RESOURCE_TYPE_NAME.is_match(type_name) {
            continue;
        }

        let entries = entries
            .as_array()
            .ok_or_else(|| ResourceSpecError::InvalidResourceType(type_name.clone()))?;

        let parsed = entries
            .iter()
            .map(|entry| parse_resource(type_name, entry))
            .collect::<Result<Vec<_>, _>>()?;

        resources.insert(type_name.clone(), parsed);
    }

    Ok(Socket { resources })
}

fn parse_resource(type_name: &str, entry: &Value) -> Result<SpecResource, ResourceSpecError> {
    let invalid = |why: &str| ResourceSpecError::InvalidResource(type_name.to_string(), why.to_string());

    let entry = entry.as_object().ok_or_else(|| invalid("entry must be an object"))?;

    let id = entry
        .get("id")
        .ok_or_else(|| invalid("\"id\" is required"))?
        .as_str()
        .ok_or_else(|| invalid("\"id\" must be a string"))?;
    if !RESOURCE_ID.is_match(id) {
        return Err(invalid("\"id\" must match [a-z0-9_]+"));
    }

    let capacity = match entry.get("slots") {
        None => 1,
        Some(slots) => slots
            .as_u64()
            .and_then(|s| u32::try_from(s).ok())
            .ok_or_else(|| invalid("\"slots\" must be a non-negative integer"))?,
    };

    Ok(SpecResource {
        id: id.to_string(),
        capacity,
    })
}
