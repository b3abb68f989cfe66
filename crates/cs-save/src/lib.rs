//! cs-save: snapshot files for response chains
//!
//! Writes response chains to a tagged JSON file and reads them back. Callers
//! are stored by id only; on load, ids unknown to the registry become
//! unresolved references that link up once the caller registers.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use cs_core::{CallerRef, CallerRegistry, Generator, Input, Response};

/// Tag every snapshot file carries in its `_header` field.
pub const SNAPSHOT_TAG: &str = "chainscope/responses@1";

/// Fields every serialized response node must carry.
const REQUIRED_FIELDS: [&str; 3] = ["caller", "input", "output"];

/// Snapshot errors
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Snapshot file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid snapshot format: {0}")]
    InvalidFormat(String),
}

/// Snapshot envelope without its responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    #[serde(rename = "_header")]
    pub tag: String,
    /// RFC 3339 time of writing
    pub timestamp: String,
    /// Number of top-level responses
    #[serde(skip)]
    pub count: usize,
}

impl SnapshotHeader {
    fn now(count: usize) -> Self {
        Self {
            tag: SNAPSHOT_TAG.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            count,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.tag != SNAPSHOT_TAG {
            return Err(SnapshotError::InvalidFormat(format!(
                "expected header {SNAPSHOT_TAG:?}, found {:?}",
                self.tag
            )));
        }
        Ok(())
    }

    /// Parsed write time, if the timestamp is well formed.
    pub fn written_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// Complete snapshot document.
#[derive(Serialize)]
struct SnapshotFile {
    #[serde(flatten)]
    header: SnapshotHeader,
    responses: Vec<Value>,
}

/// Build the snapshot document for `responses`.
pub fn render_responses(responses: &[Arc<Response>]) -> Value {
    let file = SnapshotFile {
        header: SnapshotHeader::now(responses.len()),
        responses: responses.iter().map(|r| r.to_json()).collect(),
    };
    serde_json::to_value(file).unwrap_or(Value::Null)
}

/// Save responses to a pretty-printed snapshot file
pub fn write_responses(path: impl AsRef<Path>, responses: &[Arc<Response>]) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &render_responses(responses))?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), count = responses.len(), "snapshot.write");
    Ok(())
}

/// Save responses to a compact snapshot file (no pretty printing)
pub fn write_responses_compact(
    path: impl AsRef<Path>,
    responses: &[Arc<Response>],
) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &render_responses(responses))?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), count = responses.len(), "snapshot.write_compact");
    Ok(())
}

/// Load responses from a snapshot file
pub fn read_responses(
    path: impl AsRef<Path>,
    registry: &mut CallerRegistry,
) -> Result<Vec<Arc<Response>>, SnapshotError> {
    let path = path.as_ref();
    let document = read_document(path)?;
    let responses = restore_document(&document, registry)?;
    tracing::debug!(
        path = %path.display(),
        count = responses.len(),
        unresolved = responses.iter().filter(|r| !r.is_resolved()).count(),
        "snapshot.read"
    );
    Ok(responses)
}

/// Load only the envelope of a snapshot file
pub fn read_header(path: impl AsRef<Path>) -> Result<SnapshotHeader, SnapshotError> {
    let document = read_document(path.as_ref())?;
    let (header, responses) = split_document(&document)?;
    Ok(SnapshotHeader {
        count: responses.len(),
        ..header
    })
}

/// Restore responses from snapshot text.
pub fn parse_responses(
    text: &str,
    registry: &mut CallerRegistry,
) -> Result<Vec<Arc<Response>>, SnapshotError> {
    let document: Value = serde_json::from_str(text)?;
    restore_document(&document, registry)
}

/// Get the default snapshot path for a name
pub fn default_snapshot_path(name: &str) -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("chainscope");
    path.push("snapshots");
    path.push(format!("{}.json", name));
    path
}

fn read_document(path: &Path) -> Result<Value, SnapshotError> {
    let file = File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => SnapshotError::NotFound(path.to_path_buf()),
        _ => SnapshotError::Io(e),
    })?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn split_document(document: &Value) -> Result<(SnapshotHeader, &Vec<Value>), SnapshotError> {
    let Some(object) = document.as_object() else {
        return Err(SnapshotError::InvalidFormat("snapshot is not an object".into()));
    };
    let header = SnapshotHeader {
        tag: object
            .get("_header")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        timestamp: object
            .get("timestamp")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        count: 0,
    };
    header.validate()?;
    let responses = object
        .get("responses")
        .and_then(Value::as_array)
        .ok_or_else(|| SnapshotError::InvalidFormat("missing responses array".into()))?;
    Ok((header, responses))
}

fn restore_document(
    document: &Value,
    registry: &mut CallerRegistry,
) -> Result<Vec<Arc<Response>>, SnapshotError> {
    let (_, nodes) = split_document(document)?;
    registry.prune();
    nodes
        .iter()
        .enumerate()
        .map(|(i, node)| restore_node(node, registry, &format!("responses[{i}]")))
        .collect()
}

/// Fields besides `caller` that mark an object as a serialized response.
const RESPONSE_MARKERS: [&str; 5] = ["input", "output", "level", "root", "generator"];

/// An input is a nested response when it names its caller as a string and
/// carries at least one other response field. Any other object is a seed.
fn is_response_shaped(value: &Value) -> bool {
    value.as_object().is_some_and(|o| {
        o.get("caller").is_some_and(Value::is_string)
            && RESPONSE_MARKERS.iter().any(|f| o.contains_key(*f))
    })
}

fn restore_node(
    node: &Value,
    registry: &mut CallerRegistry,
    at: &str,
) -> Result<Arc<Response>, SnapshotError> {
    let object: &Map<String, Value> = node
        .as_object()
        .ok_or_else(|| SnapshotError::InvalidFormat(format!("{at}: expected an object")))?;
    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(SnapshotError::InvalidFormat(format!("{at}: missing {field}")));
        }
    }
    let id = object["caller"]
        .as_str()
        .ok_or_else(|| SnapshotError::InvalidFormat(format!("{at}: caller is not a string")))?;

    let raw_input = &object["input"];
    let input = if is_response_shaped(raw_input) {
        Input::Step(restore_node(raw_input, registry, &format!("{at}.input"))?)
    } else {
        Input::Seed(raw_input.clone())
    };

    let generator = object
        .get("generator")
        .and_then(Value::as_str)
        .and_then(|tag| tag.parse::<Generator>().ok())
        .unwrap_or(Generator::Custom);

    let caller = match registry.get(id) {
        Some(caller) => CallerRef::Resolved(caller),
        None => CallerRef::Unresolved(id.to_string()),
    };
    let response = Response::from_parts(object["output"].clone(), caller, input, generator);
    if !response.is_resolved() {
        registry.defer(id, &response);
    }

    if let Some(stored) = object.get("level").and_then(Value::as_u64) {
        if stored as usize != response.level() {
            tracing::warn!(at, stored, actual = response.level(), "snapshot.level_mismatch");
        }
    }
    Ok(response)
}
