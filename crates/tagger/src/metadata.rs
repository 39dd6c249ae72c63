//! Metadata read/append through exiftool.
//!
//! Text contract: every value crossing this boundary is UTF-8. exiftool is
//! run with `-charset UTF8` (tag values) and `-charset filename=UTF8` (paths),
//! and tags are read back as JSON, so nothing depends on the host codepage.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("cannot run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} failed ({status}): {stderr}")]
    ToolFailed {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("unexpected exiftool output: {0}")]
    Parse(String),
}

/// The three keyword fields a person is written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagField {
    /// IPTC flat keywords.
    Keywords,
    /// XMP `lr:hierarchicalSubject`, `parent|child` paths.
    HierarchicalSubject,
    /// XMP `dc:subject`.
    Subject,
}

impl TagField {
    pub const ALL: [TagField; 3] = [
        TagField::Keywords,
        TagField::HierarchicalSubject,
        TagField::Subject,
    ];

    pub fn exiftool_name(self) -> &'static str {
        match self {
            TagField::Keywords => "Keywords",
            TagField::HierarchicalSubject => "HierarchicalSubject",
            TagField::Subject => "Subject",
        }
    }
}

impl fmt::Display for TagField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.exiftool_name())
    }
}

/// Append `value` to `field`, leaving existing values in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
    pub field: TagField,
    pub value: String,
}

impl TagUpdate {
    pub fn new(field: TagField, value: impl Into<String>) -> Self {
        Self { field, value: value.into() }
    }
}

/// Reads and appends a file's keyword tags.
pub trait MetadataTool {
    /// Current values of all [`TagField`]s, merged into one set.
    fn read_tags(&self, path: &Path) -> Result<BTreeSet<String>, MetadataError>;

    /// Apply all updates to one file in a single operation.
    fn append_tags(&self, path: &Path, updates: &[TagUpdate]) -> Result<(), MetadataError>;
}

/// exiftool command-line adapter.
#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
}

impl ExifTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-charset", "UTF8", "-charset", "filename=UTF8"])
            .stdin(Stdio::null());
        cmd
    }

    fn checked(&self, output: std::io::Result<Output>) -> Result<Output, MetadataError> {
        let program = self.program.display().to_string();
        let output = output.map_err(|source| MetadataError::Spawn {
            program: program.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(MetadataError::ToolFailed {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl MetadataTool for ExifTool {
    fn read_tags(&self, path: &Path) -> Result<BTreeSet<String>, MetadataError> {
        let mut cmd = self.command();
        cmd.arg("-j");
        for field in TagField::ALL {
            cmd.arg(format!("-{}", field.exiftool_name()));
        }
        let output = self.checked(cmd.arg(path).output())?;
        parse_json_tags(&output.stdout)
    }

    fn append_tags(&self, path: &Path, updates: &[TagUpdate]) -> Result<(), MetadataError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut cmd = self.command();
        cmd.arg("-overwrite_original");
        cmd.args(append_args(updates));
        self.checked(cmd.arg(path).stdout(Stdio::null()).output())?;
        Ok(())
    }
}

fn append_args(updates: &[TagUpdate]) -> Vec<String> {
    updates
        .iter()
        .map(|u| format!("-{}+={}", u.field.exiftool_name(), u.value))
        .collect()
}

/// Collect every tag value from `exiftool -j` output.
///
/// Single values arrive as scalars, lists as arrays; numeric-looking keywords
/// are emitted by exiftool as JSON numbers.
fn parse_json_tags(stdout: &[u8]) -> Result<BTreeSet<String>, MetadataError> {
    let doc: Value =
        serde_json::from_slice(stdout).map_err(|e| MetadataError::Parse(e.to_string()))?;
    let record = doc
        .as_array()
        .and_then(|files| files.first())
        .and_then(Value::as_object)
        .ok_or_else(|| MetadataError::Parse("expected a one-element JSON array".into()))?;

    let mut tags = BTreeSet::new();
    for field in TagField::ALL {
        match record.get(field.exiftool_name()) {
            Some(Value::Array(values)) => tags.extend(values.iter().filter_map(scalar_to_string)),
            Some(value) => tags.extend(scalar_to_string(value)),
            None => {}
        }
    }
    Ok(tags)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
