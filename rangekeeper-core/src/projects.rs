//! Project registry: the documents that change together with the reserved space.
//!
//! Publishing a project allocates its units and records them; unpublishing
//! releases them again. The owner index and the per-project record are
//! written in the same transaction as the reserved space, so the three
//! documents never disagree about which units a project holds.
//!
//! Layout under the state directory:
//!
//! ```text
//! projects.json                 owner -> [project id, ...]
//! projects/<id>/config.json     ProjectRecord
//! ```

use crate::error::{RangeError, Result};
use crate::range::{UnitId, UnitRange};
use crate::store::Transaction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

const INDEX_DOCUMENT: &str = "projects.json";

/// Identifier of a published project: 32 lowercase hex digits.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Generate a new random project ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parse a project ID, accepting any UUID notation.
    ///
    /// Returns `None` if the string is not a valid UUID.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s)
            .ok()
            .map(|uuid| Self(uuid.simple().to_string()))
    }

    /// The ID as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn record_document(&self) -> String {
        format!("projects/{}/config.json", self.0)
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted state of one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project identifier.
    pub id: ProjectId,
    /// Name of the owning user.
    pub owner: String,
    /// Primary unit of the allocation.
    pub port: UnitId,
    /// Remaining allocated units.
    pub port_ranges: Vec<UnitRange>,
    /// Published directory.
    #[serde(rename = "dataDir")]
    pub data_dir: PathBuf,
    /// File opened by default, if any.
    #[serde(rename = "loadFile")]
    pub load_file: Option<PathBuf>,
}

impl ProjectRecord {
    /// Every range held by the project, the primary unit first.
    pub fn ranges(&self) -> impl Iterator<Item = UnitRange> + '_ {
        std::iter::once(UnitRange::single(self.port)).chain(self.port_ranges.iter().copied())
    }
}

/// What to do with the default file when modifying a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadFileChange {
    /// Leave it as it is.
    #[default]
    Keep,
    /// Replace it.
    Set(PathBuf),
    /// Remove it.
    Clear,
}

/// Changes applied by [`modify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectChanges {
    /// New published directory.
    pub data_dir: Option<PathBuf>,
    /// Default file change.
    pub load_file: LoadFileChange,
}

/// Owner name to project IDs, in publication order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectIndex(BTreeMap<String, Vec<ProjectId>>);

impl ProjectIndex {
    /// Projects of `owner`, in publication order.
    pub fn projects_of(&self, owner: &str) -> &[ProjectId] {
        self.0.get(owner).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether `owner` has published `id`.
    pub fn owns(&self, owner: &str, id: &ProjectId) -> bool {
        self.projects_of(owner).contains(id)
    }

    fn add(&mut self, owner: &str, id: ProjectId) {
        self.0.entry(owner.to_string()).or_default().push(id);
    }

    fn remove(&mut self, owner: &str, id: &ProjectId) {
        if let Some(projects) = self.0.get_mut(owner) {
            projects.retain(|p| p != id);
            if projects.is_empty() {
                self.0.remove(owner);
            }
        }
    }

    /// Owners that have at least one project.
    pub fn owners(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Browser link to a project served by `servername`.
pub fn project_url(id: &ProjectId, servername: &str) -> String {
    format!("http://{servername}/?sessionManagerURL=http://{servername}/project/{id}")
}

/// Load the owner index; an absent index is empty.
pub fn load_index(txn: &Transaction<'_>) -> Result<ProjectIndex> {
    Ok(txn.read_document(INDEX_DOCUMENT)?.unwrap_or_default())
}

/// Allocate units for a new project and record it.
pub fn publish(
    txn: &mut Transaction<'_>,
    owner: &str,
    data_dir: PathBuf,
    load_file: Option<PathBuf>,
) -> Result<ProjectRecord> {
    let id = ProjectId::generate();
    let allocation = txn.allocate(txn.config().units_per_project)?;

    let record = ProjectRecord {
        id: id.clone(),
        owner: owner.to_string(),
        port: allocation.primary,
        port_ranges: allocation.spares,
        data_dir,
        load_file,
    };
    txn.write_document(&id.record_document(), &record)?;

    let mut index = load_index(txn)?;
    index.add(owner, id);
    txn.write_document(INDEX_DOCUMENT, &index)?;

    tracing::info!(project = %record.id, owner, port = record.port, "Published project");
    Ok(record)
}

/// Update the directory and default file of a project. Units are unchanged.
pub fn modify(
    txn: &mut Transaction<'_>,
    owner: &str,
    id: &ProjectId,
    changes: ProjectChanges,
) -> Result<ProjectRecord> {
    let mut record = show(txn, owner, id)?;
    if let Some(data_dir) = changes.data_dir {
        record.data_dir = data_dir;
    }
    match changes.load_file {
        LoadFileChange::Keep => {}
        LoadFileChange::Set(file) => record.load_file = Some(file),
        LoadFileChange::Clear => record.load_file = None,
    }
    txn.write_document(&id.record_document(), &record)?;

    tracing::info!(project = %id, owner, "Modified project");
    Ok(record)
}

/// Release a project's units and delete its documents.
///
/// Units the project no longer holds are skipped, so a project whose units
/// were freed by other means can still be removed.
pub fn unpublish(txn: &mut Transaction<'_>, owner: &str, id: &ProjectId) -> Result<ProjectRecord> {
    let record = show(txn, owner, id)?;
    let ranges: Vec<UnitRange> = record.ranges().collect();
    let partial = txn.release_lenient(&ranges);
    if !partial.is_empty() {
        tracing::warn!(
            project = %id,
            missing = ?partial,
            "Project held units that were already free"
        );
    }

    let mut index = load_index(txn)?;
    index.remove(owner, id);
    txn.write_document(INDEX_DOCUMENT, &index)?;
    txn.remove_document(&id.record_document())?;

    tracing::info!(project = %id, owner, "Unpublished project");
    Ok(record)
}

/// Records of every project `owner` has published.
pub fn list(txn: &Transaction<'_>, owner: &str) -> Result<Vec<ProjectRecord>> {
    let index = load_index(txn)?;
    index
        .projects_of(owner)
        .iter()
        .map(|id| read_record(txn, owner, id))
        .collect()
}

/// Record of one project, which must belong to `owner`.
pub fn show(txn: &Transaction<'_>, owner: &str, id: &ProjectId) -> Result<ProjectRecord> {
    if !load_index(txn)?.owns(owner, id) {
        return Err(not_found(owner, id));
    }
    read_record(txn, owner, id)
}

fn read_record(txn: &Transaction<'_>, owner: &str, id: &ProjectId) -> Result<ProjectRecord> {
    txn.read_document(&id.record_document())?
        .ok_or_else(|| not_found(owner, id))
}

fn not_found(owner: &str, id: &ProjectId) -> RangeError {
    RangeError::ProjectNotFound {
        owner: owner.to_string(),
        project: id.to_string(),
    }
}
