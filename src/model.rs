//! Store-facing value types.
//! A `FileRecord` is an immutable snapshot of one remote object at listing time.

use serde::{Deserialize, Serialize};

/// Mime type the store uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Prefix shared by workspace-native types (documents, sheets, folders...).
/// These carry no fingerprint and never take part in grouping.
pub const NATIVE_MIME_PREFIX: &str = "application/vnd.google-apps.";

/// One remote object as reported by the paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    /// Ordered parent folder ids; the first entry is treated as canonical.
    #[serde(default)]
    pub parent_ids: Vec<String>,
    /// Store-supplied content checksum (MD5 on Google Drive).
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
    /// RFC 3339 timestamp as supplied by the store.
    #[serde(default)]
    pub modified_time: String,
}

impl FileRecord {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }

    /// Workspace-native documents and folders.
    pub fn is_native(&self) -> bool {
        self.mime_type.starts_with(NATIVE_MIME_PREFIX)
    }

    /// True when the record can ever be part of a duplicate group.
    pub fn participates(&self) -> bool {
        !self.is_native() && self.fingerprint.as_deref().is_some_and(|f| !f.is_empty())
    }

    /// Canonical parent: the first listed parent id.
    pub fn primary_parent(&self) -> Option<&str> {
        self.parent_ids.first().map(String::as_str)
    }
}

/// A `FileRecord` together with its resolved absolute path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedFile {
    pub record: FileRecord,
    pub path: String,
}

impl ResolvedFile {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

/// Permission level of the active credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScope {
    /// Metadata or read-only access; listing works, mutations do not.
    ReadOnly,
    /// Full access including folder creation, moves and renames.
    Full,
}

impl AuthScope {
    pub fn can_move(self) -> bool {
        matches!(self, AuthScope::Full)
    }
}

impl std::fmt::Display for AuthScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AuthScope::ReadOnly => "read-only",
            AuthScope::Full => "full",
        })
    }
}

/// One page of the paginated listing call.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub records: Vec<FileRecord>,
    pub next_page_token: Option<String>,
}

/// Direct child of a folder, used for name lookups in destination folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}
