//! Vault data model.
//!
//! A vault is a flat list of credential entries plus metadata. It only
//! exists in plaintext inside the manager during a read or a mutation;
//! at rest it is always a sealed blob.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

use sealvault_common::UserId;

/// Current vault format version.
pub const FORMAT_VERSION: u32 = 1;

/// Replaces passwords in exports that exclude them.
pub const REDACTED: &str = "[REDACTED]";

/// Window used by [`VaultData::stats`] for "recently updated".
pub const RECENT_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultMetadata {
    pub user_id: UserId,
    pub total_entries: usize,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    /// Assigned on creation, never changed.
    pub id: String,
    pub title: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for a new entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntry {
    pub title: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl NewEntry {
    pub fn new(
        title: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tags: Option<Vec<String>>,
    pub url: Option<String>,
    pub notes: Option<String>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.tags.is_none()
            && self.url.is_none()
            && self.notes.is_none()
    }
}

/// Search filter. All given criteria must match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Case-insensitive substring of the title or the username.
    pub text: Option<String>,
    /// Case-insensitive substring of the title.
    pub title: Option<String>,
    /// Case-insensitive substring of the username.
    pub username: Option<String>,
    /// Entry must carry at least one of these. Empty means no tag filter.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, entry: &VaultEntry) -> bool {
        fn contains(haystack: &str, needle: &str) -> bool {
            haystack.to_lowercase().contains(&needle.to_lowercase())
        }

        if let Some(text) = &self.text {
            if !contains(&entry.title, text) && !contains(&entry.username, text) {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if !contains(&entry.title, title) {
                return false;
            }
        }
        if let Some(username) = &self.username {
            if !contains(&entry.username, username) {
                return false;
            }
        }
        self.tags.is_empty() || self.tags.iter().any(|t| entry.tags.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultStats {
    pub total_entries: usize,
    /// Entries updated within the last 30 days.
    pub recently_updated: usize,
    /// Distinct tags, sorted.
    pub tags: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultExport {
    pub exported_at: DateTime<Utc>,
    pub includes_passwords: bool,
    pub metadata: VaultMetadata,
    pub entries: Vec<VaultEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
}

/// Decrypted vault contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultData {
    pub entries: Vec<VaultEntry>,
    pub metadata: VaultMetadata,
}

impl VaultData {
    /// An empty vault for `user`.
    pub fn empty(user: UserId) -> Self {
        let now = Utc::now();
        Self {
            entries: Vec::new(),
            metadata: VaultMetadata {
                user_id: user,
                total_entries: 0,
                created_at: now,
                last_updated: now,
                version: FORMAT_VERSION,
            },
        }
    }

    pub fn from_json(bytes: &[u8]) -> sealvault_common::Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> sealvault_common::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Stamp metadata before a write.
    pub fn touch(&mut self) {
        self.metadata.total_entries = self.entries.len();
        self.metadata.last_updated = Utc::now();
    }

    pub fn entry(&self, id: &str) -> Option<&VaultEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Append a new entry and return it.
    pub fn add(&mut self, new: NewEntry) -> &VaultEntry {
        let now = Utc::now();
        self.entries.push(VaultEntry {
            id: Uuid::new_v4().to_string(),
            title: new.title,
            username: new.username,
            password: new.password,
            tags: new.tags,
            url: new.url,
            notes: new.notes,
            created_at: now,
            updated_at: now,
        });
        let last = self.entries.len() - 1;
        &self.entries[last]
    }

    /// Apply `patch` to the entry with `id`. `None` if absent.
    pub fn update(&mut self, id: &str, patch: EntryPatch) -> Option<&VaultEntry> {
        let entry = self.entries.iter_mut().find(|e| e.id == id)?;

        if let Some(title) = patch.title {
            entry.title = title;
        }
        if let Some(username) = patch.username {
            entry.username = username;
        }
        if let Some(password) = patch.password {
            entry.password = password;
        }
        if let Some(tags) = patch.tags {
            entry.tags = tags;
        }
        if let Some(url) = patch.url {
            entry.url = Some(url);
        }
        if let Some(notes) = patch.notes {
            entry.notes = Some(notes);
        }
        entry.updated_at = Utc::now();

        Some(entry)
    }

    /// Remove the entry with `id`, returning it.
    pub fn remove(&mut self, id: &str) -> Option<VaultEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<VaultEntry> {
        self.entries
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> VaultStats {
        let cutoff = Utc::now() - Duration::days(RECENT_WINDOW_DAYS);
        let tags: BTreeSet<&String> = self.entries.iter().flat_map(|e| &e.tags).collect();

        VaultStats {
            total_entries: self.entries.len(),
            recently_updated: self
                .entries
                .iter()
                .filter(|e| e.updated_at >= cutoff)
                .count(),
            tags: tags.into_iter().cloned().collect(),
            last_updated: self.metadata.last_updated,
        }
    }

    /// Snapshot for export. Without passwords, each password is replaced
    /// by [`REDACTED`] so the shape stays the same.
    pub fn export(&self, include_passwords: bool) -> VaultExport {
        let mut entries = self.entries.clone();
        if !include_passwords {
            for entry in &mut entries {
                entry.password = REDACTED.to_string();
            }
        }

        VaultExport {
            exported_at: Utc::now(),
            includes_passwords: include_passwords,
            metadata: self.metadata.clone(),
            entries,
        }
    }

    /// Check internal consistency. Never fails; problems are listed.
    pub fn check_integrity(&self) -> IntegrityReport {
        let mut issues = Vec::new();

        if self.metadata.total_entries != self.entries.len() {
            issues.push(format!(
                "metadata reports {} entries but vault holds {}",
                self.metadata.total_entries,
                self.entries.len()
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.entries {
            if !seen.insert(entry.id.as_str()) {
                issues.push(format!("duplicate entry id {}", entry.id));
            }

            let missing: Vec<&str> = [
                ("title", &entry.title),
                ("username", &entry.username),
                ("password", &entry.password),
            ]
            .into_iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
            .collect();

            if !missing.is_empty() {
                issues.push(format!(
                    "entry {} has empty {}",
                    entry.id,
                    missing.join(", ")
                ));
            }
        }

        IntegrityReport {
            is_valid: issues.is_empty(),
            issues,
        }
    }
}
