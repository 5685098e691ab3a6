//! Browse session: the navigation state of one client.
//!
//! Owned by the caller and passed around explicitly. The service layer never
//! holds one, so two clients browsing the same bucket never share state.

use crate::models::entry::{FileEntry, FolderEntry, Listing};
use crate::services::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    Name,
    #[default]
    Date,
    Size,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// A listing row, folders and files side by side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    Folder(FolderEntry),
    File(FileEntry),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Folder(folder) => &folder.name,
            Entry::File(file) => &file.name,
        }
    }

    fn size(&self) -> u64 {
        match self {
            Entry::Folder(_) => 0,
            Entry::File(file) => file.size,
        }
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        match self {
            Entry::Folder(_) => None,
            Entry::File(file) => Some(file.last_modified),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseSession {
    current_path: String,
    pub sort_by: SortBy,
}

impl BrowseSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current folder, without trailing separator; `""` is the root.
    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    pub fn navigate(&mut self, path: &str) {
        self.current_path = paths::trim_folder(path.trim_start_matches(paths::SEPARATOR)).to_string();
    }

    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        let mut crumbs = vec![Breadcrumb {
            name: "/".into(),
            path: String::new(),
        }];
        let mut path = String::new();
        for part in self.current_path.split(paths::SEPARATOR).filter(|p| !p.is_empty()) {
            if !path.is_empty() {
                path.push(paths::SEPARATOR);
            }
            path.push_str(part);
            crumbs.push(Breadcrumb {
                name: part.to_string(),
                path: path.clone(),
            });
        }
        crumbs
    }

    /// Folders first, then files, each ordered by the session's sort key.
    pub fn sorted_entries(&self, listing: Listing) -> Vec<Entry> {
        let mut entries: Vec<Entry> = listing
            .folders
            .into_iter()
            .map(Entry::Folder)
            .chain(listing.files.into_iter().map(Entry::File))
            .collect();

        let sort_by = self.sort_by;
        entries.sort_by(|a, b| {
            let kind = matches!(b, Entry::Folder(_)).cmp(&matches!(a, Entry::Folder(_)));
            kind.then_with(|| match sort_by {
                SortBy::Name => a.name().cmp(b.name()),
                SortBy::Date => b.modified().cmp(&a.modified()),
                SortBy::Size => b.size().cmp(&a.size()),
            })
            .then_with(|| a.name().cmp(b.name()))
        });
        entries
    }
}

/// Human readable size with two decimals at most.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    if bytes == 0 {
        return "0 Bytes".into();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, UNITS[unit])
}
