//! Filesystem primitive: destination layout, name sanitizing, timestamps.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::clock::system_time_from_unix;
use crate::hierarchy::{RemoteItem, RemoteNode};

/// Longest file name most filesystems accept, in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

const FALLBACK_NAME: &str = "unnamed";

const RESERVED_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Makes a remote title or file name safe to use as one path segment.
///
/// Separators and characters Windows rejects become `_`, leading and trailing
/// dots and spaces are stripped, reserved device names get a `_` prefix and the
/// result is cut to [`MAX_FILENAME_BYTES`] keeping the extension.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c| c == '.' || c == ' ');
    if trimmed.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    let stem = trimmed.split('.').next().unwrap_or(trimmed);
    let mut sanitized = if RESERVED_NAMES.contains(&stem.to_ascii_uppercase().as_str()) {
        format!("_{trimmed}")
    } else {
        trimmed.to_string()
    };

    if sanitized.len() > MAX_FILENAME_BYTES {
        sanitized = truncate_keeping_extension(&sanitized, MAX_FILENAME_BYTES);
    }
    sanitized
}

fn truncate_keeping_extension(name: &str, limit: usize) -> String {
    let extension = match name.rfind('.') {
        Some(pos) if pos > 0 && name.len() - pos < limit => &name[pos..],
        _ => "",
    };
    let stem = &name[..name.len() - extension.len()];
    let mut cut = limit - extension.len();
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{extension}", &stem[..cut])
}

/// Directory a gallery's items are written to.
///
/// The layout mirrors the remote tree below the account root:
/// `output / folder titles / gallery title`.
#[must_use]
pub fn gallery_dir(output_dir: &Path, gallery: &RemoteNode) -> PathBuf {
    let mut path = output_dir.to_path_buf();
    for segment in gallery.path.iter().skip(1) {
        path.push(sanitize_filename(segment));
    }
    if !gallery.path.is_empty() {
        path.push(sanitize_filename(&gallery.title));
    }
    path
}

/// Inserts ` (id)` before the extension of `name`: `IMG.jpg` becomes `IMG (p2).jpg`.
#[must_use]
pub fn with_id_suffix(name: &str, id: &str) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(pos) if pos > 0 => name.split_at(pos),
        _ => (name, ""),
    };
    sanitize_filename(&format!("{stem} ({id}){extension}"))
}

/// Assigns every gallery and item a local path no other one uses.
///
/// Paths are compared case-insensitively. The first claimant keeps the plain
/// name; later ones get their remote id appended, so the mapping only depends
/// on the enumeration order.
#[derive(Debug, Default)]
pub struct DestinationMap {
    galleries: HashMap<String, String>,
    files: HashSet<String>,
}

impl DestinationMap {
    /// Directory for `gallery`, suffixed with its id when another gallery
    /// already owns the plain one.
    pub fn gallery_dir(&mut self, output_dir: &Path, gallery: &RemoteNode) -> PathBuf {
        let plain = gallery_dir(output_dir, gallery);
        let owner = self
            .galleries
            .entry(collision_key(&plain))
            .or_insert_with(|| gallery.id.clone());
        if *owner == gallery.id || gallery.path.is_empty() {
            return plain;
        }

        let title = suffixed_title(&gallery.title, &gallery.id);
        let suffixed = plain.with_file_name(title);
        debug!(
            gallery_id = %gallery.id,
            path = %suffixed.display(),
            "gallery title collides with a sibling"
        );
        self.galleries
            .insert(collision_key(&suffixed), gallery.id.clone());
        suffixed
    }

    /// Path for `item` inside `dir`, suffixed with the item id on collision.
    pub fn claim(&mut self, dir: &Path, item: &RemoteItem) -> PathBuf {
        let name = sanitize_filename(&item.file_name);
        let mut candidate = dir.join(&name);
        let mut round = 1;
        while !self.files.insert(collision_key(&candidate)) {
            let id = if round == 1 {
                item.id.clone()
            } else {
                format!("{}-{round}", item.id)
            };
            candidate = dir.join(with_id_suffix(&name, &id));
            round += 1;
        }
        if round > 1 {
            debug!(
                item_id = %item.id,
                path = %candidate.display(),
                "file name collides with another item"
            );
        }
        candidate
    }
}

fn suffixed_title(title: &str, id: &str) -> String {
    sanitize_filename(&format!("{title} ({id})"))
}

fn collision_key(path: &Path) -> String {
    path.to_string_lossy().to_lowercase()
}

/// Whether `path` exists. Errors while checking count as absent.
pub async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// Sets the modification time of `path` to `unix_seconds`.
///
/// # Errors
///
/// Returns the I/O error from opening the file or updating its times.
pub async fn set_timestamp(path: &Path, unix_seconds: i64) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let modified = system_time_from_unix(unix_seconds);
    tokio::task::spawn_blocking(move || {
        let file = std::fs::OpenOptions::new().write(true).open(&path)?;
        file.set_modified(modified)?;
        debug!(path = %path.display(), unix_seconds, "timestamp set");
        Ok(())
    })
    .await
    .map_err(std::io::Error::other)?
}
