//! Uploaded file storage with collision-free naming

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Filesystem store for raw uploads
///
/// Stored names double as collection identifiers, so a name is never reused
/// while a file with that name exists.
#[derive(Debug, Clone)]
pub struct FileStore {
    upload_dir: PathBuf,
}

impl FileStore {
    /// Create the store, creating the upload directory if needed
    pub fn new(upload_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir)?;
        Ok(Self { upload_dir })
    }

    /// Upload directory
    pub fn dir(&self) -> &Path {
        &self.upload_dir
    }

    /// Full path of a stored file
    pub fn path(&self, saved_name: &str) -> PathBuf {
        self.upload_dir.join(saved_name)
    }

    /// Whether a stored file exists
    pub fn exists(&self, saved_name: &str) -> bool {
        self.path(saved_name).is_file()
    }

    /// Save bytes under a sanitized name, returning the name actually used
    ///
    /// A name is claimed by creating the file exclusively, so concurrent saves
    /// of the same name never share a file.
    pub fn save(&self, filename: &str, content: &[u8]) -> Result<String> {
        let clean = clean_filename(filename);
        let (mut file, saved_name) = self.claim_name(&clean)?;

        file.write_all(content)?;
        tracing::info!(
            "Stored upload '{}' as '{}' ({} bytes)",
            filename,
            saved_name,
            content.len()
        );

        Ok(saved_name)
    }

    /// Sorted names of all stored files
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.upload_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.upload_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Remove a stored file, returning whether it existed
    pub fn delete(&self, saved_name: &str) -> Result<bool> {
        let path = self.path(saved_name);
        if path.is_file() {
            fs::remove_file(&path)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// First name that can be created: `name`, then `{stem}_{unix_secs}{ext}`,
    /// then `{stem}_{unix_secs}_{n}{ext}`
    fn claim_name(&self, clean: &str) -> Result<(File, String)> {
        if let Some(file) = self.create_new(clean)? {
            return Ok((file, clean.to_string()));
        }

        let (stem, ext) = split_extension(clean);
        let timestamp = chrono::Utc::now().timestamp();

        let candidate = format!("{}_{}{}", stem, timestamp, ext);
        if let Some(file) = self.create_new(&candidate)? {
            return Ok((file, candidate));
        }

        let mut counter = 1u32;
        loop {
            let candidate = format!("{}_{}_{}{}", stem, timestamp, counter, ext);
            if let Some(file) = self.create_new(&candidate)? {
                return Ok((file, candidate));
            }
            counter += 1;
        }
    }

    /// Create `name` exclusively; `None` when it is already taken
    fn create_new(&self, name: &str) -> Result<Option<File>> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))
        {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Keep only the final path component, trim the stem and replace spaces with `_`
pub fn clean_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let (stem, ext) = split_extension(base);
    let stem = stem.trim().replace(' ', "_");
    let stem = match stem.as_str() {
        "" | "." | ".." => "upload".to_string(),
        _ => stem,
    };

    format!("{}{}", stem, ext)
}

/// Split `report.final.pdf` into (`report.final`, `.pdf`); dotfiles have no extension
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    }
}
