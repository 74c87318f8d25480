//! Local mirror of the remote `.git/` directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::objects::{self, LooseObject};

/// Filesystem view of `<base_dir>/.git`, addressed by object hash.
///
/// Writes to distinct loose-object paths never collide: each hash is
/// claimed by exactly one worker, and parent-directory creation tolerates
/// races.
#[derive(Clone)]
pub struct GitStore {
    git_dir: PathBuf,
}

impl GitStore {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            git_dir: base_dir.join(".git"),
        }
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn object_path(&self, hash: &str) -> PathBuf {
        self.git_dir
            .join("objects")
            .join(&hash[..2])
            .join(&hash[2..])
    }

    pub fn has_object(&self, hash: &str) -> bool {
        self.object_path(hash).exists()
    }

    /// Read and decode one loose object.
    pub fn read_object(&self, hash: &str) -> Result<LooseObject> {
        let path = self.object_path(hash);
        let raw = fs::read(&path).with_context(|| format!("read object {}", hash))?;
        objects::decode(&raw).with_context(|| format!("decode object {}", hash))
    }

    /// Write a downloaded loose object byte-for-byte. The body is treated
    /// as opaque; decoding happens separately so a corrupt download still
    /// lands on disk for inspection.
    pub fn write_raw_object(&self, hash: &str, body: &[u8]) -> Result<()> {
        let path = self.object_path(hash);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create object dir {}", parent.display()))?;
        }
        fs::write(&path, body).with_context(|| format!("write object {}", hash))?;
        Ok(())
    }

    /// Insert a blob computed from working-tree content, unless an object
    /// with that hash is already present.
    pub fn put_blob(&self, content: &[u8]) -> Result<String> {
        let (hash, compressed) = objects::encode_blob(content)?;
        if !self.has_object(&hash) {
            self.write_raw_object(&hash, &compressed)?;
        }
        Ok(hash)
    }

    /// Hashes of every loose object already on disk.
    pub fn loose_object_hashes(&self) -> Result<Vec<String>> {
        let objects_dir = self.git_dir.join("objects");
        let mut out = Vec::new();
        if !objects_dir.is_dir() {
            return Ok(out);
        }
        for entry in fs::read_dir(&objects_dir).context("read objects dir")? {
            let entry = entry.context("read objects dir entry")?;
            let prefix = entry.file_name();
            let prefix = prefix.to_string_lossy().into_owned();
            if prefix.len() != 2 || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
                continue; // info/, pack/
            }
            let dir = entry.path();
            for child in fs::read_dir(&dir).with_context(|| format!("read {}", dir.display()))? {
                let child = child.context("read object fanout entry")?;
                let name = child.file_name();
                let hash = format!("{}{}", prefix, name.to_string_lossy());
                if crate::gitdir::is_hash(&hash) {
                    out.push(hash);
                }
            }
        }
        Ok(out)
    }
}
