//! Worker routines run in scoped pools over one [`crate::jobs::JobTracker`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

mod download;
mod objects;
mod recursive;
mod refs;

pub(crate) use download::download_worker;
pub(crate) use objects::object_worker;
pub(crate) use recursive::recursive_worker;
pub(crate) use refs::ref_worker;

pub(crate) fn write_local(path: &Path, body: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    fs::write(path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
