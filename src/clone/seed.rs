//! Object-set seeding: mine candidate hashes out of everything fetched so
//! far before the graph walk starts.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::gitdir::{OBJECT_HASH_RE, REFLOG_RE};
use crate::index;

use super::CloneCtx;

pub(crate) fn seed_object_set(ctx: &CloneCtx) -> Result<HashSet<String>> {
    info!(base = %ctx.base_url, "finding objects");
    let git_dir = ctx.store.git_dir();
    let mut objs = HashSet::new();

    let mut files: Vec<PathBuf> = [
        "packed-refs",
        "info/refs",
        "FETCH_HEAD",
        "ORIG_HEAD",
        "HEAD",
    ]
    .iter()
    .map(|name| git_dir.join(name))
    .collect();

    let refs_dir = git_dir.join("refs");
    if refs_dir.exists() {
        walk_files(&refs_dir, &mut files)?;
    }

    let logs_dir = git_dir.join("logs");
    if logs_dir.exists() {
        let mut log_files = Vec::new();
        walk_files(&logs_dir, &mut log_files)?;
        synthesize_refs_from_reflogs(ctx, &log_files);
        files.extend(log_files);
    }

    for file in &files {
        if !file.exists() {
            continue;
        }
        let content =
            fs::read(file).with_context(|| format!("read {}", file.display()))?;
        let text = String::from_utf8_lossy(&content);
        for m in OBJECT_HASH_RE.find_iter(&text) {
            objs.insert(m.as_str().trim().to_string());
        }
    }

    let index_path = git_dir.join("index");
    if index_path.exists() {
        let content = fs::read(&index_path)
            .with_context(|| format!("read {}", index_path.display()))?;
        match index::parse_index(&content) {
            Ok(entries) => {
                for entry in entries {
                    objs.insert(entry.hash);
                }
            }
            Err(err) => error!(dir = %ctx.base_dir.display(), err = %err, "couldn't decode git index"),
        }
    }

    // Loose objects carried over from an earlier run (or mirrored
    // recursively) seed both themselves and everything they reference.
    for hash in ctx.store.loose_object_hashes()? {
        match ctx.store.read_object(&hash) {
            Ok(obj) => {
                objs.extend(obj.referenced_hashes());
                objs.insert(hash);
            }
            Err(err) => error!(obj = %hash, err = %err, "error while processing object files"),
        }
    }

    objs.extend(ctx.ref_hashes.lock().iter().cloned());
    Ok(objs)
}

/// A published reflog whose ref file was not exposed still tells us where
/// the branch points: the post-image hash of its last entry.
fn synthesize_refs_from_reflogs(ctx: &CloneCtx, log_files: &[PathBuf]) {
    let git_dir = ctx.store.git_dir();
    let reflog_root = git_dir.join("logs").join("refs");

    for log_file in log_files {
        let Ok(ref_name) = log_file.strip_prefix(&reflog_root) else {
            continue; // logs/HEAD and friends have real ref files elsewhere
        };
        let ref_path = git_dir.join("refs").join(ref_name);
        if ref_path.exists() {
            continue;
        }
        info!(
            dir = %ctx.base_dir.display(),
            refname = %ref_name.display(),
            "generating ref file"
        );

        let content = match fs::read(log_file) {
            Ok(c) => c,
            Err(err) => {
                error!(file = %log_file.display(), err = %err, "couldn't read reflog file");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&content);
        let Some(last) = REFLOG_RE.captures_iter(&text).last() else {
            continue;
        };
        let hash = last[1].to_string();

        if let Some(parent) = ref_path.parent()
            && let Err(err) = fs::create_dir_all(parent)
        {
            error!(file = %ref_path.display(), err = %err, "couldn't create parent directories");
            continue;
        }
        if let Err(err) = fs::write(&ref_path, format!("{}\n", hash)) {
            error!(file = %ref_path.display(), err = %err, "couldn't write to file");
        }
    }
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in
        fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("read dir entry in {}", dir.display()))?;
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
