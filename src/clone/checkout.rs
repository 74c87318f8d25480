//! Working-tree materialization and the missing-file recovery loop.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::{error, info};

use crate::gitdir::{CHECKOUT_ERR_RE, ignored_candidates, is_blacklisted};
use crate::index;
use crate::jobs::JobTracker;
use crate::objects;
use crate::workers;

use super::CloneCtx;

fn run_checkout(base_dir: &Path) -> Result<Output> {
    Command::new("git")
        .args(["checkout", "."])
        .current_dir(base_dir)
        .output()
        .context("run git checkout")
}

pub(crate) fn run_checkout_strict(base_dir: &Path) -> Result<()> {
    let out = run_checkout(base_dir)?;
    if !out.status.success() {
        bail!(
            "git checkout failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }
    Ok(())
}

pub(crate) fn checkout_and_recover(ctx: &CloneCtx) -> Result<()> {
    info!(dir = %ctx.base_dir.display(), "running git checkout .");
    let out = run_checkout(&ctx.base_dir)?;
    if out.status.success() {
        return Ok(());
    }
    match out.status.code() {
        // Partial failure: some working-tree paths could not be produced
        // from the object store. Try the server's web root for them.
        Some(128) | Some(255) => {
            info!(base = %ctx.base_url, dir = %ctx.base_dir.display(), "attempting to fetch missing files");
            recover_missing(ctx, &String::from_utf8_lossy(&out.stderr))
        }
        _ => bail!(
            "git checkout failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        ),
    }
}

/// Fetch the paths checkout complained about straight from the web root,
/// sweep the index for other absentees, insert whatever landed on disk
/// into the object store, then try the same trick on `.gitignore` entries.
pub(crate) fn recover_missing(ctx: &CloneCtx, checkout_stderr: &str) -> Result<()> {
    let mut missing: Vec<String> = Vec::new();

    let jt = JobTracker::new();
    for cap in CHECKOUT_ERR_RE.captures_iter(checkout_stderr) {
        let path = cap[1].to_string();
        if !is_blacklisted(&path) {
            missing.push(path.clone());
            jt.add_job(path);
        }
    }
    run_permissive_pool(ctx, &jt);

    let index_path = ctx.store.git_dir().join("index");
    if index_path.exists() {
        let content = fs::read(&index_path)
            .with_context(|| format!("read {}", index_path.display()))?;
        match index::parse_index(&content) {
            Ok(entries) => {
                let jt = JobTracker::new();
                for entry in entries {
                    if !is_blacklisted(&entry.path) && !ctx.base_dir.join(&entry.path).exists()
                    {
                        missing.push(entry.path.clone());
                        jt.add_job(entry.path);
                    }
                }
                run_permissive_pool(ctx, &jt);
            }
            Err(err) => error!(dir = %ctx.base_dir.display(), err = %err, "couldn't decode git index"),
        }
    }

    // Files we just pulled from the web root are not in the object store
    // yet; a later checkout only sees them once their blob form is.
    for path in &missing {
        let local = ctx.base_dir.join(path);
        if !local.is_file() {
            continue;
        }
        let content = match fs::read(&local) {
            Ok(c) => c,
            Err(err) => {
                error!(file = %path, err = %err, "couldn't read recovered file");
                continue;
            }
        };
        let hash = objects::blob_hash(&content);
        if ctx.store.has_object(&hash) {
            continue;
        }
        match ctx.store.put_blob(&content) {
            Ok(hash) => info!(obj = %hash, file = %path, "created object from recovered file"),
            Err(err) => error!(file = %path, err = %err, "couldn't create object"),
        }
    }

    let ignore_path = ctx.base_dir.join(".gitignore");
    if ignore_path.exists() {
        info!(dir = %ctx.base_dir.display(), "attempting to fetch ignored files");
        let content = fs::read_to_string(&ignore_path).context("read .gitignore")?;
        let jt = JobTracker::new();
        for candidate in ignored_candidates(&content) {
            jt.add_job(candidate);
        }
        run_permissive_pool(ctx, &jt);
    }

    Ok(())
}

fn run_permissive_pool(ctx: &CloneCtx, jt: &JobTracker) {
    let queued = jt.queued_jobs();
    if queued == 0 {
        return;
    }
    let pool = ctx.max_concurrency.min(queued);
    jt.start_and_wait(pool, || workers::download_worker(ctx, jt, true, true));
}
