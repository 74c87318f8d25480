use tracing::{error, info, warn};

use crate::clone::CloneCtx;
use crate::fetch::{is_html, is_safe_relative, join_url};
use crate::gitdir::OBJECT_HASH_RE;
use crate::jobs::{JobTracker, worker_loop};

/// Probe candidate ref paths, persist the ones that validate, and feed
/// every hash they mention into the clone's ref accumulator. Symbolic refs
/// enqueue their target (and its reflog) as further candidates.
pub(crate) fn ref_worker(ctx: &CloneCtx, jt: &JobTracker) {
    worker_loop(jt, |job| ref_job(ctx, jt, job));
}

fn ref_job(ctx: &CloneCtx, jt: &JobTracker, path: &str) {
    ctx.gate.wait_if_limited();

    if path.is_empty() || !is_safe_relative(path) {
        return;
    }

    let uri = join_url(&ctx.base_url, path);
    let fetched = match ctx.fetcher.get(&uri) {
        Ok(f) => f,
        Err(err) => {
            warn!(uri = %uri, err = %err, "failed to fetch ref");
            return;
        }
    };
    if fetched.ratelimited() {
        ctx.gate.trip();
        jt.add_job(path);
        return;
    }
    if !fetched.ok() || is_html(&fetched.body) {
        return;
    }

    let text = String::from_utf8_lossy(&fetched.body).into_owned();
    let symbolic = text.starts_with("ref:");
    if !symbolic && !OBJECT_HASH_RE.is_match(&text) {
        return;
    }

    if let Err(err) = super::write_local(&ctx.base_dir.join(path), &fetched.body) {
        error!(file = %path, err = %err, "couldn't write ref file");
        return;
    }
    info!(file = %path, "fetched ref");

    {
        let mut hashes = ctx.ref_hashes.lock();
        for m in OBJECT_HASH_RE.find_iter(&text) {
            hashes.insert(m.as_str().to_string());
        }
    }

    if symbolic {
        let target = text["ref:".len()..].trim();
        if target.starts_with("refs/") && is_safe_relative(target) {
            jt.add_job(format!(".git/{}", target));
            jt.add_job(format!(".git/logs/{}", target));
        }
    }
}
