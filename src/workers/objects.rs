use tracing::{debug, error, info, warn};

use crate::clone::CloneCtx;
use crate::fetch::{is_empty_body, is_html, join_url};
use crate::jobs::{JobTracker, worker_loop};

/// Walk the object graph one hash at a time.
///
/// The checked-hash set makes each hash the responsibility of exactly one
/// worker; everything an object references is fed back into the queue, so
/// the pool runs to the fixed point of the reachable graph.
pub(crate) fn object_worker(ctx: &CloneCtx, jt: &JobTracker) {
    worker_loop(jt, |job| object_job(ctx, jt, job));
}

fn object_job(ctx: &CloneCtx, jt: &JobTracker, hash: &str) {
    ctx.gate.wait_if_limited();

    let hash = hash.trim();
    if !crate::gitdir::is_hash(hash) {
        return;
    }
    if !ctx.checked.lock().insert(hash.to_string()) {
        return;
    }

    if ctx.store.has_object(hash) {
        debug!(obj = %hash, "already fetched, skipping redownload");
        enqueue_references(ctx, jt, hash);
        return;
    }

    let uri = join_url(
        &ctx.base_url,
        &format!(".git/objects/{}/{}", &hash[..2], &hash[2..]),
    );
    let fetched = match ctx.fetcher.get(&uri) {
        Ok(f) => f,
        Err(err) => {
            error!(obj = %hash, err = %err, "failed to fetch object");
            return;
        }
    };
    if fetched.ratelimited() {
        // Release the claim so the retry can win it again.
        ctx.checked.lock().remove(hash);
        ctx.gate.trip();
        jt.add_job(hash);
        return;
    }
    if !fetched.ok() {
        // Not necessarily fatal: the object may only exist inside a pack.
        warn!(obj = %hash, code = fetched.status.as_u16(), "failed to fetch object");
        return;
    }
    if is_html(&fetched.body) {
        warn!(uri = %uri, "file appears to be html, skipping");
        return;
    }
    if is_empty_body(&fetched.body) {
        warn!(uri = %uri, "file appears to be empty, skipping");
        return;
    }

    if let Err(err) = ctx.store.write_raw_object(hash, &fetched.body) {
        error!(obj = %hash, err = %err, "couldn't write object");
        return;
    }
    info!(obj = %hash, "fetched object");

    enqueue_references(ctx, jt, hash);
}

fn enqueue_references(ctx: &CloneCtx, jt: &JobTracker, hash: &str) {
    match ctx.store.read_object(hash) {
        Ok(obj) => {
            for referenced in obj.referenced_hashes() {
                jt.add_job(referenced);
            }
        }
        Err(err) => error!(obj = %hash, err = %err, "couldn't decode object"),
    }
}
