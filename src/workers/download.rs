use tracing::{error, info, warn};

use crate::clone::CloneCtx;
use crate::fetch::{is_empty_body, is_html, is_safe_relative, join_url};
use crate::jobs::{JobTracker, worker_loop};

/// Mirror path jobs under the target directory.
///
/// The permissive variant (`allow_html`, `allow_empty` set) is used by the
/// recovery pass, where real site files may legitimately be HTML or empty.
pub(crate) fn download_worker(
    ctx: &CloneCtx,
    jt: &JobTracker,
    allow_html: bool,
    allow_empty: bool,
) {
    worker_loop(jt, |job| download_job(ctx, jt, job, allow_html, allow_empty));
}

fn download_job(ctx: &CloneCtx, jt: &JobTracker, path: &str, allow_html: bool, allow_empty: bool) {
    ctx.gate.wait_if_limited();

    if path.is_empty() {
        return;
    }
    if !is_safe_relative(path) {
        warn!(file = %path, "refusing path outside the target directory");
        return;
    }

    let local = ctx.base_dir.join(path);
    if local.exists() {
        return;
    }

    let uri = join_url(&ctx.base_url, path);
    let fetched = match ctx.fetcher.get(&uri) {
        Ok(f) => f,
        Err(err) => {
            warn!(uri = %uri, err = %err, "failed to fetch file");
            return;
        }
    };
    if fetched.ratelimited() {
        ctx.gate.trip();
        jt.add_job(path);
        return;
    }
    if !fetched.ok() {
        warn!(uri = %uri, code = fetched.status.as_u16(), "failed to fetch file");
        return;
    }
    if !allow_html && is_html(&fetched.body) {
        warn!(uri = %uri, "file appears to be html, skipping");
        return;
    }
    if !allow_empty && is_empty_body(&fetched.body) {
        warn!(uri = %uri, "file appears to be empty, skipping");
        return;
    }

    if let Err(err) = super::write_local(&local, &fetched.body) {
        error!(file = %path, err = %err, "couldn't write file");
        return;
    }
    info!(file = %path, "fetched file");
}
