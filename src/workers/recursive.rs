use tracing::{error, info, warn};

use crate::clone::CloneCtx;
use crate::fetch::{extract_links, is_html, is_safe_relative, join_url};
use crate::jobs::{JobTracker, worker_loop};

/// Mirror an autoindex-exposed `.git/` by walking its HTML listings.
///
/// Jobs are paths relative to the base URL; subdirectory jobs keep their
/// trailing slash. Listing responses schedule their children, anything
/// else is written to disk as-is.
pub(crate) fn recursive_worker(ctx: &CloneCtx, jt: &JobTracker) {
    worker_loop(jt, |job| recursive_job(ctx, jt, job));
}

fn recursive_job(ctx: &CloneCtx, jt: &JobTracker, path: &str) {
    ctx.gate.wait_if_limited();

    if path.is_empty() || !is_safe_relative(path.trim_end_matches('/')) {
        return;
    }

    let uri = join_url(&ctx.base_url, path);
    let fetched = match ctx.fetcher.get(&uri) {
        Ok(f) => f,
        Err(err) => {
            warn!(uri = %uri, err = %err, "failed to fetch");
            return;
        }
    };
    if fetched.ratelimited() {
        ctx.gate.trip();
        jt.add_job(path);
        return;
    }
    if !fetched.ok() {
        warn!(uri = %uri, code = fetched.status.as_u16(), "failed to fetch");
        return;
    }

    if is_html(&fetched.body) {
        let mut request_path = match reqwest::Url::parse(&uri) {
            Ok(u) => u.path().to_string(),
            Err(_) => format!("/{}", path),
        };
        if !request_path.ends_with('/') {
            request_path.push('/');
        }
        for child in extract_links(&fetched.body, &request_path) {
            jt.add_job(join_url(path.trim_end_matches('/'), &child));
        }
        return;
    }

    let local = ctx.base_dir.join(path);
    if local.exists() {
        return;
    }
    if let Err(err) = super::write_local(&local, &fetched.body) {
        error!(file = %path, err = %err, "couldn't write file");
        return;
    }
    info!(file = %path, "fetched file");
}
