//! Clone driver: phase sequencing from URL normalization to recovery.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::fetch::{Fetcher, extract_links, is_html, join_url};
use crate::gitdir::{COMMON_FILES, PACK_RE, common_ref_paths};
use crate::jobs::{JobTracker, RateLimitGate};
use crate::store::GitStore;
use crate::workers;

mod checkout;
mod seed;

const DEFAULT_MAX_CONCURRENCY: usize = 40;
const DEFAULT_RATELIMIT_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct CloneOptions {
    /// Delete a nonempty target directory before cloning.
    pub force: bool,
    /// Clone into a nonempty target directory, keeping what is there.
    pub keep: bool,
    pub max_concurrency: usize,
    pub rate_limit_backoff: Duration,
}

impl Default for CloneOptions {
    fn default() -> Self {
        Self {
            force: false,
            keep: false,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            rate_limit_backoff: DEFAULT_RATELIMIT_BACKOFF,
        }
    }
}

/// Everything the workers of one clone share. Scoped per clone so
/// independent clones can run concurrently in one process.
pub(crate) struct CloneCtx {
    pub(crate) base_url: String,
    pub(crate) base_dir: PathBuf,
    pub(crate) fetcher: Fetcher,
    pub(crate) store: GitStore,
    pub(crate) gate: RateLimitGate,
    /// Object hashes already claimed by some object worker.
    pub(crate) checked: Mutex<HashSet<String>>,
    /// Hashes mined out of ref files by the ref workers.
    pub(crate) ref_hashes: Mutex<HashSet<String>>,
    pub(crate) max_concurrency: usize,
}

impl CloneCtx {
    fn new(base_url: String, base_dir: PathBuf, opts: &CloneOptions) -> Result<Self> {
        let store = GitStore::new(&base_dir);
        Ok(Self {
            fetcher: Fetcher::new(opts.max_concurrency)?,
            store,
            gate: RateLimitGate::new(opts.rate_limit_backoff),
            checked: Mutex::new(HashSet::new()),
            ref_hashes: Mutex::new(HashSet::new()),
            max_concurrency: opts.max_concurrency,
            base_url,
            base_dir,
        })
    }
}

/// Normalize a user-supplied URL: strip trailing `/`, `/HEAD` and `/.git`,
/// default the scheme to plain http. Returns the base URL and the host
/// string used as the default target directory.
pub fn normalize_base_url(raw: &str) -> Result<(String, String)> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("/HEAD").unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("/.git").unwrap_or(trimmed);

    let parsed = match reqwest::Url::parse(trimmed) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => u,
        _ => reqwest::Url::parse(&format!("http://{}", trimmed))
            .with_context(|| format!("parse url {:?}", raw))?,
    };
    let host = parsed
        .host_str()
        .with_context(|| format!("no host in url {:?}", raw))?;
    let host_dir = match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let base_url = parsed.to_string().trim_end_matches('/').to_string();
    Ok((base_url, host_dir))
}

/// Clone one exposed repository into `dir` (the URL host when empty).
pub fn clone_url(url: &str, dir: &str, opts: &CloneOptions) -> Result<()> {
    let (base_url, host_dir) = normalize_base_url(url)?;
    let base_dir = if dir.is_empty() {
        host_dir
    } else {
        dir.to_string()
    };
    let base_dir = PathBuf::from(base_dir);
    prepare_target(&base_dir, opts)?;

    let ctx = CloneCtx::new(base_url, base_dir, opts)?;
    fetch_git(&ctx)
}

/// Clone every URL in a list file, one per line, into a host-named
/// subdirectory of `base_dir`. Failures are logged per URL and do not
/// abort the list.
pub fn clone_list(list_file: &Path, base_dir: &str, opts: &CloneOptions) -> Result<()> {
    let content = fs::read_to_string(list_file)
        .with_context(|| format!("read url list {}", list_file.display()))?;

    for line in content.lines() {
        let uri = line.trim();
        if uri.is_empty() {
            continue;
        }
        let dir = if base_dir.is_empty() {
            String::new()
        } else {
            match normalize_base_url(uri) {
                Ok((_, host)) => format!("{}/{}", base_dir.trim_end_matches('/'), host),
                Err(err) => {
                    error!(uri = %uri, err = %format!("{:#}", err), "couldn't parse uri");
                    continue;
                }
            }
        };
        info!(target = %uri, dir = %dir, force = opts.force, keep = opts.keep, "starting download");
        if let Err(err) = clone_url(uri, &dir, opts) {
            error!(target = %uri, err = %format!("{:#}", err), "download failed");
        }
    }
    Ok(())
}

/// Re-run the missing-file recovery phases against an existing clone, given
/// the stderr of a failed checkout. The clone driver calls this on exit
/// codes 128 and 255; it is public because the exit code of a partially
/// failing `git checkout` varies across git versions.
pub fn recover_from_checkout(
    url: &str,
    dir: &Path,
    opts: &CloneOptions,
    checkout_stderr: &str,
) -> Result<()> {
    let (base_url, _) = normalize_base_url(url)?;
    let ctx = CloneCtx::new(base_url, dir.to_path_buf(), opts)?;
    checkout::recover_missing(&ctx, checkout_stderr)
}

/// Target-directory policy: an existing target must be a directory, and a
/// nonempty one requires an explicit `force` (wipe) or `keep` (reuse).
fn prepare_target(base_dir: &Path, opts: &CloneOptions) -> Result<()> {
    if !base_dir.exists() {
        return Ok(());
    }
    if !base_dir.is_dir() {
        bail!("{} is not a directory", base_dir.display());
    }
    let is_empty = fs::read_dir(base_dir)
        .with_context(|| format!("read dir {}", base_dir.display()))?
        .next()
        .is_none();
    if !is_empty {
        if opts.force {
            fs::remove_dir_all(base_dir)
                .with_context(|| format!("remove dir {}", base_dir.display()))?;
        } else if !opts.keep {
            bail!(
                "{} is not empty (use --force to delete it or --keep to use it)",
                base_dir.display()
            );
        }
    }
    Ok(())
}

fn fetch_git(ctx: &CloneCtx) -> Result<()> {
    // Probe: a missing or odd-looking HEAD usually means the clone will
    // come up empty, but it is not a reason to stop.
    info!(base = %ctx.base_url, "testing for exposed .git/HEAD");
    let head = ctx
        .fetcher
        .get(&join_url(&ctx.base_url, ".git/HEAD"))
        .context("probe .git/HEAD")?;
    if !head.ok() {
        warn!(
            base = %ctx.base_url,
            code = head.status.as_u16(),
            ".git/HEAD doesn't appear to exist, clone will most likely fail"
        );
    } else if !head.body.starts_with(b"ref:") {
        warn!(
            base = %ctx.base_url,
            ".git/HEAD doesn't appear to be a git HEAD file, clone will most likely fail"
        );
    }

    if try_recursive(ctx)? {
        return Ok(());
    }

    fetch_common_files(ctx);
    sweep_refs(ctx);
    fetch_packs(ctx);

    let seeded = seed::seed_object_set(ctx)?;
    walk_objects(ctx, seeded);

    checkout::checkout_and_recover(ctx)
}

/// The autoindex shortcut: when the server lists `.git/` itself, mirroring
/// the listing recursively beats guessing file names.
fn try_recursive(ctx: &CloneCtx) -> Result<bool> {
    info!(base = %ctx.base_url, "testing if recursive download is possible");
    let listing_uri = join_url(&ctx.base_url, ".git/");
    let listing = match ctx.fetcher.get(&listing_uri) {
        Ok(l) => l,
        Err(err) => {
            warn!(base = %ctx.base_url, err = %err, "couldn't probe .git/ listing");
            return Ok(false);
        }
    };
    if !listing.ok() || !is_html(&listing.body) {
        return Ok(false);
    }

    let listing_path = reqwest::Url::parse(&listing_uri)
        .context("parse listing url")?
        .path()
        .to_string();
    let links = extract_links(&listing.body, &listing_path);
    if !links.iter().any(|l| l == "HEAD") {
        return Ok(false);
    }

    info!(base = %ctx.base_url, "fetching .git/ recursively");
    let jt = JobTracker::new();
    for name in &links {
        jt.add_job(join_url(".git", name));
    }
    jt.start_and_wait(ctx.max_concurrency, || {
        workers::recursive_worker(ctx, &jt)
    });

    info!(dir = %ctx.base_dir.display(), "running git checkout .");
    checkout::run_checkout_strict(&ctx.base_dir)?;
    Ok(true)
}

fn fetch_common_files(ctx: &CloneCtx) {
    info!(base = %ctx.base_url, "fetching common files");
    let jt = JobTracker::new();
    for file in COMMON_FILES {
        jt.add_job(*file);
    }
    let pool = ctx.max_concurrency.min(COMMON_FILES.len());
    jt.start_and_wait(pool, || workers::download_worker(ctx, &jt, false, false));
}

fn sweep_refs(ctx: &CloneCtx) {
    info!(base = %ctx.base_url, "finding refs");
    let jt = JobTracker::new();
    for candidate in common_ref_paths() {
        jt.add_job(candidate);
    }
    jt.start_and_wait(ctx.max_concurrency, || workers::ref_worker(ctx, &jt));
}

/// Pack files named by `objects/info/packs` are mirrored for completeness;
/// their contents are not unpacked into the object set.
fn fetch_packs(ctx: &CloneCtx) {
    let packs_path = ctx.store.git_dir().join("objects/info/packs");
    if !packs_path.exists() {
        return;
    }
    info!(base = %ctx.base_url, "finding packs");
    let content = match fs::read(&packs_path) {
        Ok(c) => c,
        Err(err) => {
            error!(file = %packs_path.display(), err = %err, "couldn't read pack list");
            return;
        }
    };
    let text = String::from_utf8_lossy(&content);

    let jt = JobTracker::new();
    for cap in PACK_RE.captures_iter(&text) {
        let sha = &cap[1];
        jt.add_job(format!(".git/objects/pack/pack-{}.idx", sha));
        jt.add_job(format!(".git/objects/pack/pack-{}.pack", sha));
    }
    let queued = jt.queued_jobs();
    if queued == 0 {
        return;
    }
    let pool = ctx.max_concurrency.min(queued);
    jt.start_and_wait(pool, || workers::download_worker(ctx, &jt, false, false));
}

fn walk_objects(ctx: &CloneCtx, seeded: HashSet<String>) {
    info!(base = %ctx.base_url, count = seeded.len(), "fetching objects");
    let jt = JobTracker::new();
    for hash in seeded {
        jt.add_job(hash);
    }
    jt.start_and_wait(ctx.max_concurrency, || workers::object_worker(ctx, &jt));
}
