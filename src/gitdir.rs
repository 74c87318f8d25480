//! Well-known `.git/` paths and the patterns used to mine hashes out of them.

use std::sync::LazyLock;

use regex::Regex;

/// Anything a typical `git init` leaves behind, plus the index and pack list.
pub const COMMON_FILES: &[&str] = &[
    ".gitignore",
    ".git/COMMIT_EDITMSG",
    ".git/config",
    ".git/description",
    ".git/hooks/applypatch-msg.sample",
    ".git/hooks/commit-msg.sample",
    ".git/hooks/fsmonitor-watchman.sample",
    ".git/hooks/post-commit.sample",
    ".git/hooks/post-receive.sample",
    ".git/hooks/post-update.sample",
    ".git/hooks/pre-applypatch.sample",
    ".git/hooks/pre-commit.sample",
    ".git/hooks/pre-merge-commit.sample",
    ".git/hooks/pre-push.sample",
    ".git/hooks/pre-rebase.sample",
    ".git/hooks/pre-receive.sample",
    ".git/hooks/prepare-commit-msg.sample",
    ".git/hooks/update.sample",
    ".git/index",
    ".git/info/exclude",
    ".git/logs/HEAD",
    ".git/objects/info/packs",
    ".git/packed-refs",
];

/// Branch names worth probing blind when the server hides its listing.
pub const WELL_KNOWN_BRANCHES: &[&str] = &[
    "master",
    "main",
    "dev",
    "develop",
    "development",
    "staging",
    "stage",
    "production",
    "prod",
    "test",
    "testing",
    "release",
];

const WELL_KNOWN_TAGS: &[&str] = &["v1.0", "v1.0.0", "v0.1.0", "latest"];

/// Candidate ref paths for the refs sweep: the fixed singletons plus every
/// per-branch variant (head, remote head, their reflogs, wip refs) and a few
/// common tag names.
pub fn common_ref_paths() -> Vec<String> {
    let mut refs: Vec<String> = [
        ".git/FETCH_HEAD",
        ".git/HEAD",
        ".git/ORIG_HEAD",
        ".git/config",
        ".git/info/refs",
        ".git/logs/HEAD",
        ".git/packed-refs",
        ".git/refs/remotes/origin/HEAD",
        ".git/refs/stash",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    for branch in WELL_KNOWN_BRANCHES {
        refs.push(format!(".git/refs/heads/{}", branch));
        refs.push(format!(".git/refs/remotes/origin/{}", branch));
        refs.push(format!(".git/logs/refs/heads/{}", branch));
        refs.push(format!(".git/logs/refs/remotes/origin/{}", branch));
        refs.push(format!(".git/refs/wip/index/refs/heads/{}", branch));
        refs.push(format!(".git/refs/wip/wtree/refs/heads/{}", branch));
    }
    for tag in WELL_KNOWN_TAGS {
        refs.push(format!(".git/refs/tags/{}", tag));
    }
    refs
}

/// Server-side templates that never exist as static artifacts; recovery
/// skips them instead of hammering the server.
pub const BLACKLISTED_SUFFIXES: &[&str] = &[".php"];

pub fn is_blacklisted(path: &str) -> bool {
    BLACKLISTED_SUFFIXES.iter().any(|s| path.ends_with(s))
}

/// Any 40-hex object hash, anywhere in a text blob.
pub static OBJECT_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-f0-9]{40}").unwrap());

/// A body that is exactly one object hash.
pub static FULL_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-f0-9]{40}$").unwrap());

/// Reflog line: old hash, then the post-image hash we care about.
pub static REFLOG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[a-f0-9]{40} ([a-f0-9]{40})").unwrap());

/// Pack identifiers inside `objects/info/packs`.
pub static PACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pack-([a-f0-9]{40})\.pack").unwrap());

/// Paths `git checkout` complains about when a blob is missing.
pub static CHECKOUT_ERR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^error: unable to read sha1 file of (.+?) \(").unwrap());

pub static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)<a\s[^>]*href\s*=\s*["']?([^"'>\s]+)"#).unwrap());

pub fn is_hash(s: &str) -> bool {
    FULL_HASH_RE.is_match(s)
}

/// Literal paths worth fetching out of a `.gitignore`.
///
/// Comments are stripped from the first unescaped `#`; blank lines,
/// negations, directory patterns, globs and blacklisted suffixes are
/// skipped.
pub fn ignored_candidates(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = strip_comment(line);
            let line = line.trim();
            if line.is_empty()
                || line.starts_with('!')
                || line.ends_with('/')
                || line.contains(['*', '?', '['])
                || is_blacklisted(line)
            {
                return None;
            }
            Some(line.to_string())
        })
        .collect()
}

fn strip_comment(line: &str) -> &str {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '#' if !escaped => return &line[..i],
            _ => escaped = false,
        }
    }
    line
}
