use std::fs;

use anyhow::{Context, Result};

use gitgrab::clone::{CloneOptions, clone_url, normalize_base_url};
use gitgrab::fetch::{extract_links, is_empty_body, is_html, is_safe_relative, join_url};
use gitgrab::gitdir::ignored_candidates;

#[test]
fn url_normalization_strips_suffixes_and_defaults_scheme() -> Result<()> {
    let (base, dir) = normalize_base_url("http://example.com/.git/")?;
    assert_eq!(base, "http://example.com");
    assert_eq!(dir, "example.com");

    let (base, _) = normalize_base_url("https://example.com/app/.git/HEAD")?;
    assert_eq!(base, "https://example.com/app");

    let (base, dir) = normalize_base_url("example.com")?;
    assert_eq!(base, "http://example.com");
    assert_eq!(dir, "example.com");

    let (base, dir) = normalize_base_url("example.com:8080/shop")?;
    assert_eq!(base, "http://example.com:8080/shop");
    assert_eq!(dir, "example.com:8080");

    assert!(normalize_base_url("http:///nohost").is_err());
    Ok(())
}

#[test]
fn url_join_handles_slashes() {
    assert_eq!(join_url("http://x", ".git/HEAD"), "http://x/.git/HEAD");
    assert_eq!(join_url("http://x/", "/.git/HEAD"), "http://x/.git/HEAD");
    assert_eq!(join_url(".git", "objects/"), ".git/objects/");
}

#[test]
fn gitignore_lines_reduce_to_fetchable_literals() {
    let content = "\
# build artifacts
target/
*.log
secret.txt # the important one
!keep.me
vendor.php
config/local.yml
what?.bin
";
    let candidates = ignored_candidates(content);
    assert_eq!(candidates, vec!["secret.txt", "config/local.yml"]);
}

#[test]
fn html_sniffing() {
    assert!(is_html(b"<!DOCTYPE html><html><body>listing</body></html>"));
    assert!(is_html(b"\n  <HTML>\n"));
    assert!(!is_html(b"ref: refs/heads/master\n"));
    assert!(!is_html(&[0x78, 0x9c, 0x01, 0x02, 0x03]));

    assert!(is_empty_body(b""));
    assert!(is_empty_body(b" \n\t"));
    assert!(!is_empty_body(b"x"));
}

#[test]
fn listing_links_filter_to_children() {
    let html = br#"<html><body><pre>
<a href="../">../</a>
<a href="HEAD">HEAD</a>
<a href="objects/">objects/</a>
<a href="/.git/refs/">refs/</a>
<a href="/elsewhere/">elsewhere</a>
<a href="?C=N;O=D">Name</a>
<a href="http://evil.example/x">x</a>
</pre></body></html>"#;

    let links = extract_links(html, "/.git/");
    assert_eq!(links, vec!["HEAD", "objects/", "refs/"]);
}

#[test]
fn unsafe_mirror_paths_are_rejected() {
    assert!(is_safe_relative(".git/objects/ab/cdef"));
    assert!(is_safe_relative("sub/dir/file.txt"));
    assert!(!is_safe_relative("../escape"));
    assert!(!is_safe_relative("a/../../b"));
    assert!(!is_safe_relative("/absolute"));
    assert!(!is_safe_relative(""));
}

#[test]
fn nonempty_target_without_flags_is_a_preflight_failure() -> Result<()> {
    let tmp = tempfile::tempdir().context("create tempdir")?;
    fs::write(tmp.path().join("precious.txt"), b"do not touch").context("write file")?;

    let dir = tmp.path().to_string_lossy().into_owned();
    // Fails before any request is made, so the URL never resolves.
    let err = clone_url("http://127.0.0.1:1", &dir, &CloneOptions::default())
        .expect_err("nonempty target must be refused");
    assert!(err.to_string().contains("not empty"), "got: {:#}", err);

    let kept = fs::read(tmp.path().join("precious.txt")).context("reread file")?;
    assert_eq!(kept, b"do not touch");
    Ok(())
}

#[test]
fn file_target_is_a_preflight_failure() -> Result<()> {
    let tmp = tempfile::tempdir().context("create tempdir")?;
    let file = tmp.path().join("occupied");
    fs::write(&file, b"file, not dir").context("write file")?;

    let err = clone_url(
        "http://127.0.0.1:1",
        &file.to_string_lossy(),
        &CloneOptions::default(),
    )
    .expect_err("file target must be refused");
    assert!(err.to_string().contains("not a directory"), "got: {:#}", err);
    Ok(())
}
