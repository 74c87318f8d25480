//! Loose-object codec: inflate, classify, and enumerate referenced hashes.

use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow, bail};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};

#[derive(Debug)]
pub struct TreeEntry {
    pub mode: String,
    pub name: String,
    pub hash: String,
}

/// One decoded repository object. Only commits, trees and tags carry
/// outgoing hashes; blobs are leaves.
#[derive(Debug)]
pub enum LooseObject {
    Commit { tree: String, parents: Vec<String> },
    Tree { entries: Vec<TreeEntry> },
    Tag { target: String },
    Blob { size: usize },
}

impl LooseObject {
    /// Hashes this object points at: commit → tree + parents, tree → entry
    /// hashes, tag → target, blob → nothing.
    pub fn referenced_hashes(&self) -> Vec<String> {
        match self {
            LooseObject::Commit { tree, parents } => {
                let mut out = Vec::with_capacity(parents.len() + 1);
                out.push(tree.clone());
                out.extend(parents.iter().cloned());
                out
            }
            LooseObject::Tree { entries } => entries.iter().map(|e| e.hash.clone()).collect(),
            LooseObject::Tag { target } => vec![target.clone()],
            LooseObject::Blob { .. } => Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LooseObject::Commit { .. } => "commit",
            LooseObject::Tree { .. } => "tree",
            LooseObject::Tag { .. } => "tag",
            LooseObject::Blob { .. } => "blob",
        }
    }
}

/// Decode one zlib-compressed loose object.
pub fn decode(raw: &[u8]) -> Result<LooseObject> {
    let mut inflated = Vec::new();
    ZlibDecoder::new(raw)
        .read_to_end(&mut inflated)
        .context("inflate loose object")?;

    let nul = inflated
        .iter()
        .position(|&b| b == 0)
        .context("loose object missing header terminator")?;
    let header =
        std::str::from_utf8(&inflated[..nul]).context("loose object header not utf-8")?;
    let (kind, size) = header
        .split_once(' ')
        .with_context(|| format!("malformed object header {:?}", header))?;
    let size: usize = size
        .parse()
        .with_context(|| format!("malformed object size {:?}", header))?;

    let body = &inflated[nul + 1..];
    if body.len() != size {
        bail!(
            "object body is {} bytes but header declares {}",
            body.len(),
            size
        );
    }

    match kind {
        "commit" => parse_commit(body),
        "tree" => parse_tree(body),
        "tag" => parse_tag(body),
        "blob" => Ok(LooseObject::Blob { size }),
        other => Err(anyhow!("unknown object kind {:?}", other)),
    }
}

fn parse_commit(body: &[u8]) -> Result<LooseObject> {
    let text = String::from_utf8_lossy(body);
    let mut tree = None;
    let mut parents = Vec::new();
    for line in text.lines() {
        if line.is_empty() {
            break; // end of headers, message follows
        }
        if let Some(h) = line.strip_prefix("tree ") {
            tree = Some(valid_hash(h)?);
        } else if let Some(h) = line.strip_prefix("parent ") {
            parents.push(valid_hash(h)?);
        }
    }
    Ok(LooseObject::Commit {
        tree: tree.context("commit has no tree header")?,
        parents,
    })
}

fn parse_tag(body: &[u8]) -> Result<LooseObject> {
    let text = String::from_utf8_lossy(body);
    for line in text.lines() {
        if line.is_empty() {
            break;
        }
        if let Some(h) = line.strip_prefix("object ") {
            return Ok(LooseObject::Tag {
                target: valid_hash(h)?,
            });
        }
    }
    Err(anyhow!("tag has no object header"))
}

fn parse_tree(body: &[u8]) -> Result<LooseObject> {
    let mut entries = Vec::new();
    let mut rest = body;
    while !rest.is_empty() {
        let sp = rest
            .iter()
            .position(|&b| b == b' ')
            .context("tree entry missing mode separator")?;
        let mode = std::str::from_utf8(&rest[..sp])
            .context("tree entry mode not utf-8")?
            .to_string();
        rest = &rest[sp + 1..];

        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .context("tree entry missing name terminator")?;
        let name = String::from_utf8_lossy(&rest[..nul]).into_owned();
        rest = &rest[nul + 1..];

        if rest.len() < 20 {
            bail!("tree entry for {:?} truncated before hash", name);
        }
        let hash = hex::encode(&rest[..20]);
        rest = &rest[20..];

        entries.push(TreeEntry { mode, name, hash });
    }
    Ok(LooseObject::Tree { entries })
}

fn valid_hash(s: &str) -> Result<String> {
    let s = s.trim();
    if !crate::gitdir::is_hash(s) {
        bail!("malformed object hash {:?}", s);
    }
    Ok(s.to_string())
}

/// Hash a byte string as git would hash it for a blob.
pub fn blob_hash(content: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", content.len()).as_bytes());
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Produce the loose-object form of a blob: its hash and the
/// zlib-compressed `blob <len>\0<content>` bytes.
pub fn encode_blob(content: &[u8]) -> Result<(String, Vec<u8>)> {
    let mut raw = format!("blob {}\0", content.len()).into_bytes();
    raw.extend_from_slice(content);

    let mut hasher = Sha1::new();
    hasher.update(&raw);
    let hash = hex::encode(hasher.finalize());

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).context("deflate blob")?;
    let compressed = encoder.finish().context("finish blob deflate")?;
    Ok((hash, compressed))
}
