//! In-process HTTP server that plays the part of a misconfigured web host
//! exposing its `.git/` directory, plus a builder for the fake repository
//! it serves.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::io::Write;
use std::process::Command;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use sha1::{Digest, Sha1};

pub struct Site {
    pub files: HashMap<String, Vec<u8>>,
    /// Serve HTML directory listings for `.git/` and its subdirectories.
    pub autoindex: bool,
    /// Answer 429 (once) to the nth request under `.git/objects/`.
    pub ratelimit_nth_object: Option<usize>,
    hits: Mutex<HashMap<String, usize>>,
    object_requests: AtomicUsize,
    ratelimited_once: AtomicBool,
}

impl Site {
    pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            files,
            autoindex: false,
            ratelimit_nth_object: None,
            hits: Mutex::new(HashMap::new()),
            object_requests: AtomicUsize::new(0),
            ratelimited_once: AtomicBool::new(false),
        }
    }
}

pub struct GitServer {
    pub base_url: String,
    site: Arc<Site>,
}

impl GitServer {
    pub fn hits(&self, path: &str) -> usize {
        *self.site.hits.lock().unwrap().get(path).unwrap_or(&0)
    }

    /// Requests for loose objects (pack lists and pack files excluded).
    pub fn object_hits(&self) -> usize {
        self.site
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|(path, _)| is_loose_object_path(path))
            .map(|(_, count)| count)
            .sum()
    }
}

pub fn serve(site: Site) -> GitServer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test server");
    let addr = listener.local_addr().expect("test server addr");
    let site = Arc::new(site);
    let state = site.clone();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("build test runtime");
        rt.block_on(async move {
            listener.set_nonblocking(true).expect("nonblocking listener");
            let listener =
                tokio::net::TcpListener::from_std(listener).expect("adopt test listener");
            let app = Router::new().fallback(serve_path).with_state(state);
            axum::serve(listener, app).await.expect("serve test site");
        });
    });

    GitServer {
        base_url: format!("http://{}", addr),
        site,
    }
}

async fn serve_path(State(site): State<Arc<Site>>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/').to_string();
    *site.hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

    if is_loose_object_path(&path)
        && let Some(n) = site.ratelimit_nth_object
    {
        let count = site.object_requests.fetch_add(1, Ordering::SeqCst) + 1;
        if count == n && !site.ratelimited_once.swap(true, Ordering::SeqCst) {
            return StatusCode::TOO_MANY_REQUESTS.into_response();
        }
    }

    if let Some(body) = site.files.get(&path) {
        return (StatusCode::OK, body.clone()).into_response();
    }

    if path.is_empty() || path.ends_with('/') {
        if site.autoindex {
            let children = listing_children(&site.files, &path);
            if !children.is_empty() {
                return (
                    StatusCode::OK,
                    [(header::CONTENT_TYPE, "text/html")],
                    listing_html(&path, &children),
                )
                    .into_response();
            }
        } else {
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    StatusCode::NOT_FOUND.into_response()
}

fn is_loose_object_path(path: &str) -> bool {
    path.starts_with(".git/objects/")
        && !path.starts_with(".git/objects/info/")
        && !path.starts_with(".git/objects/pack/")
}

fn listing_children(files: &HashMap<String, Vec<u8>>, prefix: &str) -> Vec<String> {
    let mut children = BTreeSet::new();
    for key in files.keys() {
        let Some(rest) = key.strip_prefix(prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((dir, _)) => children.insert(format!("{}/", dir)),
            None => children.insert(rest.to_string()),
        };
    }
    children.into_iter().collect()
}

fn listing_html(path: &str, children: &[String]) -> String {
    let mut body = format!(
        "<html><head><title>Index of /{0}</title></head><body><h1>Index of /{0}</h1><hr><pre><a href=\"../\">../</a>\n",
        path
    );
    for child in children {
        body.push_str(&format!("<a href=\"{0}\">{0}</a>\n", child));
    }
    body.push_str("</pre><hr></body></html>");
    body
}

/// Builds the file map of a small but checkout-able repository.
pub struct RepoBuilder {
    pub files: HashMap<String, Vec<u8>>,
}

impl RepoBuilder {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        files.insert(
            ".git/config".to_string(),
            b"[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = false\n"
                .to_vec(),
        );
        files.insert(
            ".git/description".to_string(),
            b"Unnamed repository; edit this file 'description' to name the repository.\n"
                .to_vec(),
        );
        Self { files }
    }

    pub fn file(&mut self, path: &str, body: &[u8]) -> &mut Self {
        self.files.insert(path.to_string(), body.to_vec());
        self
    }

    pub fn loose_object(&mut self, kind: &str, body: &[u8]) -> String {
        let (hash, compressed) = loose_bytes(kind, body);
        self.files.insert(
            format!(".git/objects/{}/{}", &hash[..2], &hash[2..]),
            compressed,
        );
        hash
    }

    pub fn blob(&mut self, content: &[u8]) -> String {
        self.loose_object("blob", content)
    }

    pub fn tree(&mut self, entries: &[(&str, &str, &str)]) -> String {
        let mut body = Vec::new();
        for (mode, name, hash) in entries {
            body.extend_from_slice(format!("{} {}\0", mode, name).as_bytes());
            body.extend_from_slice(&hex::decode(hash).expect("tree entry hash"));
        }
        self.loose_object("tree", &body)
    }

    pub fn commit(&mut self, tree: &str, parents: &[&str], message: &str) -> String {
        let mut body = format!("tree {}\n", tree);
        for parent in parents {
            body.push_str(&format!("parent {}\n", parent));
        }
        body.push_str("author Ada Lovelace <ada@example.com> 1700000000 +0000\n");
        body.push_str("committer Ada Lovelace <ada@example.com> 1700000000 +0000\n");
        body.push_str(&format!("\n{}\n", message));
        self.loose_object("commit", body.as_bytes())
    }

    pub fn head(&mut self, branch: &str, commit: &str) -> &mut Self {
        self.file(
            ".git/HEAD",
            format!("ref: refs/heads/{}\n", branch).as_bytes(),
        );
        self.file(
            &format!(".git/refs/heads/{}", branch),
            format!("{}\n", commit).as_bytes(),
        );
        self
    }

    pub fn index(&mut self, entries: &[(&str, &str)]) -> &mut Self {
        let bytes = index_bytes(entries);
        self.file(".git/index", &bytes);
        self
    }
}

/// Hash and zlib-compress one loose object the way git stores it.
pub fn loose_bytes(kind: &str, body: &[u8]) -> (String, Vec<u8>) {
    let mut raw = format!("{} {}\0", kind, body.len()).into_bytes();
    raw.extend_from_slice(body);
    let hash = hex::encode(Sha1::digest(&raw));

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw).expect("deflate test object");
    let compressed = encoder.finish().expect("finish test object");
    (hash, compressed)
}

/// Version-2 index with zeroed stat data; enough for both this crate's
/// decoder and `git checkout`.
pub fn index_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut sorted: Vec<_> = entries.to_vec();
    sorted.sort_by_key(|(path, _)| path.to_string());

    let mut out = b"DIRC".to_vec();
    out.extend(2u32.to_be_bytes());
    out.extend((sorted.len() as u32).to_be_bytes());
    for (path, hash) in &sorted {
        let start = out.len();
        out.extend([0u8; 24]); // ctime, mtime, dev, ino
        out.extend(0o100644u32.to_be_bytes()); // mode
        out.extend([0u8; 12]); // uid, gid, size
        out.extend(hex::decode(hash).expect("index entry hash"));
        out.extend((path.len().min(0xfff) as u16).to_be_bytes());
        out.extend(path.as_bytes());
        let consumed = out.len() - start;
        out.extend(vec![0u8; 8 - consumed % 8]);
    }
    let checksum = Sha1::digest(&out);
    out.extend(checksum);
    out
}

pub fn have_git() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}
