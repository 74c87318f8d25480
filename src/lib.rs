//! Reconstruct a usable working copy from a web-exposed `.git/` directory.
//!
//! The clone driver probes the exposed endpoint, mirrors enough metadata
//! and object data to rebuild the object store locally, then has `git`
//! materialize the working tree. The interesting part is the fetch
//! pipeline: pools of workers over a shared job queue, where decoding one
//! object enqueues the objects it references.

pub mod clone;
pub mod fetch;
pub mod gitdir;
pub mod index;
pub mod jobs;
pub mod objects;
pub mod store;

mod workers;
