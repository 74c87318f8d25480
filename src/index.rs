//! Minimal decoder for the binary `.git/index` file (versions 2 and 3).

use anyhow::{Result, bail};

const SIGNATURE: &[u8; 4] = b"DIRC";
const ENTRY_FIXED_LEN: usize = 62;
const FLAG_EXTENDED: u16 = 0x4000;
const NAME_LEN_MASK: u16 = 0x0fff;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub path: String,
    pub hash: String,
}

/// Decode the entry list of an index file. Extensions and the trailing
/// checksum are ignored; only paths and blob hashes matter here.
pub fn parse_index(data: &[u8]) -> Result<Vec<IndexEntry>> {
    if data.len() < 12 || &data[..4] != SIGNATURE {
        bail!("not an index file (bad signature)");
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let count = u32::from_be_bytes([data[8], data[9], data[10], data[11]]) as usize;
    if !(2..=3).contains(&version) {
        bail!("unsupported index version {}", version);
    }

    let mut entries = Vec::with_capacity(count);
    let mut off = 12;
    for n in 0..count {
        if data.len() < off + ENTRY_FIXED_LEN {
            bail!("index truncated at entry {}", n);
        }
        let hash = hex::encode(&data[off + 40..off + 60]);
        let flags = u16::from_be_bytes([data[off + 60], data[off + 61]]);

        let mut consumed = ENTRY_FIXED_LEN;
        if version >= 3 && flags & FLAG_EXTENDED != 0 {
            consumed += 2;
        }

        let name_len = (flags & NAME_LEN_MASK) as usize;
        let name_start = off + consumed;
        let name_end = if name_len < NAME_LEN_MASK as usize {
            name_start + name_len
        } else {
            // Overlong path: length is not stored, scan to the terminator.
            match data[name_start..].iter().position(|&b| b == 0) {
                Some(p) => name_start + p,
                None => bail!("index entry {} has unterminated path", n),
            }
        };
        if data.len() < name_end {
            bail!("index truncated inside entry {} path", n);
        }
        let path = String::from_utf8_lossy(&data[name_start..name_end]).into_owned();
        consumed += name_end - name_start;

        // Entries are padded with 1-8 NULs to a multiple of eight bytes.
        let padding = 8 - consumed % 8;
        off += consumed + padding;

        entries.push(IndexEntry { path, hash });
    }
    Ok(entries)
}
