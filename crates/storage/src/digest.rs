//! Content digests compatible with object-store entity tags.
//!
//! S3 and Swift both report the hex MD5 of an object's bytes as its ETag for
//! single-part uploads, so that is what we compute locally. These are
//! blocking functions: async callers should wrap them in
//! [`spawn_blocking`](tokio::task::spawn_blocking).

use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER: usize = 64 * 1024;

/// Strip the quotes some stores wrap ETags in and lowercase the hex.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim().trim_matches('"').to_ascii_lowercase()
}

/// Hex MD5 of an in-memory buffer.
pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Hex MD5 of everything a reader yields.
pub fn md5_reader(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; READ_BUFFER];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex MD5 of a file on disk.
pub fn md5_file(path: &Path) -> io::Result<String> {
    md5_reader(File::open(path)?)
}

/// Hex MD5 of each consecutive `chunk_size` byte range of a file, along with
/// the length of that range. The last range may be shorter.
///
/// These are exactly the ETags the store reports for segments produced by
/// splitting the same file at the same size, which lets segmented uploads be
/// verified without writing any temp files.
pub fn md5_chunks(path: &Path, chunk_size: u64) -> io::Result<Vec<(u64, String)>> {
    if chunk_size == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "chunk size must be non-zero"));
    }
    let mut file = File::open(path)?;
    let mut digests = Vec::new();
    loop {
        let mut hasher = Md5::new();
        let mut chunk = (&mut file).take(chunk_size);
        let mut buffer = vec![0u8; READ_BUFFER];
        let mut length = 0u64;
        loop {
            let n = chunk.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            length += n as u64;
        }
        if length == 0 {
            break;
        }
        digests.push((length, hex::encode(hasher.finalize())));
        if length < chunk_size {
            break;
        }
    }
    Ok(digests)
}
