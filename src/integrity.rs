//! Streaming file digests
//!
//! Downloaded archives are untrusted until their SHA-256 matches the
//! manifest-declared digest.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::Result;

/// Compute the SHA-256 of a file as lowercase hex, streaming in 64 KiB reads.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
