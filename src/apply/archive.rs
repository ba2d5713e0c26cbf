//! Channel archive extraction
//!
//! Channels ship as gzip-compressed tarballs extracted over the channel's
//! target directory, overwriting in place.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::errors::Result;

/// Extract a tar.gz archive over `target`, creating it if needed.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    debug!(archive = %archive.display(), target = %target.display(), "extracting archive");
    std::fs::create_dir_all(target)?;

    let file = File::open(archive)?;
    let mut tarball = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    tarball.unpack(target)?;
    Ok(())
}
