//! On-disk page files.
//!
//! Each page is a pair of files: `NNNNNNNN.term` holds the fixed
//! records (written once, after which it is never touched again) and
//! `NNNNNNNN.volatile` holds one little-endian `f32` Lagrange
//! multiplier per term, rewritten after every mutating pass.  The
//! fixed file carries its own byte and term counts, so a page is
//! self-describing; the volatile file's length is implied.
//!
//! All reads go through `read_exact`: a short file is an
//! `UnexpectedEof` error, never a partial page.

use crate::term::ObjectiveTerm;
use std::convert::TryInto;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[must_use]
pub fn fixed_page_path(dir: &Path, page: usize) -> PathBuf {
    dir.join(format!("{:08}.term", page))
}

#[must_use]
pub fn volatile_page_path(dir: &Path, page: usize) -> PathBuf {
    dir.join(format!("{:08}.volatile", page))
}

/// Writes the fixed records of `terms` as one page file.
pub fn write_fixed_page(path: &Path, terms: &[ObjectiveTerm], scratch: &mut Vec<u8>) -> io::Result<()> {
    let total: usize = terms.iter().map(ObjectiveTerm::fixed_byte_size).sum();

    scratch.clear();
    scratch.reserve(8 + total);
    scratch.extend_from_slice(&(total as i32).to_le_bytes());
    scratch.extend_from_slice(&(terms.len() as i32).to_le_bytes());
    for term in terms {
        term.write_fixed(scratch);
    }

    let mut file = File::create(path)?;
    file.write_all(scratch)?;
    file.sync_data()
}

/// Reads a fixed page into the first `termCount` slots of `pool`,
/// growing the pool with placeholders as needed, and returns the
/// term count.
pub fn read_fixed_page(
    path: &Path,
    pool: &mut Vec<ObjectiveTerm>,
    scratch: &mut Vec<u8>,
) -> io::Result<usize> {
    let mut file = File::open(path)?;

    let mut header = [0_u8; 8];
    file.read_exact(&mut header)?;
    let total = i32::from_le_bytes(header[0..4].try_into().expect("four bytes"));
    let count = i32::from_le_bytes(header[4..8].try_into().expect("four bytes"));
    if total < 0 || count < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "negative page header field",
        ));
    }

    scratch.clear();
    scratch.resize(total as usize, 0);
    file.read_exact(scratch)?;

    let count = count as usize;
    if pool.len() < count {
        pool.resize_with(count, ObjectiveTerm::placeholder);
    }

    let mut cursor = 0;
    for term in pool.iter_mut().take(count) {
        term.read_fixed(scratch, &mut cursor)
            .map_err(|detail| io::Error::new(io::ErrorKind::InvalidData, detail))?;
    }
    if cursor != scratch.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "page byte count disagrees with its terms",
        ));
    }

    Ok(count)
}

/// Writes the multipliers of `pool[..count]` as a volatile page.
///
/// `shuffle_map[k]`, when present, is the fixed-file slot of the
/// term currently sitting at `pool[k]`; multipliers land in fixed
/// order regardless of any in-memory shuffle.
pub fn write_volatile_page(
    path: &Path,
    pool: &[ObjectiveTerm],
    count: usize,
    shuffle_map: Option<&[usize]>,
    scratch: &mut Vec<u8>,
) -> io::Result<()> {
    scratch.clear();
    scratch.resize(4 * count, 0);
    for (k, term) in pool.iter().take(count).enumerate() {
        let slot = shuffle_map.map_or(k, |map| map[k]);
        scratch[4 * slot..4 * slot + 4].copy_from_slice(&term.lagrange().to_le_bytes());
    }

    let mut file = File::create(path)?;
    file.write_all(scratch)?;
    file.sync_data()
}

/// Loads a volatile page's multipliers into `pool[..count]` in fixed
/// order.
pub fn read_volatile_page(
    path: &Path,
    pool: &mut [ObjectiveTerm],
    count: usize,
    scratch: &mut Vec<u8>,
) -> io::Result<()> {
    let mut file = File::open(path)?;
    scratch.clear();
    scratch.resize(4 * count, 0);
    file.read_exact(scratch)?;

    for (term, bytes) in pool.iter_mut().take(count).zip(scratch.chunks_exact(4)) {
        term.set_lagrange(f32::from_le_bytes(bytes.try_into().expect("four bytes")));
    }

    Ok(())
}
