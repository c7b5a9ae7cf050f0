//! # Segment Store
//!
//! The durable, append-only block log. Blocks are spread over fixed-capacity
//! segment files so that no single file grows without bound and a scan can
//! skip whole segments by arithmetic alone.
//!
//! ## File Layout
//!
//! ```text
//! blockchain/
//! ├── 000000.blk    sealed, exactly `capacity` blocks
//! ├── 000001.blk    sealed
//! └── _000002.blk   open, the only writable segment
//!
//! segment := count(4, LE) { length(4, LE) payload }*count
//! ```
//!
//! ## Append Protocol
//!
//! 1. Write `length ++ payload` at the end of the open segment.
//! 2. Rewrite the header with `count + 1` and sync.
//! 3. If the count reached capacity, rename `_NNNNNN.blk` → `NNNNNN.blk` and
//!    create `_NNNNNN+1.blk` with a zero header.
//!
//! The header is the commit point. A crash between steps 1 and 2 leaves
//! uncounted bytes at the tail, which [`SegmentStore::initialize`] truncates.
//! A crash inside step 3 leaves either a full open segment, which `initialize`
//! seals, or no open segment, which `initialize` recreates.

use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind as IoErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::block::{Block, BlockLocation};
use super::enumerate::{BlockMetadataIter, BlocksFromPointIter, CancelFlag, SegmentCursor};
use crate::codec;
use crate::config::{OPEN_SEGMENT_MARKER, SEGMENT_EXTENSION, SEGMENT_ORDINAL_WIDTH};
use crate::error::{LedgerError, Result};

/// Size of the block-count header at the start of every segment.
pub const SEGMENT_HEADER_LEN: u64 = 4;

// ---------------------------------------------------------------------------
// Segment Names
// ---------------------------------------------------------------------------

/// `000042.blk`
pub fn sealed_segment_name(ordinal: u32) -> String {
    format!("{ordinal:0width$}.{SEGMENT_EXTENSION}", width = SEGMENT_ORDINAL_WIDTH)
}

/// `_000042.blk`
pub fn open_segment_name(ordinal: u32) -> String {
    format!("{OPEN_SEGMENT_MARKER}{}", sealed_segment_name(ordinal))
}

/// Parse a segment file name into `(ordinal, is_open)`.
pub fn parse_segment_name(name: &str) -> Option<(u32, bool)> {
    let (stem, is_open) = match name.strip_prefix(OPEN_SEGMENT_MARKER) {
        Some(rest) => (rest, true),
        None => (name, false),
    };
    let digits = stem.strip_suffix(&format!(".{SEGMENT_EXTENSION}"))?;
    if digits.len() != SEGMENT_ORDINAL_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().map(|ordinal| (ordinal, is_open))
}

/// Path of a segment on disk, preferring the sealed file and falling back to
/// the open one. Checks the sealed name twice so that a rename racing with
/// the lookup is still found.
pub(crate) fn resolve_segment_path(dir: &Path, ordinal: u32) -> Result<PathBuf> {
    let sealed = dir.join(sealed_segment_name(ordinal));
    if sealed.exists() {
        return Ok(sealed);
    }
    let open = dir.join(open_segment_name(ordinal));
    if open.exists() {
        return Ok(open);
    }
    if sealed.exists() {
        return Ok(sealed);
    }
    Err(LedgerError::not_found(format!("segment {}", sealed_segment_name(ordinal))))
}

/// Map a truncated read to `CorruptData`; other I/O errors pass through.
pub(crate) fn read_exact_or_corrupt(reader: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == IoErrorKind::UnexpectedEof {
            LedgerError::corrupt(format!("truncated {what}"))
        } else {
            LedgerError::Io(e)
        }
    })
}

fn read_header(file: &mut File) -> Result<u32> {
    let mut raw = [0u8; 4];
    file.seek(SeekFrom::Start(0))?;
    read_exact_or_corrupt(file, &mut raw, "segment header")?;
    Ok(u32::from_le_bytes(raw))
}

fn write_header(file: &mut File, count: u32) -> Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn create_empty_segment(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(&0u32.to_le_bytes())?;
    file.sync_all()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// SegmentStore
// ---------------------------------------------------------------------------

/// State guarded by the writer lock.
#[derive(Debug)]
struct WriterState {
    /// Ordinal of the open segment; `None` until `initialize` succeeds.
    open_ordinal: Option<u32>,
}

/// Append-only segmented block log.
#[derive(Debug)]
pub struct SegmentStore {
    dir: PathBuf,
    capacity: u32,
    writer: Mutex<WriterState>,
}

impl SegmentStore {
    /// Bind to `dir`. Nothing touches the disk until [`initialize`](Self::initialize).
    pub fn new(dir: impl Into<PathBuf>, capacity: u32) -> Self {
        Self {
            dir: dir.into(),
            capacity,
            writer: Mutex::new(WriterState { open_ordinal: None }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Ensure the log directory and exactly one open segment exist.
    ///
    /// Idempotent. Also repairs the crash windows of the append protocol:
    /// uncounted tail bytes, a full segment that was never sealed, and a
    /// missing successor segment. Sealed segments must each hold exactly
    /// `capacity` blocks.
    pub fn initialize(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(LedgerError::invalid("segment capacity must be at least 1"));
        }
        fs::create_dir_all(&self.dir)?;
        let mut state = self.writer.lock();

        let (sealed, open) = self.scan()?;
        for (position, ordinal) in sealed.iter().enumerate() {
            if *ordinal != position as u32 {
                return Err(LedgerError::corrupt(format!(
                    "sealed segment {} is missing",
                    sealed_segment_name(position as u32)
                )));
            }
            let path = self.dir.join(sealed_segment_name(*ordinal));
            let count = read_header(&mut File::open(&path)?)?;
            if count != self.capacity {
                return Err(LedgerError::corrupt(format!(
                    "sealed segment {} holds {count} blocks, expected {}",
                    path.display(),
                    self.capacity
                )));
            }
        }
        let next_ordinal = sealed.len() as u32;

        let ordinal = match open.as_slice() {
            [] => {
                let path = self.dir.join(open_segment_name(next_ordinal));
                create_empty_segment(&path)?;
                tracing::info!(segment = %path.display(), "created open segment");
                next_ordinal
            }
            [ordinal] if *ordinal == next_ordinal => {
                self.repair_tail(*ordinal)?;
                self.seal_if_full(*ordinal)?
            }
            [ordinal] => {
                return Err(LedgerError::corrupt(format!(
                    "open segment {} does not follow {} sealed segments",
                    open_segment_name(*ordinal),
                    sealed.len()
                )))
            }
            many => {
                return Err(LedgerError::corrupt(format!(
                    "{} open segments found, expected one",
                    many.len()
                )))
            }
        };

        state.open_ordinal = Some(ordinal);
        tracing::info!(
            dir = %self.dir.display(),
            sealed = sealed.len(),
            open_ordinal = ordinal,
            "segment store initialized"
        );
        Ok(())
    }

    /// Sorted sealed ordinals and the ordinals of any open segments.
    fn scan(&self) -> Result<(Vec<u32>, Vec<u32>)> {
        let mut sealed = Vec::new();
        let mut open = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            match parse_segment_name(name) {
                Some((ordinal, true)) => open.push(ordinal),
                Some((ordinal, false)) => sealed.push(ordinal),
                None => {}
            }
        }
        sealed.sort_unstable();
        open.sort_unstable();
        Ok((sealed, open))
    }

    /// Finish a rotation whose header was committed but whose rename was not.
    /// Returns the ordinal of the segment that is open afterwards.
    fn seal_if_full(&self, ordinal: u32) -> Result<u32> {
        let open = self.dir.join(open_segment_name(ordinal));
        let count = read_header(&mut File::open(&open)?)?;
        if count < self.capacity {
            return Ok(ordinal);
        }
        if count > self.capacity {
            return Err(LedgerError::corrupt(format!(
                "open segment {} holds {count} blocks, capacity is {}",
                open.display(),
                self.capacity
            )));
        }
        let sealed = self.dir.join(sealed_segment_name(ordinal));
        fs::rename(&open, &sealed)?;
        let next = ordinal + 1;
        create_empty_segment(&self.dir.join(open_segment_name(next)))?;
        tracing::warn!(
            sealed = %sealed.display(),
            next_ordinal = next,
            "completed interrupted segment rotation"
        );
        Ok(next)
    }

    /// Truncate bytes past the last counted entry of the open segment.
    fn repair_tail(&self, ordinal: u32) -> Result<()> {
        let path = self.dir.join(open_segment_name(ordinal));
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let file_len = file.metadata()?.len();
        if file_len < SEGMENT_HEADER_LEN {
            return Err(LedgerError::corrupt(format!(
                "open segment {} has no header",
                path.display()
            )));
        }
        let count = read_header(&mut file)?;

        let mut reader = BufReader::new(&mut file);
        let mut end = SEGMENT_HEADER_LEN;
        for _ in 0..count {
            let mut raw = [0u8; 4];
            read_exact_or_corrupt(&mut reader, &mut raw, "length prefix")?;
            let len = u32::from_le_bytes(raw);
            end += 4 + u64::from(len);
            if end > file_len {
                return Err(LedgerError::corrupt(format!(
                    "truncated payload in {}",
                    path.display()
                )));
            }
            reader.seek_relative(i64::from(len))?;
        }
        drop(reader);

        if file_len > end {
            tracing::warn!(
                segment = %path.display(),
                discarded = file_len - end,
                "truncating uncounted bytes after last block"
            );
            file.set_len(end)?;
            file.sync_all()?;
        }
        Ok(())
    }

    /// Encode and append `block`, rotating the segment when it fills up.
    pub fn append_block(&self, block: &Block) -> Result<BlockLocation> {
        let hash = block.hash()?;
        let payload = codec::encode_block(block);
        let length = u32::try_from(payload.len())
            .map_err(|_| LedgerError::invalid("encoded block exceeds 4 GiB"))?;

        let mut state = self.writer.lock();
        let ordinal = state.open_ordinal.ok_or_else(|| {
            LedgerError::misuse("no writable segment; initialize the segment store first")
        })?;
        let path = self.dir.join(open_segment_name(ordinal));
        let mut file = match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                state.open_ordinal = None;
                return Err(LedgerError::not_found(format!(
                    "open segment {}; re-run initialize",
                    path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let count = read_header(&mut file)?;
        if count >= self.capacity {
            return Err(LedgerError::corrupt(format!(
                "open segment {} already holds {count} blocks",
                path.display()
            )));
        }

        let entry_start = file.seek(SeekFrom::End(0))?;
        let mut entry = Vec::with_capacity(4 + payload.len());
        entry.extend_from_slice(&length.to_le_bytes());
        entry.extend_from_slice(&payload);
        file.write_all(&entry)?;
        file.sync_data()?;

        let new_count = count + 1;
        write_header(&mut file, new_count)?;
        file.sync_all()?;
        drop(file);

        let location = BlockLocation {
            hash,
            segment_file: sealed_segment_name(ordinal),
            height: u64::from(ordinal) * u64::from(self.capacity) + u64::from(count),
            offset: entry_start + 4,
            length,
        };
        tracing::debug!(
            height = location.height,
            segment = %location.segment_file,
            offset = location.offset,
            length,
            "block appended"
        );

        if new_count == self.capacity {
            self.rotate(&mut state, ordinal)?;
        }
        Ok(location)
    }

    /// Seal the open segment and start the next one.
    fn rotate(&self, state: &mut WriterState, ordinal: u32) -> Result<()> {
        let open = self.dir.join(open_segment_name(ordinal));
        let sealed = self.dir.join(sealed_segment_name(ordinal));
        // Leave no writable segment behind if anything below fails.
        state.open_ordinal = None;
        fs::rename(&open, &sealed)?;

        let next = ordinal + 1;
        create_empty_segment(&self.dir.join(open_segment_name(next)))?;
        state.open_ordinal = Some(next);
        tracing::info!(sealed = %sealed.display(), next_ordinal = next, "segment rotated");
        Ok(())
    }

    /// `sealed_segments * capacity + open_segment_count`.
    pub fn total_block_count(&self) -> Result<u64> {
        let ordinal = self.writer.lock().open_ordinal.ok_or_else(|| {
            LedgerError::misuse("segment store is not initialized")
        })?;
        let path = self.dir.join(open_segment_name(ordinal));
        let mut file = File::open(&path).map_err(|e| {
            if e.kind() == IoErrorKind::NotFound {
                LedgerError::not_found(format!("open segment {}", path.display()))
            } else {
                LedgerError::Io(e)
            }
        })?;
        let count = read_header(&mut file)?;
        Ok(u64::from(ordinal) * u64::from(self.capacity) + u64::from(count))
    }

    /// Block count of one segment, read from its header.
    pub fn segment_block_count(&self, ordinal: u32) -> Result<u32> {
        let mut file = File::open(resolve_segment_path(&self.dir, ordinal)?)?;
        read_header(&mut file)
    }

    /// Lazy sequence of locations from `start_height` to the current end.
    pub fn enumerate_metadata(&self, start_height: u64) -> Result<BlockMetadataIter> {
        let end = self.total_block_count()?;
        Ok(BlockMetadataIter::new(SegmentCursor::at_height(
            self.dir.clone(),
            self.capacity,
            start_height,
            end,
        )))
    }

    /// Like [`enumerate_metadata`](Self::enumerate_metadata), stopping with
    /// `Cancelled` once `cancel` is raised.
    pub fn enumerate_metadata_cancellable(
        &self,
        start_height: u64,
        cancel: CancelFlag,
    ) -> Result<BlockMetadataIter> {
        Ok(self.enumerate_metadata(start_height)?.with_cancel(cancel))
    }

    /// Random-access read of one block.
    pub fn read_block_direct(&self, segment_file: &str, offset: u64, length: u32) -> Result<Block> {
        let (ordinal, _) = parse_segment_name(segment_file).ok_or_else(|| {
            LedgerError::corrupt(format!("malformed segment name {segment_file:?}"))
        })?;
        let mut file = File::open(resolve_segment_path(&self.dir, ordinal)?)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut payload = vec![0u8; length as usize];
        read_exact_or_corrupt(&mut file, &mut payload, "block payload")?;
        codec::decode_block(&payload)
    }

    /// Read the block a location points at.
    pub fn read_block_at(&self, location: &BlockLocation) -> Result<Block> {
        self.read_block_direct(&location.segment_file, location.offset, location.length)
    }

    /// Lazy sequence of decoded blocks from `location` to the current end.
    pub fn read_blocks_from_point(&self, location: &BlockLocation) -> Result<BlocksFromPointIter> {
        let (ordinal, _) = parse_segment_name(&location.segment_file).ok_or_else(|| {
            LedgerError::corrupt(format!(
                "malformed segment name {:?}",
                location.segment_file
            ))
        })?;
        let end = self.total_block_count()?;
        let cursor = SegmentCursor::at_location(
            self.dir.clone(),
            self.capacity,
            ordinal,
            location.height,
            location.offset,
            end,
        )?;
        Ok(BlocksFromPointIter::new(cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn store(dir: &Path, capacity: u32) -> SegmentStore {
        let store = SegmentStore::new(dir.join("blockchain"), capacity);
        store.initialize().unwrap();
        store
    }

    fn chain(store: &SegmentStore, n: usize) -> Vec<BlockLocation> {
        let mut prev = Block::genesis();
        let mut locations = vec![store.append_block(&prev).unwrap()];
        for _ in 1..n {
            let block = Block::new(prev.hash().unwrap(), Vec::new());
            locations.push(store.append_block(&block).unwrap());
            prev = block;
        }
        locations
    }

    #[test]
    fn segment_names() {
        assert_eq!(sealed_segment_name(0), "000000.blk");
        assert_eq!(open_segment_name(12), "_000012.blk");
        assert_eq!(parse_segment_name("_000012.blk"), Some((12, true)));
        assert_eq!(parse_segment_name("000003.blk"), Some((3, false)));
        assert_eq!(parse_segment_name("3.blk"), None);
        assert_eq!(parse_segment_name("000003.txt"), None);
    }

    #[test]
    fn initialize_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        store.initialize().unwrap();
        assert_eq!(store.total_block_count().unwrap(), 0);
        assert!(dir.path().join("blockchain/_000000.blk").exists());
    }

    #[test]
    fn append_before_initialize_is_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::new(dir.path(), 10);
        let err = store.append_block(&Block::genesis()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConcurrencyMisuse);
    }

    #[test]
    fn append_reports_heights_and_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        let locations = chain(&store, 3);

        assert_eq!(locations[0].height, 0);
        assert_eq!(locations[0].offset, 8);
        assert_eq!(locations[1].offset, 8 + u64::from(locations[0].length) + 4);
        assert_eq!(locations[2].height, 2);
        assert_eq!(store.total_block_count().unwrap(), 3);
        assert_eq!(store.segment_block_count(0).unwrap(), 3);
    }

    #[test]
    fn rotation_seals_full_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);
        let locations = chain(&store, 5);

        let blockchain = dir.path().join("blockchain");
        assert!(blockchain.join("000000.blk").exists());
        assert!(!blockchain.join("_000000.blk").exists());
        assert!(blockchain.join("_000001.blk").exists());
        assert_eq!(locations[4].height, 4);
        assert_eq!(locations[4].segment_file, "000001.blk");
        assert_eq!(locations[4].offset, 8);
        assert_eq!(store.total_block_count().unwrap(), 5);
    }

    #[test]
    fn direct_read_resolves_open_and_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        let genesis = Block::genesis();
        let first = store.append_block(&genesis).unwrap();
        // Still in the open segment.
        assert_eq!(store.read_block_at(&first).unwrap(), genesis);

        let second = Block::new(genesis.hash().unwrap(), Vec::new());
        store.append_block(&second).unwrap();
        // Now sealed under the same name.
        assert_eq!(store.read_block_at(&first).unwrap(), genesis);
    }

    #[test]
    fn initialize_truncates_uncounted_tail() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        chain(&store, 2);
        let path = dir.path().join("blockchain/_000000.blk");
        let clean_len = fs::metadata(&path).unwrap().len();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[9, 9, 9, 9, 9, 9]).unwrap();
        drop(file);

        store.initialize().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), clean_len);
        chain(&store, 1);
        assert_eq!(store.total_block_count().unwrap(), 3);
        assert_eq!(store.enumerate_metadata(0).unwrap().count(), 3);
    }

    #[test]
    fn initialize_recovers_interrupted_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        chain(&store, 2);
        fs::remove_file(dir.path().join("blockchain/_000001.blk")).unwrap();

        let reopened = SegmentStore::new(dir.path().join("blockchain"), 2);
        reopened.initialize().unwrap();
        assert_eq!(reopened.total_block_count().unwrap(), 2);
    }

    #[test]
    fn initialize_seals_full_open_segment() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        let mut locations = chain(&store, 2);
        let log = dir.path().join("blockchain");
        // Header committed at capacity, rename never happened.
        fs::rename(log.join("000000.blk"), log.join("_000000.blk")).unwrap();
        fs::remove_file(log.join("_000001.blk")).unwrap();

        let reopened = SegmentStore::new(log.clone(), 2);
        reopened.initialize().unwrap();
        assert!(log.join("000000.blk").exists());
        assert!(log.join("_000001.blk").exists());
        assert_eq!(reopened.total_block_count().unwrap(), 2);

        let prev = reopened.read_block_at(&locations[1]).unwrap();
        let next = Block::new(prev.hash().unwrap(), Vec::new());
        locations.push(reopened.append_block(&next).unwrap());
        assert_eq!(locations[2].segment_file, "000001.blk");
        assert_eq!(reopened.total_block_count().unwrap(), 3);
        assert_eq!(reopened.enumerate_metadata(0).unwrap().count(), 3);
    }

    #[test]
    fn reopening_with_different_capacity_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 2);
        chain(&store, 3);

        let reopened = SegmentStore::new(dir.path().join("blockchain"), 3);
        let err = reopened.initialize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn missing_open_segment_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        fs::remove_file(dir.path().join("blockchain/_000000.blk")).unwrap();
        let err = store.append_block(&Block::genesis()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 10);
        let location = chain(&store, 1).remove(0);
        let err = store
            .read_block_direct(&location.segment_file, location.offset, location.length + 50)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
    }
}
