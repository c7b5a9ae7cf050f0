//! Forward-only, single-pass readers over the segment log.
//!
//! Both sequences share one [`SegmentCursor`] whose state is
//! `(segment ordinal, byte offset, blocks read in segment)`. The cursor is
//! bounded by the block count observed when it was created, so blocks
//! appended afterwards are never yielded. Any error fuses the sequence.
//!
//! Skipping to a start height costs one length-prefix read per skipped
//! block in the first segment; earlier segments are skipped by arithmetic.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::block::{Block, BlockLocation};
use super::segment::{read_exact_or_corrupt, resolve_segment_path, sealed_segment_name, SEGMENT_HEADER_LEN};
use crate::codec;
use crate::error::{LedgerError, Result};

// ---------------------------------------------------------------------------
// CancelFlag
// ---------------------------------------------------------------------------

/// Shared flag that stops a running sequence at the next block boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// SegmentCursor
// ---------------------------------------------------------------------------

/// One raw entry read from the log.
pub(crate) struct RawEntry {
    pub ordinal: u32,
    pub height: u64,
    pub offset: u64,
    pub payload: Vec<u8>,
}

pub(crate) struct SegmentCursor {
    dir: PathBuf,
    capacity: u32,
    ordinal: u32,
    offset: u64,
    read_in_segment: u32,
    /// Entries to skip in the current segment before the first yield.
    pending_skip: u32,
    height: u64,
    end_height: u64,
    reader: Option<BufReader<File>>,
    cancel: Option<CancelFlag>,
    done: bool,
}

impl SegmentCursor {
    /// Cursor positioned at `start` by height; the in-segment skip happens
    /// lazily on the first read.
    pub fn at_height(dir: PathBuf, capacity: u32, start: u64, end_height: u64) -> Self {
        let capacity64 = u64::from(capacity.max(1));
        Self {
            dir,
            capacity,
            ordinal: (start / capacity64) as u32,
            offset: SEGMENT_HEADER_LEN,
            read_in_segment: 0,
            pending_skip: (start % capacity64) as u32,
            height: start,
            end_height,
            reader: None,
            cancel: None,
            done: start >= end_height,
        }
    }

    /// Cursor positioned at a known payload offset.
    pub fn at_location(
        dir: PathBuf,
        capacity: u32,
        ordinal: u32,
        height: u64,
        payload_offset: u64,
        end_height: u64,
    ) -> Result<Self> {
        let capacity64 = u64::from(capacity.max(1));
        if height / capacity64 != u64::from(ordinal) || payload_offset < SEGMENT_HEADER_LEN + 4 {
            return Err(LedgerError::corrupt(format!(
                "location height {height} offset {payload_offset} does not fit segment {}",
                sealed_segment_name(ordinal)
            )));
        }
        Ok(Self {
            dir,
            capacity,
            ordinal,
            offset: payload_offset - 4,
            read_in_segment: (height % capacity64) as u32,
            pending_skip: 0,
            height,
            end_height,
            reader: None,
            cancel: None,
            done: height >= end_height,
        })
    }

    pub fn set_cancel(&mut self, cancel: CancelFlag) {
        self.cancel = Some(cancel);
    }

    fn open_current(&mut self) -> Result<&mut BufReader<File>> {
        if self.reader.is_none() {
            let path = resolve_segment_path(&self.dir, self.ordinal)?;
            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(self.offset))?;
            self.reader = Some(BufReader::new(file));
        }
        self.reader
            .as_mut()
            .ok_or_else(|| LedgerError::not_found("segment reader"))
    }

    fn read_length(&mut self) -> Result<u32> {
        let mut raw = [0u8; 4];
        read_exact_or_corrupt(self.open_current()?, &mut raw, "length prefix")?;
        Ok(u32::from_le_bytes(raw))
    }

    fn skip_pending(&mut self) -> Result<()> {
        while self.pending_skip > 0 {
            let len = self.read_length()?;
            self.open_current()?.seek_relative(i64::from(len))?;
            self.offset += 4 + u64::from(len);
            self.read_in_segment += 1;
            self.pending_skip -= 1;
        }
        Ok(())
    }

    fn read_next(&mut self) -> Result<RawEntry> {
        if let Some(cancel) = &self.cancel {
            if cancel.is_cancelled() {
                return Err(LedgerError::Cancelled);
            }
        }
        if self.read_in_segment == self.capacity {
            self.ordinal += 1;
            self.offset = SEGMENT_HEADER_LEN;
            self.read_in_segment = 0;
            self.reader = None;
        }
        self.skip_pending()?;

        let len = self.read_length()?;
        let mut payload = vec![0u8; len as usize];
        read_exact_or_corrupt(self.open_current()?, &mut payload, "block payload")?;

        let entry = RawEntry {
            ordinal: self.ordinal,
            height: self.height,
            offset: self.offset + 4,
            payload,
        };
        self.offset += 4 + u64::from(len);
        self.read_in_segment += 1;
        self.height += 1;
        Ok(entry)
    }

    /// Next entry, or `None` at the bound. Errors fuse the cursor.
    pub fn next_entry(&mut self) -> Option<Result<RawEntry>> {
        if self.done || self.height >= self.end_height {
            return None;
        }
        let result = self.read_next();
        if result.is_err() {
            self.done = true;
            self.reader = None;
        }
        Some(result)
    }
}

// ---------------------------------------------------------------------------
// Public Sequences
// ---------------------------------------------------------------------------

/// Locations of blocks from a start height to the end of the log.
pub struct BlockMetadataIter {
    cursor: SegmentCursor,
}

impl BlockMetadataIter {
    pub(crate) fn new(cursor: SegmentCursor) -> Self {
        Self { cursor }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cursor.set_cancel(cancel);
        self
    }
}

impl Iterator for BlockMetadataIter {
    type Item = Result<BlockLocation>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next_entry()?;
        Some(entry.and_then(|entry| {
            let block = codec::decode_block(&entry.payload)?;
            Ok(BlockLocation {
                hash: block.hash()?,
                segment_file: sealed_segment_name(entry.ordinal),
                height: entry.height,
                offset: entry.offset,
                length: entry.payload.len() as u32,
            })
        }))
    }
}

/// Decoded blocks from a captured location to the end of the log.
pub struct BlocksFromPointIter {
    cursor: SegmentCursor,
}

impl BlocksFromPointIter {
    pub(crate) fn new(cursor: SegmentCursor) -> Self {
        Self { cursor }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cursor.set_cancel(cancel);
        self
    }
}

impl Iterator for BlocksFromPointIter {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.cursor.next_entry()?;
        Some(entry.and_then(|entry| codec::decode_block(&entry.payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::storage::segment::SegmentStore;
    use std::fs::OpenOptions;
    use std::path::Path;

    fn filled(dir: &Path, capacity: u32, n: usize) -> (SegmentStore, Vec<Block>, Vec<BlockLocation>) {
        let store = SegmentStore::new(dir.join("blockchain"), capacity);
        store.initialize().unwrap();
        let mut blocks = vec![Block::genesis()];
        for _ in 1..n {
            let prev = blocks.last().unwrap().hash().unwrap();
            blocks.push(Block::new(prev, Vec::new()));
        }
        let locations = blocks.iter().map(|b| store.append_block(b).unwrap()).collect();
        (store, blocks, locations)
    }

    fn truncate_open_segment(dir: &Path, len: u64) {
        let file = OpenOptions::new()
            .write(true)
            .open(dir.join("blockchain/_000000.blk"))
            .unwrap();
        file.set_len(len).unwrap();
    }

    #[test]
    fn truncated_tail_is_corrupt_and_fuses() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, locations) = filled(dir.path(), 10, 3);
        let last = &locations[2];
        // Cut into the last payload; the header still counts three blocks.
        truncate_open_segment(dir.path(), last.offset + u64::from(last.length) - 5);

        let mut iter = store.enumerate_metadata(0).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), locations[0]);
        assert_eq!(iter.next().unwrap().unwrap(), locations[1]);
        assert_eq!(iter.next().unwrap().unwrap_err().kind(), ErrorKind::CorruptData);
        assert!(iter.next().is_none());
    }

    #[test]
    fn truncated_length_prefix_is_corrupt_and_fuses() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, locations) = filled(dir.path(), 10, 3);
        // Two bytes of the last length prefix survive.
        truncate_open_segment(dir.path(), locations[2].offset - 2);

        let mut iter = store.enumerate_metadata(1).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), locations[1]);
        assert_eq!(iter.next().unwrap().unwrap_err().kind(), ErrorKind::CorruptData);
        assert!(iter.next().is_none());
    }

    #[test]
    fn metadata_matches_append_locations() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, locations) = filled(dir.path(), 3, 8);
        let scanned: Vec<_> = store
            .enumerate_metadata(0)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(scanned, locations);
    }

    #[test]
    fn metadata_skips_to_start_height() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, locations) = filled(dir.path(), 3, 8);
        for start in 0..=8u64 {
            let scanned: Vec<_> = store
                .enumerate_metadata(start)
                .unwrap()
                .collect::<Result<_>>()
                .unwrap();
            assert_eq!(scanned, locations[start as usize..], "start {start}");
        }
        assert_eq!(store.enumerate_metadata(50).unwrap().count(), 0);
    }

    #[test]
    fn sequence_is_bounded_at_creation() {
        let dir = tempfile::tempdir().unwrap();
        let (store, blocks, _) = filled(dir.path(), 3, 4);
        let iter = store.enumerate_metadata(0).unwrap();
        store
            .append_block(&Block::new(blocks[3].hash().unwrap(), Vec::new()))
            .unwrap();
        assert_eq!(iter.count(), 4);
        assert_eq!(store.enumerate_metadata(0).unwrap().count(), 5);
    }

    #[test]
    fn blocks_from_point_spans_segments() {
        let dir = tempfile::tempdir().unwrap();
        let (store, blocks, locations) = filled(dir.path(), 3, 7);
        let read: Vec<Block> = store
            .read_blocks_from_point(&locations[2])
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(read, blocks[2..]);
    }

    #[test]
    fn cancellation_stops_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, _) = filled(dir.path(), 3, 6);
        let cancel = CancelFlag::new();
        let mut iter = store.enumerate_metadata_cancellable(0, cancel.clone()).unwrap();
        assert!(iter.next().unwrap().is_ok());
        cancel.cancel();
        assert!(matches!(iter.next(), Some(Err(LedgerError::Cancelled))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn misplaced_location_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _, locations) = filled(dir.path(), 3, 5);
        let mut bad = locations[4].clone();
        bad.segment_file = sealed_segment_name(0);
        assert!(store.read_blocks_from_point(&bad).is_err());
    }
}
