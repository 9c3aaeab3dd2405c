//! Filtered, projected scan iterator over an RBFM file.

use crate::attribute::{Attribute, CompOp, Rid};
use crate::error::Result;
use crate::page::{self, PageBuf};
use crate::storage::FileHandle;
use crate::tuple;

/// Iterates every live record of a file, in page/slot order, skipping
/// tombstones and deleted slots, applying an optional predicate and
/// projection.
///
/// Not snapshot-isolated: an update that relocates a record to a page the
/// scan has already passed will be missed. Callers must not mutate the file
/// while a scan is in progress.
pub struct RbfmScanIterator {
    descriptor: Vec<Attribute>,
    cond_attr: String,
    op: CompOp,
    value: Vec<u8>,
    projection: Vec<String>,
    page: u32,
    slot: u16,
    page_count: u32,
    current_page: Option<PageBuf>,
}

impl RbfmScanIterator {
    pub fn new(
        fh: &mut FileHandle,
        descriptor: Vec<Attribute>,
        cond_attr: impl Into<String>,
        op: CompOp,
        value: Vec<u8>,
        projection: Vec<String>,
    ) -> RbfmScanIterator {
        RbfmScanIterator {
            descriptor,
            cond_attr: cond_attr.into(),
            op,
            value,
            projection,
            page: 0,
            slot: 0,
            page_count: fh.page_count(),
            current_page: None,
        }
    }

    /// Release any cached page buffer. Cheap and idempotent; a scan can be
    /// dropped without calling this, but it matches the original interface's
    /// explicit `close`.
    pub fn close(&mut self) {
        self.current_page = None;
    }

    /// Advance to the next record satisfying the predicate, writing its rid
    /// into `rid` and its projected, wire-format bytes into `out`.
    /// Returns `Ok(false)` at end of file.
    pub fn next(&mut self, fh: &mut FileHandle, rid: &mut Rid, out: &mut Vec<u8>) -> Result<bool> {
        loop {
            if self.page >= self.page_count {
                self.current_page = None;
                return Ok(false);
            }

            if self.current_page.is_none() {
                let mut buf = crate::aligned::Buffer::new();
                fh.read_page(self.page, &mut buf)?;
                self.current_page = Some(PageBuf::from_buffer(buf));
            }

            let page = self.current_page.as_ref().unwrap();
            let num_slots = page.num_slots();

            if self.slot >= num_slots {
                self.page += 1;
                self.slot = 0;
                self.current_page = None;
                continue;
            }

            let slot_num = self.slot;
            self.slot += 1;
            let slot = page::check_slot(page, self.page, slot_num)?;

            if slot.is_empty() || slot.is_tombstone() {
                continue;
            }

            let candidate = Rid::new(self.page, slot_num);
            let mut record = Vec::new();
            crate::rbfm::read(fh, candidate, &mut record)?;

            if !tuple::matches(
                &self.descriptor,
                &record,
                record.len(),
                &self.cond_attr,
                self.op,
                &self.value,
            ) {
                continue;
            }

            *rid = candidate;
            *out = tuple::project(&self.descriptor, &record, record.len(), &self.projection);
            return Ok(true);
        }
    }
}

/// Bundles a [`RbfmScanIterator`] with the file handle it reads through, so
/// it can implement [`Iterator`] directly for use in `for` loops — `next`
/// alone can't borrow a `FileHandle` on every call the way `Iterator::next`
/// is shaped.
pub struct ScanWithHandle<'a> {
    pub fh: &'a mut FileHandle,
    pub scan: RbfmScanIterator,
}

impl<'a> Iterator for ScanWithHandle<'a> {
    type Item = Result<(Rid, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut rid = Rid::new(0, 0);
        let mut out = Vec::new();
        match self.scan.next(self.fh, &mut rid, &mut out) {
            Ok(true) => Some(Ok((rid, out))),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
