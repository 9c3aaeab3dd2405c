//! Record-Based File Manager (RBFM): the CORE. Builds typed, variable-length
//! tuple storage on top of [`crate::storage`]'s raw pages and
//! [`crate::page`]'s slotted-page layout.

use crate::attribute::{Attribute, PageNum, Rid, SlotNum};
use crate::error::{Error, Result};
use crate::page::{self, PageBuf, Slot, TOMBSTONE_LENGTH};
use crate::storage::FileHandle;
use crate::tuple;

fn read_page(fh: &mut FileHandle, page_num: PageNum) -> Result<PageBuf> {
    let mut buf = crate::aligned::Buffer::new();
    fh.read_page(page_num, &mut buf)?;
    Ok(PageBuf::from_buffer(buf))
}

fn write_page(fh: &mut FileHandle, page_num: PageNum, page: &PageBuf) -> Result<()> {
    fh.write_page(page_num, page.as_bytes())?;
    Ok(())
}

fn append_page(fh: &mut FileHandle, page: &PageBuf) -> Result<PageNum> {
    Ok(fh.append_page(page.as_bytes())?)
}

/// Insert `data` (already in tuple wire format under `descriptor`) and
/// return its newly assigned, stable record id.
pub fn insert(fh: &mut FileHandle, descriptor: &[Attribute], data: &[u8]) -> Result<Rid> {
    let size = tuple::encoded_size(descriptor, data)?;
    if size + 4 > crate::PAGE_SIZE - 4 - 2 {
        return Err(Error::RecordTooLarge { size });
    }

    let target_page = find_or_create_target_page(fh, size)?;
    let mut page = read_page(fh, target_page)?;

    let slot_num = match page.first_deleted_slot() {
        Some(s) => s,
        None => {
            let s = page.num_slots();
            page.set_num_slots(s + 1);
            s
        }
    };

    let offset = page.free_space_offset();
    page.write_record(offset, &data[..size]);
    page.set_slot(slot_num, Slot { offset, length: size as u16 });
    page.set_free_space_offset(offset + size as u16);

    write_page(fh, target_page, &page)?;
    Ok(Rid::new(target_page, slot_num))
}

/// Select a page to receive a `size`-byte record: the last page if it has
/// room, else the first earlier page (scanning from page 0) that does, else
/// a freshly appended page. Ties favor the last page.
fn find_or_create_target_page(fh: &mut FileHandle, size: usize) -> Result<PageNum> {
    if fh.page_count() == 0 {
        let page = PageBuf::new();
        append_page(fh, &page)?;
    }

    let page_count = fh.page_count();
    let last = page_count - 1;
    if read_page(fh, last)?.can_hold(size) {
        return Ok(last);
    }

    if page_count > 1 {
        for p in 0..last {
            if read_page(fh, p)?.can_hold(size) {
                return Ok(p);
            }
        }
    }

    let page = PageBuf::new();
    append_page(fh, &page)
}

/// Follow `rid` to its current record, returning `(page, page_num, slot)`
/// for whichever slot is authoritative (i.e. not a tombstone).
fn resolve(fh: &mut FileHandle, rid: Rid) -> Result<(PageBuf, PageNum, SlotNum)> {
    let page = read_page(fh, rid.page)?;
    let slot = page::check_slot(&page, rid.page, rid.slot)?;

    if slot.length == 0 {
        return Err(Error::RecordDeleted);
    }
    if slot.is_tombstone() {
        let (fwd_page, fwd_slot) = page.read_tombstone(slot.offset);
        return resolve(fh, Rid::new(fwd_page, fwd_slot));
    }
    Ok((page, rid.page, rid.slot))
}

/// Read the record addressed by `rid` (following any tombstone chain) into
/// `out`, replacing its contents.
pub fn read(fh: &mut FileHandle, rid: Rid, out: &mut Vec<u8>) -> Result<()> {
    let (page, _, slot_num) = resolve(fh, rid)?;
    let slot = page.slot(slot_num);
    out.clear();
    out.extend_from_slice(page.read_record(slot.offset, slot.length));
    Ok(())
}

/// Delete the record addressed by `rid`. Idempotent: deleting an
/// already-deleted record returns `Ok(())`.
pub fn delete(fh: &mut FileHandle, _descriptor: &[Attribute], rid: Rid) -> Result<()> {
    let mut page = read_page(fh, rid.page)?;
    let slot = page::check_slot(&page, rid.page, rid.slot)?;

    if slot.length == 0 {
        return Ok(());
    }

    if slot.is_tombstone() {
        let (fwd_page, fwd_slot) = page.read_tombstone(slot.offset);
        delete(fh, _descriptor, Rid::new(fwd_page, fwd_slot))?;
        page.compact_after_removal(slot.offset, 6);
        page.mark_deleted(rid.slot);
    } else {
        page.compact_after_removal(slot.offset, slot.length);
        page.mark_deleted(rid.slot);
    }

    write_page(fh, rid.page, &page)
}

/// Replace the record addressed by `rid` with `new_data`. The rid remains
/// valid and continues to read back `new_data` afterward, even if the update
/// grows past the original slot's page.
pub fn update(
    fh: &mut FileHandle,
    descriptor: &[Attribute],
    rid: Rid,
    new_data: &[u8],
) -> Result<()> {
    let mut page = read_page(fh, rid.page)?;
    let slot = page::check_slot(&page, rid.page, rid.slot)?;

    if slot.length == 0 {
        return Err(Error::RecordDeleted);
    }
    if slot.is_tombstone() {
        let (fwd_page, fwd_slot) = page.read_tombstone(slot.offset);
        return update(fh, descriptor, Rid::new(fwd_page, fwd_slot), new_data);
    }

    let new_size = tuple::encoded_size(descriptor, new_data)?;

    if new_size <= slot.length as usize {
        page.write_record(slot.offset, &new_data[..new_size]);
        let diff = slot.length as usize - new_size;
        if diff > 0 {
            page.compact_after_removal(slot.offset + new_size as u16, diff as u16);
        }
        page.set_slot(
            rid.slot,
            Slot {
                offset: slot.offset,
                length: new_size as u16,
            },
        );
        return write_page(fh, rid.page, &page);
    }

    // Growing: evict the old payload from this page first, then see where
    // the new value can go. The in-page-fit check happens before the inner
    // `insert` call below so we don't needlessly relocate a record that
    // would have fit right back where it started.
    page.compact_after_removal(slot.offset, slot.length);
    page.mark_deleted(rid.slot);

    if page.can_hold_in_existing_slot(new_size) {
        let offset = page.free_space_offset();
        page.write_record(offset, &new_data[..new_size]);
        page.set_slot(
            rid.slot,
            Slot {
                offset,
                length: new_size as u16,
            },
        );
        page.set_free_space_offset(offset + new_size as u16);
        return write_page(fh, rid.page, &page);
    }

    write_page(fh, rid.page, &page)?;

    let new_rid = insert(fh, descriptor, new_data)?;

    let mut page = read_page(fh, rid.page)?;
    if !page.can_hold_in_existing_slot(6) {
        return Err(Error::NoSpaceForTombstone);
    }
    let offset = page.free_space_offset();
    page.write_tombstone(offset, new_rid.page, new_rid.slot);
    page.set_slot(
        rid.slot,
        Slot {
            offset,
            length: TOMBSTONE_LENGTH,
        },
    );
    page.set_free_space_offset(offset + 6);
    write_page(fh, rid.page, &page)
}

/// Read a single attribute of the record addressed by `rid` (following any
/// tombstone chain) as `[1-byte null-indicator][field bytes]`.
pub fn read_attribute(
    fh: &mut FileHandle,
    descriptor: &[Attribute],
    rid: Rid,
    attr_name: &str,
    out: &mut Vec<u8>,
) -> Result<()> {
    let idx = descriptor
        .iter()
        .position(|a| a.name == attr_name)
        .ok_or_else(|| Error::NoSuchAttribute {
            attribute: attr_name.to_string(),
        })?;

    let (page, _, slot_num) = resolve(fh, rid)?;
    let slot = page.slot(slot_num);
    let record = page.read_record(slot.offset, slot.length).to_vec();

    out.clear();
    tuple::extract_one(descriptor, &record, record.len(), idx, out)
}
