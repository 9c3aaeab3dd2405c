//! End-to-end scenarios and property tests spanning `page`, `tuple`, `rbfm`
//! and `scan` together, the way a single unit test in the source layer
//! never would: these exercise whole files, not a single function.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tupledb::attribute::{AttrType, Attribute, CompOp, Rid};
use tupledb::error::Error;
use tupledb::scan::RbfmScanIterator;
use tupledb::storage;
use tupledb::{rbfm, tuple};

/// Acts as a PathBuf, but removes any file found at the path when it goes
/// out of scope. Integration tests can't see the library's own `testutils`
/// module (it's `pub(crate)`), so this is a small self-contained twin.
struct TempPath {
    path: PathBuf,
}

impl Drop for TempPath {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self);
    }
}

impl AsRef<Path> for TempPath {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl std::ops::Deref for TempPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.path
    }
}

fn test_path(name: &str) -> TempPath {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("data");
    path.push("test");
    path.push(name);
    TempPath { path }
}

fn employee_descriptor() -> Vec<Attribute> {
    vec![
        Attribute::new("EmpName", AttrType::VarChar, 30),
        Attribute::new("Age", AttrType::Int32, 4),
        Attribute::new("Height", AttrType::Float32, 4),
        Attribute::new("Salary", AttrType::Int32, 4),
    ]
}

fn encode_employee(name: &str, age: i32, height: f32, salary: i32) -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&(name.len() as i32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&age.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&salary.to_le_bytes());
    out
}

fn encode_employee_with_nulls(name: &str, age: Option<i32>, height: f32, salary: Option<i32>) -> Vec<u8> {
    let mut nulls = 0u8;
    if age.is_none() {
        nulls |= 1 << 6;
    }
    if salary.is_none() {
        nulls |= 1 << 4;
    }
    let mut out = vec![nulls];
    out.extend_from_slice(&(name.len() as i32).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    if let Some(age) = age {
        out.extend_from_slice(&age.to_le_bytes());
    }
    out.extend_from_slice(&height.to_le_bytes());
    if let Some(salary) = salary {
        out.extend_from_slice(&salary.to_le_bytes());
    }
    out
}

fn fresh_file(name: &str) -> anyhow::Result<(storage::FileHandle, TempPath)> {
    let path = test_path(name);
    let _ = storage::destroy(&path);
    storage::create(&path)?;
    Ok((storage::open(&path)?, path))
}

/// Scenario 1: insert/read round trip with an exact `printRecord` string.
#[test]
fn scenario_1_insert_read_round_trip() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s1.data")?;
    let descriptor = employee_descriptor();
    let data = encode_employee("Anteater", 25, 177.8, 6200);

    let rid = rbfm::insert(&mut fh, &descriptor, &data)?;
    let mut out = Vec::new();
    rbfm::read(&mut fh, rid, &mut out)?;
    assert_eq!(out, data);
    assert_eq!(
        tuple::print_record(&descriptor, &out)?,
        "EmpName: Anteater, Age: 25, Height: 177.8, Salary: 6200"
    );

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

/// Scenario 2: nulls round trip and print as `NULL`.
#[test]
fn scenario_2_nulls() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s2.data")?;
    let descriptor = employee_descriptor();
    let data = encode_employee_with_nulls("Anteater", None, 177.8, None);
    assert_eq!(data[0], 0x50);

    let rid = rbfm::insert(&mut fh, &descriptor, &data)?;
    let mut out = Vec::new();
    rbfm::read(&mut fh, rid, &mut out)?;
    assert_eq!(out, data);
    assert_eq!(
        tuple::print_record(&descriptor, &out)?,
        "EmpName: Anteater, Age: NULL, Height: 177.8, Salary: NULL"
    );

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

/// Scenario 3: 10,000 variable-size records, deterministically sized from
/// their index, all reachable afterward by their original rid.
#[test]
fn scenario_3_massive_insert_and_read() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s3.data")?;
    let descriptor = vec![Attribute::new("Body", AttrType::VarChar, 50)];

    let n = 10_000;
    let mut rids = Vec::with_capacity(n);
    let mut expected = Vec::with_capacity(n);
    for i in 0..n {
        let len = (i % 50) + 1;
        let body: String = std::iter::repeat('x').take(len).collect();
        let mut data = vec![0u8];
        data.extend_from_slice(&(len as i32).to_le_bytes());
        data.extend_from_slice(body.as_bytes());
        rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
        expected.push(data);
    }

    for (rid, data) in rids.iter().zip(expected.iter()) {
        let mut out = Vec::new();
        rbfm::read(&mut fh, *rid, &mut out)?;
        assert_eq!(&out, data);
    }

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

/// Scenario 4: growing an update past its page's remaining room leaves a
/// tombstone behind but keeps the original rid readable.
#[test]
fn scenario_4_update_grow_crosses_page() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s4.data")?;
    let descriptor = employee_descriptor();

    let small = encode_employee("A", 1, 1.0, 1);
    let rid = rbfm::insert(&mut fh, &descriptor, &small)?;

    let filler = encode_employee(&"f".repeat(150), 2, 2.0, 2);
    loop {
        let mut buf = tupledb::aligned::Buffer::new();
        fh.read_page(rid.page, &mut buf)?;
        let page = tupledb::page::PageBuf::from_buffer(buf);
        if !page.can_hold(filler.len()) {
            break;
        }
        rbfm::insert(&mut fh, &descriptor, &filler)?;
    }

    let grown = encode_employee(&"g".repeat(800), 9, 9.0, 9);
    rbfm::update(&mut fh, &descriptor, rid, &grown)?;

    let mut out = Vec::new();
    rbfm::read(&mut fh, rid, &mut out)?;
    assert_eq!(out, grown);

    let mut buf = tupledb::aligned::Buffer::new();
    fh.read_page(rid.page, &mut buf)?;
    let page = tupledb::page::PageBuf::from_buffer(buf);
    let slot = page.slot(rid.slot);
    assert!(slot.is_tombstone());

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

/// Scenario 5: delete one record, then scan with a predicate and a
/// projection, yielding exactly the surviving rows that match.
#[test]
fn scenario_5_delete_then_filtered_projected_scan() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s5.data")?;
    let descriptor = employee_descriptor();

    let ages = [25, 30, 35, 40, 27];
    let mut rids = Vec::new();
    for &age in &ages {
        let data = encode_employee("Employee", age, 170.0, 5000);
        rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
    }
    rbfm::delete(&mut fh, &descriptor, rids[1])?; // age=30

    let value = 30i32.to_le_bytes().to_vec();
    let mut scan = RbfmScanIterator::new(
        &mut fh,
        descriptor.clone(),
        "Age",
        CompOp::Ge,
        value,
        vec!["Age".to_string(), "Height".to_string(), "EmpName".to_string()],
    );

    let proj_descriptor = vec![
        Attribute::new("Age", AttrType::Int32, 4),
        Attribute::new("Height", AttrType::Float32, 4),
        Attribute::new("EmpName", AttrType::VarChar, 30),
    ];

    let mut seen = Vec::new();
    let mut rid = Rid::new(0, 0);
    let mut out = Vec::new();
    while scan.next(&mut fh, &mut rid, &mut out)? {
        let mut age_out = Vec::new();
        tuple::extract_one(&proj_descriptor, &out, out.len(), 0, &mut age_out)?;
        seen.push(i32::from_le_bytes(age_out[1..5].try_into().unwrap()));
    }
    scan.close();

    assert_eq!(seen, vec![35, 40]);

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

/// Scenario 6: after scenario 4's tombstone chain, `readAttribute` still
/// sees the current value.
#[test]
fn scenario_6_tombstone_transparent_to_read_attribute() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::s6.data")?;
    let descriptor = employee_descriptor();

    let small = encode_employee("A", 1, 1.0, 1);
    let rid = rbfm::insert(&mut fh, &descriptor, &small)?;

    let filler = encode_employee(&"f".repeat(150), 2, 2.0, 2);
    loop {
        let mut buf = tupledb::aligned::Buffer::new();
        fh.read_page(rid.page, &mut buf)?;
        let page = tupledb::page::PageBuf::from_buffer(buf);
        if !page.can_hold(filler.len()) {
            break;
        }
        rbfm::insert(&mut fh, &descriptor, &filler)?;
    }

    let grown = encode_employee("RelocatedName", 9, 9.0, 9);
    rbfm::update(&mut fh, &descriptor, rid, &grown)?;

    let mut out = Vec::new();
    rbfm::read_attribute(&mut fh, &descriptor, rid, "EmpName", &mut out)?;
    assert_eq!(out[0], 0x00);
    assert_eq!(&out[1..5], &13i32.to_le_bytes());
    assert_eq!(&out[5..], b"RelocatedName");

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

// --- Property-style tests (P1-P8) ---
//
// These generate inputs from a seeded `rand::rngs::StdRng` rather than
// pulling in a dedicated property-testing crate the corpus doesn't already
// use; each test runs many seeded trials in a loop.

fn random_employee(rng: &mut StdRng) -> (String, i32, f32, i32) {
    let len = rng.gen_range(1, 40);
    let name: String = (0..len).map(|_| rng.gen_range(b'a', b'z' + 1) as char).collect();
    (name, rng.gen_range(0, 100), rng.gen_range(-100.0, 2000.0), rng.gen_range(-1000, 100_000))
}

#[test]
fn p1_round_trip() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p1.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(1);

    for _ in 0..200 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        let rid = rbfm::insert(&mut fh, &descriptor, &data)?;
        let mut out = Vec::new();
        rbfm::read(&mut fh, rid, &mut out)?;
        assert_eq!(out, data);
    }

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p2_rid_stability_under_unrelated_mutation() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p2.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(2);

    let anchor_data = encode_employee("Anchor", 50, 50.0, 5000);
    let anchor_rid = rbfm::insert(&mut fh, &descriptor, &anchor_data)?;

    let mut other_rids = Vec::new();
    for _ in 0..50 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        other_rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
    }

    for (i, &rid) in other_rids.iter().enumerate() {
        if i % 2 == 0 {
            rbfm::delete(&mut fh, &descriptor, rid)?;
        } else {
            let (name, age, height, salary) = random_employee(&mut rng);
            let data = encode_employee(&name, age, height, salary);
            rbfm::update(&mut fh, &descriptor, rid, &data)?;
        }
    }

    let mut out = Vec::new();
    rbfm::read(&mut fh, anchor_rid, &mut out)?;
    assert_eq!(out, anchor_data);

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p3_update_visible_across_many_updates() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p3.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(3);

    let mut data = encode_employee("Start", 1, 1.0, 1);
    let rid = rbfm::insert(&mut fh, &descriptor, &data)?;

    for _ in 0..40 {
        let (name, age, height, salary) = random_employee(&mut rng);
        data = encode_employee(&name, age, height, salary);
        rbfm::update(&mut fh, &descriptor, rid, &data)?;
        let mut out = Vec::new();
        rbfm::read(&mut fh, rid, &mut out)?;
        assert_eq!(out, data);
    }

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p4_delete_idempotent() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p4.data")?;
    let descriptor = employee_descriptor();
    let data = encode_employee("Gone", 1, 1.0, 1);
    let rid = rbfm::insert(&mut fh, &descriptor, &data)?;

    rbfm::delete(&mut fh, &descriptor, rid)?;
    rbfm::delete(&mut fh, &descriptor, rid)?;
    rbfm::delete(&mut fh, &descriptor, rid)?;

    let mut out = Vec::new();
    let err = rbfm::read(&mut fh, rid, &mut out).unwrap_err();
    assert!(matches!(err, Error::RecordDeleted));

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p5_scan_yields_each_live_record_once() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p5.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(5);

    let mut rids = Vec::new();
    for _ in 0..80 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
    }

    // Delete a third, update a third (some crossing pages by growing a lot).
    let mut deleted = 0;
    for (i, &rid) in rids.iter().enumerate() {
        match i % 3 {
            0 => {
                rbfm::delete(&mut fh, &descriptor, rid)?;
                deleted += 1;
            }
            1 => {
                let grown = encode_employee(&"z".repeat(120), 1, 1.0, 1);
                rbfm::update(&mut fh, &descriptor, rid, &grown)?;
            }
            _ => {}
        }
    }

    let live = rids.len() - deleted;

    let mut scan = RbfmScanIterator::new(
        &mut fh,
        descriptor.clone(),
        "",
        CompOp::NoOp,
        Vec::new(),
        vec!["EmpName".to_string()],
    );

    let mut count = 0;
    let mut rid = Rid::new(0, 0);
    let mut out = Vec::new();
    while scan.next(&mut fh, &mut rid, &mut out)? {
        count += 1;
    }
    scan.close();

    assert_eq!(count, live);

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p6_page_invariants_hold_after_compaction() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p6.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(6);

    let mut rids = Vec::new();
    for _ in 0..60 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
    }
    for (i, &rid) in rids.iter().enumerate() {
        if i % 2 == 0 {
            rbfm::delete(&mut fh, &descriptor, rid)?;
        } else {
            let (name, age, height, salary) = random_employee(&mut rng);
            let shrunk = encode_employee(&name[..1.min(name.len())], age, height, salary);
            rbfm::update(&mut fh, &descriptor, rid, &shrunk)?;
        }
    }

    let page_count = fh.page_count();
    for p in 0..page_count {
        let mut buf = tupledb::aligned::Buffer::new();
        fh.read_page(p, &mut buf)?;
        let page = tupledb::page::PageBuf::from_buffer(buf);
        let free = page.free_space_offset();
        let slot_dir_start = page.slot_dir_start();
        assert!(free <= slot_dir_start);

        let mut occupied = vec![false; free as usize];
        for s in 0..page.num_slots() {
            let slot = page.slot(s);
            if slot.is_empty() {
                continue;
            }
            let length = if slot.is_tombstone() { 6 } else { slot.length };
            assert!(slot.offset as usize + length as usize <= free as usize);
            for b in occupied
                .iter_mut()
                .skip(slot.offset as usize)
                .take(length as usize)
            {
                assert!(!*b, "overlapping live records on page {}", p);
                *b = true;
            }
        }
    }

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}

#[test]
fn p7_projection_matches_descriptor_restricted_decode() -> anyhow::Result<()> {
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..100 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        let size = tuple::encoded_size(&descriptor, &data)?;

        let projection = vec!["Salary".to_string(), "EmpName".to_string()];
        let projected = tuple::project(&descriptor, &data, size, &projection);
        let proj_descriptor = vec![
            Attribute::new("Salary", AttrType::Int32, 4),
            Attribute::new("EmpName", AttrType::VarChar, 30),
        ];
        let proj_size = tuple::encoded_size(&proj_descriptor, &projected)?;

        let mut salary_out = Vec::new();
        tuple::extract_one(&proj_descriptor, &projected, proj_size, 0, &mut salary_out)?;
        let mut expected_salary_out = Vec::new();
        tuple::extract_one(&descriptor, &data, size, 3, &mut expected_salary_out)?;
        assert_eq!(salary_out, expected_salary_out);

        let mut name_out = Vec::new();
        tuple::extract_one(&proj_descriptor, &projected, proj_size, 1, &mut name_out)?;
        let mut expected_name_out = Vec::new();
        tuple::extract_one(&descriptor, &data, size, 0, &mut expected_name_out)?;
        assert_eq!(name_out, expected_name_out);
    }
    Ok(())
}

#[test]
fn p8_scan_filter_matches_predicate_exactly() -> anyhow::Result<()> {
    let (mut fh, path) = fresh_file("test-tupledb::scenarios::p8.data")?;
    let descriptor = employee_descriptor();
    let mut rng = StdRng::seed_from_u64(8);

    let mut rids = Vec::new();
    let mut records = Vec::new();
    for _ in 0..120 {
        let (name, age, height, salary) = random_employee(&mut rng);
        let data = encode_employee(&name, age, height, salary);
        rids.push(rbfm::insert(&mut fh, &descriptor, &data)?);
        records.push(data);
    }

    let threshold = 50i32;
    let value = threshold.to_le_bytes().to_vec();

    let mut expected = Vec::new();
    for i in 0..rids.len() {
        let data = &records[i];
        if tuple::matches(&descriptor, data, data.len(), "Age", CompOp::Gt, &value) {
            expected.push(rids[i]);
        }
    }
    expected.sort_by_key(|r: &Rid| (r.page, r.slot));

    let mut scan = RbfmScanIterator::new(
        &mut fh,
        descriptor.clone(),
        "Age",
        CompOp::Gt,
        value,
        vec!["Age".to_string()],
    );

    let mut actual = Vec::new();
    let mut rid = Rid::new(0, 0);
    let mut out = Vec::new();
    while scan.next(&mut fh, &mut rid, &mut out)? {
        actual.push(rid);
    }
    scan.close();
    actual.sort_by_key(|r| (r.page, r.slot));

    assert_eq!(actual, expected);

    fh.close()?;
    storage::destroy(&path)?;
    Ok(())
}
