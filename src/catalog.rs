//! Relation Manager (RM): a minimal self-describing catalog built entirely
//! on top of RBFM. Two bootstrap tables, `Tables` and `Columns`, record every
//! other table's schema; this module's own logic is mechanical — bootstrap
//! rows, scan for metadata, delegate the rest straight to [`crate::rbfm`].

use std::path::Path;

use crate::attribute::{AttrType, Attribute, CompOp, Rid};
use crate::error::{Error, Result};
use crate::scan::RbfmScanIterator;
use crate::storage::{self, FileHandle};
use crate::{rbfm, tuple};

const RESERVED: [&str; 2] = ["Tables", "Columns"];

fn check_reserved(table_name: &str) -> Result<()> {
    if RESERVED.contains(&table_name) {
        return Err(Error::Reserved {
            table: table_name.to_string(),
        });
    }
    Ok(())
}

fn tables_descriptor() -> Vec<Attribute> {
    vec![
        Attribute::new("table-id", AttrType::Int32, 4),
        Attribute::new("table-name", AttrType::VarChar, 50),
        Attribute::new("file-name", AttrType::VarChar, 50),
    ]
}

fn columns_descriptor() -> Vec<Attribute> {
    vec![
        Attribute::new("table-id", AttrType::Int32, 4),
        Attribute::new("column-name", AttrType::VarChar, 50),
        Attribute::new("column-type", AttrType::Int32, 4),
        Attribute::new("column-length", AttrType::Int32, 4),
        Attribute::new("column-position", AttrType::Int32, 4),
    ]
}

fn encode_varchar(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as i32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn encode_table_row(table_id: i32, table_name: &str, file_name: &str) -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&table_id.to_le_bytes());
    encode_varchar(&mut out, table_name);
    encode_varchar(&mut out, file_name);
    out
}

fn encode_column_row(
    table_id: i32,
    column_name: &str,
    column_type: i32,
    column_length: i32,
    column_position: i32,
) -> Vec<u8> {
    let mut out = vec![0u8];
    out.extend_from_slice(&table_id.to_le_bytes());
    encode_varchar(&mut out, column_name);
    out.extend_from_slice(&column_type.to_le_bytes());
    out.extend_from_slice(&column_length.to_le_bytes());
    out.extend_from_slice(&column_position.to_le_bytes());
    out
}

fn decode_single_int(projected: &[u8]) -> i32 {
    i32::from_le_bytes(projected[1..5].try_into().unwrap())
}

fn decode_single_varchar(projected: &[u8]) -> String {
    let len = i32::from_le_bytes(projected[1..5].try_into().unwrap()) as usize;
    String::from_utf8_lossy(&projected[5..5 + len]).into_owned()
}

/// One decoded row of `Columns`, in `column-position` order.
struct ColumnRow {
    name: String,
    attr_type: i32,
    length: i32,
    position: i32,
}

fn decode_column_row(descriptor: &[Attribute], data: &[u8], size: usize) -> Result<ColumnRow> {
    let mut name_out = Vec::new();
    tuple::extract_one(descriptor, data, size, 0, &mut name_out)?;
    let mut type_out = Vec::new();
    tuple::extract_one(descriptor, data, size, 1, &mut type_out)?;
    let mut length_out = Vec::new();
    tuple::extract_one(descriptor, data, size, 2, &mut length_out)?;
    let mut position_out = Vec::new();
    tuple::extract_one(descriptor, data, size, 3, &mut position_out)?;

    Ok(ColumnRow {
        name: decode_single_varchar(&name_out),
        attr_type: decode_single_int(&type_out),
        length: decode_single_int(&length_out),
        position: decode_single_int(&position_out),
    })
}

/// An open catalog: the two bootstrap tables, each its own paged file.
pub struct Catalog {
    tables_fh: FileHandle,
    columns_fh: FileHandle,
}

impl Catalog {
    /// Create and bootstrap a brand-new catalog: `Tables`/`Columns` files are
    /// created, and each gets a row describing itself and its own columns.
    pub fn create(tables_path: impl AsRef<Path>, columns_path: impl AsRef<Path>) -> Result<Catalog> {
        storage::create(&tables_path)?;
        storage::create(&columns_path)?;
        let mut tables_fh = storage::open(&tables_path)?;
        let mut columns_fh = storage::open(&columns_path)?;

        let tables_descriptor = tables_descriptor();
        rbfm::insert(&mut tables_fh, &tables_descriptor, &encode_table_row(1, "Tables", "Tables"))?;
        rbfm::insert(
            &mut tables_fh,
            &tables_descriptor,
            &encode_table_row(2, "Columns", "Columns"),
        )?;

        let columns_descriptor = columns_descriptor();
        for (i, (name, attr_type, length)) in [
            ("table-id", 0, 4),
            ("table-name", 2, 50),
            ("file-name", 2, 50),
        ]
        .iter()
        .enumerate()
        {
            rbfm::insert(
                &mut columns_fh,
                &columns_descriptor,
                &encode_column_row(1, name, *attr_type, *length, (i + 1) as i32),
            )?;
        }
        for (i, (name, attr_type, length)) in [
            ("table-id", 0, 4),
            ("column-name", 2, 50),
            ("column-type", 0, 4),
            ("column-length", 0, 4),
            ("column-position", 0, 4),
        ]
        .iter()
        .enumerate()
        {
            rbfm::insert(
                &mut columns_fh,
                &columns_descriptor,
                &encode_column_row(2, name, *attr_type, *length, (i + 1) as i32),
            )?;
        }

        Ok(Catalog { tables_fh, columns_fh })
    }

    /// Open a previously-created catalog.
    pub fn open(tables_path: impl AsRef<Path>, columns_path: impl AsRef<Path>) -> Result<Catalog> {
        Ok(Catalog {
            tables_fh: storage::open(tables_path)?,
            columns_fh: storage::open(columns_path)?,
        })
    }

    pub fn close(self) -> Result<()> {
        self.tables_fh.close()?;
        self.columns_fh.close()?;
        Ok(())
    }

    /// `(rid, table-id, file-name)` of the `Tables` row for `table_name`.
    fn find_table_row(&mut self, table_name: &str) -> Result<(Rid, i32, String)> {
        let mut value = Vec::new();
        encode_varchar(&mut value, table_name);

        let mut scan = RbfmScanIterator::new(
            &mut self.tables_fh,
            tables_descriptor(),
            "table-name",
            CompOp::Eq,
            value,
            vec!["table-id".to_string(), "file-name".to_string()],
        );

        let mut rid = Rid::new(0, 0);
        let mut out = Vec::new();
        while scan.next(&mut self.tables_fh, &mut rid, &mut out)? {
            let mut id_out = Vec::new();
            let projected = vec![
                Attribute::new("table-id", AttrType::Int32, 4),
                Attribute::new("file-name", AttrType::VarChar, 50),
            ];
            tuple::extract_one(&projected, &out, out.len(), 0, &mut id_out)?;
            let mut name_out = Vec::new();
            tuple::extract_one(&projected, &out, out.len(), 1, &mut name_out)?;
            return Ok((rid, decode_single_int(&id_out), decode_single_varchar(&name_out)));
        }
        scan.close();

        Err(Error::NoSuchTable {
            table: table_name.to_string(),
        })
    }

    fn next_table_id(&mut self) -> Result<i32> {
        let mut scan = RbfmScanIterator::new(
            &mut self.tables_fh,
            tables_descriptor(),
            "",
            CompOp::NoOp,
            Vec::new(),
            vec!["table-id".to_string()],
        );

        let mut max_id = 0;
        let mut rid = Rid::new(0, 0);
        let mut out = Vec::new();
        while scan.next(&mut self.tables_fh, &mut rid, &mut out)? {
            max_id = max_id.max(decode_single_int(&out));
        }
        scan.close();
        Ok(max_id + 1)
    }

    /// Create `table_name`, backed by the paged file at `file_name`, with
    /// the given columns (in declared order, 1-indexed `column-position`).
    pub fn create_table(
        &mut self,
        table_name: &str,
        file_name: impl AsRef<Path>,
        attributes: &[Attribute],
    ) -> Result<()> {
        check_reserved(table_name)?;
        let file_name = file_name.as_ref().to_string_lossy().into_owned();

        let table_id = self.next_table_id()?;
        storage::create(&file_name)?;

        rbfm::insert(
            &mut self.tables_fh,
            &tables_descriptor(),
            &encode_table_row(table_id, table_name, &file_name),
        )?;

        let columns_descriptor = columns_descriptor();
        for (i, attr) in attributes.iter().enumerate() {
            rbfm::insert(
                &mut self.columns_fh,
                &columns_descriptor,
                &encode_column_row(
                    table_id,
                    &attr.name,
                    attr.attr_type.tag() as i32,
                    attr.max_length as i32,
                    (i + 1) as i32,
                ),
            )?;
        }
        Ok(())
    }

    /// Delete `table_name`: removes its `Tables`/`Columns` rows and unlinks
    /// its backing file.
    pub fn delete_table(&mut self, table_name: &str) -> Result<()> {
        check_reserved(table_name)?;
        let (rid, table_id, file_name) = self.find_table_row(table_name)?;
        rbfm::delete(&mut self.tables_fh, &tables_descriptor(), rid)?;

        let column_rids = self.column_rids_for(table_id)?;
        for rid in column_rids {
            rbfm::delete(&mut self.columns_fh, &columns_descriptor(), rid)?;
        }

        storage::destroy(&file_name)?;
        Ok(())
    }

    fn column_rids_for(&mut self, table_id: i32) -> Result<Vec<Rid>> {
        let mut scan = RbfmScanIterator::new(
            &mut self.columns_fh,
            columns_descriptor(),
            "table-id",
            CompOp::Eq,
            table_id.to_le_bytes().to_vec(),
            vec!["table-id".to_string()],
        );

        let mut rids = Vec::new();
        let mut rid = Rid::new(0, 0);
        let mut out = Vec::new();
        while scan.next(&mut self.columns_fh, &mut rid, &mut out)? {
            rids.push(rid);
        }
        scan.close();
        Ok(rids)
    }

    /// `table_name`'s columns in declared order.
    pub fn get_attributes(&mut self, table_name: &str) -> Result<Vec<Attribute>> {
        let (_, table_id, _) = self.find_table_row(table_name)?;

        let descriptor = columns_descriptor();
        let mut scan = RbfmScanIterator::new(
            &mut self.columns_fh,
            descriptor.clone(),
            "table-id",
            CompOp::Eq,
            table_id.to_le_bytes().to_vec(),
            vec![
                "column-name".to_string(),
                "column-type".to_string(),
                "column-length".to_string(),
                "column-position".to_string(),
            ],
        );

        let projected_descriptor = vec![
            Attribute::new("column-name", AttrType::VarChar, 50),
            Attribute::new("column-type", AttrType::Int32, 4),
            Attribute::new("column-length", AttrType::Int32, 4),
            Attribute::new("column-position", AttrType::Int32, 4),
        ];

        let mut rows = Vec::new();
        let mut rid = Rid::new(0, 0);
        let mut out = Vec::new();
        while scan.next(&mut self.columns_fh, &mut rid, &mut out)? {
            rows.push(decode_column_row(&projected_descriptor, &out, out.len())?);
        }
        scan.close();

        rows.sort_by_key(|r| r.position);
        rows.into_iter()
            .map(|r| {
                Ok(Attribute::new(
                    r.name,
                    AttrType::from_tag(r.attr_type as u8)?,
                    r.length as u32,
                ))
            })
            .collect()
    }

    pub fn insert_tuple(
        &mut self,
        fh: &mut FileHandle,
        table_name: &str,
        descriptor: &[Attribute],
        data: &[u8],
    ) -> Result<Rid> {
        check_reserved(table_name)?;
        rbfm::insert(fh, descriptor, data)
    }

    pub fn read_tuple(&mut self, fh: &mut FileHandle, rid: Rid, out: &mut Vec<u8>) -> Result<()> {
        rbfm::read(fh, rid, out)
    }

    pub fn delete_tuple(
        &mut self,
        fh: &mut FileHandle,
        table_name: &str,
        descriptor: &[Attribute],
        rid: Rid,
    ) -> Result<()> {
        check_reserved(table_name)?;
        rbfm::delete(fh, descriptor, rid)
    }

    pub fn update_tuple(
        &mut self,
        fh: &mut FileHandle,
        table_name: &str,
        descriptor: &[Attribute],
        rid: Rid,
        new_data: &[u8],
    ) -> Result<()> {
        check_reserved(table_name)?;
        rbfm::update(fh, descriptor, rid, new_data)
    }

    pub fn read_attribute(
        &mut self,
        fh: &mut FileHandle,
        descriptor: &[Attribute],
        rid: Rid,
        attr_name: &str,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        rbfm::read_attribute(fh, descriptor, rid, attr_name, out)
    }

    pub fn scan(
        &mut self,
        fh: &mut FileHandle,
        table_name: &str,
        descriptor: Vec<Attribute>,
        cond_attr: impl Into<String>,
        op: CompOp,
        value: Vec<u8>,
        projection: Vec<String>,
    ) -> Result<RbfmScanIterator> {
        check_reserved(table_name)?;
        Ok(RbfmScanIterator::new(fh, descriptor, cond_attr, op, value, projection))
    }
}
