//! Minimal dBASE (`.dbf`) reader.
//!
//! Shapefile attribute tables are dBASE III/IV files with a fixed-layout
//! header: a three-byte last-update date at offset 1, record counts and
//! sizes, then 32-byte field descriptors terminated by `0x0D`. This module
//! reads only what the metadata stage needs — the header date, field names
//! in declaration order, and the raw values of a single column.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use chrono::NaiveDate;

/// Size of one field descriptor in the DBF header.
const FIELD_DESCRIPTOR_LEN: usize = 32;

/// Header terminator byte.
const HEADER_TERMINATOR: u8 = 0x0D;

/// One field descriptor from the DBF header.
#[derive(Debug, Clone)]
pub struct DbfField {
    /// Field name, NUL-trimmed.
    pub name: String,
    /// Declared field width in bytes.
    pub length: usize,
}

/// Parsed DBF header.
#[derive(Debug, Clone)]
pub struct DbfTable {
    /// The three date bytes at offset 1, disambiguated to a full year
    /// (years below 1990 are shifted into the 2000s).
    pub last_update: Option<NaiveDate>,
    /// Field descriptors in declaration order, deletion flag excluded.
    pub fields: Vec<DbfField>,
    record_count: u32,
    header_len: u64,
    record_len: usize,
}

impl DbfTable {
    /// Reads the header of `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or is shorter than
    /// a DBF header.
    pub fn read_header(path: &Path) -> std::io::Result<Self> {
        let mut file = File::open(path)?;

        let mut head = [0u8; 32];
        file.read_exact(&mut head)?;

        let year = {
            let raw = 1900 + u32::from(head[1]);
            if raw < 1990 { raw + 100 } else { raw }
        };
        let last_update = NaiveDate::from_ymd_opt(
            i32::try_from(year).unwrap_or(1900),
            u32::from(head[2]),
            u32::from(head[3]),
        );

        let record_count = u32::from_le_bytes([head[4], head[5], head[6], head[7]]);
        let header_len = u64::from(u16::from_le_bytes([head[8], head[9]]));
        let record_len = usize::from(u16::from_le_bytes([head[10], head[11]]));

        let mut fields = Vec::new();
        let mut descriptor = [0u8; FIELD_DESCRIPTOR_LEN];
        loop {
            let mut marker = [0u8; 1];
            file.read_exact(&mut marker)?;
            if marker[0] == HEADER_TERMINATOR {
                break;
            }

            descriptor[0] = marker[0];
            file.read_exact(&mut descriptor[1..])?;

            let name_end = descriptor[..11]
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(11);
            let name = String::from_utf8_lossy(&descriptor[..name_end])
                .trim()
                .to_string();
            let length = usize::from(descriptor[16]);

            if !name.is_empty() {
                fields.push(DbfField { name, length });
            }
        }

        Ok(Self {
            last_update,
            fields,
            record_count,
            header_len,
            record_len,
        })
    }

    /// Field names in declaration order.
    #[must_use]
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Reads every non-deleted record's value for the named column
    /// (case-insensitive), trimmed, empty values dropped.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the record section cannot be read.
    pub fn read_column(&self, path: &Path, column: &str) -> std::io::Result<Vec<String>> {
        let column_lower = column.to_lowercase();
        let mut offset = 1usize; // deletion flag
        let mut width = None;
        for field in &self.fields {
            if field.name.to_lowercase() == column_lower {
                width = Some(field.length);
                break;
            }
            offset += field.length;
        }
        let Some(width) = width else {
            return Ok(Vec::new());
        };

        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.header_len))?;

        let mut values = Vec::new();
        let mut record = vec![0u8; self.record_len];
        for _ in 0..self.record_count {
            if file.read_exact(&mut record).is_err() {
                break; // truncated record section
            }
            if record[0] == b'*' {
                continue; // deleted record
            }
            let end = (offset + width).min(record.len());
            if offset >= end {
                continue;
            }
            let value = String::from_utf8_lossy(&record[offset..end])
                .trim()
                .to_string();
            if !value.is_empty() {
                values.push(value);
            }
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Builds an in-memory DBF with the given header date, fields, and
    /// string records.
    fn write_dbf(path: &Path, date: (u8, u8, u8), fields: &[(&str, usize)], records: &[&[&str]]) {
        let record_len = 1 + fields.iter().map(|(_, len)| len).sum::<usize>();
        let header_len = 32 + fields.len() * 32 + 1;

        let mut buf: Vec<u8> = Vec::new();
        buf.push(0x03); // dBASE III, no memo
        buf.extend_from_slice(&[date.0, date.1, date.2]);
        buf.extend_from_slice(&u32::try_from(records.len()).unwrap().to_le_bytes());
        buf.extend_from_slice(&u16::try_from(header_len).unwrap().to_le_bytes());
        buf.extend_from_slice(&u16::try_from(record_len).unwrap().to_le_bytes());
        buf.resize(32, 0);

        for (name, len) in fields {
            let mut descriptor = [0u8; 32];
            descriptor[..name.len()].copy_from_slice(name.as_bytes());
            descriptor[11] = b'C';
            descriptor[16] = u8::try_from(*len).unwrap();
            buf.extend_from_slice(&descriptor);
        }
        buf.push(HEADER_TERMINATOR);

        for record in records {
            buf.push(b' ');
            for ((_, len), value) in fields.iter().zip(record.iter()) {
                let mut cell = vec![b' '; *len];
                let bytes = value.as_bytes();
                cell[..bytes.len()].copy_from_slice(bytes);
                buf.extend_from_slice(&cell);
            }
        }

        let mut file = File::create(path).unwrap();
        file.write_all(&buf).unwrap();
    }

    #[test]
    fn reads_header_date_and_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parcels.dbf");
        write_dbf(
            &path,
            (124, 1, 15), // 2024-01-15
            &[("PARCEL_ID", 10), ("UPDATE_DT", 10)],
            &[],
        );

        let table = DbfTable::read_header(&path).unwrap();
        assert_eq!(
            table.last_update,
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(table.field_names(), vec!["PARCEL_ID", "UPDATE_DT"]);
    }

    #[test]
    fn header_year_below_1990_shifts_forward() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.dbf");
        // Raw byte 24 would read as 1924; the 1900/2000 rule makes it 2024.
        write_dbf(&path, (24, 6, 1), &[("NAME", 8)], &[]);

        let table = DbfTable::read_header(&path).unwrap();
        assert_eq!(table.last_update, NaiveDate::from_ymd_opt(2024, 6, 1));
    }

    #[test]
    fn reads_column_values_skipping_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zoning.dbf");
        write_dbf(
            &path,
            (124, 1, 15),
            &[("ZONE", 6), ("UPDATE_DT", 10)],
            &[
                &["R1", "2023-05-01"],
                &["C2", "2024-01-15"],
                &["A", ""],
            ],
        );

        let table = DbfTable::read_header(&path).unwrap();
        let values = table.read_column(&path, "update_dt").unwrap();
        assert_eq!(values, vec!["2023-05-01", "2024-01-15"]);
    }

    #[test]
    fn unknown_column_yields_no_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("streets.dbf");
        write_dbf(&path, (124, 1, 15), &[("NAME", 8)], &[&["MAIN ST"]]);

        let table = DbfTable::read_header(&path).unwrap();
        assert!(table.read_column(&path, "edit_date").unwrap().is_empty());
    }
}
