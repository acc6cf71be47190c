//! Length-framed bincode record files, used to hand candidates, examples
//! and predictions between stages. Each file starts with an 8 byte magic,
//! followed by records stored as a little-endian `u64` length and the
//! bincode payload. Files ending in `.gz` or `.bgz` are BGZF-compressed.

use crate::bgzf_io::{open_input, OutputHandle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, BufRead, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

pub const RECORDS_MAGIC: &[u8; 8] = b"SHCREC01";

pub struct RecordWriter<T> {
    out: OutputHandle,
    written: usize,
    _marker: PhantomData<T>,
}

impl<T: Serialize> RecordWriter<T> {
    pub fn create(path: &Path) -> io::Result<Self> {
        let mut out = OutputHandle::create(path)?;
        out.write_all(RECORDS_MAGIC)?;
        Ok(Self {
            out,
            written: 0,
            _marker: PhantomData,
        })
    }

    pub fn write(&mut self, record: &T) -> io::Result<()> {
        let data = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| io::Error::other(format!("Failed to encode record {}: {e:?}", self.written)))?;
        self.out.write_all(&(data.len() as u64).to_le_bytes())?;
        self.out.write_all(&data)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn finish(self) -> io::Result<usize> {
        self.out.finish()?;
        Ok(self.written)
    }
}

/// Iterator over the records of a file written by [`RecordWriter`].
pub struct RecordReader<T> {
    reader: Box<dyn BufRead + Send>,
    read: usize,
    failed: bool,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> RecordReader<T> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let mut reader = open_input(path)?;
        let mut magic_buf = [0u8; 8];
        reader.read_exact(&mut magic_buf).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("'{}' is too short for a record file: {e}", path.display()),
            )
        })?;
        if &magic_buf != RECORDS_MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Invalid magic bytes - '{}' is not a record file", path.display()),
            ));
        }
        Ok(Self {
            reader,
            read: 0,
            failed: false,
            _marker: PhantomData,
        })
    }

    fn read_record(&mut self) -> io::Result<Option<T>> {
        // A clean end of stream can only fall on a record boundary.
        if self.reader.fill_buf()?.is_empty() {
            return Ok(None);
        }
        let mut len_buf = [0u8; 8];
        self.reader.read_exact(&mut len_buf)?;
        let len = u64::from_le_bytes(len_buf) as usize;
        let mut data = vec![0u8; len];
        self.reader.read_exact(&mut data)?;
        let (record, _) = bincode::serde::decode_from_slice(&data, bincode::config::standard())
            .map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Failed to decode record {}: {e:?}", self.read),
                )
            })?;
        self.read += 1;
        Ok(Some(record))
    }
}

impl<T: DeserializeOwned> Iterator for RecordReader<T> {
    type Item = io::Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.read_record() {
            Ok(record) => record.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> io::Result<usize> {
    let mut writer = RecordWriter::create(path)?;
    for record in records {
        writer.write(record)?;
    }
    writer.finish()
}

pub fn read_records<T: DeserializeOwned>(path: &Path) -> io::Result<Vec<T>> {
    RecordReader::open(path)?.collect()
}
