use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a stream starts with a valid BGZF header, then rewind it.
/// Returns `Ok(false)` for regular gzip, too-small files, or plain text.
pub fn is_bgzf<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match reader.read_exact(&mut header) {
        Ok(()) => Ok(header[0..2] == [0x1f, 0x8b]
            && header[2] == 0x08
            && header[3] == 0x04
            && header[10..12] == [0x06, 0x00]
            && header[12..14] == [b'B', b'C']
            && header[14..16] == [0x02, 0x00]),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    result
}

pub fn has_compressed_extension(path: &Path) -> bool {
    path.extension()
        .is_some_and(|e| e == "gz" || e == "bgz")
}

/// Opens a file for reading, decompressing BGZF content when present.
pub fn open_input(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path).map_err(|e| {
        io::Error::new(e.kind(), format!("Failed to open '{}': {}", path.display(), e))
    })?;
    if is_bgzf(&mut file)? {
        Ok(Box::new(bgzf::io::Reader::new(file)))
    } else if has_compressed_extension(path) {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > out.gz",
                path.display(),
                path.display()
            ),
        ))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub enum OutputHandle {
    Plain(BufWriter<File>),
    Compressed(bgzf::io::Writer<File>),
}

impl OutputHandle {
    /// Creates `path`, BGZF-compressed when it ends in `.gz` or `.bgz`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::create(path).map_err(|e| {
            io::Error::new(e.kind(), format!("Failed to create '{}': {}", path.display(), e))
        })?;
        Ok(if has_compressed_extension(path) {
            OutputHandle::Compressed(bgzf::io::Writer::new(file))
        } else {
            OutputHandle::Plain(BufWriter::new(file))
        })
    }

    /// Flushes buffered data and writes the BGZF end-of-file marker.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputHandle::Plain(mut writer) => writer.flush(),
            OutputHandle::Compressed(writer) => writer.finish().map(|_| ()),
        }
    }
}

impl Write for OutputHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputHandle::Plain(w) => w.write(buf),
            OutputHandle::Compressed(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputHandle::Plain(w) => w.flush(),
            OutputHandle::Compressed(w) => w.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_compressed_output_is_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt.gz");
        let mut out = OutputHandle::create(&path).unwrap();
        writeln!(out, "hello").unwrap();
        out.finish().unwrap();

        let mut file = File::open(&path).unwrap();
        assert!(is_bgzf(&mut file).unwrap());
        let mut text = String::new();
        open_input(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "hello\n");
    }

    #[test]
    fn test_plain_text_is_not_bgzf() {
        assert!(!is_bgzf(&mut Cursor::new(b"chr1\t0\t10\n".to_vec())).unwrap());
        assert!(!is_bgzf(&mut Cursor::new(Vec::new())).unwrap());
    }
}
