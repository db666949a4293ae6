use std::io;
use std::io::{BufRead, BufWriter, ErrorKind, Read, Write};
use std::marker::PhantomData;

use crate::error::{Result, SortError};

pub(crate) const RECORD_SEPARATOR: u8 = b'\n';

/// A unit of data the sort engine can hold in memory and persist to a spill file.
///
/// Text records are single lines and never contain the record separator. Reading back what
/// `write_to` produced must yield an equal record.
pub trait Record: Sized {
    /// Number of bytes `write_to` produces, separator included.
    fn size_bytes(&self) -> usize;

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()>;

    /// Read the next record, `None` at a clean end of stream.
    fn read_from<B: BufRead + ?Sized>(reader: &mut B) -> io::Result<Option<Self>>;
}

impl Record for String {
    fn size_bytes(&self) -> usize {
        self.len() + 1
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        if self.as_bytes().contains(&RECORD_SEPARATOR) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "text record contains a line separator",
            ));
        }
        writer.write_all(self.as_bytes())?;
        writer.write_all(&[RECORD_SEPARATOR])
    }

    fn read_from<B: BufRead + ?Sized>(reader: &mut B) -> io::Result<Option<Self>> {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        if line.as_bytes().last() == Some(&RECORD_SEPARATOR) {
            line.pop();
        }
        Ok(Some(line))
    }
}

impl Record for Vec<u8> {
    fn size_bytes(&self) -> usize {
        self.len() + 1
    }

    fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        if self.contains(&RECORD_SEPARATOR) {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                "byte record contains a line separator",
            ));
        }
        writer.write_all(self)?;
        writer.write_all(&[RECORD_SEPARATOR])
    }

    fn read_from<B: BufRead + ?Sized>(reader: &mut B) -> io::Result<Option<Self>> {
        let mut line = Vec::new();
        if reader.read_until(RECORD_SEPARATOR, &mut line)? == 0 {
            return Ok(None);
        }
        if line.last() == Some(&RECORD_SEPARATOR) {
            line.pop();
        }
        Ok(Some(line))
    }
}

macro_rules! fixed_width_record {
    ($t:ty) => {
        impl Record for $t {
            fn size_bytes(&self) -> usize {
                std::mem::size_of::<$t>()
            }

            fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
                writer.write_all(&self.to_le_bytes())
            }

            fn read_from<B: BufRead + ?Sized>(reader: &mut B) -> io::Result<Option<Self>> {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                if read_full(reader, &mut buf)? {
                    Ok(Some(<$t>::from_le_bytes(buf)))
                } else {
                    Ok(None)
                }
            }
        }
    };
}

fixed_width_record!(i64);
fixed_width_record!(u64);

// false on a clean end of stream, error on a truncated value
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    if filled == 0 {
        Ok(false)
    } else if filled < buf.len() {
        Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("truncated record: {} of {} bytes", filled, buf.len()),
        ))
    } else {
        Ok(true)
    }
}

/// Destination for records in final sorted order. Written sequentially, never sought.
pub trait RecordSink<R> {
    fn write_record(&mut self, record: &R) -> Result<()>;

    /// Flush whatever the sink buffers. Called once after the last record.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<R: Clone> RecordSink<R> for Vec<R> {
    fn write_record(&mut self, record: &R) -> Result<()> {
        self.push(record.clone());
        Ok(())
    }
}

/// Serializes records into any [Write] target.
pub struct RecordWriter<W: Write> {
    writer: BufWriter<W>,
    records: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> RecordWriter<W> {
        RecordWriter {
            writer: BufWriter::new(writer),
            records: 0,
        }
    }

    pub fn records(&self) -> u64 {
        self.records
    }
}

impl<R: Record, W: Write> RecordSink<R> for RecordWriter<W> {
    fn write_record(&mut self, record: &R) -> Result<()> {
        record.write_to(&mut self.writer).map_err(SortError::Output)?;
        self.records += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(SortError::Output)
    }
}

/// Iterates the records of a buffered reader.
pub struct RecordReader<R, B> {
    reader: B,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record, B: BufRead> RecordReader<R, B> {
    pub fn new(reader: B) -> RecordReader<R, B> {
        RecordReader {
            reader,
            _record: PhantomData,
        }
    }
}

impl<R: Record, B: BufRead> Iterator for RecordReader<R, B> {
    type Item = io::Result<R>;

    fn next(&mut self) -> Option<Self::Item> {
        R::read_from(&mut self.reader).transpose()
    }
}
