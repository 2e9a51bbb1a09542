use std::io::{self, Write};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;

/// Compression format of output files
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Compression {
    Bzip2,
    /// gzip with compression level
    Gzip(u8),
    /// lz4 with compression level
    Lz4(u8),
    /// zstd with compression level
    Zstd(u8),
}

/// A writer compressing to one of the supported formats
///
/// Call [finish](CompressedWriter::finish) once everything is written,
/// otherwise the compressed stream may be truncated.
pub enum CompressedWriter<W: Write> {
    Plain(W),
    Bzip2(BzEncoder<W>),
    Gzip(GzEncoder<W>),
    Lz4(lz4::Encoder<W>),
    Zstd(zstd::Encoder<'static, W>),
}

impl<W: Write> CompressedWriter<W> {
    pub fn new(writer: W, compression: Option<Compression>) -> io::Result<Self> {
        let writer = match compression {
            None => Self::Plain(writer),
            Some(Compression::Bzip2) => {
                Self::Bzip2(BzEncoder::new(writer, bzip2::Compression::best()))
            }
            Some(Compression::Gzip(lvl)) => Self::Gzip(GzEncoder::new(
                writer,
                flate2::Compression::new(lvl.into()),
            )),
            Some(Compression::Lz4(lvl)) => Self::Lz4(
                lz4::EncoderBuilder::new().level(lvl.into()).build(writer)?,
            ),
            Some(Compression::Zstd(lvl)) => {
                Self::Zstd(zstd::Encoder::new(writer, lvl.into())?)
            }
        };
        Ok(writer)
    }

    /// Complete the compressed stream and return the inner writer
    pub fn finish(self) -> io::Result<W> {
        let mut inner = match self {
            Self::Plain(w) => w,
            Self::Bzip2(enc) => enc.finish()?,
            Self::Gzip(enc) => enc.finish()?,
            Self::Lz4(enc) => {
                let (w, res) = enc.finish();
                res?;
                w
            }
            Self::Zstd(enc) => enc.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }

    fn inner_mut(&mut self) -> &mut dyn Write {
        match self {
            Self::Plain(w) => w,
            Self::Bzip2(enc) => enc,
            Self::Gzip(enc) => enc,
            Self::Lz4(enc) => enc,
            Self::Zstd(enc) => enc,
        }
    }
}

impl<W: Write> Write for CompressedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner_mut().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut().flush()
    }
}
