use super::lzw::{LzwReader, LzwWriter};
use crate::traj::error::{Location, TrajError};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use phf::{Map, phf_map};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Whole-stream compression applied to an STF/CTF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Compression {
    /// zlib-framed DEFLATE.
    #[default]
    Flate,
    Gzip,
    /// LZW, least-significant-bit first with 8-bit literals.
    Lzw,
    Zstd,
    /// DEFLATE without any framing.
    RawDeflate,
}

static BY_EXTENSION_CODE: Map<char, Compression> = phf_map! {
    'f' => Compression::Flate,
    'z' => Compression::Gzip,
    'l' => Compression::Lzw,
    's' => Compression::Zstd,
    'r' => Compression::RawDeflate,
};

impl Compression {
    pub fn from_code(code: char) -> Option<Self> {
        BY_EXTENSION_CODE.get(&code.to_ascii_lowercase()).copied()
    }

    /// The character that selects this compression as the last letter of an extension.
    pub fn code(self) -> char {
        match self {
            Self::Flate => 'f',
            Self::Gzip => 'z',
            Self::Lzw => 'l',
            Self::Zstd => 's',
            Self::RawDeflate => 'r',
        }
    }

    /// Picks the compression from the last character of the file extension.
    ///
    /// Unknown or missing extensions fall back to [`Compression::default`].
    pub fn from_path(path: &Path) -> Self {
        let code = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.chars().last());
        match code.and_then(Self::from_code) {
            Some(compression) => compression,
            None => {
                let fallback = Self::default();
                debug!(
                    path = %path.display(),
                    ?fallback,
                    "Unrecognized STF extension, using default compression"
                );
                fallback
            }
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Flate => "flate",
            Self::Gzip => "gzip",
            Self::Lzw => "lzw",
            Self::Zstd => "zstd",
            Self::RawDeflate => "raw-deflate",
        };
        f.write_str(name)
    }
}

pub(crate) type StfInput = Box<dyn BufRead + Send>;

/// Maps an error raised while pulling text through a decompressor.
///
/// Corrupt compressed data and invalid UTF-8 surface from the codecs as these
/// kinds; they are faults of the file, located at `location`. zstd reports
/// every decoding fault as `Other`.
pub(crate) fn stream_error(
    compression: Compression,
    file: &str,
    location: Location,
    e: io::Error,
) -> TrajError {
    let corrupt = match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            true
        }
        io::ErrorKind::Other => compression == Compression::Zstd,
        _ => false,
    };
    if corrupt {
        TrajError::format(file, location, format!("{compression} stream: {e}"))
    } else {
        TrajError::Io(e)
    }
}

/// Wraps an open file in the matching decompressor.
pub(crate) fn open_decoder(
    compression: Compression,
    file: File,
    name: &str,
) -> Result<StfInput, TrajError> {
    let input: StfInput = match compression {
        Compression::Flate => Box::new(BufReader::new(ZlibDecoder::new(file))),
        Compression::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(file))),
        Compression::RawDeflate => Box::new(BufReader::new(DeflateDecoder::new(file))),
        Compression::Zstd => Box::new(BufReader::new(
            zstd::stream::read::Decoder::new(file)
                .map_err(|e| stream_error(compression, name, Location::Header, e))?,
        )),
        Compression::Lzw => Box::new(BufReader::new(LzwReader::new(BufReader::new(file)))),
    };
    Ok(input)
}

/// Compressing sink for an STF file. Must be [`finish`](CompressedWriter::finish)ed
/// to produce a complete stream.
pub(crate) enum CompressedWriter {
    Flate(ZlibEncoder<BufWriter<File>>),
    Gzip(GzEncoder<BufWriter<File>>),
    RawDeflate(DeflateEncoder<BufWriter<File>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<File>>),
    Lzw(LzwWriter<BufWriter<File>>),
}

impl CompressedWriter {
    pub(crate) fn new(compression: Compression, file: File) -> io::Result<Self> {
        let sink = BufWriter::new(file);
        let level = flate2::Compression::default();
        Ok(match compression {
            Compression::Flate => Self::Flate(ZlibEncoder::new(sink, level)),
            Compression::Gzip => Self::Gzip(GzEncoder::new(sink, level)),
            Compression::RawDeflate => Self::RawDeflate(DeflateEncoder::new(sink, level)),
            Compression::Zstd => Self::Zstd(zstd::stream::write::Encoder::new(sink, 0)?),
            Compression::Lzw => Self::Lzw(LzwWriter::new(sink)),
        })
    }

    /// Writes the compression trailer and flushes the file.
    pub(crate) fn finish(self) -> io::Result<()> {
        let mut sink = match self {
            Self::Flate(encoder) => encoder.finish()?,
            Self::Gzip(encoder) => encoder.finish()?,
            Self::RawDeflate(encoder) => encoder.finish()?,
            Self::Zstd(encoder) => encoder.finish()?,
            Self::Lzw(encoder) => encoder.finish()?,
        };
        sink.flush()
    }
}

impl Write for CompressedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Flate(encoder) => encoder.write(buf),
            Self::Gzip(encoder) => encoder.write(buf),
            Self::RawDeflate(encoder) => encoder.write(buf),
            Self::Zstd(encoder) => encoder.write(buf),
            Self::Lzw(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Flate(encoder) => encoder.flush(),
            Self::Gzip(encoder) => encoder.flush(),
            Self::RawDeflate(encoder) => encoder.flush(),
            Self::Zstd(encoder) => encoder.flush(),
            Self::Lzw(encoder) => encoder.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn extension_selects_compression() {
        assert_eq!(Compression::from_path(Path::new("a.stf")), Compression::Flate);
        assert_eq!(Compression::from_path(Path::new("a.ctz")), Compression::Gzip);
        assert_eq!(Compression::from_path(Path::new("a.stl")), Compression::Lzw);
        assert_eq!(Compression::from_path(Path::new("a.sts")), Compression::Zstd);
        assert_eq!(Compression::from_path(Path::new("a.STR")), Compression::RawDeflate);
    }

    #[test]
    fn unknown_extension_falls_back_to_default() {
        assert_eq!(Compression::from_path(Path::new("a.stq")), Compression::Flate);
        assert_eq!(Compression::from_path(Path::new("noext")), Compression::Flate);
    }

    #[test]
    fn codes_round_trip() {
        for c in ['f', 'z', 'l', 's', 'r'] {
            assert_eq!(Compression::from_code(c).unwrap().code(), c);
        }
        assert_eq!(Compression::from_code('x'), None);
    }

    #[test]
    fn every_compression_restores_the_stream() {
        let dir = tempdir().unwrap();
        let payload = "prec=2\n** 1\n100 200 300\n*\n".repeat(50);
        for compression in [
            Compression::Flate,
            Compression::Gzip,
            Compression::Lzw,
            Compression::Zstd,
            Compression::RawDeflate,
        ] {
            let path = dir.path().join(format!("t.st{}", compression.code()));
            let file = File::create(&path).unwrap();
            let mut writer = CompressedWriter::new(compression, file).unwrap();
            writer.write_all(payload.as_bytes()).unwrap();
            writer.finish().unwrap();

            let mut input = open_decoder(compression, File::open(&path).unwrap(), "t").unwrap();
            let mut text = String::new();
            input.read_to_string(&mut text).unwrap();
            assert_eq!(text, payload, "{compression} did not round trip");
        }
    }

    #[test]
    fn corrupt_streams_are_format_errors() {
        let dir = tempdir().unwrap();
        for compression in [
            Compression::Flate,
            Compression::Gzip,
            Compression::Lzw,
            Compression::Zstd,
        ] {
            let path = dir.path().join(format!("bad.st{}", compression.code()));
            std::fs::write(&path, b"plain text, not compressed\n").unwrap();

            let err = open_decoder(compression, File::open(&path).unwrap(), "bad")
                .and_then(|mut input| {
                    let mut text = String::new();
                    input
                        .read_to_string(&mut text)
                        .map_err(|e| stream_error(compression, "bad", Location::Line(1), e))
                })
                .unwrap_err();
            assert!(
                matches!(err, TrajError::Format { .. }),
                "{compression}: {err:?}"
            );
        }
    }

    #[test]
    fn plain_io_failures_stay_io_errors() {
        let err = stream_error(
            Compression::Gzip,
            "t.stz",
            Location::Line(3),
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, TrajError::Io(_)));
    }
}
