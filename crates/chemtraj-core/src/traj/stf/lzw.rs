//! Incremental LZW adapters over `weezl`, so `.stl` files stream like the
//! other compressions.

use std::io::{self, BufRead, Read, Write};
use weezl::{BitOrder, LzwError, LzwStatus, decode, encode};

const CODE_SIZE: u8 = 8;
const CHUNK: usize = 8 * 1024;

fn codec_error(e: LzwError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("LZW: {e}"))
}

pub(crate) struct LzwReader<R> {
    inner: R,
    decoder: decode::Decoder,
    done: bool,
}

impl<R: BufRead> LzwReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: decode::Decoder::new(BitOrder::Lsb, CODE_SIZE),
            done: false,
        }
    }
}

impl<R: BufRead> Read for LzwReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.done || out.is_empty() {
            return Ok(0);
        }
        loop {
            let input = self.inner.fill_buf()?;
            let at_eof = input.is_empty();
            let result = self.decoder.decode_bytes(input, out);
            self.inner.consume(result.consumed_in);
            let status = result.status.map_err(codec_error)?;

            if let LzwStatus::Done = status {
                self.done = true;
                return Ok(result.consumed_out);
            }
            if result.consumed_out > 0 {
                return Ok(result.consumed_out);
            }
            if at_eof || matches!(status, LzwStatus::NoProgress) && result.consumed_in == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "LZW stream ends without an end code",
                ));
            }
        }
    }
}

pub(crate) struct LzwWriter<W> {
    inner: W,
    encoder: encode::Encoder,
    scratch: Vec<u8>,
}

impl<W: Write> LzwWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            encoder: encode::Encoder::new(BitOrder::Lsb, CODE_SIZE),
            scratch: vec![0; CHUNK],
        }
    }

    /// Emits the end code and returns the underlying writer.
    pub(crate) fn finish(mut self) -> io::Result<W> {
        self.encoder.finish();
        loop {
            let result = self.encoder.encode_bytes(&[], &mut self.scratch);
            let status = result.status.map_err(codec_error)?;
            self.inner.write_all(&self.scratch[..result.consumed_out])?;
            match status {
                LzwStatus::Done => return Ok(self.inner),
                _ if result.consumed_out == 0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "LZW encoder did not emit an end code",
                    ));
                }
                _ => {}
            }
        }
    }
}

impl<W: Write> Write for LzwWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut consumed = 0;
        while consumed < data.len() {
            let result = self.encoder.encode_bytes(&data[consumed..], &mut self.scratch);
            result.status.map_err(codec_error)?;
            self.inner.write_all(&self.scratch[..result.consumed_out])?;
            if result.consumed_in == 0 && result.consumed_out == 0 {
                break;
            }
            consumed += result.consumed_in;
        }
        Ok(consumed)
    }

    // Codes still held by the encoder are only emitted by `finish`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    #[test]
    fn chunked_output_matches_one_shot_encoding() {
        let payload = "12 -340 5600\n*\n".repeat(4000);
        let mut writer = LzwWriter::new(Vec::new());
        for piece in payload.as_bytes().chunks(777) {
            writer.write_all(piece).unwrap();
        }
        let streamed = writer.finish().unwrap();

        let one_shot = encode::Encoder::new(BitOrder::Lsb, CODE_SIZE)
            .encode(payload.as_bytes())
            .unwrap();
        let decoded = decode::Decoder::new(BitOrder::Lsb, CODE_SIZE)
            .decode(&streamed)
            .unwrap();
        assert_eq!(decoded, payload.as_bytes());
        assert_eq!(
            decode::Decoder::new(BitOrder::Lsb, CODE_SIZE)
                .decode(&one_shot)
                .unwrap(),
            decoded
        );
    }

    #[test]
    fn reader_decodes_through_small_buffers() {
        let payload = "prec=2\n** 1\n100 200 300\n*\n".repeat(300);
        let encoded = encode::Encoder::new(BitOrder::Lsb, CODE_SIZE)
            .encode(payload.as_bytes())
            .unwrap();
        let input = BufReader::with_capacity(16, Cursor::new(encoded));
        let mut text = String::new();
        LzwReader::new(input).read_to_string(&mut text).unwrap();
        assert_eq!(text, payload);
    }

    #[test]
    fn missing_end_code_is_unexpected_eof() {
        let encoded = encode::Encoder::new(BitOrder::Lsb, CODE_SIZE)
            .encode(&b"abcabcabc".repeat(100))
            .unwrap();
        let cut = &encoded[..encoded.len() / 2];
        let mut out = Vec::new();
        let err = LzwReader::new(Cursor::new(cut))
            .read_to_end(&mut out)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
