//! Simple Trajectory Format: a line-based text trajectory with whole-stream compression.
//!
//! A file is a `key=value` header ended by `** <natoms>`, followed by frames.
//! Each frame is one line of three integers per atom (coordinates scaled by
//! `10^prec`) and a `*` line that may carry nine unit-cell values. The last
//! character of the extension picks the compression (`.stf` is zlib, `.stz`
//! gzip, `.stl` LZW, `.sts` zstd, `.str` raw DEFLATE); the `ct?` family is
//! the same format under a different name.

mod compression;
mod header;
mod lzw;
mod reader;
mod writer;

pub use compression::Compression;
pub use header::{DEFAULT_PRECISION, MAX_PRECISION, StfHeader};
pub use reader::StfReader;
pub use writer::{StfWriter, StfWriterOptions};

/// Whether `path` has an STF/CTF extension (`st?` or `ct?`).
pub fn is_stf_path(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|ext| ext.len() == 3 && (ext.starts_with("st") || ext.starts_with("ct")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn recognizes_stf_family_extensions() {
        assert!(is_stf_path(Path::new("run.stf")));
        assert!(is_stf_path(Path::new("run.CTZ")));
        assert!(is_stf_path(Path::new("dir/run.stq")));
        assert!(!is_stf_path(Path::new("run.st")));
        assert!(!is_stf_path(Path::new("run.xtc")));
        assert!(!is_stf_path(Path::new("run")));
    }
}
