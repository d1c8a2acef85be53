use super::compression::{self, Compression};
use crate::core::models::topology::Topology;
use crate::traj::error::{Location, TrajError};
use std::io::{BufRead, Write};

pub const DEFAULT_PRECISION: u32 = 2;
pub const MAX_PRECISION: u32 = 8;

pub(crate) const PRECISION_KEY: &str = "prec";
pub(crate) const TOPOLOGY_KEY: &str = "topology";
pub(crate) const HEADER_END: &str = "**";

/// Key/value section at the top of an STF file.
#[derive(Debug, Clone, PartialEq)]
pub struct StfHeader {
    pub natoms: usize,
    /// Decimal exponent used to encode coordinates as integers.
    pub precision: u32,
    pub topology: Option<Topology>,
    /// Keys without a built-in meaning, in file order.
    pub extra: Vec<(String, String)>,
}

impl StfHeader {
    pub fn new(natoms: usize) -> Self {
        Self {
            natoms,
            precision: DEFAULT_PRECISION,
            topology: None,
            extra: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn scale(&self) -> f64 {
        10f64.powi(self.precision as i32)
    }

    /// Parses header lines up to and including the `** <natoms>` terminator.
    ///
    /// `line_num` is advanced by the number of lines consumed.
    pub(crate) fn read(
        input: &mut impl BufRead,
        compression: Compression,
        file: &str,
        line_num: &mut usize,
    ) -> Result<Self, TrajError> {
        let mut precision = DEFAULT_PRECISION;
        let mut topology = None;
        let mut extra = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let read = input.read_line(&mut line).map_err(|e| {
                compression::stream_error(compression, file, Location::Line(*line_num + 1), e)
            })?;
            if read == 0 {
                return Err(TrajError::format(
                    file,
                    Location::Header,
                    "missing '** <natoms>' terminator",
                ));
            }
            *line_num += 1;
            let here = Location::Line(*line_num);
            let content = line.trim_end_matches(['\n', '\r']);

            if let Some(count) = content.strip_prefix(HEADER_END) {
                let natoms = count.trim().parse().map_err(|_| {
                    TrajError::format(file, here, format!("invalid atom count '{}'", count.trim()))
                })?;
                let described = topology.as_ref().map(Topology::len);
                if let Some(described) = described.filter(|n| *n != natoms) {
                    return Err(TrajError::format(
                        file,
                        here,
                        format!("topology describes {described} atoms but the header declares {natoms}"),
                    ));
                }
                return Ok(Self {
                    natoms,
                    precision,
                    topology,
                    extra,
                });
            }
            if content.trim().is_empty() {
                continue;
            }
            if content.starts_with('*') || content.contains(HEADER_END) {
                return Err(TrajError::format(
                    file,
                    here,
                    "reserved '*' or '**' inside a header entry",
                ));
            }

            let (key, value) = content.split_once('=').ok_or_else(|| {
                TrajError::format(file, here, format!("expected 'key=value', found '{content}'"))
            })?;
            match key.trim() {
                PRECISION_KEY => {
                    precision = value
                        .trim()
                        .parse()
                        .ok()
                        .filter(|p| *p <= MAX_PRECISION)
                        .ok_or_else(|| {
                            TrajError::format(
                                file,
                                here,
                                format!("precision must be 0..={MAX_PRECISION}, found '{value}'"),
                            )
                        })?;
                }
                TOPOLOGY_KEY => {
                    let parsed = serde_json::from_str(value).map_err(|e| {
                        TrajError::format(file, here, format!("invalid topology JSON: {e}"))
                    })?;
                    topology = Some(parsed);
                }
                other => extra.push((other.to_string(), value.to_string())),
            }
        }
    }

    /// Writes the header, refusing entries that would break the line grammar.
    pub(crate) fn write(&self, out: &mut impl Write) -> Result<(), TrajError> {
        if self.precision > MAX_PRECISION {
            return Err(TrajError::InvalidHeader {
                key: PRECISION_KEY.to_string(),
                reason: "precision out of range",
            });
        }
        writeln!(out, "{PRECISION_KEY}={}", self.precision)?;
        if let Some(topology) = &self.topology {
            let json = serde_json::to_string(topology).map_err(|e| {
                TrajError::InvalidHeader {
                    key: TOPOLOGY_KEY.to_string(),
                    reason: if e.is_io() { "I/O failure" } else { "not serializable" },
                }
            })?;
            validate_entry(TOPOLOGY_KEY, &json)?;
            writeln!(out, "{TOPOLOGY_KEY}={json}")?;
        }
        for (key, value) in &self.extra {
            validate_entry(key, value)?;
            if key == PRECISION_KEY || key == TOPOLOGY_KEY {
                return Err(TrajError::InvalidHeader {
                    key: key.clone(),
                    reason: "reserved key",
                });
            }
            writeln!(out, "{key}={value}")?;
        }
        writeln!(out, "{HEADER_END} {}", self.natoms)?;
        Ok(())
    }
}

fn validate_entry(key: &str, value: &str) -> Result<(), TrajError> {
    let reason = if key.trim().is_empty() {
        Some("empty key")
    } else if key.contains('=') {
        Some("'=' in key")
    } else if key.starts_with('*') {
        Some("key starts with '*'")
    } else if key.contains(['\n', '\r']) || value.contains(['\n', '\r']) {
        Some("line break")
    } else if key.contains(HEADER_END) || value.contains(HEADER_END) {
        Some("reserved '**' sequence")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(TrajError::InvalidHeader {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}
