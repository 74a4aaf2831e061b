//! Rendering of metric records into the carbon plaintext protocol
//!
//! Every record becomes a `<path> <value> <timestamp>\n` line. How tags are
//! folded into the path is decided by a `PathFormat`.
use std::io::Write;
use std::sync::Arc;

use crate::element::MetricRecord;


const EMPTY_TAG_VALUE: &'static str = "<empty>";

/// Writes the metric path (name plus tags) of a record
///
/// Implementations must be pure: the same name and tags always produce the
/// same bytes. They must also never write whitespace, or the line framing
/// of the protocol breaks.
pub trait PathFormat {
    /// Append the path for `name` and `tags` to `out`
    fn write_path(&self, name: &str, tags: &[(String, String)],
        out: &mut Vec<u8>);
}

/// Graphite tagged series: `name;key=value;key2=value2`
#[derive(Debug, Clone, Copy, Default)]
pub struct Tagged;

/// Tags as trailing path components: `name.key.value.key2.value2`
#[derive(Debug, Clone, Copy, Default)]
pub struct Dotted;

/// Which of the built-in path formats to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStyle {
    /// See `Tagged`
    Tagged,
    /// See `Dotted`
    Dotted,
}

/// Result of encoding a batch
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedPayload {
    /// Lines ready to be written to the socket
    pub bytes: Vec<u8>,
    /// Number of records rendered into `bytes`
    pub accepted: usize,
    /// Number of records skipped because the protocol can't express them
    pub dropped: usize,
}

/// Encodes batches of records, cheap to clone and to share between sends
#[derive(Clone)]
pub struct Encoder {
    format: Arc<dyn PathFormat + Send + Sync>,
}

fn push_sanitized(out: &mut Vec<u8>, value: &str, forbidden: &[char]) {
    let mut buf = [0u8; 4];
    for c in value.chars() {
        if c.is_whitespace() || forbidden.contains(&c) {
            out.push(b'_');
        } else {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
    }
}

impl PathFormat for Tagged {
    fn write_path(&self, name: &str, tags: &[(String, String)],
        out: &mut Vec<u8>)
    {
        push_sanitized(out, name, &[';']);
        for &(ref key, ref value) in tags {
            if key.is_empty() {
                continue;
            }
            out.push(b';');
            push_sanitized(out, key, &[';', '!', '^', '=']);
            out.push(b'=');
            if value.is_empty() {
                out.extend_from_slice(EMPTY_TAG_VALUE.as_bytes());
            } else {
                push_sanitized(out, value, &[';', '~']);
            }
        }
    }
}

impl PathFormat for Dotted {
    fn write_path(&self, name: &str, tags: &[(String, String)],
        out: &mut Vec<u8>)
    {
        push_sanitized(out, name, &[]);
        for &(ref key, ref value) in tags {
            if key.is_empty() {
                continue;
            }
            out.push(b'.');
            push_sanitized(out, key, &['.']);
            if !value.is_empty() {
                out.push(b'.');
                push_sanitized(out, value, &['.']);
            }
        }
    }
}

impl TagStyle {
    /// Build an encoder using this style
    pub fn encoder(self) -> Encoder {
        match self {
            TagStyle::Tagged => Encoder::new(Tagged),
            TagStyle::Dotted => Encoder::new(Dotted),
        }
    }
}

impl Encoder {
    /// Create an encoder with a custom path format
    pub fn new<F>(format: F) -> Encoder
        where F: PathFormat + Send + Sync + 'static
    {
        Encoder { format: Arc::new(format) }
    }

    /// Render the records in order, one line per record
    ///
    /// Records with a non-finite value or an empty name are skipped and
    /// counted in `dropped`, that's not an error.
    pub fn encode(&self, records: &[MetricRecord]) -> EncodedPayload {
        let mut buf = Vec::with_capacity(records.len() * 64);
        let mut dropped = 0;
        for rec in records {
            if !rec.value().is_finite() || rec.name().is_empty() {
                trace!("Dropping metric {:?} with value {}",
                    rec.name(), rec.value());
                dropped += 1;
                continue;
            }
            self.format.write_path(rec.name(), rec.tags(), &mut buf);
            writeln!(&mut buf, " {} {}", rec.value(), rec.timestamp())
                .expect("writing to buffer always succeed");
        }
        EncodedPayload {
            bytes: buf,
            accepted: records.len() - dropped,
            dropped: dropped,
        }
    }
}

impl Default for Encoder {
    fn default() -> Encoder {
        Encoder::new(Tagged)
    }
}
