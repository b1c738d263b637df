//! Conversion boundary.
//!
//! A [`Converter`] turns an input document into rendered text. While it runs
//! it writes diagnostic lines into the [`DiagnosticSink`] it was handed; each
//! job gets its own sink so concurrent conversions never share output.

mod command;

use std::path::Path;

use async_trait::async_trait;

pub use command::CommandConverter;

use crate::error::ConversionError;

/// Receives diagnostic output from a converter, one line at a time.
pub trait DiagnosticSink: Send + Sync {
    fn write_line(&self, line: &str);
}

#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    async fn convert(
        &self,
        input: &Path,
        sink: &dyn DiagnosticSink,
    ) -> Result<String, ConversionError>;
}

/// Splits a byte stream into lines on `\n` and `\r`.
///
/// Progress bars redraw in place with carriage returns, so each redraw is
/// reported as its own line.
#[derive(Debug, Default)]
pub(crate) struct LineSplitter {
    pending: Vec<u8>,
}

impl LineSplitter {
    pub(crate) fn push(&mut self, chunk: &[u8], mut emit: impl FnMut(&str)) {
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                self.flush(&mut emit);
            } else {
                self.pending.push(byte);
            }
        }
    }

    pub(crate) fn finish(&mut self, mut emit: impl FnMut(&str)) {
        self.flush(&mut emit);
    }

    fn flush(&mut self, emit: &mut impl FnMut(&str)) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending);
        emit(&line);
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(chunks: &[&[u8]]) -> Vec<String> {
        let mut splitter = LineSplitter::default();
        let mut lines = Vec::new();
        for chunk in chunks {
            splitter.push(chunk, |l| lines.push(l.to_string()));
        }
        splitter.finish(|l| lines.push(l.to_string()));
        lines
    }

    #[test]
    fn test_splits_on_carriage_returns() {
        let lines = split(&[b"Layout: 10%\rLayout: 20%\rLayout: 30%\n"]);
        assert_eq!(lines, vec!["Layout: 10%", "Layout: 20%", "Layout: 30%"]);
    }

    #[test]
    fn test_joins_lines_across_chunks() {
        let lines = split(&[b"Recog", b"nizing: 5", b"0%\r\nDone"]);
        assert_eq!(lines, vec!["Recognizing: 50%", "Done"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let lines = split(&[b"bad \xff byte\n"]);
        assert_eq!(lines, vec!["bad \u{fffd} byte"]);
    }
}
