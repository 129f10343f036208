//! Source map v3 model and mappings encoder
//!
//! Only what the export transformer needs: line-oriented segments, one
//! source, no names.
//!
//! <https://sourcemaps.info/spec.html>

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

const VERSION: u32 = 3;
const B64_DIGITS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,
    #[serde(default)]
    pub names: Vec<String>,
    pub mappings: String,
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize source map")
    }

    /// Decode `mappings` back into per-line segments
    pub fn decoded_mappings(&self) -> Result<Vec<Vec<Segment>>> {
        let mut lines = Vec::new();
        let mut source = 0i64;
        let mut source_line = 0i64;
        let mut source_col = 0i64;

        for line in self.mappings.split(';') {
            let mut segments = Vec::new();
            let mut col = 0i64;
            for raw in line.split(',').filter(|raw| !raw.is_empty()) {
                let fields = decode_vlq(raw)?;
                match fields.as_slice() {
                    [dc] => {
                        col += dc;
                        segments.push(Segment::unmapped(to_usize(col)?));
                    }
                    [dc, ds, dl, dcol, ..] => {
                        col += dc;
                        source += ds;
                        source_line += dl;
                        source_col += dcol;
                        segments.push(Segment::mapped(
                            to_usize(col)?,
                            to_usize(source)?,
                            to_usize(source_line)?,
                            to_usize(source_col)?,
                        ));
                    }
                    _ => bail!("Malformed mapping segment: {raw}"),
                }
            }
            lines.push(segments);
        }
        Ok(lines)
    }
}

fn to_usize(value: i64) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("Negative position in mappings: {value}"))
}

/// One mapping segment of a generated line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub generated_col: usize,
    /// `(source index, line, column)`; `None` marks generated-only text
    pub original: Option<(usize, usize, usize)>,
}

impl Segment {
    pub fn mapped(generated_col: usize, source: usize, line: usize, col: usize) -> Self {
        Self {
            generated_col,
            original: Some((source, line, col)),
        }
    }

    pub fn unmapped(generated_col: usize) -> Self {
        Self {
            generated_col,
            original: None,
        }
    }
}

/// Accumulates generated lines and their segments
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    file: Option<String>,
    sources: Vec<String>,
    sources_content: Vec<Option<String>>,
    lines: Vec<Vec<Segment>>,
}

impl SourceMapBuilder {
    pub fn new(file: Option<String>) -> Self {
        Self {
            file,
            ..Self::default()
        }
    }

    /// Register a source and return its index
    pub fn add_source(&mut self, url: &str, content: Option<String>) -> usize {
        if let Some(index) = self.sources.iter().position(|source| source == url) {
            return index;
        }
        self.sources.push(url.to_owned());
        self.sources_content.push(content);
        self.sources.len() - 1
    }

    /// Start a new generated line
    pub fn add_line(&mut self) -> &mut Self {
        self.lines.push(Vec::new());
        self
    }

    /// Add a segment to the current line; segments must come in column order
    pub fn add_segment(&mut self, segment: Segment) -> Result<&mut Self> {
        let Some(line) = self.lines.last_mut() else {
            bail!("A line must be added before segments can be added");
        };
        if line
            .last()
            .is_some_and(|last| last.generated_col > segment.generated_col)
        {
            bail!("Segments must be added in generated column order");
        }
        if let Some((source, _, _)) = segment.original
            && source >= self.sources.len()
        {
            bail!("Unknown source index {source}");
        }
        line.push(segment);
        Ok(self)
    }

    pub fn build(self) -> SourceMap {
        let mut mappings = String::new();
        let mut last_source = 0i64;
        let mut last_line = 0i64;
        let mut last_col = 0i64;

        for (index, segments) in self.lines.iter().enumerate() {
            if index > 0 {
                mappings.push(';');
            }
            let mut last_generated = 0i64;
            for (seg_index, segment) in segments.iter().enumerate() {
                if seg_index > 0 {
                    mappings.push(',');
                }
                let generated = segment.generated_col as i64;
                encode_vlq(generated - last_generated, &mut mappings);
                last_generated = generated;

                if let Some((source, line, col)) = segment.original {
                    let (source, line, col) = (source as i64, line as i64, col as i64);
                    encode_vlq(source - last_source, &mut mappings);
                    encode_vlq(line - last_line, &mut mappings);
                    encode_vlq(col - last_col, &mut mappings);
                    last_source = source;
                    last_line = line;
                    last_col = col;
                }
            }
        }

        let has_content = self.sources_content.iter().any(Option::is_some);
        SourceMap {
            version: VERSION,
            file: self.file,
            sources: self.sources,
            sources_content: has_content.then_some(self.sources_content),
            names: Vec::new(),
            mappings,
        }
    }
}

fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    };
    loop {
        let mut digit = (vlq & 0b1_1111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b10_0000;
        }
        out.push(char::from(B64_DIGITS[digit]));
        if vlq == 0 {
            break;
        }
    }
}

fn decode_vlq(segment: &str) -> Result<Vec<i64>> {
    let mut values = Vec::new();
    let mut value = 0i64;
    let mut shift = 0u32;

    for byte in segment.bytes() {
        let Some(digit) = B64_DIGITS.iter().position(|&d| d == byte) else {
            bail!("Invalid base64 digit in mappings: {}", char::from(byte));
        };
        let digit = digit as i64;
        value += (digit & 0b1_1111) << shift;
        if digit & 0b10_0000 == 0 {
            let magnitude = value >> 1;
            values.push(if value & 1 == 1 { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
        } else {
            shift += 5;
            if shift > 60 {
                bail!("VLQ value out of range in segment: {segment}");
            }
        }
    }
    if shift != 0 {
        bail!("Truncated VLQ value in segment: {segment}");
    }
    Ok(values)
}
