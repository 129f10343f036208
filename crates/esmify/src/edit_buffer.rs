//! Append-only edit buffer
//!
//! The export transformer only ever adds statements after the original text.
//! Keeping the original untouched means every original line and column is
//! still valid in the output, so the map is the identity over the original
//! region and maps nothing for the appended tail.

use std::fmt;

use anyhow::Result;

use crate::source_map::{Segment, SourceMap, SourceMapBuilder};

#[derive(Debug, Clone)]
pub struct AppendOnlyBuffer<'a> {
    original: &'a str,
    appended: String,
}

impl<'a> AppendOnlyBuffer<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            appended: String::new(),
        }
    }

    pub fn append(&mut self, text: &str) -> &mut Self {
        self.appended.push_str(text);
        self
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    pub fn appended(&self) -> &str {
        &self.appended
    }

    pub fn is_modified(&self) -> bool {
        !self.appended.is_empty()
    }

    /// Build a map from the output back to `source`
    ///
    /// Every non-empty original line gets one segment pointing at its own
    /// start. Text appended onto the last original line is marked as
    /// generated; lines created by the appended text get no segments.
    pub fn generate_map(&self, source: &str, include_content: bool) -> Result<SourceMap> {
        let mut builder = SourceMapBuilder::new(None);
        let source_index = builder.add_source(
            source,
            include_content.then(|| self.original.to_owned()),
        );

        let original_lines: Vec<&str> = self.original.split('\n').collect();
        let last_line = original_lines.len() - 1;
        for (line_no, line) in original_lines.iter().enumerate() {
            builder.add_line();
            let content = line.strip_suffix('\r').unwrap_or(line);
            if !content.is_empty() {
                builder.add_segment(Segment::mapped(0, source_index, line_no, 0))?;
            }
            if line_no == last_line && !content.is_empty() && !self.appended.is_empty() {
                let continues_line = !self.appended.starts_with(['\n', '\r']);
                if continues_line {
                    // columns count UTF-16 code units
                    builder.add_segment(Segment::unmapped(line.encode_utf16().count()))?;
                }
            }
        }

        for _ in 0..self.appended.matches('\n').count() {
            builder.add_line();
        }

        Ok(builder.build())
    }
}

impl fmt::Display for AppendOnlyBuffer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.original)?;
        f.write_str(&self.appended)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_appends_after_original() {
        let mut buffer = AppendOnlyBuffer::new("export default main;\n");
        assert!(!buffer.is_modified());
        buffer.append("\nexport { gamma };").append("\n");

        assert!(buffer.is_modified());
        assert_eq!(
            buffer.to_string(),
            "export default main;\n\nexport { gamma };\n"
        );
        assert_eq!(buffer.original(), "export default main;\n");
    }

    #[test]
    fn test_map_is_identity_over_original_lines() -> Result<()> {
        let mut buffer = AppendOnlyBuffer::new("a;\n\nb;\n");
        buffer.append("\nexport { b };\n");

        let map = buffer.generate_map("lib/index.js", true)?;
        // original: "a;", "", "b;", "" then two appended newlines
        assert_eq!(map.mappings, "AAAA;;AAEA;;;");
        assert_eq!(map.sources, vec!["lib/index.js"]);
        assert_eq!(
            map.sources_content,
            Some(vec![Some("a;\n\nb;\n".to_owned())])
        );

        let lines = map.decoded_mappings()?;
        assert_eq!(lines.len(), buffer.to_string().split('\n').count());
        assert_eq!(lines[2], vec![Segment::mapped(0, 0, 2, 0)]);
        assert!(lines[3..].iter().all(Vec::is_empty));
        Ok(())
    }

    #[test]
    fn test_text_appended_on_last_line_is_unmapped() -> Result<()> {
        let mut buffer = AppendOnlyBuffer::new("x;");
        buffer.append(" export { x };");

        let map = buffer.generate_map("x.js", false)?;
        assert_eq!(
            map.decoded_mappings()?,
            vec![vec![Segment::mapped(0, 0, 0, 0), Segment::unmapped(2)]]
        );
        assert_eq!(map.sources_content, None);
        Ok(())
    }

    #[test]
    fn test_unmapped_column_counts_utf16_units() -> Result<()> {
        let mut buffer = AppendOnlyBuffer::new("var s = 'é😀';");
        buffer.append(" export { s };");

        let map = buffer.generate_map("s.js", false)?;
        // 'é' is one unit and the emoji a surrogate pair
        assert_eq!(
            map.decoded_mappings()?,
            vec![vec![Segment::mapped(0, 0, 0, 0), Segment::unmapped(14)]]
        );
        Ok(())
    }
}
