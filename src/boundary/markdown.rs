//! Markdown heading boundary strategy.
//!
//! Parses `#` through `######` heading lines into a hierarchical outline. A
//! heading span ends at the line before the next heading of equal-or-lower
//! level, or at EOF.

use super::BoundarySpan;
use crate::core::Boundary;

/// Parses heading spans out of markdown `text`.
#[must_use]
pub fn parse_headings(text: &str) -> Vec<BoundarySpan> {
    let headings: Vec<(usize, u8, String, usize)> = text
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| parse_heading_line(line).map(|(level, title)| {
            let byte_offset = line_byte_offset(text, idx);
            (idx, level, title, byte_offset)
        }))
        .collect();

    let mut spans = Vec::with_capacity(headings.len());
    let total_lines = text.lines().count();
    let text_len = text.len();

    for (i, (line_idx, level, title, start_byte)) in headings.iter().enumerate() {
        let end_line_idx = headings[i + 1..]
            .iter()
            .find(|(_, other_level, ..)| other_level <= level)
            .map_or(total_lines, |(other_idx, ..)| *other_idx);

        let end_byte = if end_line_idx >= total_lines {
            text_len
        } else {
            line_byte_offset(text, end_line_idx)
        };

        spans.push(BoundarySpan {
            start_byte: *start_byte,
            end_byte,
            start_line: line_idx + 1,
            end_line: end_line_idx,
            boundary: Boundary::Heading {
                level: *level,
                title: title.clone(),
            },
        });
    }

    spans
}

/// Parses a single line as a markdown heading, returning `(level, title)`.
fn parse_heading_line(line: &str) -> Option<(u8, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') {
        return None; // e.g. "#tag" is not a heading
    }
    let title = rest.trim().to_string();
    Some((u8::try_from(hashes).unwrap_or(6), title))
}

/// Byte offset of the start of line `idx` (0-based) in `text`.
fn line_byte_offset(text: &str, idx: usize) -> usize {
    text.lines()
        .take(idx)
        .map(|l| l.len() + 1)
        .sum::<usize>()
        .min(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_heading() {
        let text = "# Title\n\nBody text\n";
        let spans = parse_headings(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].boundary.heading_level(), Some(1));
        assert_eq!(spans[0].boundary.heading_title(), Some("Title"));
        assert_eq!(spans[0].end_byte, text.len());
    }

    #[test]
    fn test_nested_headings_end_before_sibling() {
        let text = "# A\nintro\n## B\nbody b\n## C\nbody c\n";
        let spans = parse_headings(text);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].boundary.heading_level(), Some(1));
        // "# A" ends at EOF since no other level-1 heading follows
        assert_eq!(spans[0].end_byte, text.len());
        // "## B" ends right before "## C"
        let c_start = text.find("## C").unwrap();
        assert_eq!(spans[1].end_byte, c_start);
    }

    #[test]
    fn test_equal_level_headings_end_at_next() {
        let text = "## One\ntext1\n## Two\ntext2\n";
        let spans = parse_headings(text);
        assert_eq!(spans.len(), 2);
        let two_start = text.find("## Two").unwrap();
        assert_eq!(spans[0].end_byte, two_start);
    }

    #[test]
    fn test_no_headings() {
        assert!(parse_headings("just text\nno headings here\n").is_empty());
    }

    #[test]
    fn test_hashtag_without_space_is_not_a_heading() {
        assert!(parse_headings("#nospace\n").is_empty());
    }

    #[test]
    fn test_seven_hashes_is_not_a_heading() {
        assert!(parse_headings("####### too many\n").is_empty());
    }

    #[test]
    fn test_heading_with_empty_title() {
        let spans = parse_headings("#\nbody\n");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].boundary.heading_title(), Some(""));
    }
}
