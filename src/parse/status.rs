//! Incremental parser for `git status -z`
//!
//! Input arrives in arbitrary chunks; a record may be split anywhere, even in
//! the middle of a multi-byte character. Unconsumed bytes are kept until the
//! record's terminating NUL arrives.

use serde::Serialize;

/// One record from `git status -z`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatusEntry {
    /// Index status
    pub x: char,
    /// Working tree status
    pub y: char,
    pub path: String,
    /// For renames and copies (X is `R` or `C`), the new path. git emits it first
    /// and `path` then holds the original.
    pub rename: Option<String>,
}

impl FileStatusEntry {
    /// The two-letter XY code
    pub fn code(&self) -> String {
        let mut code = String::with_capacity(2);
        code.push(self.x);
        code.push(self.y);
        code
    }

    pub fn is_untracked(&self) -> bool {
        self.x == '?' && self.y == '?'
    }

    pub fn is_ignored(&self) -> bool {
        self.x == '!' && self.y == '!'
    }
}

#[derive(Debug, Default)]
pub struct StatusParser {
    tail: Vec<u8>,
    entries: Vec<FileStatusEntry>,
}

impl StatusParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk; returns how many entries it completed
    pub fn update(&mut self, chunk: &[u8]) -> usize {
        let before = self.entries.len();
        self.tail.extend_from_slice(chunk);

        let mut cursor = 0;
        while let Some((entry, next)) = parse_entry(&self.tail, cursor) {
            if let Some(entry) = entry {
                self.entries.push(entry);
            }
            cursor = next;
        }
        self.tail.drain(..cursor);

        self.entries.len() - before
    }

    pub fn entries(&self) -> &[FileStatusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes of an incomplete record still waiting for more input
    pub fn pending(&self) -> usize {
        self.tail.len()
    }

    pub fn into_entries(self) -> Vec<FileStatusEntry> {
        self.entries
    }
}

/// Parse a complete `status -z` output in one go
pub fn parse_status(raw: &[u8]) -> Vec<FileStatusEntry> {
    let mut parser = StatusParser::new();
    parser.update(raw);
    parser.into_entries()
}

/// Parse one record starting at `start`
///
/// Returns `None` when the record is incomplete. A complete record whose path
/// ends in `/` (a nested repository) yields `Some((None, next))`.
fn parse_entry(raw: &[u8], start: usize) -> Option<(Option<FileStatusEntry>, usize)> {
    // XY, space, and at least the terminating NUL
    if raw.len() < start + 4 {
        return None;
    }

    let x = raw[start] as char;
    let y = raw[start + 1] as char;
    let mut cursor = start + 3;

    let rename = if x == 'R' || x == 'C' {
        let (field, next) = take_field(raw, cursor)?;
        cursor = next;
        Some(field)
    } else {
        None
    };

    let (path, next) = take_field(raw, cursor)?;
    if path.ends_with('/') {
        return Some((None, next));
    }

    Some((Some(FileStatusEntry { x, y, path, rename }), next))
}

fn take_field(raw: &[u8], start: usize) -> Option<(String, usize)> {
    let len = raw.get(start..)?.iter().position(|b| *b == 0)?;
    let field = String::from_utf8_lossy(&raw[start..start + len]).into_owned();
    Some((field, start + len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(x: char, y: char, path: &str) -> FileStatusEntry {
        FileStatusEntry {
            x,
            y,
            path: path.to_string(),
            rename: None,
        }
    }

    #[test]
    fn test_parse_whole_stream() {
        let entries = parse_status(b"M  a.txt\0?? b.txt\0");
        assert_eq!(entries, vec![entry('M', ' ', "a.txt"), entry('?', '?', "b.txt")]);
    }

    #[test]
    fn test_chunk_boundaries_inside_records() {
        let mut parser = StatusParser::new();
        assert_eq!(parser.update(b"M  a"), 0);
        assert_eq!(parser.update(b".txt\0?"), 1);
        assert_eq!(parser.update(b"? b.txt\0"), 1);
        assert_eq!(parser.pending(), 0);
        assert_eq!(
            parser.into_entries(),
            vec![entry('M', ' ', "a.txt"), entry('?', '?', "b.txt")]
        );
    }

    #[test]
    fn test_rename_consumes_two_fields() {
        let entries = parse_status(b"R  new.txt\0old.txt\0 M c.txt\0");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].x, 'R');
        assert_eq!(entries[0].rename.as_deref(), Some("new.txt"));
        assert_eq!(entries[0].path, "old.txt");
        assert_eq!(entries[1], entry(' ', 'M', "c.txt"));
    }

    #[test]
    fn test_rename_split_between_fields() {
        let mut parser = StatusParser::new();
        assert_eq!(parser.update(b"C  copy.txt\0"), 0);
        assert_eq!(parser.update(b"orig.txt\0"), 1);
        assert_eq!(parser.entries()[0].rename.as_deref(), Some("copy.txt"));
    }

    #[test]
    fn test_nested_repository_is_dropped() {
        let entries = parse_status(b"?? vendor/lib/\0?? notes.md\0");
        assert_eq!(entries, vec![entry('?', '?', "notes.md")]);
    }

    #[test]
    fn test_path_with_newline_and_utf8() {
        let raw = "A  dir/ünï\ncode.rs\0".as_bytes();
        let (first, second) = raw.split_at(8);
        let mut parser = StatusParser::new();
        parser.update(first);
        parser.update(second);
        assert_eq!(parser.entries()[0].path, "dir/ünï\ncode.rs");
    }

    #[test]
    fn test_incomplete_record_is_retained() {
        let mut parser = StatusParser::new();
        parser.update(b" M unfinished");
        assert!(parser.is_empty());
        assert_eq!(parser.pending(), 13);
    }

    #[test]
    fn test_entry_helpers() {
        let e = entry('?', '?', "x");
        assert!(e.is_untracked());
        assert!(!e.is_ignored());
        assert_eq!(entry('U', 'U', "x").code(), "UU");
    }
}
