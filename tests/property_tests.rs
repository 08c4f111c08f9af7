//! Property-based tests for output parsing.

use proptest::prelude::*;

use git_interop::parse::{parse_config_value, parse_status, ConfigScope, FileStatusEntry, StatusParser};
use git_interop::repository::pigeonhole;

/// Strategy for a path without NULs, not ending in `/`.
fn path() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ._-]{1,12}(/[a-zA-Z0-9 ._-]{1,12}){0,2}"
}

/// Strategy for one status record and the entry it should parse to.
fn record() -> impl Strategy<Value = (Vec<u8>, FileStatusEntry)> {
    let code = prop::sample::select(vec![
        "M ", " M", "MM", "A ", "AM", "D ", " D", "R ", "RM", "C ", "UU", "AA", "DD", "??", "!!",
    ]);
    (code, path(), path()).prop_map(|(code, path, renamed)| {
        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');

        let mut raw = format!("{} ", code).into_bytes();
        let rename = if x == 'R' || x == 'C' {
            raw.extend_from_slice(renamed.as_bytes());
            raw.push(0);
            Some(renamed)
        } else {
            None
        };
        raw.extend_from_slice(path.as_bytes());
        raw.push(0);

        (raw, FileStatusEntry { x, y, path, rename })
    })
}

/// Split `raw` at the given (unsorted, possibly repeated) cut points.
fn split_at(raw: &[u8], cuts: &[usize]) -> Vec<Vec<u8>> {
    let mut cuts: Vec<usize> = cuts.iter().map(|c| c % (raw.len() + 1)).collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(raw[start..cut].to_vec());
        start = cut;
    }
    chunks.push(raw[start..].to_vec());
    chunks
}

proptest! {
    /// Feeding a stream in arbitrary chunks parses to the same entries as feeding it whole.
    #[test]
    fn status_parse_is_chunking_independent(
        records in prop::collection::vec(record(), 0..20),
        cuts in prop::collection::vec(any::<usize>(), 0..16),
    ) {
        let raw: Vec<u8> = records.iter().flat_map(|(r, _)| r.clone()).collect();
        let expected: Vec<FileStatusEntry> = records.into_iter().map(|(_, e)| e).collect();

        let mut parser = StatusParser::new();
        for chunk in split_at(&raw, &cuts) {
            parser.update(&chunk);
        }
        prop_assert_eq!(parser.pending(), 0);
        prop_assert_eq!(parser.into_entries(), expected.clone());
        prop_assert_eq!(parse_status(&raw), expected);
    }

    /// Every entry lands in at least one group, and conflicts only in `merge`.
    #[test]
    fn every_entry_is_grouped(records in prop::collection::vec(record(), 1..20)) {
        let entries: Vec<FileStatusEntry> = records.into_iter().map(|(_, e)| e).collect();
        let groups = pigeonhole(std::path::Path::new("/repo"), &entries);

        let grouped = groups.merge.len()
            + groups.index.len()
            + groups.working_tree.len()
            + groups.untracked.len()
            + groups.ignored.len();
        prop_assert!(grouped >= entries.len());

        let conflicts = entries
            .iter()
            .filter(|e| matches!(e.code().as_str(), "UU" | "AA" | "DD"))
            .count();
        prop_assert_eq!(groups.merge.len(), conflicts);
    }

    /// Only the four known scopes are ever accepted.
    #[test]
    fn config_scope_is_never_guessed(scope in "[a-z]{1,10}", value in "[^\t\n]{0,20}") {
        let output = format!("{}\t{}\n", scope, value);
        let parsed = parse_config_value("user.name", &output);
        let known = matches!(scope.as_str(), "local" | "worktree" | "global" | "system");
        prop_assert_eq!(parsed.is_ok(), known);
        if let Ok(parsed) = parsed {
            prop_assert_eq!(parsed.scope, scope.parse::<ConfigScope>().unwrap());
        }
    }
}
