//! NUL-separated path lists: `check-ignore -v -z` and `ls-files -z`

/// Paths from `check-ignore -v -z` that git actually ignores
///
/// Output is groups of four fields: source, line number, pattern, path. A match
/// against a negated (`!`) pattern means the path is re-included, so it is dropped.
pub fn parse_check_ignore(raw: &str) -> Vec<String> {
    let fields: Vec<&str> = raw.split('\0').collect();
    fields
        .chunks(4)
        .filter_map(|group| {
            let pattern = group.get(2)?;
            let path = group.get(3)?;
            (!pattern.is_empty() && !pattern.starts_with('!')).then(|| path.to_string())
        })
        .collect()
}

/// Paths from a `-z` listing such as `ls-files -z --others --exclude-standard`
pub fn parse_path_list(raw: &str) -> Vec<String> {
    raw.split('\0')
        .filter(|path| !path.is_empty())
        .map(str::to_string)
        .collect()
}
