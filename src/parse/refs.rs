//! Refs, remotes, upstreams and stashes

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefKind {
    Head,
    RemoteHead,
    Tag,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GitRef {
    pub kind: RefKind,
    /// Short name; remote branches include the remote, e.g. `origin/main`
    pub name: String,
    pub commit: Option<String>,
    pub remote: Option<String>,
}

/// Format passed to `for-each-ref` for [`parse_refs`]
pub const REF_FORMAT: &str = "%(refname) %(objectname) %(*objectname)";

/// Parse `for-each-ref --format '%(refname) %(objectname) %(*objectname)'`
///
/// Annotated tags report the peeled commit. Lines outside heads, remotes and
/// tags are skipped.
pub fn parse_refs(output: &str) -> Vec<GitRef> {
    output
        .lines()
        .filter(|line| !line.is_empty())
        .filter_map(parse_ref_line)
        .collect()
}

fn parse_ref_line(line: &str) -> Option<GitRef> {
    let mut fields = line.split(' ');
    let refname = fields.next()?;
    let object = fields.next().filter(|s| is_object_id(s))?;
    let peeled = fields.next().filter(|s| is_object_id(s));

    if let Some(name) = refname.strip_prefix("refs/heads/") {
        Some(GitRef {
            kind: RefKind::Head,
            name: name.to_string(),
            commit: Some(object.to_string()),
            remote: None,
        })
    } else if let Some(name) = refname.strip_prefix("refs/remotes/") {
        let (remote, branch) = name.split_once('/')?;
        if branch.is_empty() {
            return None;
        }
        Some(GitRef {
            kind: RefKind::RemoteHead,
            name: name.to_string(),
            commit: Some(object.to_string()),
            remote: Some(remote.to_string()),
        })
    } else {
        refname.strip_prefix("refs/tags/").map(|name| GitRef {
            kind: RefKind::Tag,
            name: name.to_string(),
            commit: Some(peeled.unwrap_or(object).to_string()),
            remote: None,
        })
    }
}

/// SHA-1 or SHA-256 hex object id
fn is_object_id(s: &str) -> bool {
    (s.len() == 40 || s.len() == 64) && s.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Remote {
    pub name: String,
    pub fetch_url: Option<String>,
    pub push_url: Option<String>,
    /// No push URL, or the conventional `no_push` placeholder
    pub is_read_only: bool,
}

/// Parse `remote --verbose`: `name<TAB>url (fetch|push)` per line
pub fn parse_remotes(output: &str) -> Vec<Remote> {
    let mut remotes: Vec<Remote> = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut parts = line.split_whitespace();
        let (Some(name), Some(url)) = (parts.next(), parts.next()) else {
            continue;
        };
        let kind = parts.next().unwrap_or("").to_ascii_lowercase();

        let index = match remotes.iter().position(|r| r.name == name) {
            Some(index) => index,
            None => {
                remotes.push(Remote {
                    name: name.to_string(),
                    ..Default::default()
                });
                remotes.len() - 1
            }
        };
        let remote = &mut remotes[index];

        if kind.contains("fetch") {
            remote.fetch_url = Some(url.to_string());
        } else if kind.contains("push") {
            remote.push_url = Some(url.to_string());
        } else {
            remote.fetch_url = Some(url.to_string());
            remote.push_url = Some(url.to_string());
        }

        remote.is_read_only = matches!(remote.push_url.as_deref(), None | Some("no_push"));
    }

    remotes
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upstream {
    pub remote: String,
    pub name: String,
}

/// `origin/feature/x` → remote `origin`, branch `feature/x`
pub fn parse_upstream(short: &str) -> Option<Upstream> {
    let (remote, name) = short.trim().split_once('/')?;
    if remote.is_empty() || name.is_empty() {
        return None;
    }
    Some(Upstream {
        remote: remote.to_string(),
        name: name.to_string(),
    })
}

/// Parse `rev-list --left-right --count <branch>...<upstream>` into (ahead, behind)
pub fn parse_ahead_behind(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some((ahead, behind))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stash {
    pub index: usize,
    pub description: String,
}

/// Parse `stash list`: `stash@{N}:description` per line
pub fn parse_stash_list(output: &str) -> Vec<Stash> {
    output
        .lines()
        .filter_map(|line| {
            let rest = line.strip_prefix("stash@{")?;
            let (index, rest) = rest.split_once("}:")?;
            if rest.is_empty() {
                return None;
            }
            Some(Stash {
                index: index.parse().ok()?,
                description: rest.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "1111111111111111111111111111111111111111";
    const B: &str = "2222222222222222222222222222222222222222";

    #[test]
    fn test_parse_refs() {
        let out = format!(
            "refs/heads/main {A} \nrefs/remotes/origin/feature/x {A} \nrefs/tags/v1 {A} {B}\nrefs/tags/light {B} \nrefs/notes/commits {A} \n"
        );
        let refs = parse_refs(&out);
        assert_eq!(refs.len(), 4);
        assert_eq!(refs[0].kind, RefKind::Head);
        assert_eq!(refs[0].name, "main");
        assert_eq!(refs[1].name, "origin/feature/x");
        assert_eq!(refs[1].remote.as_deref(), Some("origin"));
        assert_eq!(refs[2].commit.as_deref(), Some(B));
        assert_eq!(refs[3].commit.as_deref(), Some(B));
    }

    #[test]
    fn test_parse_remotes() {
        let out = "origin\thttps://example.com/r.git (fetch)\norigin\thttps://example.com/r.git (push)\n\
                   upstream\thttps://example.com/u.git (fetch)\nupstream\tno_push (push)\n";
        let remotes = parse_remotes(out);
        assert_eq!(remotes.len(), 2);
        assert!(!remotes[0].is_read_only);
        assert_eq!(remotes[1].fetch_url.as_deref(), Some("https://example.com/u.git"));
        assert!(remotes[1].is_read_only);
    }

    #[test]
    fn test_parse_upstream() {
        assert_eq!(
            parse_upstream("origin/feature/x\n"),
            Some(Upstream {
                remote: "origin".to_string(),
                name: "feature/x".to_string()
            })
        );
        assert_eq!(parse_upstream("main"), None);
    }

    #[test]
    fn test_parse_ahead_behind() {
        assert_eq!(parse_ahead_behind("3\t1\n"), Some((3, 1)));
        assert_eq!(parse_ahead_behind("garbage"), None);
    }

    #[test]
    fn test_parse_stash_list() {
        let stashes = parse_stash_list("stash@{0}: WIP on main: abc fix\nstash@{1}: On main: keep\nnoise\n");
        assert_eq!(stashes.len(), 2);
        assert_eq!(stashes[1].index, 1);
        assert_eq!(stashes[0].description, " WIP on main: abc fix");
    }
}
