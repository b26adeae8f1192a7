//! Pathname expansion.
//!
//! Patterns support `*` (any run of characters), `?` (exactly one), and
//! `[...]` character sets with ranges and `[!...]`/`[^...]` negation. An
//! unclosed `[` is taken literally. Matching never crosses a `/`; the
//! expander walks the filesystem one segment at a time, relative to the
//! shell's working directory.

use std::path::{Path, PathBuf};

/// Does this text contain any pattern metacharacters?
pub fn has_magic(s: &str) -> bool {
    s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
}

/// Match a single path segment against a pattern.
pub fn glob_match(pattern: &str, input: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let inp: Vec<char> = input.chars().collect();
    match_at(&pat, 0, &inp, 0)
}

fn match_at(pat: &[char], pi: usize, inp: &[char], ii: usize) -> bool {
    if pi == pat.len() {
        return ii == inp.len();
    }
    match pat[pi] {
        '*' => {
            // Greedy or not, some suffix of the input has to satisfy the
            // rest of the pattern.
            (ii..=inp.len()).any(|skip| match_at(pat, pi + 1, inp, skip))
        }
        '?' => ii < inp.len() && match_at(pat, pi + 1, inp, ii + 1),
        '[' => match class_match(pat, pi + 1, inp.get(ii).copied()) {
            Some((matched, next_pi)) => {
                matched && ii < inp.len() && match_at(pat, next_pi, inp, ii + 1)
            }
            // No closing bracket: the '[' is an ordinary character.
            None => ii < inp.len() && inp[ii] == '[' && match_at(pat, pi + 1, inp, ii + 1),
        },
        c => ii < inp.len() && inp[ii] == c && match_at(pat, pi + 1, inp, ii + 1),
    }
}

/// Evaluate a `[...]` class starting just past the bracket. Returns the
/// match result and the index past the closing `]`, or `None` when the
/// class never closes.
fn class_match(pat: &[char], start: usize, input: Option<char>) -> Option<(bool, usize)> {
    let mut i = start;
    let negated = matches!(pat.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let c = *pat.get(i)?;
        if c == ']' && !first {
            return Some((matched != negated && input.is_some(), i + 1));
        }
        first = false;
        // Range like a-z, unless the '-' is trailing.
        if pat.get(i + 1) == Some(&'-') && pat.get(i + 2).is_some_and(|&e| e != ']') {
            let end = pat[i + 2];
            if let Some(inc) = input {
                if c <= inc && inc <= end {
                    matched = true;
                }
            }
            i += 3;
        } else {
            if input == Some(c) {
                matched = true;
            }
            i += 1;
        }
    }
}

/// Expand a pattern against the filesystem. Returns the sorted matches as
/// written (relative patterns yield relative paths); empty means no match.
///
/// Entries starting with `.` only match when the pattern segment asks for
/// them explicitly. Unreadable directories are skipped silently, as POSIX
/// shells do.
pub fn expand(pattern: &str, cwd: &Path) -> Vec<String> {
    let absolute = pattern.starts_with('/');
    let root = if absolute {
        PathBuf::from("/")
    } else {
        cwd.to_path_buf()
    };
    let mut candidates: Vec<(PathBuf, String)> = vec![(root, String::new())];

    for seg in pattern.split('/').filter(|s| !s.is_empty()) {
        let mut next = Vec::new();
        for (dir, shown) in &candidates {
            if has_magic(seg) {
                let Ok(entries) = std::fs::read_dir(dir) else {
                    continue;
                };
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect();
                names.sort();
                for name in names {
                    if name.starts_with('.') && !seg.starts_with('.') {
                        continue;
                    }
                    if glob_match(seg, &name) {
                        next.push((dir.join(&name), join_shown(shown, &name, absolute)));
                    }
                }
            } else {
                let path = dir.join(seg);
                if std::fs::symlink_metadata(&path).is_ok() {
                    next.push((path, join_shown(shown, seg, absolute)));
                }
            }
        }
        if next.is_empty() {
            return Vec::new();
        }
        candidates = next;
    }

    let mut out: Vec<String> = candidates.into_iter().map(|(_, shown)| shown).collect();
    out.sort();
    out
}

fn join_shown(prefix: &str, seg: &str, absolute: bool) -> String {
    if prefix.is_empty() {
        if absolute {
            format!("/{seg}")
        } else {
            seg.to_string()
        }
    } else {
        format!("{prefix}/{seg}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("*.rs", "main.rs", true)]
    #[case("*.rs", "main.go", false)]
    #[case("*", "anything", true)]
    #[case("te?t", "test", true)]
    #[case("te?t", "teest", false)]
    #[case("[abc]x", "bx", true)]
    #[case("[abc]x", "dx", false)]
    #[case("[a-z]1", "m1", true)]
    #[case("[!a-z]1", "M1", true)]
    #[case("[!a-z]1", "m1", false)]
    #[case("[^0-9]", "a", true)]
    #[case("a[", "a[", true)]
    #[case("x*y*z", "xaybz", true)]
    #[case("", "", true)]
    #[case("*", "", true)]
    fn matcher(#[case] pattern: &str, #[case] input: &str, #[case] expect: bool) {
        assert_eq!(glob_match(pattern, input), expect, "{pattern} vs {input}");
    }

    #[test]
    fn magic_detection() {
        assert!(has_magic("*.txt"));
        assert!(has_magic("a[bc]"));
        assert!(!has_magic("plain/name.txt"));
    }

    #[test]
    fn expands_relative_to_the_given_directory() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a.txt", "b.txt", "c.rs", ".hidden.txt"] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/inner.rs"), "").unwrap();

        assert_eq!(
            expand("*.txt", tmp.path()),
            vec!["a.txt".to_string(), "b.txt".to_string()]
        );
        assert_eq!(expand("sub/*.rs", tmp.path()), vec!["sub/inner.rs".to_string()]);
        assert_eq!(expand("*.nope", tmp.path()), Vec::<String>::new());
    }

    #[test]
    fn hidden_entries_need_an_explicit_dot() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".hidden.txt"), "").unwrap();
        std::fs::write(tmp.path().join("shown.txt"), "").unwrap();

        assert_eq!(expand("*.txt", tmp.path()), vec!["shown.txt".to_string()]);
        assert_eq!(
            expand(".*.txt", tmp.path()),
            vec![".hidden.txt".to_string()]
        );
    }

    #[test]
    fn absolute_patterns_yield_absolute_paths() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("only.txt"), "").unwrap();
        let pattern = format!("{}/*.txt", tmp.path().display());
        assert_eq!(
            expand(&pattern, Path::new("/nonexistent-cwd")),
            vec![format!("{}/only.txt", tmp.path().display())]
        );
    }
}
