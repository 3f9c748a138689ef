//! Just enough JavaScript lexing for the built-in indexers: balanced-brace
//! scanning that skips strings and comments, and field extraction from the
//! top level of an object literal.

use crate::naming::import_path_for;
use crate::specifier::lexical_normalize;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

pub(crate) fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in pattern compiles"))
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn skip_comment(bytes: &[u8], start: usize) -> Option<usize> {
    match bytes.get(start + 1) {
        Some(b'/') => Some(
            bytes[start..]
                .iter()
                .position(|b| *b == b'\n')
                .map_or(bytes.len(), |n| start + n),
        ),
        Some(b'*') => Some(
            bytes[start + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |n| start + 2 + n + 2),
        ),
        _ => None,
    }
}

/// Byte index just past the `}` that closes the `{` at `open`.
pub(crate) fn block_end(src: &str, open: usize) -> Option<usize> {
    let bytes = src.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'\'' | b'"' | b'`' => {
                i = skip_string(bytes, i);
                continue;
            }
            b'/' => {
                if let Some(next) = skip_comment(bytes, i) {
                    i = next;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// The inside of the object literal starting at `open`, without its braces.
pub(crate) fn object_body(src: &str, open: usize) -> Option<&str> {
    let end = block_end(src, open)?;
    Some(&src[open + 1..end - 1])
}

/// Drops everything nested inside braces and all comments, leaving the
/// top-level keys of an object body.
pub(crate) fn top_level(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth = depth.saturating_sub(1);
                i += 1;
            }
            b'\'' | b'"' | b'`' => {
                let end = skip_string(bytes, i);
                if depth == 0 {
                    out.extend_from_slice(&bytes[i..end]);
                }
                i = end;
            }
            b'/' if skip_comment(bytes, i).is_some() => {
                i = skip_comment(bytes, i).unwrap_or(bytes.len());
                out.push(b' ');
            }
            b => {
                if depth == 0 {
                    out.push(b);
                }
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// `key: 'value'` (any quote style).
pub(crate) fn string_field(text: &str, key: &str) -> Option<String> {
    let pattern = format!(r#"\b{}\s*:\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#, regex::escape(key));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    (1..=3)
        .find_map(|group| caps.get(group))
        .map(|m| m.as_str().to_string())
}

/// `key: ['a', "b"]`.
pub(crate) fn string_list_field(text: &str, key: &str) -> Option<Vec<String>> {
    let pattern = format!(r"\b{}\s*:\s*\[([^\]]*)\]", regex::escape(key));
    let re = Regex::new(&pattern).ok()?;
    let inner = re.captures(text)?.get(1)?.as_str();
    Some(string_literals(inner))
}

pub(crate) fn string_literals(text: &str) -> Vec<String> {
    static LITERAL: OnceLock<Regex> = OnceLock::new();
    static_regex(&LITERAL, r#"'([^']*)'|"([^"]*)"|`([^`]*)`"#)
        .captures_iter(text)
        .filter_map(|caps| (1..=3).find_map(|group| caps.get(group)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `key: Identifier`.
pub(crate) fn identifier_field(text: &str, key: &str) -> Option<String> {
    let pattern = format!(r"\b{}\s*:\s*([A-Za-z_$][\w$]*)", regex::escape(key));
    let re = Regex::new(&pattern).ok()?;
    Some(re.captures(text)?.get(1)?.as_str().to_string())
}

/// Resolves a relative module specifier imported from `importer` into an
/// import path. Bare package specifiers are returned unchanged.
pub(crate) fn resolve_specifier(working_dir: &Path, importer: &Path, specifier: &str) -> String {
    if !specifier.starts_with('.') {
        return specifier.to_string();
    }
    let base = importer.parent().unwrap_or(working_dir);
    import_path_for(working_dir, &lexical_normalize(&base.join(specifier)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn block_end_skips_strings_and_comments() {
        let src = r#"x = { a: "}", b: { c: 1 }, // }
 d: '{' } rest"#;
        let open = src.find('{').unwrap();
        let end = block_end(src, open).unwrap();
        assert_eq!(&src[end..], " rest");
    }

    #[test]
    fn top_level_hides_nested_keys() {
        let body = r#" title: 'Button', parameters: { title: 'nested' }, tags: ['a'] "#;
        let top = top_level(body);
        assert_eq!(string_field(&top, "title").as_deref(), Some("Button"));
        assert!(!top.contains("nested"));
        assert_eq!(string_list_field(&top, "tags"), Some(vec!["a".to_string()]));
    }

    #[test]
    fn identifiers_and_quotes() {
        let body = r#"component: Button, name: "Primary", id: `x-y`"#;
        assert_eq!(identifier_field(body, "component").as_deref(), Some("Button"));
        assert_eq!(string_field(body, "name").as_deref(), Some("Primary"));
        assert_eq!(string_field(body, "id").as_deref(), Some("x-y"));
    }

    #[test]
    fn relative_specifiers_resolve_against_importer() {
        let root = PathBuf::from("/p");
        let importer = root.join("src/docs/Intro.mdx");
        assert_eq!(
            resolve_specifier(&root, &importer, "../Button.stories"),
            "./src/Button.stories"
        );
        assert_eq!(resolve_specifier(&root, &importer, "react"), "react");
    }
}
