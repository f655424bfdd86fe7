//! Valve KeyValue ("VDF") text documents.
//!
//! The format is a brace-delimited tree of `"key" "value"` and `"key" { ... }` pairs, used
//! by Steam for app manifests (`appmanifest_*.acf`), the library index
//! (`libraryfolders.vdf`), per-account config (`localconfig.vdf`, `sharedconfig.vdf`) and the
//! login state (`loginusers.vdf`, `registry.vdf`).
//!
//! Two very different operations are offered:
//!
//! - [`KeyValueDocument::parse`] builds a read-only tree for querying. Unbalanced braces,
//!   dangling keys and unterminated strings are reported as [`KeyValueError::Format`].
//! - [`patch_field`] / [`patch_all_fields`] rewrite one value directly in the source text.
//!   Nothing outside the replaced value changes, so whitespace, ordering and keys written by
//!   the owning client survive untouched. Patching tolerates malformed trailing content and
//!   only fails when the scope anchor (or, unscoped, the field) cannot be located.
//!
//! # Examples
//!
//! ```ignore
//! use swch::services::keyvalue::{KeyValueDocument, patch_field};
//!
//! let text = r#""AppState" { "appid" "730" "name" "Counter-Strike 2" }"#;
//! let doc = KeyValueDocument::parse(text)?;
//! assert_eq!(doc.lookup("AppState.name")?, "Counter-Strike 2");
//!
//! let patched = patch_field(text, "name", "CS2", Some("AppState"))?;
//! ```

use anyhow::{Context, Result};
use camino::Utf8Path;
use indexmap::IndexMap;
use std::fs;
use std::ops::Range;
use thiserror::Error;

/// Errors raised while parsing, querying or patching a KeyValue document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyValueError {
    #[error("Malformed KeyValue document at byte {offset}: {message}")]
    Format { offset: usize, message: String },

    #[error("Key not found: {0}")]
    NotFound(String),
}

impl KeyValueError {
    fn format(offset: usize, message: impl Into<String>) -> Self {
        KeyValueError::Format {
            offset,
            message: message.into(),
        }
    }
}

/// A node of a parsed KeyValue tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyValueNode {
    Scalar(String),
    Mapping(IndexMap<String, KeyValueNode>),
}

impl KeyValueNode {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeyValueNode::Scalar(s) => Some(s),
            KeyValueNode::Mapping(_) => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, KeyValueNode>> {
        match self {
            KeyValueNode::Mapping(m) => Some(m),
            KeyValueNode::Scalar(_) => None,
        }
    }

    /// Exact, case-sensitive child lookup.
    pub fn get(&self, key: &str) -> Option<&KeyValueNode> {
        self.as_mapping()?.get(key)
    }

    /// Child lookup that falls back to ASCII case-insensitive matching.
    ///
    /// Used for fields Steam has been seen writing with inconsistent casing
    /// (`AppState.appid` vs `appID`, `apps` vs `Apps`, `libraryfolders` vs `LibraryFolders`).
    pub fn get_ignore_case(&self, key: &str) -> Option<&KeyValueNode> {
        let map = self.as_mapping()?;
        map.get(key).or_else(|| {
            map.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// Scalar child, case-insensitive, ignoring empty values.
    pub fn str_ignore_case(&self, key: &str) -> Option<&str> {
        self.get_ignore_case(key)
            .and_then(KeyValueNode::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Walk nested keys exactly.
    pub fn get_path(&self, path: &[&str]) -> Option<&KeyValueNode> {
        path.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Walk nested keys, each segment matched case-insensitively.
    pub fn get_path_ignore_case(&self, path: &[&str]) -> Option<&KeyValueNode> {
        path.iter().try_fold(self, |node, key| node.get_ignore_case(key))
    }
}

/// A fully parsed KeyValue document. Built once per parse and discarded after use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueDocument {
    root: KeyValueNode,
}

impl KeyValueDocument {
    /// Parse a complete document.
    ///
    /// # Errors
    ///
    /// [`KeyValueError::Format`] for unbalanced braces, a key with no value, or an
    /// unterminated quoted string.
    pub fn parse(text: &str) -> Result<Self, KeyValueError> {
        let mut lexer = Lexer::new(text);
        let root = parse_mapping(&mut lexer, 0)?;
        Ok(Self {
            root: KeyValueNode::Mapping(root),
        })
    }

    pub fn root(&self) -> &KeyValueNode {
        &self.root
    }

    pub fn get(&self, key: &str) -> Option<&KeyValueNode> {
        self.root.get(key)
    }

    pub fn get_ignore_case(&self, key: &str) -> Option<&KeyValueNode> {
        self.root.get_ignore_case(key)
    }

    pub fn get_path(&self, path: &[&str]) -> Option<&KeyValueNode> {
        self.root.get_path(path)
    }

    pub fn get_path_ignore_case(&self, path: &[&str]) -> Option<&KeyValueNode> {
        self.root.get_path_ignore_case(path)
    }

    /// Look up a scalar by dotted path, e.g. `"AppState.installdir"`.
    ///
    /// # Errors
    ///
    /// [`KeyValueError::NotFound`] if any segment is missing or the target is a mapping.
    pub fn lookup(&self, dotted_path: &str) -> Result<&str, KeyValueError> {
        let segments: Vec<&str> = dotted_path.split('.').collect();
        self.root
            .get_path(&segments)
            .and_then(KeyValueNode::as_str)
            .ok_or_else(|| KeyValueError::NotFound(dotted_path.to_string()))
    }
}

/// Read and parse a KeyValue file.
pub fn read_document(path: &Utf8Path) -> Result<KeyValueDocument> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read KeyValue file: {}", path))?;
    KeyValueDocument::parse(&text)
        .with_context(|| format!("Failed to parse KeyValue file: {}", path))
}

/// Replace the value of `field` in place, returning the rewritten text.
///
/// With `scope`, the first block keyed `scope` (case-insensitive) is the anchor and only its
/// direct children are considered; when the field is missing there it is appended as a new
/// line before the block's closing brace. Without `scope`, the first scalar field named
/// `field` anywhere in the document is replaced and nothing is appended.
///
/// # Errors
///
/// [`KeyValueError::NotFound`] when the anchor (or, unscoped, the field) does not exist.
/// The caller still holds the original text, which is left as it was.
pub fn patch_field(
    text: &str,
    field: &str,
    new_value: &str,
    scope: Option<&str>,
) -> Result<String, KeyValueError> {
    let outline = Outline::scan(text);

    let Some(scope) = scope else {
        let pair = outline
            .pairs
            .iter()
            .find(|p| p.key.eq_ignore_ascii_case(field))
            .ok_or_else(|| KeyValueError::NotFound(field.to_string()))?;
        return Ok(replace_value(text, pair, new_value));
    };

    let (block_idx, block) = outline
        .blocks
        .iter()
        .enumerate()
        .find(|(_, b)| b.key.eq_ignore_ascii_case(scope))
        .ok_or_else(|| KeyValueError::NotFound(scope.to_string()))?;

    if let Some(pair) = outline
        .pairs
        .iter()
        .find(|p| p.parent == Some(block_idx) && p.key.eq_ignore_ascii_case(field))
    {
        return Ok(replace_value(text, pair, new_value));
    }

    Ok(insert_field(text, block, field, new_value))
}

/// Set every scalar `field` in the document to `new_value`.
///
/// Returns the rewritten text and how many values were replaced.
pub fn patch_all_fields(text: &str, field: &str, new_value: &str) -> (String, usize) {
    let outline = Outline::scan(text);
    let mut patched = text.to_string();
    let mut count = 0;

    // Back to front so earlier offsets stay valid.
    for pair in outline
        .pairs
        .iter()
        .rev()
        .filter(|p| p.key.eq_ignore_ascii_case(field))
    {
        patched = replace_value(&patched, pair, new_value);
        count += 1;
    }

    (patched, count)
}

/// Escape a value for writing between double quotes.
pub fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn replace_value(text: &str, pair: &ScalarPair, new_value: &str) -> String {
    let escaped = escape_value(new_value);
    let (range, replacement) = if pair.quoted {
        (pair.value_inner.clone(), escaped)
    } else {
        (pair.value_span.clone(), format!("\"{}\"", escaped))
    };

    let mut out = String::with_capacity(text.len() + replacement.len());
    out.push_str(&text[..range.start]);
    out.push_str(&replacement);
    out.push_str(&text[range.end..]);
    out
}

fn insert_field(text: &str, block: &Block, field: &str, new_value: &str) -> String {
    let line = format!("\"{}\"\t\t\"{}\"", escape_value(field), escape_value(new_value));

    let Some(close) = block.close else {
        // Unterminated scope: append at the end rather than fail.
        return format!("{}\n\t{}", text, line);
    };

    let line_start = text[..close].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let brace_indent = &text[line_start..close];

    let mut out = String::with_capacity(text.len() + line.len() + 8);
    if brace_indent.chars().all(|c| c == ' ' || c == '\t') {
        out.push_str(&text[..line_start]);
        out.push_str(brace_indent);
        out.push('\t');
        out.push_str(&line);
        out.push('\n');
        out.push_str(&text[line_start..]);
    } else {
        out.push_str(&text[..close]);
        out.push('\n');
        out.push('\t');
        out.push_str(&line);
        out.push('\n');
        out.push_str(&text[close..]);
    }
    out
}

fn parse_mapping(
    lexer: &mut Lexer<'_>,
    depth: usize,
) -> Result<IndexMap<String, KeyValueNode>, KeyValueError> {
    let mut map = IndexMap::new();

    loop {
        let Some(token) = lexer.next_token()? else {
            if depth == 0 {
                return Ok(map);
            }
            return Err(KeyValueError::format(
                lexer.offset(),
                "unexpected end of input, missing '}'",
            ));
        };

        let key = match token.kind {
            TokenKind::Close if depth > 0 => return Ok(map),
            TokenKind::Close => {
                return Err(KeyValueError::format(token.span.start, "unmatched '}'"));
            }
            TokenKind::Open => {
                return Err(KeyValueError::format(
                    token.span.start,
                    "'{' where a key was expected",
                ));
            }
            TokenKind::Text(key) => key,
        };

        let value = match lexer.next_token()? {
            Some(Token {
                kind: TokenKind::Text(v),
                ..
            }) => KeyValueNode::Scalar(v),
            Some(Token {
                kind: TokenKind::Open,
                ..
            }) => KeyValueNode::Mapping(parse_mapping(lexer, depth + 1)?),
            Some(Token { span, .. }) => {
                return Err(KeyValueError::format(
                    span.start,
                    format!("key \"{}\" has no value", key),
                ));
            }
            None => {
                return Err(KeyValueError::format(
                    lexer.offset(),
                    format!("key \"{}\" has no value", key),
                ));
            }
        };

        insert_merged(&mut map, key, value);
    }
}

/// Repeated mapping keys are merged; anything else keeps the last value.
fn insert_merged(map: &mut IndexMap<String, KeyValueNode>, key: String, value: KeyValueNode) {
    match (map.get_mut(&key), value) {
        (Some(KeyValueNode::Mapping(existing)), KeyValueNode::Mapping(incoming)) => {
            for (k, v) in incoming {
                insert_merged(existing, k, v);
            }
        }
        (_, value) => {
            map.insert(key, value);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Text(String),
    Open,
    Close,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    /// Whole token, including quotes.
    span: Range<usize>,
    /// Content between the quotes (equal to `span` for bare tokens).
    inner: Range<usize>,
    quoted: bool,
}

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        // Skip a UTF-8 BOM
        let pos = if text.starts_with('\u{feff}') { 3 } else { 0 };
        Self { text, pos }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn next_token(&mut self) -> Result<Option<Token>, KeyValueError> {
        loop {
            self.skip_whitespace();
            let rest = &self.text[self.pos..];

            if rest.starts_with("//") {
                self.pos = rest
                    .find('\n')
                    .map(|i| self.pos + i + 1)
                    .unwrap_or(self.text.len());
                continue;
            }

            // Platform conditionals such as [$WIN32] carry no data for us.
            if rest.starts_with('[') {
                self.pos = rest
                    .find(']')
                    .map(|i| self.pos + i + 1)
                    .unwrap_or(self.text.len());
                continue;
            }

            break;
        }

        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '{' => {
                self.pos += 1;
                Token {
                    kind: TokenKind::Open,
                    span: start..self.pos,
                    inner: start..self.pos,
                    quoted: false,
                }
            }
            '}' => {
                self.pos += 1;
                Token {
                    kind: TokenKind::Close,
                    span: start..self.pos,
                    inner: start..self.pos,
                    quoted: false,
                }
            }
            '"' => self.quoted(start)?,
            _ => self.bare(start),
        };

        Ok(Some(token))
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn quoted(&mut self, start: usize) -> Result<Token, KeyValueError> {
        let inner_start = start + 1;
        let mut value = String::new();
        let mut chars = self.text[inner_start..].char_indices();

        while let Some((i, c)) = chars.next() {
            match c {
                '"' => {
                    let inner_end = inner_start + i;
                    self.pos = inner_end + 1;
                    return Ok(Token {
                        kind: TokenKind::Text(value),
                        span: start..self.pos,
                        inner: inner_start..inner_end,
                        quoted: true,
                    });
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, '\\')) => value.push('\\'),
                    Some((_, '"')) => value.push('"'),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => value.push('\\'),
                },
                _ => value.push(c),
            }
        }

        Err(KeyValueError::format(start, "unterminated quoted string"))
    }

    fn bare(&mut self, start: usize) -> Token {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '"') {
                break;
            }
            self.pos += c.len_utf8();
        }
        Token {
            kind: TokenKind::Text(self.text[start..self.pos].to_string()),
            span: start..self.pos,
            inner: start..self.pos,
            quoted: false,
        }
    }
}

/// `"key" "value"` occurrence in the source text.
#[derive(Debug)]
struct ScalarPair {
    key: String,
    parent: Option<usize>,
    value_span: Range<usize>,
    value_inner: Range<usize>,
    quoted: bool,
}

/// `"key" { ... }` occurrence in the source text. `close` is the offset of the `}`.
#[derive(Debug)]
struct Block {
    key: String,
    close: Option<usize>,
}

/// Positions of every pair and block, scanned leniently: a lexing error ends the scan
/// and whatever was seen up to there is kept.
#[derive(Debug, Default)]
struct Outline {
    pairs: Vec<ScalarPair>,
    blocks: Vec<Block>,
}

impl Outline {
    fn scan(text: &str) -> Self {
        let mut outline = Outline::default();
        let mut lexer = Lexer::new(text);
        let mut stack: Vec<usize> = Vec::new();
        let mut pending_key: Option<String> = None;

        while let Ok(Some(token)) = lexer.next_token() {
            match token.kind {
                TokenKind::Text(s) => match pending_key.take() {
                    Some(key) => outline.pairs.push(ScalarPair {
                        key,
                        parent: stack.last().copied(),
                        value_span: token.span,
                        value_inner: token.inner,
                        quoted: token.quoted,
                    }),
                    None => pending_key = Some(s),
                },
                TokenKind::Open => {
                    outline.blocks.push(Block {
                        key: pending_key.take().unwrap_or_default(),
                        close: None,
                    });
                    stack.push(outline.blocks.len() - 1);
                }
                TokenKind::Close => {
                    pending_key = None;
                    if let Some(idx) = stack.pop() {
                        outline.blocks[idx].close = Some(token.span.start);
                    }
                }
            }
        }

        outline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LOGIN_USERS: &str = r#""users"
{
	"76561197960287930"
	{
		"AccountName"		"alice"
		"PersonaName"		"Alice"
		"RememberPassword"		"1"
		"MostRecent"		"1"
		"Timestamp"		"1700000000"
	}
	"76561197960287931"
	{
		"AccountName"		"bob"
		"PersonaName"		"Bob"
		"RememberPassword"		"1"
		"MostRecent"		"0"
	}
}
"#;

    #[test]
    fn test_parse_nested_lookup() {
        let doc = KeyValueDocument::parse(LOGIN_USERS).unwrap();
        assert_eq!(
            doc.lookup("users.76561197960287930.PersonaName").unwrap(),
            "Alice"
        );
        assert_eq!(
            doc.lookup("users.76561197960287931.MostRecent").unwrap(),
            "0"
        );
    }

    #[test]
    fn test_lookup_missing_is_not_found() {
        let doc = KeyValueDocument::parse(LOGIN_USERS).unwrap();
        assert_eq!(
            doc.lookup("users.nobody.AccountName"),
            Err(KeyValueError::NotFound("users.nobody.AccountName".into()))
        );
        // A mapping is not a scalar
        assert!(doc.lookup("users").is_err());
    }

    #[test]
    fn test_unbalanced_braces_are_format_errors() {
        assert!(matches!(
            KeyValueDocument::parse(r#""a" { "b" "c""#),
            Err(KeyValueError::Format { .. })
        ));
        assert!(matches!(
            KeyValueDocument::parse(r#""a" "b" }"#),
            Err(KeyValueError::Format { .. })
        ));
        assert!(matches!(
            KeyValueDocument::parse(r#""a""#),
            Err(KeyValueError::Format { .. })
        ));
    }

    #[test]
    fn test_escapes_comments_and_conditionals() {
        let text = r#"
// library index
"libraryfolders"
{
	"0"
	{
		"path"		"C:\\Program Files (x86)\\Steam"
		"label"		"say \"hi\"" [$WIN32]
	}
}
"#;
        let doc = KeyValueDocument::parse(text).unwrap();
        assert_eq!(
            doc.lookup("libraryfolders.0.path").unwrap(),
            r"C:\Program Files (x86)\Steam"
        );
        assert_eq!(doc.lookup("libraryfolders.0.label").unwrap(), "say \"hi\"");
    }

    #[test]
    fn test_bare_tokens() {
        let doc = KeyValueDocument::parse("AppState { appid 440 name TF2 }").unwrap();
        assert_eq!(doc.lookup("AppState.appid").unwrap(), "440");
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let doc =
            KeyValueDocument::parse(r#""AppState" { "appID" "570" "Name" "Dota 2" }"#).unwrap();
        let app = doc.get("AppState").unwrap();
        assert!(app.get("appid").is_none());
        assert_eq!(app.str_ignore_case("appid"), Some("570"));
        assert_eq!(
            doc.get_path_ignore_case(&["appstate", "name"])
                .and_then(KeyValueNode::as_str),
            Some("Dota 2")
        );
    }

    #[test]
    fn test_duplicate_blocks_merge() {
        let doc = KeyValueDocument::parse(r#""a" { "x" "1" } "a" { "y" "2" }"#).unwrap();
        assert_eq!(doc.lookup("a.x").unwrap(), "1");
        assert_eq!(doc.lookup("a.y").unwrap(), "2");
    }

    #[test]
    fn test_patch_scoped_field_in_place() {
        let patched =
            patch_field(LOGIN_USERS, "MostRecent", "1", Some("76561197960287931")).unwrap();

        let doc = KeyValueDocument::parse(&patched).unwrap();
        assert_eq!(doc.lookup("users.76561197960287931.MostRecent").unwrap(), "1");
        assert_eq!(doc.lookup("users.76561197960287930.MostRecent").unwrap(), "1");
        assert_eq!(patched.len(), LOGIN_USERS.len());
    }

    #[test]
    fn test_patch_appends_missing_field_before_closing_brace() {
        let patched =
            patch_field(LOGIN_USERS, "Timestamp", "1800000000", Some("76561197960287931"))
                .unwrap();

        let doc = KeyValueDocument::parse(&patched).unwrap();
        assert_eq!(
            doc.lookup("users.76561197960287931.Timestamp").unwrap(),
            "1800000000"
        );
        // The other account keeps its own timestamp.
        assert_eq!(
            doc.lookup("users.76561197960287930.Timestamp").unwrap(),
            "1700000000"
        );
        assert!(patched.contains("\t\t\"Timestamp\"\t\t\"1800000000\"\n\t}"));
    }

    #[test]
    fn test_patch_is_case_insensitive() {
        let text = "\"Steam\"\n{\n\t\"autologinuser\"\t\t\"old\"\n}\n";
        let patched = patch_field(text, "AutoLoginUser", "new", Some("steam")).unwrap();
        assert_eq!(patched, "\"Steam\"\n{\n\t\"autologinuser\"\t\t\"new\"\n}\n");
    }

    #[test]
    fn test_patch_missing_anchor_is_not_found() {
        let result = patch_field(LOGIN_USERS, "MostRecent", "1", Some("123"));
        assert_eq!(result, Err(KeyValueError::NotFound("123".into())));

        let result = patch_field(LOGIN_USERS, "NoSuchField", "1", None);
        assert_eq!(result, Err(KeyValueError::NotFound("NoSuchField".into())));
    }

    #[test]
    fn test_patch_tolerates_malformed_trailing_content() {
        let text = "\"Steam\"\n{\n\t\"AutoLoginUser\"\t\t\"old\"\n}\n\"broken\" { \"x";
        let patched = patch_field(text, "AutoLoginUser", "new", Some("Steam")).unwrap();
        assert!(patched.contains("\"AutoLoginUser\"\t\t\"new\""));
        assert!(patched.ends_with("\"broken\" { \"x"));
    }

    #[test]
    fn test_patch_unterminated_scope_appends_at_end() {
        let text = "\"Steam\"\n{\n\t\"Other\"\t\t\"1\"\n";
        let patched = patch_field(text, "AutoLoginUser", "carol", Some("Steam")).unwrap();
        assert!(patched.starts_with(text));
        assert!(patched.ends_with("\"AutoLoginUser\"\t\t\"carol\""));
    }

    #[test]
    fn test_patch_escapes_value() {
        let text = r#""a" { "path" "x" }"#;
        let patched = patch_field(text, "path", r#"C:\Games "new""#, Some("a")).unwrap();
        let doc = KeyValueDocument::parse(&patched).unwrap();
        assert_eq!(doc.lookup("a.path").unwrap(), r#"C:\Games "new""#);
    }

    #[test]
    fn test_patch_bare_value_gets_quoted() {
        let patched = patch_field("a { b 1 }", "b", "2", Some("a")).unwrap();
        assert_eq!(patched, "a { b \"2\" }");
    }

    #[test]
    fn test_patch_all_fields() {
        let (patched, count) = patch_all_fields(LOGIN_USERS, "mostrecent", "0");
        assert_eq!(count, 2);
        let doc = KeyValueDocument::parse(&patched).unwrap();
        assert_eq!(doc.lookup("users.76561197960287930.MostRecent").unwrap(), "0");
        assert_eq!(doc.lookup("users.76561197960287931.MostRecent").unwrap(), "0");
    }

    proptest! {
        #[test]
        fn prop_patch_changes_only_target_value(
            before in "[A-Za-z0-9 _]{0,12}",
            old in "[A-Za-z0-9 _]{0,12}",
            new in "[A-Za-z0-9 _]{0,12}",
            sibling in "[A-Za-z0-9 _]{0,12}",
        ) {
            let prefix = format!(
                "\"Root\"\n{{\n\t\"Unknown\"\t\t\"{}\"\n\t\"Nested\"\n\t{{\n\t\t\"Target\"\t\"decoy\"\n\t}}\n\t\"Target\"\t\t",
                before
            );
            let suffix = format!("\n\t\"Sibling\"\t\t\"{}\"\n}}\n", sibling);
            let original = format!("{}\"{}\"{}", prefix, old, suffix);

            let patched = patch_field(&original, "Target", &new, Some("Root")).unwrap();
            prop_assert_eq!(&patched, &format!("{}\"{}\"{}", prefix, new, suffix));

            let doc = KeyValueDocument::parse(&patched).unwrap();
            prop_assert_eq!(doc.lookup("Root.Target").unwrap(), new.as_str());
            prop_assert_eq!(doc.lookup("Root.Nested.Target").unwrap(), "decoy");
            prop_assert_eq!(doc.lookup("Root.Unknown").unwrap(), before.as_str());
            prop_assert_eq!(doc.lookup("Root.Sibling").unwrap(), sibling.as_str());
        }
    }
}
