//! Cross-reference grammar and rewriting.
//!
//! References recognised in free text:
//!
//! | Form | Kind |
//! |---|---|
//! | `#12`, `P1#12` | issue |
//! | `!3`, `group/proj!3` | merge request |
//! | `#12#note_40` | note on an issue (or merge request) |
//! | `abc1234..def5678`, `P1@abc1234...def5678` | commit range |
//!
//! A reference without a scope prefix is only meaningful inside the scope
//! whose text contains it. [`rewrite`] prefixes such references with the
//! origin scope's handle so they keep pointing at the same target after the
//! text is copied elsewhere. Markdown code (fenced blocks and inline spans)
//! never contains references.

pub mod commit_range;

pub use commit_range::{CommitLookup, CommitRange, find_unresolved};

use regex::{Captures, Regex};
use serde::Serialize;
use std::ops::Range;
use std::sync::LazyLock;

use crate::error::{MoverError, Result};

const HANDLE: &str = r"[A-Za-z0-9_.\-]+(?:/[A-Za-z0-9_.\-]+)*";

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(
        r"\b(?:(?P<cscope>{HANDLE})@)?(?P<from>[0-9a-f]{{7,40}})(?P<dots>\.{{2,3}})(?P<to>[0-9a-f]{{7,40}})\b|(?P<scope>{HANDLE})?(?P<sigil>[#!])(?P<iid>\d+)(?:#note_(?P<note>\d+))?\b"
    );
    Regex::new(&pattern).expect("reference pattern is valid")
});

static QUALIFIED_ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(?P<scope>{HANDLE})#(?P<iid>\d+)$")).expect("issue pattern is valid")
});

/// Kinds of reference the grammar recognises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Issue,
    MergeRequest,
    CommitRange,
}

/// One reference found in a text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    /// Scope handle the reference is qualified with, if any.
    pub scope: Option<String>,
    /// Issue/merge request number, or the range text (`a..b`).
    pub target: String,
    /// Note anchor (`#note_<id>`), when the reference points at a note.
    pub note_id: Option<i64>,
    /// Byte range of the whole reference in the source text.
    pub span: Range<usize>,
}

impl Reference {
    #[must_use]
    pub const fn is_qualified(&self) -> bool {
        self.scope.is_some()
    }

    #[must_use]
    pub const fn is_note_mention(&self) -> bool {
        self.note_id.is_some()
    }

    fn from_captures(caps: &Captures<'_>, offset: usize) -> Option<Self> {
        let whole = caps.get(0)?;
        let span = (offset + whole.start())..(offset + whole.end());

        if let (Some(from), Some(dots), Some(to)) = (caps.name("from"), caps.name("dots"), caps.name("to")) {
            return Some(Self {
                kind: ReferenceKind::CommitRange,
                scope: caps.name("cscope").map(|m| m.as_str().to_string()),
                target: format!("{}{}{}", from.as_str(), dots.as_str(), to.as_str()),
                note_id: None,
                span,
            });
        }

        let sigil = caps.name("sigil")?;
        let kind = if sigil.as_str() == "!" {
            ReferenceKind::MergeRequest
        } else {
            ReferenceKind::Issue
        };
        Some(Self {
            kind,
            scope: caps.name("scope").map(|m| m.as_str().to_string()),
            target: caps.name("iid")?.as_str().to_string(),
            note_id: caps.name("note").and_then(|m| m.as_str().parse().ok()),
            span,
        })
    }
}

/// Result of rewriting a text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rewritten {
    pub text: String,
    /// Commit ranges that were scope-implicit and have been qualified.
    pub commit_ranges: Vec<CommitRange>,
}

fn backtick_run(bytes: &[u8], at: usize) -> usize {
    bytes[at..].iter().take_while(|&&b| b == b'`').count()
}

/// Byte ranges of markdown code in `text`.
///
/// A run of three or more backticks opens a fence, closed by a run at least
/// as long or by the end of the text. A shorter run opens an inline span,
/// closed by a run of exactly the same length on the same line; an unclosed
/// run is literal text.
fn code_spans(text: &str) -> Vec<Range<usize>> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let start = i;
        let open = backtick_run(bytes, i);
        let fence = open >= 3;
        i += open;

        let mut j = i;
        let mut end = None;
        while j < bytes.len() {
            match bytes[j] {
                b'`' => {
                    let run = backtick_run(bytes, j);
                    if run == open || (fence && run > open) {
                        end = Some(j + run);
                        break;
                    }
                    j += run;
                }
                b'\n' if !fence => break,
                _ => j += 1,
            }
        }

        match end {
            Some(end) => {
                spans.push(start..end);
                i = end;
            }
            None if fence => {
                spans.push(start..bytes.len());
                i = bytes.len();
            }
            None => {}
        }
    }
    spans
}

/// Apply `f` to every stretch of `text` outside markdown code.
///
/// `f` receives the prose slice and its byte offset; code is passed through.
fn for_each_prose(text: &str, mut f: impl FnMut(&str, usize, &mut String)) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for code in code_spans(text) {
        f(&text[last..code.start], last, &mut out);
        out.push_str(&text[code.clone()]);
        last = code.end;
    }
    f(&text[last..], last, &mut out);
    out
}

/// `&#39;` is an HTML character reference, not an issue reference.
fn is_character_reference(prose: &str, caps: &Captures<'_>) -> bool {
    caps.name("scope").is_none()
        && caps.name("sigil").is_some_and(|sigil| sigil.as_str() == "#")
        && caps
            .get(0)
            .is_some_and(|whole| whole.start() > 0 && prose.as_bytes()[whole.start() - 1] == b'&')
}

/// Find every reference in `text`, in order of appearance.
#[must_use]
pub fn extract(text: &str) -> Vec<Reference> {
    let mut found = Vec::new();
    for_each_prose(text, |prose, offset, _| {
        found.extend(
            REFERENCE_PATTERN
                .captures_iter(prose)
                .filter(|caps| !is_character_reference(prose, caps))
                .filter_map(|caps| Reference::from_captures(&caps, offset)),
        );
    });
    found
}

/// Qualify every scope-implicit reference in `text` with `origin_handle`.
///
/// Total: text that is not a well-formed reference is copied unchanged, and
/// already-qualified references are left alone, so rewriting twice is the
/// same as rewriting once.
#[must_use]
pub fn rewrite(text: &str, origin_handle: &str) -> String {
    rewrite_collecting(text, origin_handle).text
}

/// Like [`rewrite`], also reporting the commit ranges it qualified.
#[must_use]
pub fn rewrite_collecting(text: &str, origin_handle: &str) -> Rewritten {
    let mut commit_ranges = Vec::new();
    let text = for_each_prose(text, |prose, _, out| {
        let replaced = REFERENCE_PATTERN.replace_all(prose, |caps: &Captures<'_>| {
            let whole = &caps[0];
            if is_character_reference(prose, caps) {
                return whole.to_string();
            }
            match Reference::from_captures(caps, 0) {
                Some(reference) if !reference.is_qualified() => {
                    if reference.kind == ReferenceKind::CommitRange {
                        if let Some(range) = CommitRange::parse(&reference.target) {
                            let qualified = range.to_reference(origin_handle);
                            commit_ranges.push(range);
                            return qualified;
                        }
                        return whole.to_string();
                    }
                    format!("{origin_handle}{whole}")
                }
                _ => whole.to_string(),
            }
        });
        out.push_str(&replaced);
    });
    Rewritten {
        text,
        commit_ranges,
    }
}

/// Rewrites text out of one origin scope.
#[derive(Debug, Clone, Copy)]
pub struct ReferenceRewriter<'a> {
    origin_handle: &'a str,
}

impl<'a> ReferenceRewriter<'a> {
    #[must_use]
    pub const fn new(origin_handle: &'a str) -> Self {
        Self { origin_handle }
    }

    #[must_use]
    pub fn rewrite(&self, text: &str) -> Rewritten {
        rewrite_collecting(text, self.origin_handle)
    }
}

/// A qualified issue reference such as `P1#12`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssueRef {
    pub scope: String,
    pub iid: i64,
}

impl std::fmt::Display for IssueRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.scope, self.iid)
    }
}

/// Parse `<handle>#<iid>`.
///
/// # Errors
///
/// Returns `InvalidReference` if `text` is not a qualified issue reference.
pub fn parse_issue_reference(text: &str) -> Result<IssueRef> {
    let invalid = || MoverError::InvalidReference {
        reference: text.to_string(),
    };
    let caps = QUALIFIED_ISSUE.captures(text.trim()).ok_or_else(invalid)?;
    let iid = caps["iid"].parse::<i64>().map_err(|_| invalid())?;
    if iid < 1 {
        return Err(invalid());
    }
    Ok(IssueRef {
        scope: caps["scope"].to_string(),
        iid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rewrites_implicit_issue_reference() {
        assert_eq!(
            rewrite("Some description #123", "P1"),
            "Some description P1#123"
        );
    }

    #[test]
    fn test_rewrites_merge_request_reference() {
        assert_eq!(
            rewrite("Note with reference to merge request !1", "group/p1"),
            "Note with reference to merge request group/p1!1"
        );
    }

    #[test]
    fn test_leaves_qualified_references() {
        let text = "See P2#4, other/proj!7 and P2@abc1234..def5678";
        assert_eq!(rewrite(text, "P1"), text);
    }

    #[test]
    fn test_note_mentions_keep_anchor() {
        assert_eq!(rewrite("as said in #12#note_40", "P1"), "as said in P1#12#note_40");
        let refs = extract("as said in #12#note_40");
        assert_eq!(refs.len(), 1);
        assert!(refs[0].is_note_mention());
        assert_eq!(refs[0].note_id, Some(40));
    }

    #[test]
    fn test_commit_ranges_are_qualified_and_reported() {
        let out = rewrite_collecting("Fixed in abc1234..def5678 and 1111111...2222222", "P1");
        assert_eq!(
            out.text,
            "Fixed in P1@abc1234..def5678 and P1@1111111...2222222"
        );
        assert_eq!(out.commit_ranges.len(), 2);
        assert!(out.commit_ranges[1].inclusive);
    }

    #[test]
    fn test_code_is_left_verbatim() {
        let text = "Run `make #1` then\n```\nissue #2\n```\nsee #3";
        assert_eq!(
            rewrite(text, "P1"),
            "Run `make #1` then\n```\nissue #2\n```\nsee P1#3"
        );
    }

    #[test]
    fn test_html_character_references_are_untouched() {
        assert_eq!(
            rewrite("it&#39;s broken, see #5", "P1"),
            "it&#39;s broken, see P1#5"
        );
        assert_eq!(rewrite("a &#8212; b", "P1"), "a &#8212; b");
        let refs = extract("it&#39;s #5");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "5");
    }

    #[test]
    fn test_inline_code_matches_backtick_run_length() {
        assert_eq!(rewrite("``x ` #1`` #2", "P1"), "``x ` #1`` P1#2");
        assert_eq!(rewrite("``open #1` #2", "P1"), "``open P1#1` P1#2");
        assert_eq!(
            rewrite("````\n```\n#1\n````\n#2", "P1"),
            "````\n```\n#1\n````\nP1#2"
        );
        assert_eq!(rewrite("`a\n#1` #2", "P1"), "`a\nP1#1` P1#2");
    }

    #[test]
    fn test_malformed_text_is_untouched() {
        for text in ["#", "#abc", "#12abc", "abc12..def", "!", "##", "`unterminated #1"] {
            let out = rewrite(text, "P1");
            if text == "`unterminated #1" {
                assert_eq!(out, "`unterminated P1#1");
            } else {
                assert_eq!(out, text);
            }
        }
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let once = rewrite("#1, !2, #3#note_4 and abc1234..def5678", "P1");
        assert_eq!(rewrite(&once, "P1"), once);
    }

    #[test]
    fn test_extract_spans_and_kinds() {
        let text = "x #5 y P2!6 z abc1234...def5678";
        let refs = extract(text);
        assert_eq!(refs.len(), 3);
        assert_eq!(refs[0].kind, ReferenceKind::Issue);
        assert_eq!(&text[refs[0].span.clone()], "#5");
        assert_eq!(refs[1].kind, ReferenceKind::MergeRequest);
        assert_eq!(refs[1].scope.as_deref(), Some("P2"));
        assert_eq!(refs[2].kind, ReferenceKind::CommitRange);
        assert_eq!(refs[2].target, "abc1234...def5678");
    }

    #[test]
    fn test_extract_skips_code_with_offsets() {
        let text = "`#1` #2";
        let refs = extract(text);
        assert_eq!(refs.len(), 1);
        assert_eq!(&text[refs[0].span.clone()], "#2");
    }

    #[test]
    fn test_parse_issue_reference() {
        assert_eq!(
            parse_issue_reference("group/p1#12").unwrap(),
            IssueRef {
                scope: "group/p1".to_string(),
                iid: 12
            }
        );
        assert!(parse_issue_reference("#12").is_err());
        assert!(parse_issue_reference("P1#0").is_err());
        assert!(parse_issue_reference("P1!12").is_err());
    }

    #[test]
    fn test_rewriter_struct_matches_free_function() {
        let rewriter = ReferenceRewriter::new("P1");
        assert_eq!(rewriter.rewrite("#9").text, rewrite("#9", "P1"));
    }
}
