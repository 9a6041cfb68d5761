//! Plain text comparator.
//!
//! Diffs line by line, then character by character inside each changed hunk that is
//! small enough, and renders the result either as a self-contained
//! marked-up text (`{-removed-}`, `{+added+}`) or, in pretty mode, with terminal colors.
//! Long unchanged stretches are collapsed to a few lines of context around each change.

use std::any::Any;
use std::fmt;

use aho_corasick::{AhoCorasick, MatchKind};
use crossterm::style::{style, Stylize};
use difference::{Changeset, Difference};

use super::{Comparable, CompareError, Kind, Replacements};

/// Lines of unchanged text kept before and after each change.
pub const DEFAULT_CONTEXT: usize = 3;

const PLAIN_ELISION: &str = "{=...=}";
const PRETTY_ELISION: &str = "[...]";

// the character diff holds a removed x added table, hunks above this stay whole lines
const REFINE_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text {
    text: String,
    context: Option<usize>,
    pretty: bool,
}

#[derive(Clone, Copy)]
enum Mark {
    Removed,
    Added,
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Text {
            text: text.into(),
            context: Some(DEFAULT_CONTEXT),
            pretty: false,
        }
    }

    /// Renders diffs with terminal colors instead of bracket markers.
    pub fn pretty(text: impl Into<String>) -> Self {
        Text {
            pretty: true,
            ..Text::new(text)
        }
    }

    pub fn with_context(mut self, lines: usize) -> Self {
        self.context = Some(lines);
        self
    }

    /// Print unchanged runs in full.
    pub fn without_context(mut self) -> Self {
        self.context = None;
        self
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Diff of `self` (expected) against `actual`, empty when they are equal.
    pub fn diff(&self, actual: &str) -> String {
        if self.text == actual {
            return String::new();
        }

        let runs = changes(&self.text, actual);
        let mut output = String::new();
        for (i, run) in runs.iter().enumerate() {
            match run {
                Difference::Same(text) => {
                    let previous = i.checked_sub(1).map(|p| run_text(&runs[p]));
                    let has_next = i + 1 < runs.len();
                    self.push_unchanged(&mut output, text, previous, has_next);
                }
                Difference::Rem(text) => self.push_marked(&mut output, text, Mark::Removed),
                Difference::Add(text) => self.push_marked(&mut output, text, Mark::Added),
            }
        }
        output
    }

    fn push_marked(&self, output: &mut String, text: &str, mark: Mark) {
        if self.pretty {
            let styled = match mark {
                Mark::Removed => style(text).red(),
                Mark::Added => style(text).green(),
            };
            output.push_str(&styled.to_string());
            return;
        }

        let (open, close) = match mark {
            Mark::Removed => ("{-", "-}"),
            Mark::Added => ("{+", "+}"),
        };
        output.push_str(open);
        output.push_str(text);
        output.push_str(close);
    }

    fn push_unchanged(&self, output: &mut String, text: &str, previous: Option<&str>, has_next: bool) {
        let Some(context) = self.context else {
            output.push_str(text);
            return;
        };
        if !text.contains('\n') {
            output.push_str(text);
            return;
        }

        let lines: Vec<&str> = text.split_inclusive('\n').collect();

        // a change that did not end its line leaves a partial line ahead of the context
        let head = match previous {
            None => 0,
            Some(prev) if prev.ends_with('\n') => context,
            Some(_) => context + 1,
        };
        // same for a change that starts mid line
        let tail = match (has_next, text.ends_with('\n')) {
            (false, _) => 0,
            (true, true) => context,
            (true, false) => context + 1,
        };

        if head + tail >= lines.len() {
            output.push_str(text);
            return;
        }

        for line in &lines[..head] {
            output.push_str(line);
        }
        if self.pretty {
            output.push_str(&style(PRETTY_ELISION).dim().to_string());
        } else {
            output.push_str(PLAIN_ELISION);
        }
        output.push('\n');
        for line in &lines[lines.len() - tail..] {
            output.push_str(line);
        }
    }
}

fn run_text(diff: &Difference) -> &str {
    match diff {
        Difference::Same(text) | Difference::Add(text) | Difference::Rem(text) => text,
    }
}

/// Runs of `expected` turning into `actual`, no two neighbours of the same kind.
fn changes(expected: &str, actual: &str) -> Vec<Difference> {
    let mut runs = Vec::new();
    if expected.is_empty() || actual.is_empty() {
        push_hunk(&mut runs, expected, actual);
        return runs;
    }

    let mut old = Lines::new(expected);
    let mut new = Lines::new(actual);
    let (mut removed, mut added) = ("", "");
    for diff in &Changeset::new(expected, actual, "\n").diffs {
        match diff {
            Difference::Same(run) => {
                push_hunk(&mut runs, removed, added);
                (removed, added) = ("", "");
                new.take(run);
                push_run(&mut runs, Difference::Same(old.take(run).to_string()));
            }
            Difference::Rem(run) => removed = old.take(run),
            Difference::Add(run) => added = new.take(run),
        }
    }
    push_hunk(&mut runs, removed, added);
    runs
}

fn push_hunk(runs: &mut Vec<Difference>, removed: &str, added: &str) {
    let whole = removed.is_empty()
        || added.is_empty()
        || removed.len().saturating_mul(added.len()) > REFINE_LIMIT;
    if whole {
        push_run(runs, Difference::Rem(removed.to_string()));
        push_run(runs, Difference::Add(added.to_string()));
        return;
    }
    for diff in Changeset::new(removed, added, "").diffs {
        push_run(runs, diff);
    }
}

fn push_run(runs: &mut Vec<Difference>, diff: Difference) {
    if run_text(&diff).is_empty() {
        return;
    }
    let merged = match (runs.last_mut(), &diff) {
        (Some(Difference::Same(last)), Difference::Same(text))
        | (Some(Difference::Rem(last)), Difference::Rem(text))
        | (Some(Difference::Add(last)), Difference::Add(text)) => {
            last.push_str(text);
            true
        }
        _ => false,
    };
    if !merged {
        runs.push(diff);
    }
}

/// Cursor over the lines of a text, handing out runs with their newlines.
struct Lines<'a> {
    text: &'a str,
    // line starts plus the end of the text
    starts: Vec<usize>,
    at: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        let mut starts = vec![0];
        starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        starts.push(text.len());
        Lines { text, starts, at: 0 }
    }

    // a run of the line diff is its lines joined by '\n'
    fn take(&mut self, run: &str) -> &'a str {
        let count = run.split('\n').count();
        let end = (self.at + count).min(self.starts.len() - 1);
        let slice = &self.text[self.starts[self.at]..self.starts[end]];
        self.at = end;
        slice
    }
}

impl fmt::Display for Text {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Comparable for Text {
    fn kind(&self) -> Kind {
        Kind::TEXT
    }

    fn dump(&self) -> Vec<u8> {
        self.text.as_bytes().to_vec()
    }

    fn load(&self, body: &[u8]) -> Result<Box<dyn Comparable>, CompareError> {
        Ok(Box::new(Text {
            text: String::from_utf8_lossy(body).into_owned(),
            ..self.clone()
        }))
    }

    fn replace(&mut self, replacements: &Replacements) {
        let (tokens, values): (Vec<&str>, Vec<&str>) = replacements
            .iter()
            .filter(|(token, _)| !token.is_empty())
            .map(|(token, value)| (token.as_str(), value.as_str()))
            .unzip();
        if tokens.is_empty() {
            return;
        }

        match AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(&tokens)
        {
            Ok(matcher) => self.text = matcher.replace_all(&self.text, &values),
            Err(err) => tracing::warn!(%err, "text replacements skipped"),
        }
    }

    // any kind compares against text through its rendering
    fn compare_to(&self, other: &dyn Comparable) -> Result<String, CompareError> {
        Ok(self.diff(&other.to_string()))
    }

    fn extension(&self) -> &'static str {
        "txt"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
