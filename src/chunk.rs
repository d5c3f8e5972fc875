//! `Chunk` — an authored run of text, the payload carried by `Insert` and
//! `Delete` operations and by sync-segment wire messages.

use rle::{AppendRLE, SplitableSpan};

/// A single maximal run of text contributed by one user.
///
/// Kept separate from `Chunk` (which is a sequence of these) so the two can
/// each implement [`SplitableSpan`] independently: a `Run` splits by byte
/// offset into its own text, while a `Chunk` splits by walking its runs and
/// delegating to the run that straddles the split point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Run {
    pub author: u32,
    pub text: String,
}

impl Run {
    pub fn new(author: u32, text: impl Into<String>) -> Self {
        Self { author, text: text.into() }
    }
}

impl SplitableSpan for Run {
    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn truncate(&mut self, at: usize) -> Self {
        let byte_at = char_to_byte(&self.text, at);
        let rest = self.text.split_off(byte_at);
        Run { author: self.author, text: rest }
    }

    fn can_append(&self, other: &Self) -> bool {
        self.author == other.author
    }

    fn append(&mut self, other: Self) {
        self.text.push_str(&other.text);
    }

    fn prepend(&mut self, other: Self) {
        let mut combined = other.text;
        combined.push_str(&self.text);
        self.text = combined;
    }
}

fn char_to_byte(s: &str, char_idx: usize) -> usize {
    s.char_indices().nth(char_idx).map(|(b, _)| b).unwrap_or(s.len())
}

/// A piece of text carried by an `Insert`/`Delete` operation or a
/// sync-segment: a sequence of [`Run`]s, adjacent runs by the same author
/// merged via run-length encoding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Chunk {
    runs: Vec<Run>,
}

impl Chunk {
    pub fn new() -> Self {
        Self { runs: Vec::new() }
    }

    pub fn single(author: u32, text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            return Self::new();
        }
        Self { runs: vec![Run::new(author, text)] }
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.iter().map(SplitableSpan::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn push_run(&mut self, run: Run) {
        if run.text.is_empty() {
            return;
        }
        self.runs.push_rle(run);
    }

    /// Concatenates the text of every run, losing authorship. Used to apply
    /// a Chunk onto a plain `String` buffer.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::with_capacity(self.len());
        for run in &self.runs {
            out.push_str(&run.text);
        }
        out
    }

    /// Splits at character offset `at`, leaving the first `at` characters in
    /// `self` and returning the rest. Unlike [`SplitableSpan::truncate`],
    /// `at` may legally be `0` or `self.len()` — buffer mutations routinely
    /// insert/erase at either boundary.
    pub fn truncate_at(&mut self, at: usize) -> Chunk {
        let len = self.len();
        if at == 0 {
            return std::mem::take(self);
        }
        if at >= len {
            return Chunk::new();
        }
        SplitableSpan::truncate(self, at)
    }

    /// Appends `other`'s runs onto the end of `self`, merging a boundary run
    /// by the same author instead of leaving a spurious split.
    pub fn append_chunk(&mut self, other: Chunk) {
        SplitableSpan::append(self, other)
    }

    pub fn author_at(&self, char_idx: usize) -> Option<u32> {
        let mut remaining = char_idx;
        for run in &self.runs {
            let run_len = run.len();
            if remaining < run_len {
                return Some(run.author);
            }
            remaining -= run_len;
        }
        None
    }
}

impl SplitableSpan for Chunk {
    fn len(&self) -> usize {
        self.runs.iter().map(SplitableSpan::len).sum()
    }

    fn truncate(&mut self, at: usize) -> Self {
        debug_assert!(at <= self.len());
        let mut remaining = at;
        let mut split_idx = self.runs.len();
        let mut tail_run: Option<Run> = None;

        for (idx, run) in self.runs.iter_mut().enumerate() {
            let run_len = run.len();
            if remaining == 0 {
                split_idx = idx;
                break;
            }
            if remaining < run_len {
                tail_run = Some(run.truncate(remaining));
                split_idx = idx + 1;
                break;
            }
            remaining -= run_len;
        }

        let mut rest_runs = self.runs.split_off(split_idx);
        if let Some(tail) = tail_run {
            rest_runs.insert(0, tail);
        }
        Chunk { runs: rest_runs }
    }

    fn can_append(&self, _other: &Self) -> bool {
        true
    }

    fn append(&mut self, other: Self) {
        for run in other.runs {
            self.push_run(run);
        }
    }

    fn prepend(&mut self, other: Self) {
        let mut combined = other;
        combined.append(self.clone());
        *self = combined;
    }
}

impl From<Run> for Chunk {
    fn from(run: Run) -> Self {
        if run.text.is_empty() {
            Chunk::new()
        } else {
            Chunk { runs: vec![run] }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rle::SplitableSpan;

    #[test]
    fn single_builds_one_run() {
        let c = Chunk::single(1, "hello");
        assert_eq!(c.len(), 5);
        assert_eq!(c.runs().len(), 1);
    }

    #[test]
    fn push_run_merges_same_author() {
        let mut c = Chunk::new();
        c.push_run(Run::new(1, "ab"));
        c.push_run(Run::new(1, "cd"));
        assert_eq!(c.runs().len(), 1);
        assert_eq!(c.to_plain_text(), "abcd");
    }

    #[test]
    fn push_run_keeps_distinct_authors_separate() {
        let mut c = Chunk::new();
        c.push_run(Run::new(1, "ab"));
        c.push_run(Run::new(2, "cd"));
        assert_eq!(c.runs().len(), 2);
        assert_eq!(c.to_plain_text(), "abcd");
    }

    #[test]
    fn truncate_splits_within_a_run() {
        let mut c = Chunk::single(1, "hello world");
        let rest = c.truncate(5);
        assert_eq!(c.to_plain_text(), "hello");
        assert_eq!(rest.to_plain_text(), " world");
    }

    #[test]
    fn truncate_splits_across_runs() {
        let mut c = Chunk::new();
        c.push_run(Run::new(1, "abc"));
        c.push_run(Run::new(2, "def"));
        let rest = c.truncate(3);
        assert_eq!(c.to_plain_text(), "abc");
        assert_eq!(rest.to_plain_text(), "def");
        assert_eq!(c.runs().len(), 1);
        assert_eq!(rest.runs().len(), 1);
    }

    #[test]
    fn author_at_reports_the_contributing_run() {
        let mut c = Chunk::new();
        c.push_run(Run::new(1, "ab"));
        c.push_run(Run::new(2, "cd"));
        assert_eq!(c.author_at(0), Some(1));
        assert_eq!(c.author_at(1), Some(1));
        assert_eq!(c.author_at(2), Some(2));
        assert_eq!(c.author_at(10), None);
    }

    #[test]
    fn append_merges_boundary_runs_by_author() {
        let mut a = Chunk::single(1, "ab");
        let b = Chunk::single(1, "cd");
        a.append(b);
        assert_eq!(a.runs().len(), 1);
        assert_eq!(a.to_plain_text(), "abcd");
    }
}
