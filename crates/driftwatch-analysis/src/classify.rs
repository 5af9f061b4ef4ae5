use std::fmt;

use serde::{Deserialize, Serialize};

/// Share of the alphanumeric text that may differ for a change to still count
/// as a wording tweak.
const COPY_ALNUM_TOLERANCE: f64 = 0.05;
/// Hunks longer than this (in characters per side) skip the edit-distance
/// check and are treated as content.
const MAX_COPY_COMPARE_CHARS: usize = 4_096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticBucket {
    Structural,
    Copy,
    Content,
    Binary,
}

impl SemanticBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::Copy => "copy",
            Self::Content => "content",
            Self::Binary => "binary",
        }
    }

    /// Tie-break rank when two hunks carry the same number of changed lines.
    fn precedence(self) -> u8 {
        match self {
            Self::Binary => 4,
            Self::Content => 3,
            Self::Structural => 2,
            Self::Copy => 1,
        }
    }
}

impl fmt::Display for SemanticBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Removed and added lines of one `@@` block, without their `-`/`+` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Hunk {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl Hunk {
    pub fn changed_lines(&self) -> usize {
        self.removed.len() + self.added.len()
    }
}

/// Splits unified diff output into hunks. File headers (`---`/`+++`) are
/// only recognized outside a hunk body.
pub fn parse_hunks(diff: &str) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in diff.lines() {
        if line.starts_with("diff ") {
            hunks.extend(current.take());
            continue;
        }
        if line.starts_with("@@") {
            hunks.extend(current.take());
            current = Some(Hunk::default());
            continue;
        }
        let Some(hunk) = current.as_mut() else {
            continue;
        };
        if let Some(rest) = line.strip_prefix('-') {
            hunk.removed.push(rest.to_owned());
        } else if let Some(rest) = line.strip_prefix('+') {
            hunk.added.push(rest.to_owned());
        }
    }
    hunks.extend(current);

    hunks.retain(|hunk| hunk.changed_lines() > 0);
    hunks
}

pub fn classify_hunk(hunk: &Hunk) -> SemanticBucket {
    if is_heading_change(hunk) || is_reordering(&hunk.removed, &hunk.added) {
        return SemanticBucket::Structural;
    }
    if is_copy_edit(&hunk.removed.join("\n"), &hunk.added.join("\n")) {
        return SemanticBucket::Copy;
    }
    SemanticBucket::Content
}

/// Bucket of the hunk with the most changed lines. A file whose lines only
/// moved between hunks is structural as a whole; a file without textual
/// hunks (a pure rename) is structural, anything else without hunks is
/// content.
pub fn classify_file(hunks: &[Hunk], renamed: bool) -> SemanticBucket {
    if hunks.is_empty() {
        return if renamed {
            SemanticBucket::Structural
        } else {
            SemanticBucket::Content
        };
    }

    let removed = hunks
        .iter()
        .flat_map(|hunk| hunk.removed.iter().cloned())
        .collect::<Vec<_>>();
    let added = hunks
        .iter()
        .flat_map(|hunk| hunk.added.iter().cloned())
        .collect::<Vec<_>>();
    if hunks.len() > 1 && is_reordering(&removed, &added) {
        return SemanticBucket::Structural;
    }

    hunks
        .iter()
        .map(|hunk| (hunk.changed_lines(), classify_hunk(hunk)))
        .max_by(|left, right| {
            left.0
                .cmp(&right.0)
                .then_with(|| left.1.precedence().cmp(&right.1.precedence()))
        })
        .map(|(_, bucket)| bucket)
        .unwrap_or(SemanticBucket::Content)
}

fn is_heading_change(hunk: &Hunk) -> bool {
    let (Some(mut before), Some(mut after)) =
        (heading_titles(&hunk.removed), heading_titles(&hunk.added))
    else {
        return false;
    };
    if before.is_empty() && after.is_empty() {
        return false;
    }
    if before.is_empty() || after.is_empty() {
        return true;
    }

    before.sort_unstable();
    after.sort_unstable();
    before == after
}

/// Titles of a side that holds nothing but headings, `None` as soon as any
/// other text appears. A setext underline only counts directly beneath a
/// text line; on its own a `---` or `===` run is a thematic break or a
/// front-matter fence.
fn heading_titles(lines: &[String]) -> Option<Vec<&str>> {
    let mut titles = Vec::new();
    let mut lines = lines.iter().map(|line| line.trim()).peekable();
    while let Some(line) = lines.next() {
        if line.is_empty() {
            continue;
        }
        if let Some(title) = atx_title(line) {
            titles.push(title);
            continue;
        }
        let underlined = !is_setext_underline(line)
            && lines.next_if(|next| is_setext_underline(next)).is_some();
        if underlined {
            titles.push(line);
            continue;
        }
        return None;
    }
    Some(titles)
}

fn atx_title(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|ch| *ch == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    (rest.is_empty() || rest.starts_with(' ')).then(|| rest.trim())
}

fn is_setext_underline(line: &str) -> bool {
    line.len() >= 3 && (line.chars().all(|ch| ch == '=') || line.chars().all(|ch| ch == '-'))
}

/// Same lines on both sides in a different order. List numbering is ignored
/// so renumbered ordered lists still count.
fn is_reordering(removed: &[String], added: &[String]) -> bool {
    let mut before = non_blank(removed)
        .into_iter()
        .map(list_item_body)
        .collect::<Vec<_>>();
    let mut after = non_blank(added)
        .into_iter()
        .map(list_item_body)
        .collect::<Vec<_>>();
    if before.is_empty() || before.len() != after.len() || before == after {
        return false;
    }
    before.sort_unstable();
    after.sort_unstable();
    before == after
}

fn list_item_body(line: &str) -> &str {
    let trimmed = line.trim();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(body) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return body.trim();
        }
    }
    trimmed
}

fn non_blank(lines: &[String]) -> Vec<&str> {
    lines
        .iter()
        .map(String::as_str)
        .filter(|line| !line.trim().is_empty())
        .collect()
}

/// Near-identical alphanumeric text where most of the edit falls on
/// whitespace and punctuation.
fn is_copy_edit(before: &str, after: &str) -> bool {
    if before == after {
        return true;
    }
    if before.len() > MAX_COPY_COMPARE_CHARS || after.len() > MAX_COPY_COMPARE_CHARS {
        return false;
    }

    let before_alnum = alphanumeric(before);
    let after_alnum = alphanumeric(after);
    let alnum_distance = levenshtein(&before_alnum, &after_alnum);
    if alnum_distance == 0 {
        return true;
    }

    let longest = before_alnum.len().max(after_alnum.len());
    if (alnum_distance as f64) > (longest as f64) * COPY_ALNUM_TOLERANCE {
        return false;
    }

    let before_chars = before.chars().collect::<Vec<_>>();
    let after_chars = after.chars().collect::<Vec<_>>();
    let raw_distance = levenshtein(&before_chars, &after_chars);
    let non_alnum_share =
        raw_distance.saturating_sub(alnum_distance) as f64 / raw_distance.max(1) as f64;
    non_alnum_share >= 0.5
}

fn alphanumeric(text: &str) -> Vec<char> {
    text.chars()
        .filter(|ch| ch.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn levenshtein(left: &[char], right: &[char]) -> usize {
    if left.is_empty() {
        return right.len();
    }
    if right.is_empty() {
        return left.len();
    }

    let mut previous = (0..=right.len()).collect::<Vec<_>>();
    let mut current = vec![0; right.len() + 1];
    for (i, left_char) in left.iter().enumerate() {
        current[0] = i + 1;
        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != right_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[right.len()]
}
