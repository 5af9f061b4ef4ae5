mod git;
mod git_cli;

use sha2::{Digest, Sha256};

pub use git::GitContext;
pub use git_cli::{ChangeStatus, DiffEntry, GitCli, GitError};

/// Hex SHA-256 of the exact bytes given.
pub fn content_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Whether `path` equals `prefix` or lives underneath it, comparing whole
/// path segments (`docs/decisions` does not contain `docs/decisionsX`).
pub fn path_within(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Number of lines as an editor would show them; a trailing newline does not
/// start a new line.
pub fn count_lines(text: &str) -> usize {
    text.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_digest_is_sha256_hex() {
        assert_eq!(
            content_digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_ne!(content_digest(b"abc\n"), content_digest(b"abc"));
    }

    #[test]
    fn path_within_compares_whole_segments() {
        assert!(path_within("docs/decisions/001.md", "docs/decisions"));
        assert!(path_within("docs/decisions", "docs/decisions"));
        assert!(!path_within("docs/decisionsX/001.md", "docs/decisions"));
        assert!(!path_within("docs", "docs/decisions"));
        assert!(path_within("anything", ""));
    }

    #[test]
    fn count_lines_ignores_trailing_newline() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("one\n"), 1);
        assert_eq!(count_lines("one\ntwo"), 2);
        assert_eq!(count_lines("one\r\ntwo\r\n"), 2);
    }
}
