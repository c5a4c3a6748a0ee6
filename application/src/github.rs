//! GitHub handle normalization.

/// Split a free-form list of GitHub handles into normalized handles.
///
/// Entries are separated by commas or whitespace. Each entry loses one
/// leading `@`, is trimmed and lower-cased; empty entries and repeats are
/// dropped, first occurrence wins.
///
/// # Example
///
/// ```
/// use filplus_application::github::normalize_github_handles;
///
/// assert_eq!(
///     normalize_github_handles(" @Alice, bob\n@CHARLIE "),
///     vec!["alice", "bob", "charlie"],
/// );
/// ```
#[must_use]
pub fn normalize_github_handles(input: &str) -> Vec<String> {
    let mut handles: Vec<String> = Vec::new();
    for raw in input.split(|c: char| c == ',' || c.is_whitespace()) {
        let handle = raw.strip_prefix('@').unwrap_or(raw).trim().to_lowercase();
        if !handle.is_empty() && !handles.contains(&handle) {
            handles.push(handle);
        }
    }
    handles
}
