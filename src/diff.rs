use std::collections::HashSet;

/// Lines of `new` that do not occur anywhere in `old`, in `new`'s order.
///
/// Duplicates in `new` are kept: each one is a separate candidate option.
pub fn new_lines(old: &[String], new: &[String]) -> Vec<String> {
    let seen: HashSet<&str> = old.iter().map(String::as_str).collect();
    new.iter()
        .filter(|line| !seen.contains(line.as_str()))
        .cloned()
        .collect()
}

/// Same as [`new_lines`], treating a missing snapshot as "nothing new".
pub fn new_lines_or_empty(old: Option<&[String]>, new: Option<&[String]>) -> Vec<String> {
    match (old, new) {
        (Some(old), Some(new)) => new_lines(old, new),
        _ => Vec::new(),
    }
}
