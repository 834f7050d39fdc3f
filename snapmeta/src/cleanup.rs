use regex::Regex;
use std::sync::LazyLock;

// Ordered substitutions applied to SnapStream-style names,
// from "South Park-(Christmas in Canada_)-2006-11-02-0.avi"
// to "South Park-(Christmas in Canada_)-2006-11-02.avi"
// and "Show/Name-2006-11-02" to "Show/Name (2006-11-02)".
static FILENAME_SUBS: LazyLock<Vec<(Regex, &str)>> = LazyLock::new(|| {
    [
        (r"(.*)/([^()]+)-(\d{4}-\d{2}-\d{2})", "$1/$2 ($3)"),
        (r"(.*)/[^/]+\((.*?)\)-(\d{4}-\d{2}-\d{2})", "$1/$2 ($3)"),
        (r"-0([.].*)$", "$1"),
        (r"(_\s+)", " "),
    ]
    .into_iter()
    .map(|(pattern, sub)| (Regex::new(pattern).unwrap(), sub))
    .collect()
});

/// Normalize a legacy recording name. Pure, applies `FILENAME_SUBS` in order.
pub fn cleanup_name(name: &str) -> String {
    FILENAME_SUBS
        .iter()
        .fold(name.to_owned(), |name, (regex, sub)| {
            regex.replace_all(&name, *sub).into_owned()
        })
}
