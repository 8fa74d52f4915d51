/// Normalize chat text or an alias for matching.
///
/// Case-folds, trims, and collapses every whitespace run to a single ASCII
/// space, so token boundaries in the result are always `' '` or the ends of
/// the string.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    for token in lowered.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}
