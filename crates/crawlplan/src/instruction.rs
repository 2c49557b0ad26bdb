/// Whether a configured instruction list applies to the instructions
/// requested for the current run.
///
/// An empty `requested` list applies to everything. Otherwise at least one
/// incoming instruction must be listed, compared case-sensitively.
pub fn matches<R, I>(requested: &[R], incoming: &[I]) -> bool
where
    R: AsRef<str>,
    I: AsRef<str>,
{
    if requested.is_empty() {
        return true;
    }
    incoming
        .iter()
        .any(|pi| requested.iter().any(|r| r.as_ref() == pi.as_ref()))
}

/// Splits a comma separated instruction list. Empty items are dropped,
/// whitespace is kept.
pub fn parse_instruction_list(list: &str) -> Vec<String> {
    list.split(',')
        .filter(|pi| !pi.is_empty())
        .map(String::from)
        .collect()
}
