//! Small text helpers shared by consultation and audit notes.

/// First line that is not blank after trimming, trimmed; empty if none.
pub fn first_non_blank_line(text: &str) -> &str {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_leading_blank_lines() {
        assert_eq!(first_non_blank_line("\n   \r\n  Tidy holdings  \nsecond"), "Tidy holdings");
    }

    #[test]
    fn empty_when_all_blank() {
        assert_eq!(first_non_blank_line(""), "");
        assert_eq!(first_non_blank_line(" \n\t\n"), "");
    }
}
