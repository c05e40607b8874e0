//! Working-tree change detection from `git status --porcelain` output.

/// True when porcelain output lists at least one entry.
pub fn has_changes(status: &str) -> bool {
    !status.trim().is_empty()
}

/// Changed paths: each non-blank line's content after its `XY ` status prefix.
///
/// Renames keep the `old -> new` form so reviewers see both sides.
pub fn changed_paths(status: &str) -> Vec<String> {
    status
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.get(3..) {
            Some(rest) if !rest.trim().is_empty() => rest.trim().to_string(),
            _ => line.trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_status_means_no_changes() {
        assert!(!has_changes(""));
        assert!(!has_changes("\n  \n"));
        assert!(has_changes("?? new.txt\n"));
    }

    #[test]
    fn strips_two_letter_code_and_separator() {
        let status = " M src/main.rs\n?? notes/todo.md\nA  app/data/portfolio.json\r\n";
        assert_eq!(
            changed_paths(status),
            vec!["src/main.rs", "notes/todo.md", "app/data/portfolio.json"]
        );
    }

    #[test]
    fn keeps_rename_arrow() {
        assert_eq!(changed_paths("R  old.txt -> new.txt"), vec!["old.txt -> new.txt"]);
    }

    #[test]
    fn short_lines_are_kept_whole() {
        assert_eq!(changed_paths("?? \nM"), vec!["??", "M"]);
    }
}
