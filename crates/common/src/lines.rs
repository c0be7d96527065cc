// Line-indexed view over a newline-delimited document body.
//
// The canonical form is always the single string; these helpers derive the
// line sequence by splitting on `\n` and rejoin it losslessly, so
// `join(split(body)) == body` for every body, including empty and
// trailing-newline bodies.

/// Split a body into its line sequence.
pub fn split_lines(body: &str) -> Vec<&str> {
    body.split('\n').collect()
}

/// Rejoin a line sequence into the canonical single string.
pub fn join_lines<S: AsRef<str>>(lines: &[S]) -> String {
    lines.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("\n")
}

/// Number of lines in a body. An empty body has one (empty) line.
pub fn line_count(body: &str) -> usize {
    body.split('\n').count()
}

/// Replace the line at `index` with `replacement` and return the rejoined
/// body. Returns `None` when `index` is out of bounds of the current line
/// sequence; the caller decides whether that is an error or a skip.
pub fn replace_line(body: &str, index: usize, replacement: &str) -> Option<String> {
    let mut lines = split_lines(body);
    let slot = lines.get_mut(index)?;
    *slot = replacement;
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_join_round_trips_arbitrary_bodies() {
        for body in [
            "",
            "single line",
            "a\nb\nc",
            "trailing newline\n",
            "\nleading newline",
            "\n\n\n",
            "interior\n\nblank",
        ] {
            assert_eq!(join_lines(&split_lines(body)), body);
        }
    }

    #[test]
    fn empty_body_is_one_empty_line() {
        assert_eq!(line_count(""), 1);
        assert_eq!(split_lines(""), vec![""]);
    }

    #[test]
    fn replace_line_rewrites_exactly_one_line() {
        let body = "Intro.\nThe cat sat.\nEnd.";
        let updated = replace_line(body, 1, "The cat sat quietly.").expect("index 1 is in bounds");
        assert_eq!(updated, "Intro.\nThe cat sat quietly.\nEnd.");
        // Untouched lines are byte-for-byte identical.
        assert_eq!(split_lines(&updated)[0], "Intro.");
        assert_eq!(split_lines(&updated)[2], "End.");
    }

    #[test]
    fn replace_line_out_of_bounds_returns_none() {
        let body = "a\nb\nc";
        assert!(replace_line(body, 3, "x").is_none());
        assert!(replace_line(body, 5, "x").is_none());
    }

    #[test]
    fn replace_preserves_trailing_newline() {
        let body = "a\nb\n";
        let updated = replace_line(body, 0, "z").expect("in bounds");
        assert_eq!(updated, "z\nb\n");
    }

    #[test]
    fn line_count_matches_split() {
        for body in ["", "a", "a\nb", "a\nb\n"] {
            assert_eq!(line_count(body), split_lines(body).len());
        }
    }
}
