/// Escape characters that break Markdown link text: `[`, `]`, `(`, `)`.
pub(crate) fn escape_md_link(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '[' | ']' | '(' | ')') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Flatten a term for use in a heading. Newlines would end the heading early.
pub(crate) fn sanitize_heading(s: &str) -> String {
    s.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Make upstream text safe inside one table cell.
pub(crate) fn table_cell(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "\\|")
}

/// Cut `s` to at most `max` bytes on a char boundary, marking the cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let end = s.floor_char_boundary(max);
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_link_brackets() {
        assert_eq!(escape_md_link("Lipitor"), "Lipitor");
        assert_eq!(
            escape_md_link("Stent [coated] (drug-eluting)"),
            r"Stent \[coated\] \(drug-eluting\)"
        );
    }

    #[test]
    fn heading_newlines_become_spaces() {
        assert_eq!(sanitize_heading("bone\ncement\rkit"), "bone cement kit");
    }

    #[test]
    fn table_cells_escape_pipes_and_collapse_whitespace() {
        assert_eq!(table_cell("a |  b\nc"), r"a \| b c");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("αβγδ", 3), "α...");
    }
}
