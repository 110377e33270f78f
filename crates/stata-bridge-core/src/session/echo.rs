//! Removal of the console's own chatter around a command file run.

use std::path::Path;

/// Strip the echo that surrounds running `do_file` from already unmarked
/// output, then trim the result.
///
/// Removes, in order of appearance:
/// - leading blank lines and the echoed `do "<file>"` line,
/// - the `end of do-file` trailer,
/// - wrapped `> ` lines that continue the echoed file path,
/// - echoed command lines starting with `. `,
/// - trailing lone `.` prompt lines.
pub fn clean_do_output(output: &str, do_file: &Path) -> String {
    let stem = do_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut kept: Vec<&str> = Vec::new();
    let mut in_header = true;
    for line in output.lines() {
        let trimmed = line.trim();
        if in_header {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with("do ") {
                in_header = false;
                continue;
            }
            in_header = false;
        }
        if trimmed == "end of do-file" {
            continue;
        }
        if !stem.is_empty() && trimmed.starts_with("> ") && trimmed.contains(&stem) {
            continue;
        }
        if trimmed.starts_with(". ") {
            continue;
        }
        kept.push(line);
    }

    while kept.last().is_some_and(|l| matches!(l.trim(), "." | "")) {
        kept.pop();
    }
    kept.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn do_file() -> PathBuf {
        PathBuf::from("/tmp/stata_session_ab/_cmd_0123456789ab.do")
    }

    #[test]
    fn test_display_output() {
        let raw = "\n. do \"/tmp/stata_session_ab/_cmd_0123456789ab.do\"\n\n. display 1+1\n2\n\n. \nend of do-file\n";
        assert_eq!(clean_do_output(raw, &do_file()), "2");
    }

    #[test]
    fn test_bare_do_echo_without_prompt() {
        let raw = "do \"/tmp/x/_cmd_0123456789ab.do\"\nhello\n";
        assert_eq!(clean_do_output(raw, &do_file()), "hello");
    }

    #[test]
    fn test_terminal_echo_of_directive() {
        let raw = "do \"/tmp/stata_session_ab/_cmd_0123456789ab.do\"\r\n\r\n. display 1+1\r\n2\r\n\r\nend of do-file\r\n";
        assert_eq!(clean_do_output(raw, &do_file()), "2");
    }

    #[test]
    fn test_wrapped_path_line_removed() {
        let raw = ". do \"/very/long/path/that/wraps/\n> _cmd_0123456789ab.do\"\nresult\n";
        assert_eq!(clean_do_output(raw, &do_file()), "result");
    }

    #[test]
    fn test_interior_blank_lines_kept() {
        let raw = ". display \"a\"\na\n\n. display \"b\"\nb\n";
        assert_eq!(clean_do_output(raw, &do_file()), "a\n\nb");
    }

    #[test]
    fn test_trailing_dot_lines() {
        let raw = "table\n.\n.\n";
        assert_eq!(clean_do_output(raw, &do_file()), "table");
    }

    #[test]
    fn test_error_text_survives() {
        let raw = ". foo\ncommand foo is unrecognized\nr(199);\n\nend of do-file\nr(199);\n";
        assert_eq!(
            clean_do_output(raw, &do_file()),
            "command foo is unrecognized\nr(199);\n\nr(199);"
        );
    }

    #[test]
    fn test_user_lines_starting_with_do_after_header_survive() {
        let raw = "first\ndo not remove me\n";
        assert_eq!(clean_do_output(raw, &do_file()), "first\ndo not remove me");
    }
}
