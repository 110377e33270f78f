//! SMCL markup normalisation.
//!
//! Stata decorates console and log output with SMCL tags (`{res}`, `{txt}`,
//! `{hline 20}`, `{c |}`, ...). [`strip_smcl`] turns such text back into plain
//! text. Only a closed vocabulary of tags is removed; anything else that merely
//! looks like a tag is left in place so unrelated braces are never eaten.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `{c <name>}` character escapes.
static CHAR_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{c\s+([^}]+)\}").expect("valid char escape regex"));

/// Formatting and structural tags that carry no textual content.
static FORMAT_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"\{(?:",
        r"res(?:ult)?|txt|text|err(?:or)?|cmd|inp(?:ut)?|bf|it|sf|",
        r"com|hline(?:\s+\d+)?|dup\s+\d+:[^}]*|space\s+\d+|col\s+\d+|",
        r"ralign\s+\d+:[^}]*|lalign\s+\d+:[^}]*|center\s+\d+:[^}]*|",
        r"right|reset|smcl|p_end|p |pstd|phang|pmore|p2colset[^}]*|",
        r"p2col[^}]*|p2line[^}]*|marker[^}]*|dlgtab[^}]*|title[^}]*|",
        r"hi(?:lite)?|ul\s+(?:on|off)|bind\s+[^}]*|char\s+[^}]*|break",
        r")\}",
    ))
    .expect("valid format tag regex")
});

fn char_for_escape(name: &str) -> &'static str {
    match name {
        "|" => "|",
        "-" => "-",
        "+" | "TT" | "BT" | "TLC" | "TRC" | "BLC" | "BRC" | "LT" | "RT" => "+",
        _ => "",
    }
}

fn strip_once(text: &str) -> String {
    let escaped = CHAR_ESCAPE.replace_all(text, |caps: &Captures<'_>| {
        char_for_escape(caps[1].trim()).to_string()
    });
    FORMAT_TAG.replace_all(&escaped, "").into_owned()
}

/// Remove SMCL markup from `text` and return plain text.
///
/// Removal runs to a fixed point, so adjacent fragments that only form a tag
/// once their neighbour is gone (`{{txt}c |}`) are handled too and the result
/// is stable under a second application.
pub fn strip_smcl(text: &str) -> String {
    let mut current = strip_once(text);
    loop {
        let next = strip_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}
