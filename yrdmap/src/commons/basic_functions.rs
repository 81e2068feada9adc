use encoding_rs::{GB18030, UTF_8};
use std::path::{Path, PathBuf};

/// Trim a city name read from a table or an attribute field.
/// Full-width spaces count as whitespace here.
pub fn normalize_name(name: &str) -> &str {
    name.trim_matches(|c: char| c.is_whitespace() || c == '\u{3000}')
}

/// Decode text exported by spreadsheet tools.
/// UTF-8 (BOM stripped) when valid, GB18030 otherwise.
pub fn decode_text(bytes: &[u8]) -> String {
    let (text, had_errors) = UTF_8.decode_without_bom_handling(strip_bom(bytes));
    if !had_errors {
        return text.into_owned();
    }
    let (text, _, _) = GB18030.decode(bytes);
    text.into_owned()
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

/// Build `<dir>/<title>.<extension>`, replacing characters that are not
/// allowed in file names
pub fn output_file(dir: &Path, title: &str, extension: &str) -> PathBuf {
    let stem: String = title
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    dir.join(format!("{}.{}", stem.trim(), extension))
}
