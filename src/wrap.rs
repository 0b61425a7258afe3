//! Greedy word wrap and the ASCII visibility heuristic.
//!
//! Both helpers work on raw bytes and only ever classify bytes in the ASCII
//! range. Bytes of multi-byte UTF-8 sequences never test as whitespace or
//! control, so they are never rewritten and always count as visible.

/// Narrowest wrap width offered to users.
pub const MIN_WRAP_WIDTH: u32 = 40;
/// Widest wrap width offered to users.
pub const MAX_WRAP_WIDTH: u32 = 160;
/// Wrap width used when nothing else is configured.
pub const DEFAULT_WRAP_WIDTH: u32 = 60;

/// C-locale `isspace`: space, `\t`, `\n`, `\v`, `\f`, `\r`.
#[inline]
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Whether `s` contains at least one byte that is neither a space nor an
/// ASCII control character.
pub fn has_visible_symbols(s: &str) -> bool {
    s.bytes().any(|b| b != b' ' && !b.is_ascii_control())
}

/// Reflow `source` so that lines break at whitespace near `width` columns.
///
/// Only whitespace bytes are rewritten (into `\n`), so the output always has
/// the same byte length as the input. Existing newlines restart the column
/// count. A word that does not fit and has no whitespace before it on the
/// current line is kept whole; scanning continues `width` bytes at a time
/// and the next break lands on the last whitespace seen on that line. A
/// `width` of zero returns the input unchanged.
pub fn greedy_word_wrap(source: &str, width: usize) -> String {
    let mut bytes = source.as_bytes().to_vec();
    wrap_bytes(&mut bytes, width);
    match String::from_utf8(bytes) {
        Ok(out) => out,
        // Unreachable for valid input: only ASCII bytes were replaced.
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

fn wrap_bytes(bytes: &mut [u8], width: usize) {
    if width == 0 {
        return;
    }
    let n = bytes.len();
    let mut i = 0;
    let mut line_start = 0;

    while i < n {
        let mut col = 1;
        while col <= width {
            if i == n {
                return;
            }
            if bytes[i] == b'\n' {
                col = 1;
                line_start = i + 1;
            }
            col += 1;
            i += 1;
        }
        if i == n {
            return;
        }

        if is_space(bytes[i]) {
            bytes[i] = b'\n';
            i += 1;
            line_start = i;
            continue;
        }

        // Nearest whitespace back on the current line, never its first byte.
        match (line_start + 1..i).rev().find(|&k| is_space(bytes[k])) {
            Some(k) => {
                bytes[k] = b'\n';
                i = k + 1;
                line_start = i;
            }
            // No break point yet; keep scanning in width steps.
            None => {}
        }
    }
}
