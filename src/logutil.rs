//! Logging helpers that keep user-supplied announcement content on one
//! log line. Control characters are escaped and long content is truncated
//! to a short preview.

/// Escape announcement content for single-line logging:
/// - `\n` => `\\n`, `\r` => `\\r`, `\t` => `\\t`, backslash => `\\\\`
/// - other control characters become `\xNN`
///
/// Content longer than the preview cap is cut with an ellipsis so one noisy
/// broadcast cannot flood the log.
pub fn escape_log(content: &str) -> String {
    const PREVIEW_CAP: usize = 200;
    let mut out = String::with_capacity(content.len().min(PREVIEW_CAP) + 8);
    for (count, ch) in content.chars().enumerate() {
        if count >= PREVIEW_CAP {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                use std::fmt::Write;
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
