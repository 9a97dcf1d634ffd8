//! Character classification helpers shared by the guard and the passes.

/// Check if a byte is a line terminator.
#[inline]
pub fn is_line_break(b: u8) -> bool {
    b == b'\n' || b == b'\r'
}

/// Check if a byte is horizontal whitespace (not a line break).
#[inline]
pub fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | 0x0B | 0x0C)
}

/// Check if a byte is any whitespace, including line breaks.
#[inline]
pub fn is_whitespace(b: u8) -> bool {
    is_space(b) || is_line_break(b)
}

/// Check if a byte can start an ASCII identifier.
#[inline]
pub fn is_ascii_ident_start(b: u8) -> bool {
    b == b'_' || b == b'$' || b.is_ascii_alphabetic()
}

/// Check if a byte can continue an ASCII identifier.
#[inline]
pub fn is_ascii_ident_part(b: u8) -> bool {
    b == b'_' || b == b'$' || b.is_ascii_alphanumeric()
}

/// Check if a character can start an identifier.
#[inline]
pub fn is_identifier_start(ch: char) -> bool {
    ch == '_'
        || ch == '$'
        || ch.is_ascii_alphabetic()
        || (ch as u32 > 0x7F && unicode_xid::UnicodeXID::is_xid_start(ch))
}

/// Check if a character can be part of an identifier.
#[inline]
pub fn is_identifier_part(ch: char) -> bool {
    ch == '_'
        || ch == '$'
        || ch.is_ascii_alphanumeric()
        || (ch as u32 > 0x7F && unicode_xid::UnicodeXID::is_xid_continue(ch))
}

/// Check if the byte at `i` continues an identifier, decoding a full
/// character when the byte is outside ASCII.
pub fn ident_part_at(text: &str, i: usize) -> bool {
    let bytes = text.as_bytes();
    if i >= bytes.len() {
        return false;
    }
    let b = bytes[i];
    if b < 0x80 {
        return is_ascii_ident_part(b);
    }
    text[i..]
        .chars()
        .next()
        .map(is_identifier_part)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_classes() {
        assert!(is_ascii_ident_start(b'a'));
        assert!(is_ascii_ident_start(b'$'));
        assert!(is_ascii_ident_start(b'_'));
        assert!(!is_ascii_ident_start(b'1'));
        assert!(is_ascii_ident_part(b'1'));
        assert!(!is_ascii_ident_part(b'-'));
    }

    #[test]
    fn test_unicode_identifiers() {
        assert!(is_identifier_start('å'));
        assert!(is_identifier_part('é'));
        assert!(!is_identifier_start('★'));
    }

    #[test]
    fn test_ident_part_at_multibyte() {
        let text = "変数x";
        assert!(ident_part_at(text, 0));
        assert!(ident_part_at(text, 6)); // the 'x'
        assert!(!ident_part_at(text, 7));
    }
}
