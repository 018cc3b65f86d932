//! Decoding of string-literal content.
//!
//! The lexer hands over the raw text between the quotes; this module applies
//! escape-sequence processing according to the literal's prefix flags and
//! produces the final constant. Raw strings skip all of it. Unknown
//! single-character escapes keep the backslash, the way CPython does;
//! malformed `\x`/`\u`/`\U` escapes are hard errors.

use krait_ast::{ConstantValue, SourceLocation};

use crate::error::{LexError, LexErrorKind};
use crate::token::{Token, TokenFlags, TokenValue};

/// Decode a `String` token into a `Str` or `Bytes` constant.
pub(crate) fn decode_string_token(token: &Token) -> Result<ConstantValue, LexError> {
    let TokenValue::Str(raw) = &token.value else {
        unreachable!("string token always carries a Str value");
    };
    let location = token.location();

    if token.flags.is_bytes() {
        if let Some(c) = raw.chars().find(|c| !c.is_ascii()) {
            return Err(LexError::new(LexErrorKind::UnrecognizedToken(c), location));
        }
        let bytes = if token.flags.is_raw() {
            raw.as_bytes().to_vec()
        } else {
            decode_bytes_escapes(raw, location)?
        };
        Ok(ConstantValue::Bytes(bytes))
    } else {
        let text = if token.flags.is_raw() {
            raw.clone()
        } else {
            decode_str_escapes(raw, location)?
        };
        Ok(ConstantValue::Str(text))
    }
}

/// Decode the literal text of an f-/t-string middle token. Doubled braces
/// were already collapsed by the lexer; this applies backslash escapes.
pub(crate) fn decode_fstring_middle(
    raw: &str,
    flags: TokenFlags,
    location: SourceLocation,
) -> Result<String, LexError> {
    if flags.is_raw() {
        Ok(raw.to_string())
    } else {
        decode_str_escapes(raw, location)
    }
}

fn decode_str_escapes(raw: &str, location: SourceLocation) -> Result<String, LexError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(&escape) = chars.peek() else {
            // A trailing backslash would have escaped the closing quote; the
            // lexer never produces this.
            out.push('\\');
            break;
        };
        chars.next();
        match escape {
            '\n' => {}
            '\r' => {
                // Line continuation; swallow a following \n too.
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            o @ '0'..='7' => {
                let mut value = o.to_digit(8).expect("octal digit");
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                match char::from_u32(value) {
                    Some(c) => out.push(c),
                    None => return Err(LexError::new(LexErrorKind::InvalidEscape(o), location)),
                }
            }
            'x' => out.push(decode_unicode_escape(&mut chars, 2, location)?),
            'u' => out.push(decode_unicode_escape(&mut chars, 4, location)?),
            'U' => out.push(decode_unicode_escape(&mut chars, 8, location)?),
            'N' => {
                // Named-character escapes need a unicode name table; the
                // toolchain rejects them instead of guessing.
                return Err(LexError::new(LexErrorKind::InvalidEscape('N'), location));
            }
            other => {
                // Unknown escape: keep the backslash.
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

fn decode_bytes_escapes(raw: &str, location: SourceLocation) -> Result<Vec<u8>, LexError> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c as u8);
            continue;
        }
        let Some(&escape) = chars.peek() else {
            out.push(b'\\');
            break;
        };
        chars.next();
        match escape {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push(b'\\'),
            '\'' => out.push(b'\''),
            '"' => out.push(b'"'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            o @ '0'..='7' => {
                let mut value = o.to_digit(8).expect("octal digit");
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(digit) => {
                            value = value * 8 + digit;
                            chars.next();
                        }
                        None => break,
                    }
                }
                if value > 0xff {
                    return Err(LexError::new(LexErrorKind::InvalidEscape(o), location));
                }
                out.push(value as u8);
            }
            'x' => {
                let c = decode_unicode_escape(&mut chars, 2, location)?;
                out.push(c as u8);
            }
            other => {
                out.push(b'\\');
                out.push(other as u8);
            }
        }
    }
    Ok(out)
}

/// Read exactly `digits` hex digits and convert them to a character.
fn decode_unicode_escape(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    digits: u32,
    location: SourceLocation,
) -> Result<char, LexError> {
    let mut value: u32 = 0;
    for _ in 0..digits {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| LexError::new(LexErrorKind::InvalidEscape('x'), location))?;
        value = value * 16 + digit;
    }
    match value {
        // Surrogates cannot be represented in a Rust char.
        0xd800..=0xdfff => Ok(char::REPLACEMENT_CHARACTER),
        _ => char::from_u32(value)
            .ok_or_else(|| LexError::new(LexErrorKind::InvalidEscape('u'), location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> String {
        decode_str_escapes(raw, SourceLocation::default()).unwrap()
    }

    #[test]
    fn simple_escapes() {
        assert_eq!(decode(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(decode(r"\\"), "\\");
        assert_eq!(decode(r"\'"), "'");
    }

    #[test]
    fn hex_and_unicode_escapes() {
        assert_eq!(decode(r"\x41"), "A");
        assert_eq!(decode(r"\u00e9"), "\u{e9}");
        assert_eq!(decode(r"\U0001f600"), "😀");
    }

    #[test]
    fn octal_escapes() {
        assert_eq!(decode(r"\101"), "A");
        assert_eq!(decode(r"\0"), "\0");
    }

    #[test]
    fn unknown_escape_keeps_backslash() {
        assert_eq!(decode(r"\q"), "\\q");
    }

    #[test]
    fn malformed_hex_escape_errors() {
        assert!(decode_str_escapes(r"\xzz", SourceLocation::default()).is_err());
    }

    #[test]
    fn line_continuation_is_removed() {
        assert_eq!(decode("a\\\nb"), "ab");
    }
}
