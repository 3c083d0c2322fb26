//! PDF lexer (tokenizer).
//!
//! Low-level tokenization of PDF byte buffers with nom. The grammar is
//! deliberately forgiving: numbers accept a leading `+`, extra decimal points
//! and implied digits, and names decode `#XX` escapes.
//!
//! Whitespace (space, \t, \r, \n, \0, \f) and comments (% to EOL) are skipped
//! before every token.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_till, take_while},
    character::complete::char,
    combinator::{map, value},
    sequence::{delimited, preceded},
    IResult,
};

/// Token types recognized by the lexer.
#[derive(Debug, PartialEq, Clone)]
pub enum Token<'a> {
    /// Integer number (e.g., 42, -123, +7)
    Integer(i64),

    /// Real number (e.g., 3.14, .5, 4.)
    Real(f64),

    /// Literal string body, escapes still encoded
    LiteralString(&'a [u8]),

    /// Hex string body, whitespace still present
    HexString(&'a [u8]),

    /// Name with `#XX` escapes decoded
    Name(String),

    /// `true`
    True,

    /// `false`
    False,

    /// `null`
    Null,

    /// `[`
    ArrayStart,

    /// `]`
    ArrayEnd,

    /// `<<`
    DictStart,

    /// `>>`
    DictEnd,

    /// `obj`
    ObjStart,

    /// `endobj`
    ObjEnd,

    /// `stream`
    StreamStart,

    /// `endstream`
    StreamEnd,

    /// `R` in `10 0 R`
    R,
}

/// PDF whitespace bytes.
pub fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\r' | b'\n' | 0x00 | 0x0C)
}

/// PDF delimiter bytes.
pub fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

/// Regular characters: neither whitespace nor delimiters.
pub fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn whitespace(input: &[u8]) -> IResult<&[u8], ()> {
    let (remaining, ws) = take_while(is_whitespace)(input)?;
    if ws.is_empty() {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Space)));
    }
    Ok((remaining, ()))
}

fn comment(input: &[u8]) -> IResult<&[u8], ()> {
    value((), preceded(char('%'), take_till(|c| c == b'\r' || c == b'\n')))(input)
}

/// Skip all whitespace and comments.
pub fn skip_ws(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let mut remaining = input;
    loop {
        if let Ok((rest, _)) = whitespace(remaining) {
            remaining = rest;
            continue;
        }
        if let Ok((rest, _)) = comment(remaining) {
            remaining = rest;
            continue;
        }
        break;
    }
    Ok((remaining, input))
}

fn digits(input: &[u8]) -> (&[u8], &[u8]) {
    let end = input.iter().position(|c| !c.is_ascii_digit()).unwrap_or(input.len());
    (&input[end..], &input[..end])
}

/// Parse an integer or real number.
///
/// Accepted forms: `42`, `+17`, `-3.5`, `.5`, `5.`, `-.002`. Any further
/// `.digits` groups after the first decimal point are consumed and ignored,
/// so `1.2.3` reads as `1.2`. Integers too large for `i64` become reals.
fn parse_number(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let fail = |at| nom::Err::Error(nom::error::Error::new(at, nom::error::ErrorKind::Digit));

    let (rest, negative) = match input.first() {
        Some(b'-') => (&input[1..], true),
        Some(b'+') => (&input[1..], false),
        _ => (input, false),
    };

    let (rest, int_part) = digits(rest);
    let (mut rest, frac_part) = if rest.first() == Some(&b'.') {
        let (after, frac) = digits(&rest[1..]);
        (after, Some(frac))
    } else {
        (rest, None)
    };

    if int_part.is_empty() && frac_part.map_or(true, |f| f.is_empty()) {
        return Err(fail(input));
    }

    while rest.first() == Some(&b'.') {
        let (after, _) = digits(&rest[1..]);
        rest = after;
    }

    let sign = if negative { "-" } else { "" };
    let int_str = std::str::from_utf8(int_part).map_err(|_| fail(input))?;

    match frac_part {
        None => match format!("{}{}", sign, int_str).parse::<i64>() {
            Ok(n) => Ok((rest, Token::Integer(n))),
            Err(_) => {
                let n: f64 = format!("{}{}", sign, int_str).parse().map_err(|_| fail(input))?;
                Ok((rest, Token::Real(n)))
            },
        },
        Some(frac) => {
            let frac_str = std::str::from_utf8(frac).map_err(|_| fail(input))?;
            let text = format!(
                "{}{}.{}",
                sign,
                if int_str.is_empty() { "0" } else { int_str },
                if frac_str.is_empty() { "0" } else { frac_str }
            );
            let n: f64 = text.parse().map_err(|_| fail(input))?;
            Ok((rest, Token::Real(n)))
        },
    }
}

/// Find the end of a literal string body.
///
/// `input` starts right after the opening parenthesis. Returns the index of
/// the closing parenthesis, or `None` when the parentheses never balance.
pub fn literal_string_end(input: &[u8]) -> Option<usize> {
    let mut depth = 1usize;
    let mut pos = 0;
    while pos < input.len() {
        match input[pos] {
            b'\\' => pos += 2,
            b'(' => {
                depth += 1;
                pos += 1;
            },
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(pos);
                }
                pos += 1;
            },
            _ => pos += 1,
        }
    }
    None
}

/// Parse a literal string enclosed in balanced parentheses.
///
/// The raw body is returned with escapes intact; decoding happens in the
/// parser.
fn parse_literal_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (body, _) = char('(')(input)?;
    match literal_string_end(body) {
        Some(end) => Ok((&body[end + 1..], Token::LiteralString(&body[..end]))),
        None => Err(nom::Err::Failure(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        ))),
    }
}

/// Parse a hexadecimal string enclosed in angle brackets.
fn parse_hex_string(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    if input.starts_with(b"<<") {
        return Err(nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Tag)));
    }

    delimited(
        char('<'),
        map(
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            Token::HexString,
        ),
        char('>'),
    )(input)
}

/// Decode `#XX` escape sequences in a name.
///
/// Invalid sequences are kept verbatim. Decoded bytes that do not form
/// UTF-8 are mapped one byte per character.
///
/// ```
/// # use pdf_graph::lexer::decode_name_escapes;
/// assert_eq!(decode_name_escapes(b"A#20B#23C"), "A B#C");
/// assert_eq!(decode_name_escapes(b"Type"), "Type");
/// assert_eq!(decode_name_escapes(b"A#"), "A#");
/// ```
pub fn decode_name_escapes(raw: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'#' && i + 2 < raw.len() {
            let hex = &raw[i + 1..i + 3];
            if let Some(byte) = std::str::from_utf8(hex)
                .ok()
                .and_then(|h| u8::from_str_radix(h, 16).ok())
            {
                bytes.push(byte);
                i += 3;
                continue;
            }
        }
        bytes.push(raw[i]);
        i += 1;
    }
    String::from_utf8(bytes)
        .unwrap_or_else(|e| e.into_bytes().iter().map(|&b| b as char).collect())
}

/// Parse a name starting with `/`.
fn parse_name(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    preceded(
        char('/'),
        map(take_while(is_regular), |bytes: &[u8]| Token::Name(decode_name_escapes(bytes))),
    )(input)
}

/// Match an alphabetic keyword that must end at a token boundary.
fn keyword<'a>(
    word: &'static [u8],
    tok: Token<'static>,
) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], Token<'a>> {
    move |input: &'a [u8]| {
        let (rest, _) = tag(word)(input)?;
        match rest.first() {
            Some(&c) if is_regular(c) => Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            ))),
            _ => Ok((rest, tok.clone())),
        }
    }
}

/// Parse keywords and delimiters.
///
/// `endstream` is tried before `stream` and `<<` before `<`.
fn parse_keyword(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    alt((
        keyword(b"false", Token::False),
        keyword(b"true", Token::True),
        keyword(b"null", Token::Null),
        keyword(b"obj", Token::ObjStart),
        keyword(b"endobj", Token::ObjEnd),
        keyword(b"endstream", Token::StreamEnd),
        keyword(b"stream", Token::StreamStart),
        keyword(b"R", Token::R),
        value(Token::DictStart, tag(b"<<")),
        value(Token::DictEnd, tag(b">>")),
        value(Token::ArrayStart, tag(b"[")),
        value(Token::ArrayEnd, tag(b"]")),
    ))(input)
}

/// Parse a single token after skipping whitespace and comments.
pub fn token(input: &[u8]) -> IResult<&[u8], Token<'_>> {
    let (input, _) = skip_ws(input)?;

    alt((
        parse_keyword,
        parse_name,
        parse_number,
        parse_literal_string,
        parse_hex_string,
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integers() {
        assert_eq!(token(b"42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(token(b"-123"), Ok((&b""[..], Token::Integer(-123))));
        assert_eq!(token(b"+17"), Ok((&b""[..], Token::Integer(17))));
        assert_eq!(token(b"0"), Ok((&b""[..], Token::Integer(0))));
    }

    #[test]
    fn test_parse_reals_with_implied_digits() {
        assert_eq!(token(b"-2.5"), Ok((&b""[..], Token::Real(-2.5))));
        assert_eq!(token(b".5"), Ok((&b""[..], Token::Real(0.5))));
        assert_eq!(token(b"5."), Ok((&b""[..], Token::Real(5.0))));
        assert_eq!(token(b"-.002"), Ok((&b""[..], Token::Real(-0.002))));
    }

    #[test]
    fn test_parse_number_collapses_extra_decimal_points() {
        assert_eq!(token(b"1.2.3 "), Ok((&b" "[..], Token::Real(1.2))));
        assert_eq!(token(b"0.00.1]"), Ok((&b"]"[..], Token::Real(0.0))));
    }

    #[test]
    fn test_parse_number_overflow_becomes_real() {
        assert_eq!(
            token(b"99999999999999999999"),
            Ok((&b""[..], Token::Real(99999999999999999999.0)))
        );
    }

    #[test]
    fn test_lone_sign_is_not_a_number() {
        assert!(parse_number(b"+").is_err());
        assert!(parse_number(b".").is_err());
    }

    #[test]
    fn test_parse_literal_strings() {
        assert_eq!(token(b"(Hello)"), Ok((&b""[..], Token::LiteralString(b"Hello"))));
        assert_eq!(
            token(b"(Hello (nested) World)"),
            Ok((&b""[..], Token::LiteralString(b"Hello (nested) World")))
        );
        assert_eq!(
            token(b"(a\\) b)"),
            Ok((&b""[..], Token::LiteralString(b"a\\) b")))
        );
        assert_eq!(token(b"()"), Ok((&b""[..], Token::LiteralString(b""))));
    }

    #[test]
    fn test_unbalanced_literal_string_fails_hard() {
        assert!(matches!(token(b"(never closed"), Err(nom::Err::Failure(_))));
    }

    #[test]
    fn test_parse_hex_strings() {
        assert_eq!(token(b"<48656C6C6F>"), Ok((&b""[..], Token::HexString(b"48656C6C6F"))));
        assert_eq!(token(b"<48 65>"), Ok((&b""[..], Token::HexString(b"48 65"))));
        assert_eq!(token(b"<>"), Ok((&b""[..], Token::HexString(b""))));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(token(b"/Type"), Ok((&b""[..], Token::Name("Type".to_string()))));
        assert_eq!(token(b"/A#20B"), Ok((&b""[..], Token::Name("A B".to_string()))));
        assert_eq!(token(b"/A#ZZ"), Ok((&b""[..], Token::Name("A#ZZ".to_string()))));
        assert_eq!(token(b"/Type/Page"), Ok((&b"/Page"[..], Token::Name("Type".to_string()))));
        assert_eq!(token(b"/ "), Ok((&b" "[..], Token::Name(String::new()))));
    }

    #[test]
    fn test_name_with_utf8_escapes() {
        assert_eq!(decode_name_escapes(b"Gr#C3#BC#C3#9Fe"), "Grüße");
        // Not UTF-8: one char per byte
        assert_eq!(decode_name_escapes(b"#E9t#E9"), "\u{e9}t\u{e9}");
    }

    #[test]
    fn test_keywords() {
        assert_eq!(token(b"true"), Ok((&b""[..], Token::True)));
        assert_eq!(token(b"false"), Ok((&b""[..], Token::False)));
        assert_eq!(token(b"null"), Ok((&b""[..], Token::Null)));
        assert_eq!(token(b"obj"), Ok((&b""[..], Token::ObjStart)));
        assert_eq!(token(b"endobj"), Ok((&b""[..], Token::ObjEnd)));
        assert_eq!(token(b"stream\n"), Ok((&b"\n"[..], Token::StreamStart)));
        assert_eq!(token(b"endstream"), Ok((&b""[..], Token::StreamEnd)));
        assert_eq!(token(b"R]"), Ok((&b"]"[..], Token::R)));
    }

    #[test]
    fn test_keyword_requires_boundary() {
        assert!(token(b"nullify").is_err());
        assert!(token(b"RG").is_err());
    }

    #[test]
    fn test_delimiters() {
        assert_eq!(token(b"<<"), Ok((&b""[..], Token::DictStart)));
        assert_eq!(token(b">>"), Ok((&b""[..], Token::DictEnd)));
        assert_eq!(token(b"["), Ok((&b""[..], Token::ArrayStart)));
        assert_eq!(token(b"]"), Ok((&b""[..], Token::ArrayEnd)));
    }

    #[test]
    fn test_skip_whitespace_and_comments() {
        assert_eq!(token(b"  \n\t42"), Ok((&b""[..], Token::Integer(42))));
        assert_eq!(
            token(b"% comment\n% another\r\n  /Name"),
            Ok((&b""[..], Token::Name("Name".to_string())))
        );
    }

    #[test]
    fn test_reference_token_sequence() {
        let (rest, a) = token(b"10 0 R").unwrap();
        let (rest, b) = token(rest).unwrap();
        let (rest, c) = token(rest).unwrap();
        assert_eq!((a, b, c), (Token::Integer(10), Token::Integer(0), Token::R));
        assert!(rest.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn integers_lex_exactly(n in proptest::num::i64::ANY) {
            let text = format!("{} ", n);
            proptest::prop_assert_eq!(token(text.as_bytes()), Ok((&b" "[..], Token::Integer(n))));
        }

        #[test]
        fn number_garbage_never_panics(input in "[-+.0-9]{0,12}") {
            let _ = token(input.as_bytes());
        }
    }
}
