//! Text codec for PostgreSQL `hstore` values
//!
//! Hstore parameters are sent as text and cast server-side (`$1::hstore`),
//! and hstore columns are read back through `::text`, so the mapping layer
//! only ever sees the external text form:
//!
//! ```text
//! "en"=>"hello", "fr"=>"bonjour", "draft"=>NULL
//! ```

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::str::CharIndices;

use crate::error::{MappingError, MappingResult};

/// Encode key/value pairs into hstore text. `None` values are written as `NULL`.
pub fn encode<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut out = String::new();
    for (i, (key, value)) in pairs.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_quoted(&mut out, key);
        out.push_str("=>");
        match value {
            Some(value) => push_quoted(&mut out, value),
            None => out.push_str("NULL"),
        }
    }
    out
}

/// Encode a map without NULL values
pub fn encode_map(map: &BTreeMap<String, String>) -> String {
    encode(map.iter().map(|(k, v)| (k.as_str(), Some(v.as_str()))))
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

/// Decode hstore text. The first occurrence of a duplicated key wins.
pub fn decode(input: &str) -> MappingResult<BTreeMap<String, Option<String>>> {
    let mut parser = Parser::new(input);
    let mut map = BTreeMap::new();

    parser.skip_whitespace();
    if parser.at_end() {
        return Ok(map);
    }

    loop {
        let (key, _) = parser.token(true)?;
        parser.skip_whitespace();
        parser.arrow()?;
        parser.skip_whitespace();
        let (raw, quoted) = parser.token(false)?;
        let value = if !quoted && raw.eq_ignore_ascii_case("NULL") {
            None
        } else {
            Some(raw)
        };
        map.entry(key).or_insert(value);

        parser.skip_whitespace();
        match parser.chars.next() {
            None => break,
            Some((_, ',')) => parser.skip_whitespace(),
            Some((position, _)) => {
                return Err(MappingError::HstoreSyntax {
                    position,
                    reason: "expected ',' between pairs",
                })
            }
        }
    }

    Ok(map)
}

/// Decode hstore text into a map that cannot hold NULL values
pub fn decode_map(input: &str) -> MappingResult<BTreeMap<String, String>> {
    decode(input)?
        .into_iter()
        .map(|(key, value)| match value {
            Some(value) => Ok((key, value)),
            None => Err(MappingError::NullHstoreValue { key }),
        })
        .collect()
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }

    fn position(&mut self) -> usize {
        match self.chars.peek() {
            Some((i, _)) => *i,
            None => self.input.len(),
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some((_, c)) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn arrow(&mut self) -> MappingResult<()> {
        for expected in ['=', '>'] {
            match self.chars.next() {
                Some((_, c)) if c == expected => {}
                Some((position, _)) => {
                    return Err(MappingError::HstoreSyntax {
                        position,
                        reason: "expected '=>'",
                    })
                }
                None => {
                    return Err(MappingError::HstoreSyntax {
                        position: self.input.len(),
                        reason: "expected '=>'",
                    })
                }
            }
        }
        Ok(())
    }

    /// Read a quoted or bare token. Returns the unescaped text and whether it was quoted.
    fn token(&mut self, is_key: bool) -> MappingResult<(String, bool)> {
        let start = self.position();
        let mut out = String::new();

        if matches!(self.chars.peek(), Some((_, '"'))) {
            self.chars.next();
            loop {
                match self.chars.next() {
                    Some((_, '"')) => return Ok((out, true)),
                    Some((_, '\\')) => out.push(self.escaped()?),
                    Some((_, c)) => out.push(c),
                    None => {
                        return Err(MappingError::HstoreSyntax {
                            position: self.input.len(),
                            reason: "unterminated quoted string",
                        })
                    }
                }
            }
        }

        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == '"' || (is_key && c == '=') {
                break;
            }
            self.chars.next();
            if c == '\\' {
                out.push(self.escaped()?);
            } else {
                out.push(c);
            }
        }

        if out.is_empty() {
            return Err(MappingError::HstoreSyntax {
                position: start,
                reason: if is_key { "expected a key" } else { "expected a value" },
            });
        }
        Ok((out, false))
    }

    fn escaped(&mut self) -> MappingResult<char> {
        match self.chars.next() {
            Some((_, c)) => Ok(c),
            None => Err(MappingError::HstoreSyntax {
                position: self.input.len(),
                reason: "dangling escape",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translations() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("en".to_string(), "hello".to_string()),
            ("fr".to_string(), "bonjour".to_string()),
        ])
    }

    #[test]
    fn test_encode_translations() {
        assert_eq!(
            encode_map(&translations()),
            r#""en"=>"hello", "fr"=>"bonjour""#
        );
    }

    #[test]
    fn test_encode_empty_map() {
        assert_eq!(encode_map(&BTreeMap::new()), "");
        assert!(decode("").unwrap().is_empty());
        assert!(decode("   ").unwrap().is_empty());
    }

    #[test]
    fn test_encode_escapes_quotes_and_backslashes() {
        let encoded = encode([(r#"say "hi""#, Some(r"C:\temp"))]);
        assert_eq!(encoded, r#""say \"hi\""=>"C:\\temp""#);

        let decoded = decode_map(&encoded).unwrap();
        assert_eq!(decoded.get(r#"say "hi""#).map(String::as_str), Some(r"C:\temp"));
    }

    #[test]
    fn test_encode_null_value() {
        assert_eq!(encode([("draft", None)]), r#""draft"=>NULL"#);
    }

    #[test]
    fn test_decode_server_output() {
        let decoded = decode_map(r#""en"=>"hello", "fr"=>"bonjour""#).unwrap();
        assert_eq!(decoded, translations());
    }

    #[test]
    fn test_decode_bare_tokens_and_null() {
        let decoded = decode("a=>1 ,b => NULL,c=>null").unwrap();
        assert_eq!(decoded.get("a"), Some(&Some("1".to_string())));
        assert_eq!(decoded.get("b"), Some(&None));
        assert_eq!(decoded.get("c"), Some(&None));
    }

    #[test]
    fn test_quoted_null_is_a_string() {
        let decoded = decode(r#""k"=>"NULL""#).unwrap();
        assert_eq!(decoded.get("k"), Some(&Some("NULL".to_string())));
    }

    #[test]
    fn test_first_duplicate_key_wins() {
        let decoded = decode_map(r#""k"=>"first", "k"=>"second""#).unwrap();
        assert_eq!(decoded.get("k").map(String::as_str), Some("first"));
    }

    #[test]
    fn test_unicode_round_trip() {
        let map = BTreeMap::from([("ja".to_string(), "こんにちは".to_string())]);
        assert_eq!(decode_map(&encode_map(&map)).unwrap(), map);
    }

    #[test]
    fn test_decode_map_rejects_null() {
        let err = decode_map(r#""en"=>NULL"#).unwrap_err();
        assert_eq!(err, MappingError::NullHstoreValue { key: "en".into() });
    }

    #[test]
    fn test_missing_value_reports_position() {
        let err = decode(r#""a"=>"#).unwrap_err();
        assert_eq!(
            err,
            MappingError::HstoreSyntax {
                position: 5,
                reason: "expected a value"
            }
        );
    }

    #[test]
    fn test_broken_arrow_reports_position() {
        let err = decode(r#""a"="b""#).unwrap_err();
        assert_eq!(
            err,
            MappingError::HstoreSyntax {
                position: 4,
                reason: "expected '=>'"
            }
        );
    }

    #[test]
    fn test_missing_comma_reports_position() {
        let err = decode(r#""a"=>"b" "c"=>"d""#).unwrap_err();
        assert_eq!(
            err,
            MappingError::HstoreSyntax {
                position: 9,
                reason: "expected ',' between pairs"
            }
        );
    }

    #[test]
    fn test_unterminated_string() {
        let err = decode(r#""a"#).unwrap_err();
        assert_eq!(
            err,
            MappingError::HstoreSyntax {
                position: 2,
                reason: "unterminated quoted string"
            }
        );
    }

    #[test]
    fn test_trailing_comma_is_rejected() {
        let err = decode(r#""a"=>"b","#).unwrap_err();
        assert!(matches!(
            err,
            MappingError::HstoreSyntax {
                reason: "expected a key",
                ..
            }
        ));
    }
}
