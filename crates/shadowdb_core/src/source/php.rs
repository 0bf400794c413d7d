//! Values written by PHP's `serialize()`.
//!
//! WordPress stores array and object metadata serialized. Scalars (`N`,
//! `b`, `i`, `d`, `s`) and arrays are decoded; a list keyed `0..n` becomes a
//! JSON array and any other array an object. Objects, references and
//! anything malformed are left for the caller to keep as text.

use serde_json::{Map, Number, Value};
use std::str::FromStr;

const MAX_DEPTH: usize = 64;

/// Decodes a complete serialized value, or returns `None`.
pub(crate) fn unserialize(raw: &str) -> Option<Value> {
    let mut parser = Parser {
        input: raw.trim().as_bytes(),
        pos: 0,
    };
    let value = parser.value(0)?;
    (parser.pos == parser.input.len()).then_some(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn value(&mut self, depth: usize) -> Option<Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        let tag = self.next()?;
        if tag == b'N' {
            self.expect(b';')?;
            return Some(Value::Null);
        }
        self.expect(b':')?;
        match tag {
            b'b' => match self.until(b';')? {
                b"0" => Some(Value::Bool(false)),
                b"1" => Some(Value::Bool(true)),
                _ => None,
            },
            b'i' => self.number::<i64>(b';').map(Value::from),
            b'd' => self.number::<f64>(b';').and_then(Number::from_f64).map(Value::Number),
            b's' => {
                let s = self.string()?;
                self.expect(b';')?;
                Some(Value::String(s))
            }
            b'a' => self.array(depth),
            _ => None,
        }
    }

    fn array(&mut self, depth: usize) -> Option<Value> {
        let len = self.number::<usize>(b':')?;
        self.expect(b'{')?;
        let mut entries = Vec::with_capacity(len.min(64));
        for _ in 0..len {
            let key = match self.next()? {
                b'i' => {
                    self.expect(b':')?;
                    self.number::<i64>(b';')?.to_string()
                }
                b's' => {
                    self.expect(b':')?;
                    let key = self.string()?;
                    self.expect(b';')?;
                    key
                }
                _ => return None,
            };
            entries.push((key, self.value(depth + 1)?));
        }
        self.expect(b'}')?;

        let is_list = entries
            .iter()
            .enumerate()
            .all(|(i, (key, _))| *key == i.to_string());
        Some(if is_list {
            Value::Array(entries.into_iter().map(|(_, v)| v).collect())
        } else {
            Value::Object(entries.into_iter().collect::<Map<_, _>>())
        })
    }

    /// `<byte length>:"<bytes>"`
    fn string(&mut self) -> Option<String> {
        let len = self.number::<usize>(b':')?;
        self.expect(b'"')?;
        let input = self.input;
        let end = self.pos.checked_add(len)?;
        let bytes = input.get(self.pos..end)?;
        self.pos = end;
        self.expect(b'"')?;
        String::from_utf8(bytes.to_vec()).ok()
    }

    fn number<T: FromStr>(&mut self, end: u8) -> Option<T> {
        std::str::from_utf8(self.until(end)?).ok()?.parse().ok()
    }

    /// Returns the bytes before `end` and moves past it.
    fn until(&mut self, end: u8) -> Option<&'a [u8]> {
        let input = self.input;
        let rest = input.get(self.pos..)?;
        let len = rest.iter().position(|&b| b == end)?;
        self.pos += len + 1;
        Some(&rest[..len])
    }

    fn next(&mut self) -> Option<u8> {
        let byte = *self.input.get(self.pos)?;
        self.pos += 1;
        Some(byte)
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        (self.next()? == byte).then_some(())
    }
}
