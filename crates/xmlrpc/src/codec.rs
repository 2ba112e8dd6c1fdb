//! XML-RPC wire encoding.
//!
//! Requests are written directly into a `String`. Responses are tokenized with
//! `quick-xml` and then walked by a small recursive-descent parser, which keeps
//! the grammar (`value`, `struct`, `array`, `fault`) readable in one place.

use std::collections::BTreeMap;
use std::iter::Peekable;
use std::vec::IntoIter;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use quick_xml::Reader;
use quick_xml::escape::escape;
use quick_xml::events::Event;

use crate::error::XmlRpcError;
use crate::value::Value;

/// Encodes a `methodCall` document.
pub fn encode_call(method: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(128 + params.len() * 64);
    out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    out.push_str("<methodCall><methodName>");
    out.push_str(&escape(method));
    out.push_str("</methodName><params>");
    for param in params {
        out.push_str("<param>");
        write_value(&mut out, param);
        out.push_str("</param>");
    }
    out.push_str("</params></methodCall>");
    out
}

fn write_value(out: &mut String, value: &Value) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => {
            // i4 is the only integer type every server understands.
            let tag = if i32::try_from(*i).is_ok() { "int" } else { "i8" };
            push_scalar(out, tag, &i.to_string());
        }
        Value::Bool(b) => push_scalar(out, "boolean", if *b { "1" } else { "0" }),
        Value::String(s) => push_scalar(out, "string", &escape(s.as_str())),
        Value::Double(d) => push_scalar(out, "double", &d.to_string()),
        Value::DateTime(s) => push_scalar(out, "dateTime.iso8601", &escape(s.as_str())),
        Value::Base64(bytes) => push_scalar(out, "base64", &BASE64.encode(bytes)),
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, member);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item);
            }
            out.push_str("</data></array>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

fn push_scalar(out: &mut String, tag: &str, text: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(text);
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Decodes a `methodResponse` document.
///
/// A `<fault>` response is returned as [`XmlRpcError::Fault`].
pub fn decode_response(xml: &str) -> Result<Value, XmlRpcError> {
    let mut parser = Parser::new(tokenize(xml)?);

    parser.expect_open("methodResponse")?;
    let result = match parser.next_significant() {
        Some(Token::Open(tag)) if tag == "params" => {
            let value = if parser.at_close("params") {
                Value::Nil
            } else {
                parser.expect_open("param")?;
                let value = parser.parse_value()?;
                parser.expect_close("param")?;
                value
            };
            parser.expect_close("params")?;
            Ok(value)
        }
        Some(Token::Empty(tag)) if tag == "params" => Ok(Value::Nil),
        Some(Token::Open(tag)) if tag == "fault" => {
            let fault = parser.parse_value()?;
            parser.expect_close("fault")?;
            Err(into_fault(fault))
        }
        other => {
            return Err(XmlRpcError::Parse(format!(
                "expected <params> or <fault>, found {}",
                describe(other.as_ref())
            )));
        }
    };
    parser.expect_close("methodResponse")?;
    result
}

fn into_fault(mut fault: Value) -> XmlRpcError {
    let code = fault.take_member::<i64>("faultCode");
    let message = fault.take_member::<String>("faultString");
    match (code, message) {
        (Ok(code), Ok(message)) => XmlRpcError::Fault { code, message },
        _ => XmlRpcError::Parse("fault without faultCode/faultString".into()),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open(String),
    Close(String),
    Empty(String),
    Text(String),
}

fn describe(token: Option<&Token>) -> String {
    match token {
        Some(Token::Open(tag)) => format!("<{tag}>"),
        Some(Token::Close(tag)) => format!("</{tag}>"),
        Some(Token::Empty(tag)) => format!("<{tag}/>"),
        Some(Token::Text(text)) => format!("text {text:?}"),
        None => "end of document".into(),
    }
}

fn parse_err(e: impl std::fmt::Display) -> XmlRpcError {
    XmlRpcError::Parse(e.to_string())
}

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn tokenize(xml: &str) -> Result<Vec<Token>, XmlRpcError> {
    let mut reader = Reader::from_str(xml);
    let mut tokens: Vec<Token> = Vec::new();

    loop {
        let token = match reader.read_event().map_err(parse_err)? {
            Event::Start(e) => Token::Open(tag_name(e.local_name().as_ref())),
            Event::End(e) => Token::Close(tag_name(e.local_name().as_ref())),
            Event::Empty(e) => Token::Empty(tag_name(e.local_name().as_ref())),
            Event::Text(t) => Token::Text(t.unescape().map_err(parse_err)?.into_owned()),
            Event::CData(c) => Token::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
            Event::Eof => break,
            _ => continue,
        };

        // Coalesce text split across CDATA sections or entity boundaries.
        if let Token::Text(more) = &token {
            if let Some(Token::Text(prev)) = tokens.last_mut() {
                prev.push_str(more);
                continue;
            }
        }
        tokens.push(token);
    }

    Ok(tokens)
}

/// Maximum nesting of structs and arrays in one response.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens: tokens.into_iter().peekable(),
            depth: 0,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(Token::Text(text)) = self.tokens.peek() {
            if !text.trim().is_empty() {
                break;
            }
            self.tokens.next();
        }
    }

    fn next_significant(&mut self) -> Option<Token> {
        self.skip_whitespace();
        self.tokens.next()
    }

    fn at_close(&mut self, tag: &str) -> bool {
        self.skip_whitespace();
        matches!(self.tokens.peek(), Some(Token::Close(t)) if t == tag)
    }

    fn expect_open(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next_significant() {
            Some(Token::Open(t)) if t == tag => Ok(()),
            other => Err(XmlRpcError::Parse(format!(
                "expected <{tag}>, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn expect_close(&mut self, tag: &str) -> Result<(), XmlRpcError> {
        match self.next_significant() {
            Some(Token::Close(t)) if t == tag => Ok(()),
            other => Err(XmlRpcError::Parse(format!(
                "expected </{tag}>, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    /// Reads the text content of an already-opened element through its close tag.
    fn read_text(&mut self, tag: &str) -> Result<String, XmlRpcError> {
        let text = match self.tokens.peek() {
            Some(Token::Text(_)) => match self.tokens.next() {
                Some(Token::Text(text)) => text,
                _ => String::new(),
            },
            _ => String::new(),
        };
        match self.tokens.next() {
            Some(Token::Close(t)) if t == tag => Ok(text),
            other => Err(XmlRpcError::Parse(format!(
                "expected text in <{tag}>, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_value(&mut self) -> Result<Value, XmlRpcError> {
        match self.next_significant() {
            Some(Token::Empty(tag)) if tag == "value" => Ok(Value::String(String::new())),
            Some(Token::Open(tag)) if tag == "value" => {
                let text = match self.tokens.peek() {
                    Some(Token::Text(_)) => match self.tokens.next() {
                        Some(Token::Text(text)) => text,
                        _ => String::new(),
                    },
                    _ => String::new(),
                };

                // An untyped value is a string, whitespace included.
                if let Some(Token::Close(t)) = self.tokens.peek() {
                    if t == "value" {
                        self.tokens.next();
                        return Ok(Value::String(text));
                    }
                }
                if !text.trim().is_empty() {
                    return Err(XmlRpcError::Parse(format!(
                        "unexpected text {text:?} before typed value"
                    )));
                }

                let value = self.parse_typed()?;
                self.expect_close("value")?;
                Ok(value)
            }
            other => Err(XmlRpcError::Parse(format!(
                "expected <value>, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_typed(&mut self) -> Result<Value, XmlRpcError> {
        match self.next_significant() {
            Some(Token::Empty(tag)) => match tag.as_str() {
                "string" => Ok(Value::String(String::new())),
                "nil" => Ok(Value::Nil),
                "struct" => Ok(Value::Struct(BTreeMap::new())),
                "array" => Ok(Value::Array(Vec::new())),
                "base64" => Ok(Value::Base64(Vec::new())),
                other => Err(XmlRpcError::Parse(format!("empty <{other}/> has no value"))),
            },
            Some(Token::Open(tag)) => match tag.as_str() {
                "i4" | "int" | "i8" => {
                    let text = self.read_text(&tag)?;
                    text.trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|e| XmlRpcError::Parse(format!("bad <{tag}> {text:?}: {e}")))
                }
                "boolean" => {
                    let text = self.read_text(&tag)?;
                    match text.trim() {
                        "1" | "true" => Ok(Value::Bool(true)),
                        "0" | "false" => Ok(Value::Bool(false)),
                        other => Err(XmlRpcError::Parse(format!("bad <boolean> {other:?}"))),
                    }
                }
                "string" => self.read_text(&tag).map(Value::String),
                "double" => {
                    let text = self.read_text(&tag)?;
                    text.trim()
                        .parse::<f64>()
                        .map(Value::Double)
                        .map_err(|e| XmlRpcError::Parse(format!("bad <double> {text:?}: {e}")))
                }
                "dateTime.iso8601" => {
                    let text = self.read_text(&tag)?;
                    Ok(Value::DateTime(text.trim().to_string()))
                }
                "base64" => {
                    let text = self.read_text(&tag)?;
                    let compact: String = text.split_whitespace().collect();
                    BASE64
                        .decode(compact)
                        .map(Value::Base64)
                        .map_err(|e| XmlRpcError::Parse(format!("bad <base64>: {e}")))
                }
                "nil" => {
                    self.expect_close("nil")?;
                    Ok(Value::Nil)
                }
                "struct" => self.nested(Self::parse_struct),
                "array" => self.nested(Self::parse_array),
                other => Err(XmlRpcError::Parse(format!("unknown value type <{other}>"))),
            },
            other => Err(XmlRpcError::Parse(format!(
                "expected typed value, found {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Value, XmlRpcError>,
    ) -> Result<Value, XmlRpcError> {
        if self.depth >= MAX_DEPTH {
            return Err(XmlRpcError::Parse(format!(
                "nesting too deep (limit {MAX_DEPTH})"
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_struct(&mut self) -> Result<Value, XmlRpcError> {
        let mut members = BTreeMap::new();
        loop {
            match self.next_significant() {
                Some(Token::Close(tag)) if tag == "struct" => break,
                Some(Token::Open(tag)) if tag == "member" => {
                    let name = match self.next_significant() {
                        Some(Token::Open(t)) if t == "name" => self.read_text("name")?,
                        Some(Token::Empty(t)) if t == "name" => String::new(),
                        other => {
                            return Err(XmlRpcError::Parse(format!(
                                "expected <name>, found {}",
                                describe(other.as_ref())
                            )));
                        }
                    };
                    let value = self.parse_value()?;
                    self.expect_close("member")?;
                    members.insert(name, value);
                }
                other => {
                    return Err(XmlRpcError::Parse(format!(
                        "expected <member>, found {}",
                        describe(other.as_ref())
                    )));
                }
            }
        }
        Ok(Value::Struct(members))
    }

    fn parse_array(&mut self) -> Result<Value, XmlRpcError> {
        let mut items = Vec::new();
        match self.next_significant() {
            Some(Token::Empty(tag)) if tag == "data" => {}
            Some(Token::Open(tag)) if tag == "data" => {
                while !self.at_close("data") {
                    items.push(self.parse_value()?);
                }
                self.expect_close("data")?;
            }
            other => {
                return Err(XmlRpcError::Parse(format!(
                    "expected <data>, found {}",
                    describe(other.as_ref())
                )));
            }
        }
        self.expect_close("array")?;
        Ok(Value::Array(items))
    }
}
