// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # JSON 加速器
//!
//! 基于字节下标的单遍解析器与直接写入 `String` 的序列化器：
//! - 解析结果为带标签的值树 `JsonValue`，对象保留键的插入顺序。
//! - 嵌套深度超过上限时返回 `DepthExceeded`，防止恶意输入耗尽栈空间。
//! - 数字：能放进 `i64` 的整数保持整数，其余按 `f64` 处理；浮点数序列化使用最短往返表示。
//! - 严格模式：值之后出现非空白内容视为语法错误。

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::{Duration, Instant};

use crate::exception::JsonError;

pub const DEFAULT_MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JsonNumber {
    Integer(i64),
    Float(f64),
}

impl JsonNumber {
    pub fn as_f64(&self) -> f64 {
        match *self {
            JsonNumber::Integer(i) => i as f64,
            JsonNumber::Float(f) => f,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            JsonNumber::Integer(i) => Some(i),
            JsonNumber::Float(_) => None,
        }
    }
}

/// 保留插入顺序的 JSON 对象。重复的键保留首次出现的位置，值取最后一次。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonObject {
    entries: Vec<(String, JsonValue)>,
}

impl JsonObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: JsonValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 由解析器产生的键值序列构建对象，键较多时借助哈希表去重。
    fn from_pairs(pairs: Vec<(String, JsonValue)>) -> Self {
        if pairs.len() <= 8 {
            let mut object = Self::new();
            for (k, v) in pairs {
                object.insert(k, v);
            }
            return object;
        }
        let mut index: HashMap<String, usize> = HashMap::with_capacity(pairs.len());
        let mut entries: Vec<(String, JsonValue)> = Vec::with_capacity(pairs.len());
        for (k, v) in pairs {
            match index.get(&k) {
                Some(&i) => entries[i].1 = v,
                None => {
                    index.insert(k.clone(), entries.len());
                    entries.push((k, v));
                }
            }
        }
        Self { entries }
    }
}

impl FromIterator<(String, JsonValue)> for JsonObject {
    fn from_iter<I: IntoIterator<Item = (String, JsonValue)>>(iter: I) -> Self {
        Self::from_pairs(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(JsonNumber),
    String(String),
    Array(Vec<JsonValue>),
    Object(JsonObject),
}

impl JsonValue {
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match self {
            JsonValue::Object(o) => o.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(n) => Some(n.as_f64()),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            JsonValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<JsonValue>> {
        match self {
            JsonValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&JsonObject> {
        match self {
            JsonValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }

    pub fn to_json(&self) -> String {
        serialize(self)
    }
}

impl From<bool> for JsonValue {
    fn from(b: bool) -> Self {
        JsonValue::Bool(b)
    }
}

impl From<i64> for JsonValue {
    fn from(i: i64) -> Self {
        JsonValue::Number(JsonNumber::Integer(i))
    }
}

impl From<u64> for JsonValue {
    fn from(u: u64) -> Self {
        match i64::try_from(u) {
            Ok(i) => JsonValue::Number(JsonNumber::Integer(i)),
            Err(_) => JsonValue::Number(JsonNumber::Float(u as f64)),
        }
    }
}

impl From<f64> for JsonValue {
    fn from(f: f64) -> Self {
        JsonValue::Number(JsonNumber::Float(f))
    }
}

impl From<&str> for JsonValue {
    fn from(s: &str) -> Self {
        JsonValue::String(s.to_string())
    }
}

impl From<String> for JsonValue {
    fn from(s: String) -> Self {
        JsonValue::String(s)
    }
}

impl From<Vec<JsonValue>> for JsonValue {
    fn from(v: Vec<JsonValue>) -> Self {
        JsonValue::Array(v)
    }
}

impl From<JsonObject> for JsonValue {
    fn from(o: JsonObject) -> Self {
        JsonValue::Object(o)
    }
}

/// 以给定的深度上限解析 JSON 文本。
pub fn parse_with_depth(text: &str, max_depth: usize) -> Result<JsonValue, JsonError> {
    let mut parser = Parser {
        text,
        bytes: text.as_bytes(),
        pos: 0,
        depth: 0,
        max_depth,
    };
    parser.skip_whitespace();
    let value = parser.parse_value()?;
    parser.skip_whitespace();
    if parser.pos != parser.bytes.len() {
        return Err(JsonError::syntax(parser.pos));
    }
    Ok(value)
}

pub fn parse(text: &str) -> Result<JsonValue, JsonError> {
    parse_with_depth(text, DEFAULT_MAX_DEPTH)
}

/// 解析原始字节，非法 UTF-8 作为语法错误报告在首个非法字节处。
pub fn parse_bytes(bytes: &[u8], max_depth: usize) -> Result<JsonValue, JsonError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_with_depth(text, max_depth),
        Err(e) => Err(JsonError::syntax(e.valid_up_to())),
    }
}

struct Parser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
    depth: usize,
    max_depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while let Some(b' ' | b'\t' | b'\n' | b'\r') = self.peek() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, byte: u8) -> Result<(), JsonError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(JsonError::syntax(self.pos))
        }
    }

    fn parse_value(&mut self) -> Result<JsonValue, JsonError> {
        match self.peek() {
            Some(b'{') => self.parse_object(),
            Some(b'[') => self.parse_array(),
            Some(b'"') => self.parse_string().map(JsonValue::String),
            Some(b't') => self.parse_literal(b"true", JsonValue::Bool(true)),
            Some(b'f') => self.parse_literal(b"false", JsonValue::Bool(false)),
            Some(b'n') => self.parse_literal(b"null", JsonValue::Null),
            Some(b'-' | b'0'..=b'9') => self.parse_number(),
            _ => Err(JsonError::syntax(self.pos)),
        }
    }

    fn enter(&mut self) -> Result<(), JsonError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(JsonError::depth_exceeded(self.pos));
        }
        Ok(())
    }

    fn parse_object(&mut self) -> Result<JsonValue, JsonError> {
        self.enter()?;
        self.pos += 1;
        let mut pairs = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(JsonValue::Object(JsonObject::new()));
        }
        loop {
            self.skip_whitespace();
            if self.peek() != Some(b'"') {
                return Err(JsonError::syntax(self.pos));
            }
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(b':')?;
            self.skip_whitespace();
            let value = self.parse_value()?;
            pairs.push((key, value));
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(JsonError::syntax(self.pos)),
            }
        }
        self.depth -= 1;
        Ok(JsonValue::Object(JsonObject::from_pairs(pairs)))
    }

    fn parse_array(&mut self) -> Result<JsonValue, JsonError> {
        self.enter()?;
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(b']') {
            self.pos += 1;
            self.depth -= 1;
            return Ok(JsonValue::Array(items));
        }
        loop {
            self.skip_whitespace();
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(JsonError::syntax(self.pos)),
            }
        }
        self.depth -= 1;
        Ok(JsonValue::Array(items))
    }

    fn parse_literal(&mut self, literal: &[u8], value: JsonValue) -> Result<JsonValue, JsonError> {
        if self.bytes[self.pos..].starts_with(literal) {
            self.pos += literal.len();
            Ok(value)
        } else {
            Err(JsonError::syntax(self.pos))
        }
    }

    fn parse_string(&mut self) -> Result<String, JsonError> {
        self.pos += 1;
        let mut out = String::new();
        let mut run_start = self.pos;
        loop {
            let byte = match self.peek() {
                Some(b) => b,
                None => return Err(JsonError::syntax(self.pos)),
            };
            match byte {
                b'"' => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    return Ok(out);
                }
                b'\\' => {
                    out.push_str(&self.text[run_start..self.pos]);
                    self.pos += 1;
                    self.parse_escape(&mut out)?;
                    run_start = self.pos;
                }
                0x00..=0x1f => return Err(JsonError::syntax(self.pos)),
                _ => self.pos += 1,
            }
        }
    }

    fn parse_escape(&mut self, out: &mut String) -> Result<(), JsonError> {
        let escape_pos = self.pos;
        let byte = match self.peek() {
            Some(b) => b,
            None => return Err(JsonError::syntax(self.pos)),
        };
        self.pos += 1;
        match byte {
            b'"' => out.push('"'),
            b'\\' => out.push('\\'),
            b'/' => out.push('/'),
            b'b' => out.push('\u{0008}'),
            b'f' => out.push('\u{000c}'),
            b'n' => out.push('\n'),
            b'r' => out.push('\r'),
            b't' => out.push('\t'),
            b'u' => {
                let first = self.parse_hex4()?;
                let code = if (0xD800..0xDC00).contains(&first) {
                    // 高位代理必须紧跟低位代理
                    if !self.bytes[self.pos..].starts_with(b"\\u") {
                        return Err(JsonError::syntax(escape_pos));
                    }
                    self.pos += 2;
                    let second = self.parse_hex4()?;
                    if !(0xDC00..0xE000).contains(&second) {
                        return Err(JsonError::syntax(escape_pos));
                    }
                    0x10000 + ((first - 0xD800) << 10) + (second - 0xDC00)
                } else if (0xDC00..0xE000).contains(&first) {
                    return Err(JsonError::syntax(escape_pos));
                } else {
                    first
                };
                match char::from_u32(code) {
                    Some(c) => out.push(c),
                    None => return Err(JsonError::syntax(escape_pos)),
                }
            }
            _ => return Err(JsonError::syntax(escape_pos)),
        }
        Ok(())
    }

    fn parse_hex4(&mut self) -> Result<u32, JsonError> {
        let end = self.pos + 4;
        if end > self.bytes.len() {
            return Err(JsonError::syntax(self.pos));
        }
        let mut value = 0u32;
        for &b in &self.bytes[self.pos..end] {
            let digit = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(JsonError::syntax(self.pos)),
            };
            value = (value << 4) | digit as u32;
        }
        self.pos = end;
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<JsonValue, JsonError> {
        let start = self.pos;
        let mut is_float = false;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => self.skip_digits(),
            _ => return Err(JsonError::syntax(self.pos)),
        }
        if self.peek() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(JsonError::syntax(self.pos));
            }
            self.skip_digits();
        }
        if let Some(b'e' | b'E') = self.peek() {
            is_float = true;
            self.pos += 1;
            if let Some(b'+' | b'-') = self.peek() {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(JsonError::syntax(self.pos));
            }
            self.skip_digits();
        }
        let literal = &self.text[start..self.pos];
        if !is_float {
            if let Ok(i) = literal.parse::<i64>() {
                return Ok(JsonValue::Number(JsonNumber::Integer(i)));
            }
        }
        match literal.parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(JsonValue::Number(JsonNumber::Float(f))),
            _ => Err(JsonError::syntax(start)),
        }
    }

    fn skip_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.peek() {
            self.pos += 1;
        }
    }
}

/// 紧凑序列化，对象按插入顺序输出。
pub fn serialize(value: &JsonValue) -> String {
    let mut out = String::with_capacity(128);
    write_value(&mut out, value, None, 0);
    out
}

/// 两空格缩进的格式化输出。
pub fn serialize_pretty(value: &JsonValue) -> String {
    let mut out = String::with_capacity(256);
    write_value(&mut out, value, Some(2), 0);
    out
}

fn write_value(out: &mut String, value: &JsonValue, indent: Option<usize>, level: usize) {
    match value {
        JsonValue::Null => out.push_str("null"),
        JsonValue::Bool(true) => out.push_str("true"),
        JsonValue::Bool(false) => out.push_str("false"),
        JsonValue::Number(n) => write_number(out, n),
        JsonValue::String(s) => write_string(out, s),
        JsonValue::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, indent, level + 1);
                write_value(out, item, indent, level + 1);
            }
            newline(out, indent, level);
            out.push(']');
        }
        JsonValue::Object(object) => {
            if object.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            for (i, (key, item)) in object.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                newline(out, indent, level + 1);
                write_string(out, key);
                out.push(':');
                if indent.is_some() {
                    out.push(' ');
                }
                write_value(out, item, indent, level + 1);
            }
            newline(out, indent, level);
            out.push('}');
        }
    }
}

fn newline(out: &mut String, indent: Option<usize>, level: usize) {
    if let Some(width) = indent {
        out.push('\n');
        for _ in 0..width * level {
            out.push(' ');
        }
    }
}

fn write_number(out: &mut String, number: &JsonNumber) {
    match *number {
        JsonNumber::Integer(i) => {
            let _ = write!(out, "{}", i);
        }
        // Debug 格式给出最短往返表示，且总带有小数点或指数
        JsonNumber::Float(f) if f.is_finite() => {
            let _ = write!(out, "{:?}", f);
        }
        JsonNumber::Float(_) => out.push_str("null"),
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    let bytes = s.as_bytes();
    let mut run_start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        let escaped = match b {
            b'"' => "\\\"",
            b'\\' => "\\\\",
            b'\n' => "\\n",
            b'\r' => "\\r",
            b'\t' => "\\t",
            0x08 => "\\b",
            0x0c => "\\f",
            0x00..=0x1f => "",
            _ => continue,
        };
        out.push_str(&s[run_start..i]);
        if escaped.is_empty() {
            let _ = write!(out, "\\u{:04x}", b);
        } else {
            out.push_str(escaped);
        }
        run_start = i + 1;
    }
    out.push_str(&s[run_start..]);
    out.push('"');
}

/// `benchmark` 的测量结果。
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkResult {
    pub execution_time: Duration,
    pub operations_performed: u64,
    pub ops_per_second: f64,
}

/// 带深度上限配置的 JSON 编解码入口。
#[derive(Debug, Clone, Copy)]
pub struct JsonAccelerator {
    max_depth: usize,
}

impl JsonAccelerator {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn parse(&self, text: &str) -> Result<JsonValue, JsonError> {
        parse_with_depth(text, self.max_depth)
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<JsonValue, JsonError> {
        parse_bytes(bytes, self.max_depth)
    }

    pub fn serialize(&self, value: &JsonValue) -> String {
        serialize(value)
    }

    pub fn serialize_pretty(&self, value: &JsonValue) -> String {
        serialize_pretty(value)
    }

    /// 对 `value` 重复执行 `iterations` 次序列化加解析，返回耗时与吞吐量。
    pub fn benchmark(&self, value: &JsonValue, iterations: u64) -> Result<BenchmarkResult, JsonError> {
        let start = Instant::now();
        for _ in 0..iterations {
            let text = serialize(value);
            std::hint::black_box(self.parse(&text)?);
        }
        let execution_time = start.elapsed();
        let seconds = execution_time.as_secs_f64();
        Ok(BenchmarkResult {
            execution_time,
            operations_performed: iterations,
            ops_per_second: if seconds > 0.0 {
                iterations as f64 / seconds
            } else {
                0.0
            },
        })
    }
}

impl Default for JsonAccelerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::JsonErrorKind;
    use proptest::prelude::*;
    use std::fmt::Write;

    #[test]
    fn test_object_key_order() {
        let value = parse(r#"{"a":1,"b":[1,2,3]}"#).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(value.get("a").unwrap().as_i64(), Some(1));
        assert_eq!(value.get("b").unwrap().as_array().unwrap().len(), 3);
        assert_eq!(serialize(&value), r#"{"a":1,"b":[1,2,3]}"#);
    }

    #[test]
    fn test_insertion_order_is_not_sorted() {
        let value = parse(r#"{"z":true,"m":null,"a":"x"}"#).unwrap();
        assert_eq!(serialize(&value), r#"{"z":true,"m":null,"a":"x"}"#);
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let value = parse(r#"{"a":1,"b":2,"a":3}"#).unwrap();
        assert_eq!(serialize(&value), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn test_duplicate_keys_large_object() {
        let mut text = String::from("{");
        for i in 0..20 {
            let _ = write!(text, "\"k{}\":{},", i, i);
        }
        text.push_str("\"k3\":99}");
        let value = parse(&text).unwrap();
        let object = value.as_object().unwrap();
        assert_eq!(object.len(), 20);
        assert_eq!(object.get("k3").unwrap().as_i64(), Some(99));
        assert_eq!(object.keys().nth(3), Some("k3"));
    }

    #[test]
    fn test_syntax_error_offset() {
        let err = parse(r#"{"a":}"#).unwrap_err();
        assert_eq!(err.kind, JsonErrorKind::Syntax);
        assert_eq!(err.offset, 5);

        let err = parse("[1,2,]").unwrap_err();
        assert_eq!(err.offset, 5);

        let err = parse("").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_trailing_content_rejected() {
        let err = parse("{} x").unwrap_err();
        assert_eq!(err.kind, JsonErrorKind::Syntax);
        assert_eq!(err.offset, 3);
        assert!(parse("  [1]  \n").is_ok());
    }

    #[test]
    fn test_depth_exceeded() {
        let deep = "[".repeat(101) + &"]".repeat(101);
        let err = parse(&deep).unwrap_err();
        assert_eq!(err.kind, JsonErrorKind::DepthExceeded);

        let ok = "[".repeat(100) + &"]".repeat(100);
        assert!(parse(&ok).is_ok());

        let accel = JsonAccelerator::new(2);
        assert!(accel.parse(r#"{"a":[1]}"#).is_ok());
        assert_eq!(
            accel.parse(r#"{"a":[[1]]}"#).unwrap_err().kind,
            JsonErrorKind::DepthExceeded
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse("0").unwrap().as_i64(), Some(0));
        assert_eq!(parse("-42").unwrap().as_i64(), Some(-42));
        assert_eq!(parse("1.5").unwrap().as_f64(), Some(1.5));
        assert_eq!(parse("1e3").unwrap().as_f64(), Some(1000.0));
        assert_eq!(parse("9223372036854775807").unwrap().as_i64(), Some(i64::MAX));
        // 超出 i64 的整数退化为浮点数
        assert_eq!(
            parse("9223372036854775808").unwrap().as_f64(),
            Some(9223372036854775808.0)
        );
        assert!(parse("01").is_err());
        assert!(parse("1.").is_err());
        assert!(parse("-").is_err());
        assert!(parse("1e400").is_err());
    }

    #[test]
    fn test_float_serialization_round_trips() {
        for f in [0.1, 1.0, -2.5, 1e300, 1e-7, 123456.789, f64::MIN_POSITIVE] {
            let text = serialize(&JsonValue::from(f));
            assert_eq!(parse(&text).unwrap().as_f64(), Some(f), "{}", text);
        }
        assert_eq!(serialize(&JsonValue::from(1.0)), "1.0");
        assert_eq!(serialize(&JsonValue::from(f64::NAN)), "null");
    }

    #[test]
    fn test_string_escapes() {
        let value = parse(r#""a\"b\\c\/d\n\té😀""#).unwrap();
        assert_eq!(value.as_str(), Some("a\"b\\c/d\n\té😀"));
        assert_eq!(
            serialize(&JsonValue::from("q\"\\\n\u{1}")),
            r#""q\"\\\n\u0001""#
        );
        assert_eq!(serialize(&JsonValue::from("中文")), "\"中文\"");
    }

    #[test]
    fn test_invalid_strings() {
        assert!(parse("\"abc").is_err());
        assert!(parse("\"a\u{1}b\"").is_err());
        assert!(parse(r#""\x""#).is_err());
        assert!(parse(r#""\ud800""#).is_err());
        assert!(parse(r#""\udc00""#).is_err());
        assert!(parse(r#""\u12g4""#).is_err());
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse("true").unwrap(), JsonValue::Bool(true));
        assert_eq!(parse("false").unwrap(), JsonValue::Bool(false));
        assert!(parse("null").unwrap().is_null());
        assert!(parse("nul").is_err());
        assert!(parse("True").is_err());
    }

    #[test]
    fn test_parse_bytes_invalid_utf8() {
        let err = parse_bytes(b"[\"\xff\"]", 10).unwrap_err();
        assert_eq!(err.kind, JsonErrorKind::Syntax);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_pretty() {
        let value = parse(r#"{"a":[1,2],"b":{},"c":[]}"#).unwrap();
        let expected = "{\n  \"a\": [\n    1,\n    2\n  ],\n  \"b\": {},\n  \"c\": []\n}";
        assert_eq!(serialize_pretty(&value), expected);
        assert_eq!(parse(expected).unwrap(), value);
    }

    #[test]
    fn test_benchmark() {
        let accel = JsonAccelerator::default();
        let value = parse(r#"{"users":[{"id":1,"name":"a"},{"id":2,"name":"b"}]}"#).unwrap();
        let result = accel.benchmark(&value, 50).unwrap();
        assert_eq!(result.operations_performed, 50);
        assert!(result.ops_per_second > 0.0);
    }

    #[test]
    fn test_benchmark_depth_limited() {
        let accel = JsonAccelerator::new(1);
        let value = parse("[[1]]").unwrap();
        assert!(accel.benchmark(&value, 1).is_err());
    }

    fn arb_json() -> impl Strategy<Value = JsonValue> {
        let leaf = prop_oneof![
            Just(JsonValue::Null),
            any::<bool>().prop_map(JsonValue::Bool),
            any::<i64>().prop_map(JsonValue::from),
            (-1e12f64..1e12f64).prop_map(JsonValue::from),
            "\\PC{0,12}".prop_map(JsonValue::String),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(JsonValue::Array),
                prop::collection::vec(("[a-z]{1,6}", inner), 0..6)
                    .prop_map(|pairs| JsonValue::Object(pairs.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_round_trip_is_idempotent(value in arb_json()) {
            let first = parse(&serialize(&value)).unwrap();
            let second = parse(&serialize(&first)).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, value);
        }

        #[test]
        fn prop_pretty_and_compact_agree(value in arb_json()) {
            prop_assert_eq!(parse(&serialize_pretty(&value)).unwrap(), parse(&serialize(&value)).unwrap());
        }
    }
}
