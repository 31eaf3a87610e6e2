//! Literal parsing for `==` / `!=` guard rules

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value a comparison rule expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Null,
    Number(f64),
    String(String),
}

impl Literal {
    /// Parses rule text after the operator. Surrounding whitespace is
    /// ignored; `true`/`false`/`null` and anything fully numeric never stay
    /// strings, so `"0"` parses as the number zero.
    pub fn parse(raw: &str) -> Self {
        let value = raw.trim();

        match value {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            "null" => Self::Null,
            _ => match parse_number(value) {
                Some(n) => Self::Number(n),
                None => Self::String(value.to_string()),
            },
        }
    }

    /// Strict equality against a resolved document value. An unresolved
    /// path equals nothing, including `null`.
    pub fn strictly_equals(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else {
            return false;
        };

        match (self, actual) {
            (Self::Bool(expected), Value::Bool(b)) => expected == b,
            (Self::Null, Value::Null) => true,
            (Self::Number(expected), Value::Number(n)) => {
                n.as_f64().is_some_and(|n| n == *expected)
            }
            (Self::String(expected), Value::String(s)) => expected == s,
            _ => false,
        }
    }

    /// JSON form for reporting. Non-finite numbers have no JSON encoding and
    /// are reported by name.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Null => Value::Null,
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(non_finite_name(*n).to_string())),
            Self::String(s) => Value::String(s.clone()),
        }
    }
}

fn non_finite_name(n: f64) -> &'static str {
    if n.is_nan() {
        "NaN"
    } else if n > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

/// Numeric literal grammar used for rule operands: optional sign, decimal
/// digits with optional fraction and exponent, `Infinity`, or unsigned
/// `0x`/`0o`/`0b` integers. Returns `None` for the empty string and for
/// anything that does not denote a number.
pub fn parse_number(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }

    if let Some(n) = parse_radix_integer(text) {
        return Some(n);
    }

    let (sign, unsigned) = match text.as_bytes()[0] {
        b'+' => (1.0, &text[1..]),
        b'-' => (-1.0, &text[1..]),
        _ => (1.0, text),
    };

    if unsigned == "Infinity" {
        return Some(sign * f64::INFINITY);
    }

    if !is_decimal_literal(unsigned) {
        return None;
    }

    unsigned.parse::<f64>().ok().map(|n| sign * n)
}

fn parse_radix_integer(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();

    if bytes.len() < 3 || bytes[0] != b'0' {
        return None;
    }

    let radix = match bytes[1] {
        b'x' | b'X' => 16,
        b'o' | b'O' => 8,
        b'b' | b'B' => 2,
        _ => return None,
    };

    text[2..].chars().try_fold(0f64, |acc, c| {
        c.to_digit(radix).map(|d| acc * radix as f64 + d as f64)
    })
}

/// digits [ "." digits? ] [ exponent ] | "." digits [ exponent ]
fn is_decimal_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;

    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;

    let mut frac_digits = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }

    if int_digits == 0 && frac_digits == 0 {
        return false;
    }

    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }

    i == bytes.len()
}
