//! Placeholder filter pipeline (`{0|div(10)|fixed(1)|suffix(mm)}`)
//!
//! Filters that do not apply to the current value leave it unchanged.
//! Unknown filters are ignored.

use std::f64::consts::PI;

/// Upper bound for width and precision arguments
const MAX_WIDTH: f64 = 64.0;

/// Intermediate value flowing through a filter chain
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    pub fn render(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Text(s) => s.clone(),
        }
    }
}

/// Integers print without a fractional part
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Apply a `|`-separated filter chain
pub fn apply_filters(value: Value, chain: &str) -> Value {
    chain
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .fold(value, |current, step| {
            let (name, arg) = split_step(step);
            apply_step(current, name, arg)
        })
}

fn split_step(step: &str) -> (&str, &str) {
    match (step.find('('), step.strip_suffix(')')) {
        (Some(open), Some(body)) if open < body.len() =>(&step[..open], &body[open + 1..]),
        _ => (step, ""),
    }
}

fn unquote(arg: &str) -> &str {
    let arg = arg.strip_prefix(['\'', '"']).unwrap_or(arg);
    arg.strip_suffix(['\'', '"']).unwrap_or(arg)
}

fn apply_step(current: Value, name: &str, arg: &str) -> Value {
    let num_arg = arg.trim().parse::<f64>().ok().filter(|f| f.is_finite());
    let width_arg = num_arg.map(|w| w.min(MAX_WIDTH));

    match name {
        "scale" | "mul" => match (current.as_number(), num_arg) {
            (Some(n), Some(f)) => Value::Number(n * f),
            _ => current,
        },
        "div" => match (current.as_number(), num_arg) {
            (Some(n), Some(d)) if d != 0.0 => Value::Number(n / d),
            _ => current,
        },
        "round" => match current.as_number() {
            Some(n) => match width_arg.filter(|d| *d >= 0.0) {
                Some(digits) => {
                    let p = 10f64.powi(digits as i32);
                    Value::Number((n * p).round() / p)
                }
                None => Value::Number(n.round()),
            },
            None => current,
        },
        "fixed" => match (current.as_number(), width_arg) {
            (Some(n), Some(d)) if d >= 0.0 => Value::Text(format!("{:.*}", d as usize, n)),
            _ => current,
        },
        "prefix" => Value::Text(format!("{}{}", unquote(arg), current.render())),
        "suffix" => Value::Text(format!("{}{}", current.render(), unquote(arg))),
        "unit" => match (current.as_number(), unit_factor(unquote(arg))) {
            (Some(n), Some(f)) => Value::Number(n * f),
            _ => current,
        },
        "highByte" => match current.as_number() {
            Some(n) => Value::Number((((n as i64) >> 8) & 0xFF) as f64),
            None => current,
        },
        "lowByte" => match current.as_number() {
            Some(n) => Value::Number(((n as i64) & 0xFF) as f64),
            None => current,
        },
        "hex" => match current.as_number() {
            Some(n) => {
                let digits = format!("{:X}", (n.trunc() as i64).unsigned_abs());
                let width = width_arg.filter(|w| *w > 0.0).map(|w| w as usize).unwrap_or(0);
                Value::Text(format!("{:0>width$}", digits, width = width))
            }
            None => current,
        },
        "zpad" => match width_arg.filter(|w| *w > 0.0) {
            Some(w) => Value::Text(format!("{:0>width$}", current.render(), width = w as usize)),
            None => current,
        },
        "ascii" => ascii(current),
        _ => current,
    }
}

fn unit_factor(mapping: &str) -> Option<f64> {
    let factor = match mapping {
        "ms->s" | "us->ms" | "mm->m" => 0.001,
        "s->ms" | "ms->us" | "m->mm" => 1000.0,
        "mm->cm" => 0.1,
        "cm->mm" => 10.0,
        "cm->m" => 0.01,
        "m->cm" => 100.0,
        "deg->rad" => PI / 180.0,
        "rad->deg" => 180.0 / PI,
        _ => return None,
    };
    Some(factor)
}

/// Byte value(s) to characters. A single value above 255 is split into its
/// four big-endian bytes, dropping NULs.
fn ascii(current: Value) -> Value {
    let text = current.render();
    let parts: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.len() > 1 {
        let out: String = parts
            .iter()
            .filter_map(|p| p.parse::<u32>().ok())
            .filter(|b| *b <= 255)
            .map(|b| b as u8 as char)
            .collect();
        return Value::Text(out);
    }

    match current.as_number() {
        Some(n) if (0.0..=255.0).contains(&n) => Value::Text((n as u8 as char).to_string()),
        Some(n) => {
            let word = (n.trunc() as i64).unsigned_abs() as u32;
            let out: String = word
                .to_be_bytes()
                .iter()
                .filter(|b| **b != 0)
                .map(|b| *b as char)
                .collect();
            Value::Text(out)
        }
        None => current,
    }
}
