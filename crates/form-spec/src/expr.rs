use std::sync::LazyLock;

use regex::{Captures, Regex};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Arithmetic operator shared by calculation terms and inline expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ArithOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-", alias = "−")]
    Sub,
    #[serde(rename = "*", alias = "×", alias = "x")]
    Mul,
    #[serde(rename = "/", alias = "÷")]
    Div,
}

impl ArithOp {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '+' => Some(ArithOp::Add),
            '-' | '−' => Some(ArithOp::Sub),
            '*' | '×' => Some(ArithOp::Mul),
            '/' | '÷' => Some(ArithOp::Div),
            _ => None,
        }
    }

    /// Applies the operator. Division by zero yields `0`.
    pub fn apply(self, acc: f64, rhs: f64) -> f64 {
        let result = match self {
            ArithOp::Add => acc + rhs,
            ArithOp::Sub => acc - rhs,
            ArithOp::Mul => acc * rhs,
            ArithOp::Div => {
                if rhs == 0.0 {
                    return 0.0;
                }
                acc / rhs
            }
        };
        if result.is_finite() { result } else { 0.0 }
    }
}

/// Folds `first` with each `(op, value)` strictly left to right. There is no
/// operator precedence: `2 + 3 × 4` is `20`.
pub fn fold(first: f64, rest: impl IntoIterator<Item = (ArithOp, f64)>) -> f64 {
    rest.into_iter()
        .fold(first, |acc, (op, value)| op.apply(acc, value))
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Operand(String),
    Op(ArithOp),
}

/// Splits an inline expression on operators, keeping them as tokens.
/// Operands are trimmed; empty operands are dropped.
pub fn tokenize(expression: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        let operand = current.trim();
        if !operand.is_empty() {
            tokens.push(Token::Operand(operand.to_string()));
        }
        current.clear();
    };

    for ch in expression.chars() {
        match ArithOp::from_char(ch) {
            Some(op) => {
                flush(&mut current, &mut tokens);
                tokens.push(Token::Op(op));
            }
            None => current.push(ch),
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

/// Evaluates a token stream with the same fold as calculation rules.
/// Operands that parse as finite numbers are literals; anything else goes to
/// `lookup`. A leading operator applies to an implicit `0`; a trailing one is
/// ignored. A `-` directly after another operator negates the next operand.
pub fn evaluate_tokens(tokens: &[Token], mut lookup: impl FnMut(&str) -> f64) -> f64 {
    let mut acc: Option<f64> = None;
    let mut pending: Option<ArithOp> = None;
    let mut negate = false;

    for token in tokens {
        match token {
            Token::Op(op) => match pending {
                Some(_) if *op == ArithOp::Sub && !negate => negate = true,
                Some(previous) => {
                    debug!(?previous, next = ?op, "consecutive operators, keeping the last");
                    pending = Some(*op);
                    negate = false;
                }
                None => pending = Some(*op),
            },
            Token::Operand(operand) => {
                let value = literal(operand).unwrap_or_else(|| lookup(operand));
                let value = if std::mem::take(&mut negate) { -value } else { value };
                let op = pending.take().unwrap_or(ArithOp::Add);
                acc = Some(op.apply(acc.unwrap_or(0.0), value));
            }
        }
    }

    acc.unwrap_or(0.0)
}

fn literal(operand: &str) -> Option<f64> {
    operand.parse::<f64>().ok().filter(|number| number.is_finite())
}

pub fn evaluate(expression: &str, lookup: impl FnMut(&str) -> f64) -> f64 {
    evaluate_tokens(&tokenize(expression), lookup)
}

/// Renders an accumulator as a plain number string (`1050`, `12.5`).
pub fn format_number(value: f64) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }
    format!("{value}")
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\$\$(.*?)\$\$").expect("static pattern is valid"));

/// Replaces every `$$expr$$` span in `text` with the evaluated result.
pub fn substitute(text: &str, mut lookup: impl FnMut(&str) -> f64) -> String {
    if !text.contains("$$") {
        return text.to_string();
    }
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| {
            format_number(evaluate(&caps[1], &mut lookup))
        })
        .into_owned()
}
