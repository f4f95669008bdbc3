//! Expression evaluation for rules, if-parts and applicability checks.
//!
//! The engine only sees [`ExpressionEvaluator`]; a full expression language
//! can be plugged in through `EngineServices`. The built-in evaluator covers
//! literals, case-file paths, comparisons and boolean operators:
//!
//! ```text
//! Order/Amount > 100 && (Order.Status == 'open' || !Approved)
//! ```

use crate::actormodel::types::UserIdentity;
use crate::value::Value;
use chrono::Duration;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot evaluate '{expression}': {message}")]
pub struct ExpressionError {
    pub expression: String,
    pub message: String,
}

impl ExpressionError {
    fn new(expression: &str, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            message: message.into(),
        }
    }
}

/// What an expression can see.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub case_file: &'a Value,
    /// Name of the plan item the expression belongs to, if any.
    pub plan_item: Option<&'a str>,
    pub user: Option<&'a UserIdentity>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(case_file: &'a Value) -> Self {
        Self {
            case_file,
            plan_item: None,
            user: None,
        }
    }

    pub fn for_item(mut self, name: &'a str) -> Self {
        self.plan_item = Some(name);
        self
    }

    pub fn for_user(mut self, user: &'a UserIdentity) -> Self {
        self.user = Some(user);
        self
    }
}

pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &EvaluationContext<'_>) -> Result<Value, ExpressionError>;

    fn evaluate_condition(
        &self,
        expression: &str,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, ExpressionError> {
        self.evaluate(expression, context).map(|value| value.is_truthy())
    }
}

/// Small built-in evaluator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleExpressionEvaluator;

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(&self, expression: &str, context: &EvaluationContext<'_>) -> Result<Value, ExpressionError> {
        let tokens = tokenize(expression)?;
        if tokens.is_empty() {
            return Ok(Value::Bool(true));
        }
        let mut parser = Parser {
            expression,
            tokens,
            position: 0,
            context,
        };
        let value = parser.or()?;
        if parser.position != parser.tokens.len() {
            return Err(ExpressionError::new(expression, "unexpected trailing input"));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Path(String),
    Operator(&'static str),
}

const OPERATORS: &[&str] = &["==", "!=", ">=", "<=", "&&", "||", ">", "<", "!", "(", ")"];

fn token_pattern() -> Result<&'static Regex, ExpressionError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r#"^\s*(?:(?P<num>-?\d+(?:\.\d+)?)|'(?P<sq>[^']*)'|"(?P<dq>[^"]*)"|(?P<op>==|!=|>=|<=|&&|\|\||[<>!()])|(?P<path>[A-Za-z_][A-Za-z0-9_]*(?:\[\d+\])?(?:[./][A-Za-z_][A-Za-z0-9_]*(?:\[\d+\])?)*))"#,
            )
        })
        .as_ref()
        .map_err(|e| ExpressionError::new("", e.to_string()))
}

fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
    let pattern = token_pattern()?;
    let mut tokens = Vec::new();
    let mut position = 0;
    loop {
        let rest = expression.get(position..).unwrap_or_default();
        if rest.trim().is_empty() {
            break;
        }
        let captures = pattern
            .captures(rest)
            .ok_or_else(|| ExpressionError::new(expression, format!("unexpected input at {}", position)))?;
        let whole = captures.get(0).map(|m| m.end()).unwrap_or(0);
        if whole == 0 {
            return Err(ExpressionError::new(expression, format!("unexpected input at {}", position)));
        }
        position += whole;

        let token = if let Some(number) = captures.name("num") {
            let parsed = number
                .as_str()
                .parse::<f64>()
                .map_err(|e| ExpressionError::new(expression, e.to_string()))?;
            Token::Number(parsed)
        } else if let Some(text) = captures.name("sq").or_else(|| captures.name("dq")) {
            Token::Text(text.as_str().to_string())
        } else if let Some(op) = captures.name("op") {
            let op = OPERATORS
                .iter()
                .find(|candidate| **candidate == op.as_str())
                .copied()
                .ok_or_else(|| ExpressionError::new(expression, "unknown operator"))?;
            Token::Operator(op)
        } else if let Some(path) = captures.name("path") {
            Token::Path(path.as_str().to_string())
        } else {
            return Err(ExpressionError::new(expression, "unrecognized token"));
        };
        tokens.push(token);
    }
    Ok(tokens)
}

struct Parser<'e, 'c> {
    expression: &'e str,
    tokens: Vec<Token>,
    position: usize,
    context: &'c EvaluationContext<'c>,
}

impl Parser<'_, '_> {
    fn peek_operator(&self, op: &str) -> bool {
        matches!(self.tokens.get(self.position), Some(Token::Operator(candidate)) if *candidate == op)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::new(self.expression, message)
    }

    fn or(&mut self) -> Result<Value, ExpressionError> {
        let mut left = self.and()?;
        while self.peek_operator("||") {
            self.position += 1;
            let right = self.and()?;
            left = Value::Bool(left.is_truthy() || right.is_truthy());
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, ExpressionError> {
        let mut left = self.not()?;
        while self.peek_operator("&&") {
            self.position += 1;
            let right = self.not()?;
            left = Value::Bool(left.is_truthy() && right.is_truthy());
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Value, ExpressionError> {
        if self.peek_operator("!") {
            self.position += 1;
            let inner = self.not()?;
            return Ok(Value::Bool(!inner.is_truthy()));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Value, ExpressionError> {
        let left = self.term()?;
        let op = match self.tokens.get(self.position) {
            Some(Token::Operator(op)) if ["==", "!=", ">", "<", ">=", "<="].contains(op) => *op,
            _ => return Ok(left),
        };
        self.position += 1;
        let right = self.term()?;
        let result = match op {
            "==" => values_equal(&left, &right),
            "!=" => !values_equal(&left, &right),
            _ => {
                let ordering = compare(&left, &right)
                    .ok_or_else(|| self.error(format!("cannot compare {} with {}", left.kind(), right.kind())))?;
                match op {
                    ">" => ordering.is_gt(),
                    "<" => ordering.is_lt(),
                    ">=" => ordering.is_ge(),
                    _ => ordering.is_le(),
                }
            }
        };
        Ok(Value::Bool(result))
    }

    fn term(&mut self) -> Result<Value, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Value::from(n)),
            Some(Token::Text(s)) => Ok(Value::String(s)),
            Some(Token::Path(path)) => Ok(match path.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                _ => self.resolve(&path),
            }),
            Some(Token::Operator("(")) => {
                let inner = self.or()?;
                match self.next() {
                    Some(Token::Operator(")")) => Ok(inner),
                    _ => Err(self.error("missing closing parenthesis")),
                }
            }
            Some(other) => Err(self.error(format!("unexpected {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// Resolves a path against the case file, or `user` against the caller.
    fn resolve(&self, path: &str) -> Value {
        if path == "user" {
            return self
                .context
                .user
                .map(|u| Value::from(u.user_id.as_str()))
                .unwrap_or_default();
        }
        let mut current = self.context.case_file;
        for segment in path.split(['/', '.']) {
            let (name, index) = match segment.split_once('[') {
                Some((name, rest)) => (name, rest.trim_end_matches(']').parse::<usize>().ok()),
                None => (segment, None),
            };
            let Some(next) = current.get(name) else {
                return Value::Null;
            };
            current = match index {
                Some(i) => match next.as_list().and_then(|items| items.get(i)) {
                    Some(item) => item,
                    None => return Value::Null,
                },
                None => next,
            };
        }
        current.clone()
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => left.as_f64()?.partial_cmp(&right.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+(?:\.\d+)?)S)?)?$").ok()
        })
        .as_ref()
}

/// Parses an ISO 8601 duration such as `P1DT2H` or `PT0.5S`.
pub fn parse_duration(text: &str) -> Result<Duration, ExpressionError> {
    let invalid = || ExpressionError::new(text, "not an ISO 8601 duration");
    let pattern = duration_pattern().ok_or_else(invalid)?;
    let trimmed = text.trim();
    if trimmed == "P" || trimmed.ends_with('T') {
        return Err(invalid());
    }
    let captures = pattern.captures(trimmed).ok_or_else(invalid)?;
    let part = |i: usize| -> Result<i64, ExpressionError> {
        captures
            .get(i)
            .map(|m| m.as_str().parse::<i64>().map_err(|_| invalid()))
            .unwrap_or(Ok(0))
    };
    let seconds = captures
        .get(5)
        .map(|m| m.as_str().parse::<f64>().map_err(|_| invalid()))
        .unwrap_or(Ok(0.0))?;
    Ok(Duration::weeks(part(1)?)
        + Duration::days(part(2)?)
        + Duration::hours(part(3)?)
        + Duration::minutes(part(4)?)
        + Duration::milliseconds((seconds * 1000.0).round() as i64))
}

#[cfg(test)]
#[path = "tests/expression_tests.rs"]
mod tests;
