//! Arithmetic expression evaluation for the developer role.
//!
//! A small recursive-descent evaluator over `+ - * / % ^`, parentheses,
//! and a fixed function set. No variables, no side effects.

use async_trait::async_trait;
use serde_json::{json, Value};

use quill_agent_core::{AgentTool, ToolExecutionResult};
use quill_ai::ToolDefinition;

/// Evaluates `expression` to a finite number.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "unexpected trailing input near '{}'",
            parser.describe_current()
        ));
    }
    if !value.is_finite() {
        return Err("expression did not evaluate to a finite number".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&ch) = chars.peek() {
        match ch {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '^' => {
                chars.next();
                tokens.push(Token::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Some(token) => format!("{token:?}"),
            None => "end of input".to_string(),
        }
    }

    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.bump();
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.power()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.bump();
                    value *= self.power()?;
                }
                Some(Token::Slash) => {
                    self.bump();
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= divisor;
                }
                Some(Token::Percent) => {
                    self.bump();
                    let divisor = self.power()?;
                    if divisor == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    value %= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // Exponentiation binds tighter than unary minus and is
    // right-associative.
    fn power(&mut self) -> Result<f64, String> {
        if let Some(Token::Minus) = self.peek() {
            self.bump();
            return Ok(-self.power()?);
        }
        let base = self.primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.bump();
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some(Token::Number(value)) => Ok(value),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("expected ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => self.call(&name),
            other => Err(format!("unexpected token {other:?}")),
        }
    }

    fn call(&mut self, name: &str) -> Result<f64, String> {
        match self.bump() {
            Some(Token::LParen) => {}
            _ => return Err(format!("expected '(' after function '{name}'")),
        }
        let mut arguments = vec![self.expr()?];
        while let Some(Token::Comma) = self.peek() {
            self.bump();
            arguments.push(self.expr()?);
        }
        match self.bump() {
            Some(Token::RParen) => {}
            _ => return Err(format!("expected ')' to close '{name}'")),
        }
        apply_function(name, &arguments)
    }
}

fn apply_function(name: &str, arguments: &[f64]) -> Result<f64, String> {
    let unary = |f: fn(f64) -> f64| -> Result<f64, String> {
        if arguments.len() != 1 {
            return Err(format!("{name} takes exactly one argument"));
        }
        Ok(f(arguments[0]))
    };
    match name {
        "abs" => unary(f64::abs),
        "sqrt" => unary(f64::sqrt),
        "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "exp" => unary(f64::exp),
        "min" => Ok(arguments.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(arguments.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        other => Err(format!("unknown function '{other}'")),
    }
}

/// Tool exposing [`evaluate`] to the developer role.
pub struct EvaluateExpressionTool;

#[async_trait]
impl AgentTool for EvaluateExpressionTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "evaluate_expression".to_string(),
            description: "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses, \
                          and the functions abs, sqrt, ln, log10, exp, min, max."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "Expression to evaluate, e.g. \"(150.0 - 142.5) / 142.5 * 100\""
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(expression) = arguments.get("expression").and_then(Value::as_str) else {
            return ToolExecutionResult::error(json!({ "error": "missing 'expression' argument" }));
        };
        match evaluate(expression) {
            Ok(result) => ToolExecutionResult::ok(json!({
                "expression": expression,
                "result": result,
            })),
            Err(error) => ToolExecutionResult::error(json!({ "error": error })),
        }
    }
}
