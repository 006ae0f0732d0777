//! Calculator tool — evaluates arithmetic expressions.
//!
//! Supports `+`, `-`, `*`, `/`, parentheses, unary signs, decimal numbers
//! and the comma as a sequence operator (`1, 2` yields `2`). Input is gated
//! to that character set before parsing; evaluation is a recursive-descent
//! parser, never a general-purpose interpreter.

use async_trait::async_trait;
use chatloom_core::error::ToolError;
use chatloom_core::tool::{Tool, ToolOutput};

const NAME: &str = "calculator";

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Evaluate a basic arithmetic expression (numbers + - * / ( ) .)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. (2+3)*4/5"
                }
            },
            "required": ["expression"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let expr = match &arguments["expression"] {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };

        let value = evaluate(&expr).map_err(|reason| ToolError::failed(NAME, reason))?;

        Ok(ToolOutput {
            content: format_number(value),
            data: Some(serde_json::json!({ "value": value })),
        })
    }
}

/// Format nicely: no trailing `.0` for integers.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

fn is_allowed(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '*' | '/' | '(' | ')' | '.' | ',') || c.is_whitespace()
}

/// Evaluate an arithmetic expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("Empty expression.".into());
    }
    if !expr.chars().all(is_allowed) {
        return Err("Expression contains disallowed characters.".into());
    }

    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_sequence()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "Unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        ));
    }

    if !result.is_finite() {
        return Err("Result is not a finite number.".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let token = match chars[i] {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            '/' => Token::Slash,
            ',' => Token::Comma,
            '(' => Token::LParen,
            ')' => Token::RParen,
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
                continue;
            }
            c => return Err(format!("Unexpected character: '{}'", c)),
        };
        tokens.push(token);
        i += 1;
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // sequence = expr (',' expr)*
    fn parse_sequence(&mut self) -> Result<f64, String> {
        let mut value = self.parse_expr()?;
        while let Some(Token::Comma) = self.peek() {
            self.consume();
            value = self.parse_expr()?;
        }
        Ok(value)
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = unary (('*' | '/') unary)*
    // Division by zero yields an infinity or NaN, rejected once at the top.
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_unary()?;
                }
                Token::Slash => {
                    self.consume();
                    left /= self.parse_unary()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // unary = ('-' | '+') unary | primary
    fn parse_unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.consume();
                Ok(-self.parse_unary()?)
            }
            Some(Token::Plus) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    // primary = NUMBER | '(' sequence ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(*n),
            Some(Token::LParen) => {
                let val = self.parse_sequence()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("Expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("Unexpected token: {:?}", tok)),
            None => Err("Unexpected end of expression".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_addition() {
        assert_eq!(evaluate("2 + 3").unwrap(), 5.0);
    }

    #[test]
    fn operator_precedence() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
    }

    #[test]
    fn parentheses() {
        assert_eq!(evaluate("(2 + 3) * 4 / 5").unwrap(), 4.0);
    }

    #[test]
    fn unary_signs() {
        assert_eq!(evaluate("-5 + 3").unwrap(), -2.0);
        assert_eq!(evaluate("+4 - -1").unwrap(), 5.0);
    }

    #[test]
    fn comma_yields_right_operand() {
        assert_eq!(evaluate("1, 2").unwrap(), 2.0);
        assert_eq!(evaluate("(1 + 1, 3) * 2").unwrap(), 6.0);
    }

    #[test]
    fn division_by_zero_is_not_finite() {
        let err = evaluate("1 / 0").unwrap_err();
        assert_eq!(err, "Result is not a finite number.");
        assert!(evaluate("0 / 0").is_err());
    }

    #[test]
    fn disallowed_characters_rejected() {
        let err = evaluate("2 ** x").unwrap_err();
        assert_eq!(err, "Expression contains disallowed characters.");
        assert!(evaluate("alert(1)").is_err());
    }

    #[test]
    fn empty_expression() {
        assert_eq!(evaluate("   ").unwrap_err(), "Empty expression.");
    }

    #[test]
    fn invalid_expression() {
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("1..2").is_err());
        assert!(evaluate("(1 + 2").is_err());
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(6.0), "6");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[tokio::test]
    async fn tool_execute() {
        let output = CalculatorTool
            .execute(serde_json::json!({"expression": "2*3"}))
            .await
            .unwrap();

        assert_eq!(output.content, "6");
        assert_eq!(output.data, Some(serde_json::json!({"value": 6.0})));
    }

    #[tokio::test]
    async fn tool_formats_decimals() {
        let output = CalculatorTool
            .execute(serde_json::json!({"expression": "10 / 3"}))
            .await
            .unwrap();

        assert!(output.content.starts_with("3.333"));
    }

    #[tokio::test]
    async fn tool_missing_expression_fails() {
        let err = CalculatorTool.execute(serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Empty expression.");
    }

    #[test]
    fn tool_definition() {
        let def = CalculatorTool.to_definition();
        assert_eq!(def.name, "calculator");
        assert_eq!(def.parameters["required"][0], "expression");
    }
}
