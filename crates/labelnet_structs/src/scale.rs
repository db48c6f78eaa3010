//! Arithmetic expressions for the `Rescaling` scale, such as `1/255` or `1 / (127.5)`.
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := ('+' | '-') unary | atom
//! atom   := number | '(' expr ')'
//! number := digits ['.' digits] [('e' | 'E') ['+' | '-'] digits]
//! ```

/// Maximum nesting of parentheses and unary signs.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScaleError {
    #[error("scale expression is empty")]
    Empty,

    #[error("unexpected character {found:?} at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid number {0:?}")]
    InvalidNumber(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression is nested too deeply")]
    TooDeep,

    #[error("expression does not evaluate to a finite number")]
    NotFinite,
}

/// Evaluates a scale expression.
///
/// # Errors
///
/// Returns an error if the expression is malformed, divides by zero or does not
/// produce a finite number.
pub fn evaluate(expr: &str) -> Result<f64, ScaleError> {
    if expr.trim().is_empty() {
        return Err(ScaleError::Empty);
    }

    let mut parser = Parser {
        chars: expr.char_indices().peekable(),
        depth: 0,
    };
    let value = parser.expr()?;

    parser.skip_whitespace();
    if let Some((position, found)) = parser.chars.next() {
        return Err(ScaleError::UnexpectedChar { found, position });
    }

    if value.is_finite() {
        Ok(value)
    } else {
        Err(ScaleError::NotFinite)
    }
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    depth: usize,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.peek().map(|(_, c)| *c)
    }

    fn expr(&mut self) -> Result<f64, ScaleError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ScaleError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.unary()?;
                }
                Some('/') => {
                    self.chars.next();
                    let divisor = self.unary()?;
                    if divisor == 0.0 {
                        return Err(ScaleError::DivisionByZero);
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ScaleError> {
        match self.peek() {
            Some(sign @ ('+' | '-')) => {
                self.chars.next();
                let value = self.nested(Self::unary)?;
                Ok(if sign == '-' { -value } else { value })
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Result<f64, ScaleError> {
        match self.peek() {
            Some('(') => {
                self.chars.next();
                let value = self.nested(Self::expr)?;
                match self.chars.next() {
                    Some((_, ')')) => Ok(value),
                    Some((position, found)) => Err(ScaleError::UnexpectedChar { found, position }),
                    None => Err(ScaleError::UnexpectedEnd),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(_) => {
                let (position, found) = self.chars.next().ok_or(ScaleError::UnexpectedEnd)?;
                Err(ScaleError::UnexpectedChar { found, position })
            }
            None => Err(ScaleError::UnexpectedEnd),
        }
    }

    fn nested(&mut self, parse: fn(&mut Self) -> Result<f64, ScaleError>) -> Result<f64, ScaleError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ScaleError::TooDeep);
        }
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn number(&mut self) -> Result<f64, ScaleError> {
        let mut literal = String::new();
        while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }

        if let Some((_, e)) = self.chars.next_if(|(_, c)| matches!(c, 'e' | 'E')) {
            literal.push(e);
            if let Some((_, sign)) = self.chars.next_if(|(_, c)| matches!(c, '+' | '-')) {
                literal.push(sign);
            }
            while let Some((_, c)) = self.chars.next_if(|(_, c)| c.is_ascii_digit()) {
                literal.push(c);
            }
        }

        literal
            .parse::<f64>()
            .map_err(|_| ScaleError::InvalidNumber(literal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(expr: &str, expected: f64) {
        let value = evaluate(expr).unwrap_or_else(|e| panic!("{expr}: {e}"));
        assert!((value - expected).abs() < 1e-12, "{expr} = {value}, expected {expected}");
    }

    #[test]
    fn test_common_scales() {
        approx("1/255", 1.0 / 255.0);
        approx("1./127.5", 1.0 / 127.5);
        approx("0.5", 0.5);
        approx(" 2 ", 2.0);
    }

    #[test]
    fn test_precedence_and_parentheses() {
        approx("1 + 2 * 3", 7.0);
        approx("(1 + 2) * 3", 9.0);
        approx("2 * -3", -6.0);
        approx("--4", 4.0);
        approx("10 - 4 - 3", 3.0);
        approx("8 / 2 / 2", 2.0);
        approx("1e-3 * 2", 0.002);
        approx("2.5E2", 250.0);
    }

    #[test]
    fn test_errors() {
        assert_eq!(evaluate(""), Err(ScaleError::Empty));
        assert_eq!(evaluate("1/0"), Err(ScaleError::DivisionByZero));
        assert_eq!(evaluate("1/(2-2)"), Err(ScaleError::DivisionByZero));
        assert_eq!(evaluate("(1 + 2"), Err(ScaleError::UnexpectedEnd));
        assert_eq!(evaluate("1 +"), Err(ScaleError::UnexpectedEnd));
        assert!(matches!(
            evaluate("1 2"),
            Err(ScaleError::UnexpectedChar { found: '2', .. })
        ));
        assert!(matches!(
            evaluate("__import__('os')"),
            Err(ScaleError::UnexpectedChar { found: '_', .. })
        ));
        assert!(matches!(evaluate("1.2.3"), Err(ScaleError::InvalidNumber(_))));
        assert_eq!(evaluate("1e308 * 10"), Err(ScaleError::NotFinite));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let expr = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&expr), Err(ScaleError::TooDeep));
    }
}
