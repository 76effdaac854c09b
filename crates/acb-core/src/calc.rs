//! Arithmetic evaluator behind `计算`, `calc` and bare math messages.
//!
//! Only numbers, the operators `+ - * / // % ** ^`, parentheses, a fixed set of
//! functions and the constants `pi` / `e` are accepted. `^` is exponentiation.
//! Values remember whether they are integral so `7*6` prints `42` while
//! `84/2` prints `42` through the float path and `0.1*3` prints `0.3`.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CalcError {
    #[error("除数不能为零")]
    DivisionByZero,
    #[error("变量 '{0}' 不允许使用")]
    UnknownName(String),
    #[error("函数 '{0}' 不允许使用")]
    UnknownFunction(String),
    #[error("函数 '{0}' 参数错误")]
    BadArguments(String),
    #[error("表达式语法错误")]
    Syntax,
    #[error("数学运算错误")]
    Domain,
}

/// A number plus whether it came from integer-only arithmetic.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Number {
    pub value: f64,
    pub integral: bool,
}

impl Number {
    fn int(value: f64) -> Self {
        Self {
            value,
            integral: true,
        }
    }

    fn float(value: f64) -> Self {
        Self {
            value,
            integral: false,
        }
    }

    /// Integral results without decimals, floats with at most ten decimals.
    pub fn display(&self) -> String {
        if self.integral {
            return format!("{:.0}", self.value);
        }
        let fixed = format!("{:.10}", self.value);
        let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
        if trimmed == "-0" {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    DoubleSlash,
    Percent,
    Power,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, CalcError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let value: f64 = raw.parse().map_err(|_| CalcError::Syntax)?;
                tokens.push(Token::Num(if raw.contains('.') {
                    Number::float(value)
                } else {
                    Number::int(value)
                }));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Power);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            _ => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    // Power, not bitwise xor.
                    '^' => Token::Power,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => return Err(CalcError::Syntax),
                });
                i += 1;
            }
        }
    }
    Ok(tokens)
}

/// Nesting allowed for parentheses, unary signs and chained powers.
const MAX_DEPTH: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Number, CalcError> {
        let mut left = self.term()?;
        loop {
            if self.eat(&Token::Plus) {
                left = add(left, self.term()?);
            } else if self.eat(&Token::Minus) {
                left = add(left, negate(self.term()?));
            } else {
                return Ok(left);
            }
        }
    }

    fn term(&mut self) -> Result<Number, CalcError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Token::Star,
                Some(Token::Slash) => Token::Slash,
                Some(Token::DoubleSlash) => Token::DoubleSlash,
                Some(Token::Percent) => Token::Percent,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = match op {
                Token::Star => mul(left, right),
                Token::Slash => divide(left, right)?,
                Token::DoubleSlash => floor_divide(left, right)?,
                _ => modulo(left, right)?,
            };
        }
    }

    // Every recursive path passes through here, so this bounds the stack.
    fn unary(&mut self) -> Result<Number, CalcError> {
        if self.depth >= MAX_DEPTH {
            return Err(CalcError::Syntax);
        }
        self.depth += 1;
        let out = self.signed();
        self.depth -= 1;
        out
    }

    fn signed(&mut self) -> Result<Number, CalcError> {
        if self.eat(&Token::Minus) {
            return Ok(negate(self.unary()?));
        }
        if self.eat(&Token::Plus) {
            return self.unary();
        }
        self.power()
    }

    // `-2**2` is `-(2**2)`, and `2**-1` is allowed.
    fn power(&mut self) -> Result<Number, CalcError> {
        let base = self.atom()?;
        if self.eat(&Token::Power) {
            let exponent = self.unary()?;
            return Ok(pow(base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Number, CalcError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                if !self.eat(&Token::RParen) {
                    return Err(CalcError::Syntax);
                }
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.arguments()?;
                    return call(&name, &args);
                }
                constant(&name)
            }
            _ => Err(CalcError::Syntax),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Number>, CalcError> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            if !self.eat(&Token::Comma) {
                return Err(CalcError::Syntax);
            }
        }
    }
}

fn add(a: Number, b: Number) -> Number {
    Number {
        value: a.value + b.value,
        integral: a.integral && b.integral,
    }
}

fn negate(a: Number) -> Number {
    Number {
        value: -a.value,
        integral: a.integral,
    }
}

fn mul(a: Number, b: Number) -> Number {
    Number {
        value: a.value * b.value,
        integral: a.integral && b.integral,
    }
}

fn divide(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.value == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number::float(a.value / b.value))
}

fn floor_divide(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.value == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number {
        value: (a.value / b.value).floor(),
        integral: a.integral && b.integral,
    })
}

/// Result takes the sign of the divisor.
fn modulo(a: Number, b: Number) -> Result<Number, CalcError> {
    if b.value == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    Ok(Number {
        value: a.value - b.value * (a.value / b.value).floor(),
        integral: a.integral && b.integral,
    })
}

fn pow(base: Number, exponent: Number) -> Number {
    Number {
        value: base.value.powf(exponent.value),
        integral: base.integral && exponent.integral && exponent.value >= 0.0,
    }
}

fn constant(name: &str) -> Result<Number, CalcError> {
    match name {
        "pi" => Ok(Number::float(std::f64::consts::PI)),
        "e" => Ok(Number::float(std::f64::consts::E)),
        _ => Err(CalcError::UnknownName(name.to_string())),
    }
}

fn call(name: &str, args: &[Number]) -> Result<Number, CalcError> {
    let bad = || CalcError::BadArguments(name.to_string());
    let one = || match args {
        [x] => Ok(*x),
        _ => Err(bad()),
    };
    let float1 = |f: fn(f64) -> f64| one().map(|x| Number::float(f(x.value)));

    match name {
        "abs" => one().map(|x| Number {
            value: x.value.abs(),
            integral: x.integral,
        }),
        "round" => match args {
            [x] => Ok(Number::int(x.value.round_ties_even())),
            [x, digits] if digits.integral => {
                let scale = 10f64.powi(digits.value as i32);
                Ok(Number {
                    value: (x.value * scale).round_ties_even() / scale,
                    integral: x.integral,
                })
            }
            _ => Err(bad()),
        },
        "int" => one().map(|x| Number::int(x.value.trunc())),
        "float" => one().map(|x| Number::float(x.value)),
        "min" | "max" => {
            let pick_max = name == "max";
            args.iter()
                .copied()
                .reduce(|a, b| {
                    let take_b = if pick_max { b.value > a.value } else { b.value < a.value };
                    if take_b {
                        b
                    } else {
                        a
                    }
                })
                .ok_or_else(bad)
        }
        "sum" => Ok(args
            .iter()
            .copied()
            .fold(Number::int(0.0), add)),
        "pow" => match args {
            [b, e] => Ok(pow(*b, *e)),
            _ => Err(bad()),
        },
        "sin" => float1(f64::sin),
        "cos" => float1(f64::cos),
        "tan" => float1(f64::tan),
        "sqrt" => float1(f64::sqrt),
        "log" => match args {
            [x] => Ok(Number::float(x.value.ln())),
            [x, base] => Ok(Number::float(x.value.log(base.value))),
            _ => Err(bad()),
        },
        "log10" => float1(f64::log10),
        "exp" => float1(f64::exp),
        "radians" => float1(f64::to_radians),
        "degrees" => float1(f64::to_degrees),
        _ => Err(CalcError::UnknownFunction(name.to_string())),
    }
}

pub fn evaluate(expression: &str) -> Result<Number, CalcError> {
    let tokens = tokenize(expression)?;
    if tokens.is_empty() {
        return Err(CalcError::Syntax);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let result = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CalcError::Syntax);
    }
    if !result.value.is_finite() {
        return Err(CalcError::Domain);
    }
    Ok(result)
}

/// Drop a leading `计算` / `calc` keyword.
pub fn strip_prefix(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix("计算")
        .or_else(|| text.strip_prefix("calc"))
        .unwrap_or(text)
        .trim()
}

/// Reply text for a calculator request.
pub fn reply(text: &str) -> String {
    let expression = strip_prefix(text);
    match evaluate(expression) {
        Ok(n) => format!("计算结果: {expression} = {}", n.display()),
        Err(e) => format!("计算错误: {e}"),
    }
}

fn math_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[\d\s+\-*/().,^%]+$").expect("valid regex"))
}

/// Whole message looks like arithmetic: digits and operator characters only,
/// with at least one operator or parenthesis.
pub fn is_math_expression(text: &str) -> bool {
    let text = text.trim();
    math_re().is_match(text) && text.chars().any(|c| "+-*/()^%".contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show(expr: &str) -> String {
        evaluate(expr).map(|n| n.display()).unwrap_or_else(|e| e.to_string())
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(show("1+2*3"), "7");
        assert_eq!(show("(1+2)*3"), "9");
        assert_eq!(show("2**3**2"), "512");
        assert_eq!(show("2^10"), "1024");
        assert_eq!(show("-2**2"), "-4");
        assert_eq!(show("2**-1"), "0.5");
        assert_eq!(show("10-4-3"), "3");
    }

    #[test]
    fn integer_and_float_results() {
        assert_eq!(show("84/2"), "42");
        assert_eq!(show("10/4"), "2.5");
        assert_eq!(show("0.1+0.2"), "0.3");
        assert_eq!(show("1/3"), "0.3333333333");
        assert_eq!(show("7//2"), "3");
        assert_eq!(show("-7//2"), "-4");
        assert_eq!(show("-7%3"), "2");
        assert_eq!(show("7%-3"), "-2");
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(show("max(1, 5, 3)"), "5");
        assert_eq!(show("min(2.5, 4)"), "2.5");
        assert_eq!(show("sum(1,2,3)"), "6");
        assert_eq!(show("round(2.5)"), "2");
        assert_eq!(show("round(3.14159, 2)"), "3.14");
        assert_eq!(show("sqrt(16)"), "4");
        assert_eq!(show("abs(-3)"), "3");
        assert_eq!(show("int(7.9)"), "7");
        assert_eq!(show("pow(2, 8)"), "256");
        assert_eq!(show("round(pi, 4)"), "3.1416");
    }

    #[test]
    fn errors_are_reported_in_chinese() {
        assert_eq!(show("1/0"), "除数不能为零");
        assert_eq!(show("5%0"), "除数不能为零");
        assert_eq!(show("x+1"), "变量 'x' 不允许使用");
        assert_eq!(show("open(1)"), "函数 'open' 不允许使用");
        assert_eq!(show("1+"), "表达式语法错误");
        assert_eq!(show("(1+2"), "表达式语法错误");
        assert_eq!(show("1,000"), "表达式语法错误");
        assert_eq!(show("sqrt(-1)"), "数学运算错误");
        assert_eq!(show("abs(1, 2)"), "函数 'abs' 参数错误");
    }

    #[test]
    fn deep_nesting_is_rejected_not_recursed() {
        let parens = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
        assert!(is_math_expression(&parens));
        assert_eq!(evaluate(&parens), Err(CalcError::Syntax));
        assert_eq!(reply(&parens), "计算错误: 表达式语法错误");

        let signs = format!("{}1", "-".repeat(3000));
        assert_eq!(evaluate(&signs), Err(CalcError::Syntax));

        let powers = vec!["1"; 2000].join("**");
        assert_eq!(evaluate(&powers), Err(CalcError::Syntax));

        let fine = format!("{}1{}", "(".repeat(50), ")".repeat(50));
        assert_eq!(show(&fine), "1");
    }

    #[test]
    fn reply_strips_keyword() {
        assert_eq!(reply("计算 1+2"), "计算结果: 1+2 = 3");
        assert_eq!(reply("calc 2*3"), "计算结果: 2*3 = 6");
        assert_eq!(reply("3*3"), "计算结果: 3*3 = 9");
        assert_eq!(reply("计算 1/0"), "计算错误: 除数不能为零");
    }

    #[test]
    fn detects_bare_math() {
        assert!(is_math_expression("100*7.2"));
        assert!(is_math_expression(" (1+2) "));
        assert!(!is_math_expression("100"));
        assert!(!is_math_expression("abc+1"));
    }
}
