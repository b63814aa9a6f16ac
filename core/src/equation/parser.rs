//! Parser for scoring equations.
//!
//! Recursive descent over the token slice produced by the lexer.
//! Precedence, loosest to tightest: `or`, `xor`, `and`, comparisons,
//! additive, multiplicative, unary minus, `^` (right-associative).

use crate::equation::ast::{BinaryOp, CompareOp, Expr, LogicOp, Program, Span, Stmt};
use crate::equation::lexer::Token;
use nom::{multi::separated_list0, Err, IResult};

/// Parser input is a slice of tokens with byte offsets.
pub type TokenSlice<'a> = &'a [(Token, usize, usize)];

/// Parse error with source location.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token `{found}` at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("unexpected end of equation")]
    UnexpectedEnd,
}

/// Parse a complete program: statements separated by `;` or newlines,
/// with blank separators tolerated.
pub fn parse_program(tokens: TokenSlice) -> Result<Program, ParseError> {
    let mut input = skip_separators(tokens);
    if input.is_empty() {
        return Err(ParseError::UnexpectedEnd);
    }

    let mut statements = Vec::new();
    loop {
        let (rest, stmt) = statement(input).map_err(into_parse_error)?;
        statements.push(stmt);

        let after = skip_separators(rest);
        if after.is_empty() {
            break;
        }
        // Statements must be separated; a statement directly followed
        // by another token is a parse error.
        if after.len() == rest.len() {
            return Err(unexpected(rest));
        }
        input = after;
    }

    Ok(Program { statements })
}

fn skip_separators(mut input: TokenSlice) -> TokenSlice {
    while let Some((tok, _, _)) = input.first() {
        if matches!(tok, Token::Semicolon | Token::Newline) {
            input = &input[1..];
        } else {
            break;
        }
    }
    input
}

fn unexpected(input: TokenSlice) -> ParseError {
    match input.first() {
        Some((tok, start, _)) => ParseError::UnexpectedToken {
            found: tok.to_string(),
            position: *start,
        },
        None => ParseError::UnexpectedEnd,
    }
}

fn into_parse_error(err: Err<nom::error::Error<TokenSlice>>) -> ParseError {
    match err {
        Err::Error(e) | Err::Failure(e) => unexpected(e.input),
        Err::Incomplete(_) => ParseError::UnexpectedEnd,
    }
}

// ============================================================================
// Statements
// ============================================================================

fn statement(input: TokenSlice) -> IResult<TokenSlice, Stmt> {
    // Assignment needs two tokens of lookahead: IDENT `=` ...
    if let (Some((Token::Ident(name), start, end)), Some((Token::Eq, _, _))) =
        (input.first(), input.get(1))
    {
        let (rest, expr) = expression(&input[2..])?;
        return Ok((
            rest,
            Stmt::Assign {
                name: name.clone(),
                span: Span::new(*start, *end),
                expr,
            },
        ));
    }

    let (rest, expr) = expression(input)?;
    Ok((rest, Stmt::Expr(expr)))
}

// ============================================================================
// Expressions
// ============================================================================

pub fn expression(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    if matches!(input.first(), Some((Token::If, _, _))) {
        return if_expression(input);
    }
    logic_or(input)
}

fn if_expression(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    let (input, _) = token(Token::If)(input)?;
    let (input, first_cond) = expression(input)?;
    let (input, _) = token(Token::Then)(input)?;
    let (input, first_body) = expression(input)?;

    let mut arms = vec![(first_cond, first_body)];
    let mut input = input;
    while matches!(input.first(), Some((Token::Elif, _, _))) {
        let (rest, _) = token(Token::Elif)(input)?;
        let (rest, cond) = expression(rest)?;
        let (rest, _) = token(Token::Then)(rest)?;
        let (rest, body) = expression(rest)?;
        arms.push((cond, body));
        input = rest;
    }

    let (input, _) = token(Token::Else)(input)?;
    let (input, else_expr) = expression(input)?;

    Ok((
        input,
        Expr::If {
            arms,
            else_expr: Box::new(else_expr),
        },
    ))
}

fn logic_or(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    binary_chain(input, logic_xor, |tok| match tok {
        Token::Or => Some(LogicOp::Or),
        _ => None,
    })
}

fn logic_xor(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    binary_chain(input, logic_and, |tok| match tok {
        Token::Xor => Some(LogicOp::Xor),
        _ => None,
    })
}

fn logic_and(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    binary_chain(input, comparison, |tok| match tok {
        Token::And => Some(LogicOp::And),
        _ => None,
    })
}

fn binary_chain<'a>(
    input: TokenSlice<'a>,
    next: fn(TokenSlice<'a>) -> IResult<TokenSlice<'a>, Expr>,
    op_for: fn(&Token) -> Option<LogicOp>,
) -> IResult<TokenSlice<'a>, Expr> {
    let (mut input, mut left) = next(input)?;
    while let Some((tok, _, _)) = input.first() {
        let Some(op) = op_for(tok) else { break };
        let (rest, right) = next(&input[1..])?;
        left = Expr::Logic {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        input = rest;
    }
    Ok((input, left))
}

fn comparison(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    let (mut input, mut left) = additive(input)?;
    while let Some((tok, _, _)) = input.first() {
        let op = match tok {
            Token::Gt => CompareOp::Gt,
            Token::Lt => CompareOp::Lt,
            Token::Gte => CompareOp::Ge,
            Token::Lte => CompareOp::Le,
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::Ne,
            _ => break,
        };
        let (rest, right) = additive(&input[1..])?;
        left = Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        input = rest;
    }
    Ok((input, left))
}

fn additive(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    let (mut input, mut left) = multiplicative(input)?;
    while let Some((tok, _, _)) = input.first() {
        let op = match tok {
            Token::Plus => BinaryOp::Add,
            Token::Minus => BinaryOp::Sub,
            _ => break,
        };
        let (rest, right) = multiplicative(&input[1..])?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        input = rest;
    }
    Ok((input, left))
}

fn multiplicative(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    let (mut input, mut left) = unary(input)?;
    while let Some((tok, _, _)) = input.first() {
        let op = match tok {
            Token::Star => BinaryOp::Mul,
            Token::Slash => BinaryOp::Div,
            _ => break,
        };
        let (rest, right) = unary(&input[1..])?;
        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        input = rest;
    }
    Ok((input, left))
}

fn unary(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    if matches!(input.first(), Some((Token::Minus, _, _))) {
        let (rest, inner) = unary(&input[1..])?;
        return Ok((rest, Expr::Neg(Box::new(inner))));
    }
    power(input)
}

fn power(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    let (input, base) = atom(input)?;
    if matches!(input.first(), Some((Token::Caret, _, _))) {
        // Right-associative; descending through `unary` admits a negated
        // exponent, and `^` binds tighter than unary minus on the base.
        let (rest, exponent) = unary(&input[1..])?;
        return Ok((
            rest,
            Expr::Binary {
                op: BinaryOp::Pow,
                left: Box::new(base),
                right: Box::new(exponent),
            },
        ));
    }
    Ok((input, base))
}

fn atom(input: TokenSlice) -> IResult<TokenSlice, Expr> {
    match input.first() {
        Some((Token::Number(n), _, _)) => Ok((&input[1..], Expr::Number(*n))),
        Some((Token::Null, _, _)) => Ok((&input[1..], Expr::Null)),
        Some((Token::ItemRef(number), start, end)) => Ok((
            &input[1..],
            Expr::ItemRef {
                number: *number,
                span: Span::new(*start, *end),
            },
        )),
        Some((Token::LParen, _, _)) => {
            let (rest, inner) = expression(&input[1..])?;
            let (rest, _) = token(Token::RParen)(rest)?;
            Ok((rest, inner))
        }
        Some((Token::Ident(name), start, end)) => {
            let span = Span::new(*start, *end);
            if matches!(input.get(1), Some((Token::LParen, _, _))) {
                let (rest, args) = separated_list0(token(Token::Comma), expression)(&input[2..])?;
                let (rest, _) = token(Token::RParen)(rest)?;
                return Ok((
                    rest,
                    Expr::Call {
                        name: name.clone(),
                        args,
                        span,
                    },
                ));
            }
            Ok((
                &input[1..],
                Expr::Var {
                    name: name.clone(),
                    span,
                },
            ))
        }
        _ => Err(Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Tag,
        ))),
    }
}

// ============================================================================
// Helper Parsers
// ============================================================================

/// Parse a specific token.
fn token(tok: Token) -> impl Fn(TokenSlice) -> IResult<TokenSlice, &Token> {
    move |input: TokenSlice| {
        if let Some(first) = input.first() {
            if first.0 == tok {
                Ok((&input[1..], &first.0))
            } else {
                Err(Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )))
            }
        } else {
            Err(Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Eof,
            )))
        }
    }
}
