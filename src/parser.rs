use super::ast::{Expr, Function, ProtoKind, Prototype, DEFAULT_PRECEDENCE};
use super::error::Error;
use super::lexer::Lexer;
use super::operators::OperatorTable;
use super::token::Token;

/// Name given to the wrapper function of a bare top-level expression.
pub const ANON_FN: &str = "__anon_expr";

const MAX_NESTING: usize = 100;

/// Bound on the height of any expression tree, so that lowering and dropping
/// it stay within the stack.
const MAX_EXPR_DEPTH: usize = 256;

type Result<T> = std::result::Result<T, Error>;

/// Recursive-descent parser holding one token of lookahead.
///
/// The operator table is passed into every expression-level call rather than
/// stored, so the driver may mutate it between top-level units.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(mut lexer: Lexer<'a>) -> Self {
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            depth: 0,
        }
    }

    pub fn current(&self) -> &Token {
        &self.current
    }

    pub fn next_token(&mut self) -> &Token {
        self.current = self.lexer.next_token();
        &self.current
    }

    fn is_kwd(&self, c: char) -> bool {
        self.current == Token::Kwd(c)
    }

    fn expect_kwd(&mut self, c: char, msg: &str) -> Result<()> {
        if !self.is_kwd(c) {
            return Err(Error::parse(msg));
        }
        self.next_token();
        Ok(())
    }

    fn expect(&mut self, t: Token, msg: &str) -> Result<()> {
        if self.current != t {
            return Err(Error::parse(msg));
        }
        self.next_token();
        Ok(())
    }

    fn expect_ident(&mut self, msg: &str) -> Result<String> {
        let name = match &self.current {
            Token::Ident(name) => name.clone(),
            _ => return Err(Error::parse(msg)),
        };
        self.next_token();
        Ok(name)
    }

    fn precedence(&self, ops: &OperatorTable) -> i32 {
        match self.current {
            Token::Kwd(c) if c.is_ascii() => ops.precedence(c).unwrap_or(-1),
            _ => -1,
        }
    }

    fn parse_paren_expr(&mut self, ops: &OperatorTable) -> Result<Expr> {
        self.next_token(); // eat '('
        let e = self.parse_expression(ops)?;
        self.expect_kwd(')', "expected ')'")?;
        Ok(e)
    }

    fn parse_identifier_expr(&mut self, ops: &OperatorTable, name: String) -> Result<Expr> {
        if !self.is_kwd('(') {
            return Ok(Expr::Variable(name));
        }
        self.next_token();

        let mut args = Vec::new();
        if !self.is_kwd(')') {
            loop {
                args.push(self.parse_expression(ops)?);
                if self.is_kwd(')') {
                    break;
                }
                if !self.is_kwd(',') {
                    return Err(Error::parse("Expected ')' or ',' in argument list"));
                }
                self.next_token();
            }
        }
        self.next_token(); // eat ')'

        Ok(Expr::Call(name, args))
    }

    fn parse_if_expr(&mut self, ops: &OperatorTable) -> Result<Expr> {
        self.next_token(); // eat 'if'
        let cond = self.parse_expression(ops)?;
        self.expect(Token::Then, "expected then")?;
        let then = self.parse_expression(ops)?;
        self.expect(Token::Else, "expected else")?;
        let els = self.parse_expression(ops)?;

        Ok(Expr::If(Box::new(cond), Box::new(then), Box::new(els)))
    }

    fn parse_for_expr(&mut self, ops: &OperatorTable) -> Result<Expr> {
        self.next_token(); // eat 'for'
        let id = self.expect_ident("expected identifier after for")?;
        self.expect_kwd('=', "expected '=' after for")?;
        let start = self.parse_expression(ops)?;
        self.expect_kwd(',', "expected ',' after for start value")?;
        let end = self.parse_expression(ops)?;

        let step = if self.is_kwd(',') {
            self.next_token();
            Some(Box::new(self.parse_expression(ops)?))
        } else {
            None
        };

        self.expect(Token::In, "expected 'in' after for")?;
        let body = self.parse_expression(ops)?;

        Ok(Expr::For(
            id,
            Box::new(start),
            Box::new(end),
            step,
            Box::new(body),
        ))
    }

    fn parse_var_expr(&mut self, ops: &OperatorTable) -> Result<Expr> {
        self.next_token(); // eat 'var'

        let mut vars = Vec::new();
        let mut msg = "expected identifier after var";
        loop {
            let name = self.expect_ident(msg)?;
            let init = if self.is_kwd('=') {
                self.next_token();
                Some(self.parse_expression(ops)?)
            } else {
                None
            };
            vars.push((name, init));

            if !self.is_kwd(',') {
                break;
            }
            self.next_token();
            msg = "expected identifier list after var";
        }

        self.expect(Token::In, "expected 'in' keyword after 'var'")?;
        let body = self.parse_expression(ops)?;

        Ok(Expr::Var(vars, Box::new(body)))
    }

    fn parse_primary(&mut self, ops: &OperatorTable) -> Result<Expr> {
        match self.current.clone() {
            Token::Ident(name) => {
                self.next_token();
                self.parse_identifier_expr(ops, name)
            }
            Token::Number(n) => {
                self.next_token();
                Ok(Expr::Number(n))
            }
            Token::If => self.parse_if_expr(ops),
            Token::For => self.parse_for_expr(ops),
            Token::Var => self.parse_var_expr(ops),
            Token::Kwd('(') => self.parse_paren_expr(ops),
            t => Err(Error::parse(format!(
                "unknown token when expecting an expression: {}",
                t
            ))),
        }
    }

    fn parse_unary(&mut self, ops: &OperatorTable) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(Error::parse("expression nested too deeply"));
        }
        self.depth += 1;
        let e = self.parse_unary_operand(ops);
        self.depth -= 1;
        e
    }

    fn parse_unary_operand(&mut self, ops: &OperatorTable) -> Result<Expr> {
        let op = match self.current {
            Token::Kwd(c) if c.is_ascii_punctuation() && c != '(' && c != ',' => c,
            _ => return self.parse_primary(ops),
        };
        self.next_token();
        let operand = self.parse_unary(ops)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    /// Precedence climbing: absorbs operators binding at least as tightly as
    /// `expr_prec` into `lhs`.
    fn parse_binop_rhs(&mut self, ops: &OperatorTable, expr_prec: i32, mut lhs: Expr) -> Result<Expr> {
        let mut lhs_depth = lhs.depth();
        loop {
            let tok_prec = self.precedence(ops);
            if tok_prec < expr_prec {
                return Ok(lhs);
            }

            let op = match self.current {
                Token::Kwd(c) => c,
                _ => return Ok(lhs),
            };
            self.next_token();

            let mut rhs = self.parse_unary(ops)?;

            let next_prec = self.precedence(ops);
            if tok_prec < next_prec {
                rhs = self.parse_binop_rhs(ops, tok_prec + 1, rhs)?;
            }

            // Chains of one precedence deepen the tree in this loop, not
            // through parse_unary.
            let depth = 1 + lhs_depth.max(rhs.depth());
            if self.depth + depth > MAX_EXPR_DEPTH {
                return Err(Error::parse("expression nested too deeply"));
            }
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
            lhs_depth = depth;
        }
    }

    pub fn parse_expression(&mut self, ops: &OperatorTable) -> Result<Expr> {
        let lhs = self.parse_unary(ops)?;
        self.parse_binop_rhs(ops, 0, lhs)
    }

    fn expect_operator(&mut self, msg: &str) -> Result<char> {
        let op = match self.current {
            Token::Kwd(c) if c.is_ascii_punctuation() => c,
            _ => return Err(Error::parse(msg)),
        };
        self.next_token();
        Ok(op)
    }

    pub fn parse_prototype(&mut self) -> Result<Prototype> {
        let (name, kind) = match self.current.clone() {
            Token::Ident(name) => {
                self.next_token();
                (name, ProtoKind::Function)
            }
            Token::Unary => {
                self.next_token();
                let op = self.expect_operator("Expected unary operator")?;
                (format!("unary{}", op), ProtoKind::Unary)
            }
            Token::Binary => {
                self.next_token();
                let op = self.expect_operator("Expected binary operator")?;
                let mut precedence = DEFAULT_PRECEDENCE;
                if let Token::Number(n) = self.current {
                    if n < 1.0 || n > 100.0 {
                        return Err(Error::parse("Invalid precedence: must be 1..100"));
                    }
                    precedence = n as i32;
                    self.next_token();
                }
                (format!("binary{}", op), ProtoKind::Binary(precedence))
            }
            _ => return Err(Error::parse("Expected function name in prototype")),
        };

        if !self.is_kwd('(') {
            return Err(Error::parse("Expected '(' in prototype"));
        }

        let mut args = Vec::new();
        while let Token::Ident(arg) = self.next_token() {
            args.push(arg.clone());
        }

        self.expect_kwd(')', "Expected ')' in prototype")?;

        let operands = match kind {
            ProtoKind::Function => None,
            ProtoKind::Unary => Some(1),
            ProtoKind::Binary(_) => Some(2),
        };
        if operands.map_or(false, |n| n != args.len()) {
            return Err(Error::parse("Invalid number of operands for operator"));
        }

        Ok(Prototype { name, args, kind })
    }

    /// definition ::= 'def' prototype expression
    pub fn parse_definition(&mut self, ops: &OperatorTable) -> Result<Function> {
        self.next_token(); // eat 'def'
        let proto = self.parse_prototype()?;
        let body = self.parse_expression(ops)?;
        Ok(Function { proto, body })
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self) -> Result<Prototype> {
        self.next_token(); // eat 'extern'
        self.parse_prototype()
    }

    pub fn parse_top_level_expr(&mut self, ops: &OperatorTable) -> Result<Function> {
        let body = self.parse_expression(ops)?;
        Ok(Function {
            proto: Prototype::new(ANON_FN.to_owned(), vec![]),
            body,
        })
    }
}
