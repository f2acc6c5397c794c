use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Def,
    Extern,
    If,
    Then,
    Else,
    For,
    In,
    Binary,
    Unary,
    Var,
    Ident(String),
    Number(f64),
    Kwd(char),
    Eof,
}

impl Token {
    pub(crate) fn keyword(id: &str) -> Option<Token> {
        let t = match id {
            "def" => Token::Def,
            "extern" => Token::Extern,
            "if" => Token::If,
            "then" => Token::Then,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            "binary" => Token::Binary,
            "unary" => Token::Unary,
            "var" => Token::Var,
            _ => return None,
        };
        Some(t)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Def => write!(f, "def"),
            Token::Extern => write!(f, "extern"),
            Token::If => write!(f, "if"),
            Token::Then => write!(f, "then"),
            Token::Else => write!(f, "else"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::Binary => write!(f, "binary"),
            Token::Unary => write!(f, "unary"),
            Token::Var => write!(f, "var"),
            Token::Ident(id) => write!(f, "{}", id),
            Token::Number(n) => write!(f, "{}", n),
            Token::Kwd(c) => write!(f, "'{}'", c),
            Token::Eof => write!(f, "end of input"),
        }
    }
}
