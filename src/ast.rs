#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary(char, Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    If(Box<Expr>, Box<Expr>, Box<Expr>),
    /// `for var = start, end, step in body`
    For(String, Box<Expr>, Box<Expr>, Option<Box<Expr>>, Box<Expr>),
    Var(Vec<(String, Option<Expr>)>, Box<Expr>),
}

impl Expr {
    /// Height of the tree rooted at this node; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        let children = match self {
            Expr::Number(_) | Expr::Variable(_) => return 1,
            Expr::Unary(_, e) => e.depth(),
            Expr::Binary(_, l, r) => l.depth().max(r.depth()),
            Expr::Call(_, args) => args.iter().map(Expr::depth).max().unwrap_or(0),
            Expr::If(c, t, e) => c.depth().max(t.depth()).max(e.depth()),
            Expr::For(_, start, end, step, body) => start
                .depth()
                .max(end.depth())
                .max(step.as_ref().map_or(0, |s| s.depth()))
                .max(body.depth()),
            Expr::Var(vars, body) => vars
                .iter()
                .filter_map(|(_, init)| init.as_ref().map(Expr::depth))
                .max()
                .unwrap_or(0)
                .max(body.depth()),
        };
        children + 1
    }
}

pub const DEFAULT_PRECEDENCE: i32 = 30;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProtoKind {
    Function,
    Unary,
    Binary(i32),
}

/// A function signature. Operator prototypes are named `unary<op>` or
/// `binary<op>`, so the operator is always the last character of the name.
#[derive(Debug, Clone, PartialEq)]
pub struct Prototype {
    pub name: String,
    pub args: Vec<String>,
    pub kind: ProtoKind,
}

impl Prototype {
    pub fn new(name: String, args: Vec<String>) -> Self {
        Prototype {
            name,
            args,
            kind: ProtoKind::Function,
        }
    }

    pub fn operator_name(&self) -> Option<char> {
        match self.kind {
            ProtoKind::Function => None,
            _ => self.name.chars().last(),
        }
    }

    pub fn binary_precedence(&self) -> Option<i32> {
        match self.kind {
            ProtoKind::Binary(p) => Some(p),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_operator_name() {
        let p = Prototype {
            name: "binary%".to_owned(),
            args: vec!["a".to_owned(), "b".to_owned()],
            kind: ProtoKind::Binary(10),
        };
        assert_eq!(p.operator_name(), Some('%'));
        assert_eq!(p.binary_precedence(), Some(10));

        let u = Prototype {
            name: "unary!".to_owned(),
            args: vec!["v".to_owned()],
            kind: ProtoKind::Unary,
        };
        assert_eq!(u.operator_name(), Some('!'));
        assert_eq!(u.binary_precedence(), None);

        let f = Prototype::new("foo".to_owned(), vec![]);
        assert_eq!(f.operator_name(), None);
        assert_eq!(f.binary_precedence(), None);
    }

    #[test]
    fn test_depth() {
        let leaf = Expr::Number(1.0);
        assert_eq!(leaf.depth(), 1);

        let sum = Expr::Binary('+', Box::new(leaf.clone()), Box::new(leaf.clone()));
        assert_eq!(sum.depth(), 2);

        let call = Expr::Call("f".to_owned(), vec![leaf.clone(), sum.clone()]);
        assert_eq!(call.depth(), 3);
        assert_eq!(Expr::Call("g".to_owned(), vec![]).depth(), 1);

        let var = Expr::Var(vec![("a".to_owned(), Some(call)), ("b".to_owned(), None)], Box::new(leaf));
        assert_eq!(var.depth(), 4);
    }
}
