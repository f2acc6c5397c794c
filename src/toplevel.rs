use std::io::Write;

use failure::ResultExt;

use super::codegen::CodeGen;
use super::error::{Error, ErrorKind};
use super::exec::Executor;
use super::ir::Module;
use super::lexer::Lexer;
use super::operators::OperatorTable;
use super::parser::{Parser, ANON_FN};
use super::token::Token;

/// What an accepted top-level unit produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Definition(String),
    Extern(String),
    Expression(f64),
}

/// One compilation session: the operator table, the module under
/// construction, and the two sinks everything is reported to.
///
/// State persists across calls to `run`, so a REPL can feed it line by line.
pub struct Session<O, E> {
    operators: OperatorTable,
    codegen: CodeGen,
    out: O,
    err: E,
    dump_ir: bool,
}

impl<O: Write, E: Write> Session<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Session {
            operators: OperatorTable::default(),
            codegen: CodeGen::new("my cool jit"),
            out,
            err,
            dump_ir: false,
        }
    }

    /// Echo the IR of every accepted unit to the output sink.
    pub fn dump_ir(mut self, on: bool) -> Self {
        self.dump_ir = on;
        self
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    pub fn module(&self) -> &Module {
        self.codegen.module()
    }

    pub fn output(&mut self) -> &mut O {
        &mut self.out
    }

    pub fn into_streams(self) -> (O, E) {
        (self.out, self.err)
    }

    /// Runs the driver loop over `source` until end of input.
    ///
    /// Failures are written to the error sink as `Error: <message>` and the
    /// loop carries on; only a failing sink ends it early.
    pub fn run(&mut self, source: &str) -> Result<Vec<Item>, Error> {
        let mut parser = Parser::new(Lexer::new(source));
        let mut items = Vec::new();

        loop {
            let result = match parser.current() {
                Token::Eof => break,
                Token::Kwd(';') => {
                    parser.next_token();
                    continue;
                }
                Token::Def => self.handle_definition(&mut parser),
                Token::Extern => self.handle_extern(&mut parser),
                _ => self.handle_top_level_expression(&mut parser),
            };

            match result {
                Ok(item) => items.push(item),
                Err(e) => {
                    if *e.kind() == ErrorKind::Io {
                        return Err(e);
                    }
                    writeln!(self.err, "Error: {}", e).context(ErrorKind::Io)?;
                    // Parse errors leave the parser mid-unit; skip a token
                    // for recovery.
                    if let ErrorKind::Parse(_) = e.kind() {
                        parser.next_token();
                    }
                }
            }
        }

        Ok(items)
    }

    fn handle_definition(&mut self, parser: &mut Parser) -> Result<Item, Error> {
        let function = parser.parse_definition(&self.operators)?;
        let ir = self.codegen.gen_function(&mut self.operators, &function)?;
        if self.dump_ir {
            write!(self.out, "Read function definition:\n{}", ir).context(ErrorKind::Io)?;
        }
        Ok(Item::Definition(function.proto.name))
    }

    fn handle_extern(&mut self, parser: &mut Parser) -> Result<Item, Error> {
        let proto = parser.parse_extern()?;
        let name = proto.name.clone();
        let ir = self.codegen.gen_extern(proto)?;
        if self.dump_ir {
            write!(self.out, "Read extern: {}", ir).context(ErrorKind::Io)?;
        }
        Ok(Item::Extern(name))
    }

    fn handle_top_level_expression(&mut self, parser: &mut Parser) -> Result<Item, Error> {
        let function = parser.parse_top_level_expr(&self.operators)?;
        let ir = self.codegen.gen_function(&mut self.operators, &function)?;
        if self.dump_ir {
            write!(self.out, "Read top-level expression:\n{}", ir).context(ErrorKind::Io)?;
        }

        let result = Executor::new(self.codegen.module(), &mut self.out).run(ANON_FN, &[]);
        self.codegen.remove_function(ANON_FN);
        let value = result?;

        writeln!(self.out, "Evaluated to {}", value).context(ErrorKind::Io)?;
        Ok(Item::Expression(value))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn session() -> Session<Vec<u8>, Vec<u8>> {
        Session::new(Vec::new(), Vec::new())
    }

    #[test]
    fn test_units() {
        let mut s = session();
        let items = s.run("extern sin(x); def foo(x) x + 1; foo(2)").unwrap();
        assert_eq!(
            items,
            vec![
                Item::Extern("sin".to_owned()),
                Item::Definition("foo".to_owned()),
                Item::Expression(3.0),
            ]
        );
        let (out, err) = s.into_streams();
        assert_eq!(String::from_utf8(out).unwrap(), "Evaluated to 3\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_anonymous_function_is_discarded() {
        let mut s = session();
        let items = s.run("1; 2").unwrap();
        assert_eq!(items, vec![Item::Expression(1.0), Item::Expression(2.0)]);
        assert!(s.module().get_function(ANON_FN).is_none());
    }

    #[test]
    fn test_codegen_error_skips_nothing() {
        let mut s = session();
        let items = s.run("foo(1) def bar(x) x").unwrap();
        assert_eq!(items, vec![Item::Definition("bar".to_owned())]);
        let (_, err) = s.into_streams();
        assert_eq!(
            String::from_utf8(err).unwrap(),
            "Error: Unknown function referenced: 'foo'\n"
        );
    }

    #[test]
    fn test_dump_ir() {
        let mut s = session().dump_ir(true);
        s.run("extern cos(x)").unwrap();
        let (out, _) = s.into_streams();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Read extern: declare double @cos(double %x)\n"
        );
    }

    #[test]
    fn test_state_persists_between_runs() {
        let mut s = session();
        s.run("def mod(a b) if a < b then a else mod(a - b, b)").unwrap();
        s.run("def binary% 10 (a b) mod(a, b)").unwrap();
        assert_eq!(s.operators().precedence('%'), Some(10));
        assert_eq!(s.run("10 % 3").unwrap(), vec![Item::Expression(1.0)]);
    }
}
