//! Front end for the Kaleidoscope toy language: lexer, precedence-climbing
//! parser, and a code generator producing an SSA IR module.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod exec;
pub mod ir;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod token;
pub mod toplevel;
