//! Reference evaluator for the IR.
//!
//! Stands in for a JIT: walks the blocks of a module function directly.
//! Declarations without a body resolve to the host primitives below.
//! Calls push frames onto a heap stack, so deep recursion in the evaluated
//! program never recurses on the host.

use std::io::Write;

use super::error::Error;
use super::ir::{BlockId, FloatPredicate, Function, InstKind, Module, Terminator, Value};

const MAX_CALL_DEPTH: usize = 100_000;

type Result<T> = std::result::Result<T, Error>;

/// Activation record of one defined function.
struct Frame<'m> {
    func: &'m Function,
    args: Vec<f64>,
    /// One register per instruction; an alloca's register is its slot.
    regs: Vec<f64>,
    block: BlockId,
    prev: Option<BlockId>,
    /// Index of the next instruction to run within `block`.
    pos: usize,
}

impl<'m> Frame<'m> {
    fn new(func: &'m Function, args: Vec<f64>) -> Result<Self> {
        let block = func
            .entry()
            .ok_or_else(|| Error::exec(format!("'{}' has no body", func.name)))?;
        Ok(Frame {
            func,
            args,
            regs: vec![0.0; func.inst_count()],
            block,
            prev: None,
            pos: 0,
        })
    }

    fn value(&self, v: Value) -> f64 {
        match v {
            Value::Const(n) => n,
            Value::Arg(i) => self.args[i],
            Value::Inst(id) => self.regs[id.0],
        }
    }

    fn jump(&mut self, to: BlockId) {
        self.prev = Some(self.block);
        self.block = to;
        self.pos = 0;
    }

    /// Completes the call instruction the frame is suspended on.
    fn resume(&mut self, result: f64) {
        let id = self.func.block(self.block).insts[self.pos];
        self.regs[id.0] = result;
        self.pos += 1;
    }
}

enum Step<'m> {
    Call(&'m str, Vec<f64>),
    Return(f64),
}

fn slot(v: Value) -> Result<usize> {
    match v {
        Value::Inst(id) => Ok(id.0),
        _ => Err(Error::exec("store or load through a non-slot value")),
    }
}

pub struct Executor<'m, W> {
    module: &'m Module,
    out: W,
}

impl<'m, W: Write> Executor<'m, W> {
    /// Host primitives write to `out`.
    pub fn new(module: &'m Module, out: W) -> Self {
        Executor { module, out }
    }

    pub fn run(&mut self, name: &str, args: &[f64]) -> Result<f64> {
        let func = self.lookup(name, args.len())?;
        if func.is_declaration() {
            return self.call_host(name, args);
        }

        let mut stack = vec![Frame::new(func, args.to_vec())?];
        loop {
            let next = match stack.last_mut() {
                Some(frame) => step(frame)?,
                None => return Err(Error::exec("empty call stack")),
            };

            match next {
                Step::Call(callee, args) => {
                    let func = self.lookup(callee, args.len())?;
                    if func.is_declaration() {
                        let v = self.call_host(callee, &args)?;
                        if let Some(caller) = stack.last_mut() {
                            caller.resume(v);
                        }
                    } else {
                        if stack.len() >= MAX_CALL_DEPTH {
                            return Err(Error::exec("call stack exhausted"));
                        }
                        stack.push(Frame::new(func, args)?);
                    }
                }
                Step::Return(v) => {
                    stack.pop();
                    match stack.last_mut() {
                        Some(caller) => caller.resume(v),
                        None => return Ok(v),
                    }
                }
            }
        }
    }

    fn lookup(&self, name: &str, argc: usize) -> Result<&'m Function> {
        let module = self.module;
        let func = module
            .get_function(name)
            .ok_or_else(|| Error::exec(format!("Unknown function '{}'", name)))?;

        if func.arity() != argc {
            return Err(Error::exec(format!(
                "'{}' expects {} arguments, got {}",
                name,
                func.arity(),
                argc
            )));
        }
        Ok(func)
    }

    fn call_host(&mut self, name: &str, args: &[f64]) -> Result<f64> {
        let io = |e: std::io::Error| Error::exec(format!("{}: {}", name, e));
        match (name, args) {
            ("putchard", &[x]) => {
                write!(self.out, "{}", x as u8 as char).map_err(io)?;
                Ok(0.0)
            }
            ("printd", &[x]) => {
                writeln!(self.out, "{:.6}", x).map_err(io)?;
                Ok(0.0)
            }
            _ => Err(Error::exec(format!("Unresolved external function '{}'", name))),
        }
    }
}

/// Runs `frame` until it either calls out or returns.
fn step<'m>(frame: &mut Frame<'m>) -> Result<Step<'m>> {
    let func = frame.func;
    loop {
        let bb = func.block(frame.block);
        while let Some(&id) = bb.insts.get(frame.pos) {
            let v = match &func.inst(id).kind {
                InstKind::Alloca => Some(0.0),
                InstKind::Load(s) => Some(frame.regs[slot(*s)?]),
                InstKind::Store { value, slot: s } => {
                    let v = frame.value(*value);
                    frame.regs[slot(*s)?] = v;
                    None
                }
                InstKind::FAdd(l, r) => Some(frame.value(*l) + frame.value(*r)),
                InstKind::FSub(l, r) => Some(frame.value(*l) - frame.value(*r)),
                InstKind::FMul(l, r) => Some(frame.value(*l) * frame.value(*r)),
                InstKind::FCmp(pred, l, r) => {
                    Some(bool_to_f64(pred.eval(frame.value(*l), frame.value(*r))))
                }
                InstKind::UIToFP(x) => Some(frame.value(*x)),
                InstKind::Call { callee, args } => {
                    let args = args.iter().map(|a| frame.value(*a)).collect();
                    return Ok(Step::Call(callee, args));
                }
                InstKind::Phi(incoming) => {
                    let from = frame.prev.ok_or_else(|| Error::exec("phi in entry block"))?;
                    let (v, _) = incoming
                        .iter()
                        .find(|(_, bb)| *bb == from)
                        .ok_or_else(|| Error::exec("phi has no value for predecessor"))?;
                    Some(frame.value(*v))
                }
            };
            if let Some(v) = v {
                frame.regs[id.0] = v;
            }
            frame.pos += 1;
        }

        match bb.terminator {
            Some(Terminator::Ret(v)) => return Ok(Step::Return(frame.value(v))),
            Some(Terminator::Br(dest)) => frame.jump(dest),
            Some(Terminator::CondBr {
                cond,
                then_block,
                else_block,
            }) => {
                if FloatPredicate::One.eval(frame.value(cond), 0.0) {
                    frame.jump(then_block)
                } else {
                    frame.jump(else_block)
                }
            }
            None => return Err(Error::exec(format!("unterminated block in '{}'", func.name))),
        }
    }
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod test {
    use super::super::ir::{Builder, Function};
    use super::*;

    fn module_with(f: Function) -> Module {
        let mut m = Module::new("test");
        m.add_function(f);
        m
    }

    #[test]
    fn test_arithmetic() {
        let mut b = Builder::new("f", vec!["x".to_owned()]);
        let t = b.build_fmul(Value::Arg(0), Value::Const(3.0), "multmp");
        let t = b.build_fsub(t, Value::Const(1.0), "subtmp");
        b.build_ret(t);
        let m = module_with(b.finish());

        let mut out = Vec::new();
        assert_eq!(Executor::new(&m, &mut out).run("f", &[2.0]).unwrap(), 5.0);
    }

    #[test]
    fn test_branches_and_phi() {
        // f(x) = if x < 1 then 10 else 20
        let mut b = Builder::new("f", vec!["x".to_owned()]);
        let c = b.build_fcmp(FloatPredicate::Ult, Value::Arg(0), Value::Const(1.0), "cmptmp");
        let then_bb = b.create_block("then");
        let else_bb = b.create_block("else");
        let merge = b.create_block("ifcont");
        b.build_cond_br(c, then_bb, else_bb);
        b.append_block(then_bb);
        b.position_at_end(then_bb);
        b.build_br(merge);
        b.append_block(else_bb);
        b.position_at_end(else_bb);
        b.build_br(merge);
        b.append_block(merge);
        b.position_at_end(merge);
        let phi = b.build_phi(vec![(Value::Const(10.0), then_bb), (Value::Const(20.0), else_bb)], "iftmp");
        b.build_ret(phi);
        let m = module_with(b.finish());

        let mut out = Vec::new();
        let mut exec = Executor::new(&m, &mut out);
        assert_eq!(exec.run("f", &[0.0]).unwrap(), 10.0);
        assert_eq!(exec.run("f", &[5.0]).unwrap(), 20.0);
    }

    #[test]
    fn test_host_primitives() {
        let mut m = Module::new("test");
        m.add_function(Function::declaration("putchard", vec!["c".to_owned()]));
        m.add_function(Function::declaration("printd", vec!["x".to_owned()]));
        m.add_function(Function::declaration("mystery", vec![]));

        let mut out = Vec::new();
        {
            let mut exec = Executor::new(&m, &mut out);
            assert_eq!(exec.run("putchard", &[72.0]).unwrap(), 0.0);
            assert_eq!(exec.run("printd", &[1.5]).unwrap(), 0.0);
            assert!(exec.run("mystery", &[]).is_err());
            assert!(exec.run("printd", &[]).is_err());
        }
        assert_eq!(String::from_utf8(out).unwrap(), "H1.500000\n");
    }

    #[test]
    fn test_deep_recursion() {
        // down(n) = if n < 1 then 0 else down(n - 1)
        let mut b = Builder::new("down", vec!["n".to_owned()]);
        let c = b.build_fcmp(FloatPredicate::Ult, Value::Arg(0), Value::Const(1.0), "cmptmp");
        let base = b.create_block("base");
        let rec = b.create_block("rec");
        b.build_cond_br(c, base, rec);
        b.append_block(base);
        b.position_at_end(base);
        b.build_ret(Value::Const(0.0));
        b.append_block(rec);
        b.position_at_end(rec);
        let n = b.build_fsub(Value::Arg(0), Value::Const(1.0), "subtmp");
        let v = b.build_call("down", vec![n], "calltmp");
        b.build_ret(v);
        let m = module_with(b.finish());

        let mut out = Vec::new();
        assert_eq!(Executor::new(&m, &mut out).run("down", &[20_000.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_unbounded_recursion_is_an_error() {
        let mut b = Builder::new("loop", vec![]);
        let v = b.build_call("loop", vec![], "calltmp");
        b.build_ret(v);
        let m = module_with(b.finish());

        let mut out = Vec::new();
        let e = Executor::new(&m, &mut out).run("loop", &[]).unwrap_err();
        assert_eq!(e.to_string(), "call stack exhausted");
    }
}
