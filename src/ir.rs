//! In-memory SSA intermediate representation.
//!
//! Mirrors the subset of LLVM IR the front end needs: every value is a
//! `double`, except the `i1` produced by `fcmp`. Mutable variables live in
//! entry-block `alloca` slots.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Const(f64),
    /// The n-th function parameter.
    Arg(usize),
    Inst(InstId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatPredicate {
    /// Ordered and not equal.
    One,
    /// Unordered or less than.
    Ult,
}

impl FloatPredicate {
    pub fn eval(self, l: f64, r: f64) -> bool {
        match self {
            FloatPredicate::One => !l.is_nan() && !r.is_nan() && l != r,
            FloatPredicate::Ult => l.is_nan() || r.is_nan() || l < r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    Alloca,
    Load(Value),
    /// `Store { value, slot }`
    Store { value: Value, slot: Value },
    FAdd(Value, Value),
    FSub(Value, Value),
    FMul(Value, Value),
    FCmp(FloatPredicate, Value, Value),
    UIToFP(Value),
    Call { callee: String, args: Vec<Value> },
    Phi(Vec<(Value, BlockId)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub name: String,
    pub kind: InstKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Terminator {
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub name: String,
    pub insts: Vec<InstId>,
    pub terminator: Option<Terminator>,
}

/// A function definition, or a declaration when it has no blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<String>,
    blocks: Vec<BasicBlock>,
    /// Order in which blocks are laid out; blocks may be created before they
    /// are placed.
    layout: Vec<BlockId>,
    insts: Vec<Instruction>,
}

impl Function {
    pub fn declaration(name: &str, params: Vec<String>) -> Self {
        Function {
            name: name.to_owned(),
            params,
            blocks: Vec::new(),
            layout: Vec::new(),
            insts: Vec::new(),
        }
    }

    pub fn is_declaration(&self) -> bool {
        self.layout.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }

    pub fn inst(&self, id: InstId) -> &Instruction {
        &self.insts[id.0]
    }

    pub fn inst_count(&self) -> usize {
        self.insts.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> + '_ {
        self.layout.iter().map(move |&id| (id, &self.blocks[id.0]))
    }

    fn block_label(&self, id: BlockId) -> String {
        let name = &self.blocks[id.0].name;
        if id.0 == 0 {
            name.clone()
        } else {
            format!("{}{}", name, id.0)
        }
    }

    fn value(&self, v: Value) -> String {
        match v {
            Value::Const(n) => format!("{:?}", n),
            Value::Arg(i) => format!("%{}", self.params[i]),
            Value::Inst(id) => format!("%{}{}", self.insts[id.0].name, id.0),
        }
    }

    fn fmt_inst(&self, f: &mut fmt::Formatter, id: InstId) -> fmt::Result {
        let inst = &self.insts[id.0];
        let v = |v: Value| self.value(v);
        let dest = v(Value::Inst(id));
        match &inst.kind {
            InstKind::Alloca => writeln!(f, "  {} = alloca double", dest),
            InstKind::Load(slot) => writeln!(f, "  {} = load double, double* {}", dest, v(*slot)),
            InstKind::Store { value, slot } => {
                writeln!(f, "  store double {}, double* {}", v(*value), v(*slot))
            }
            InstKind::FAdd(l, r) => writeln!(f, "  {} = fadd double {}, {}", dest, v(*l), v(*r)),
            InstKind::FSub(l, r) => writeln!(f, "  {} = fsub double {}, {}", dest, v(*l), v(*r)),
            InstKind::FMul(l, r) => writeln!(f, "  {} = fmul double {}, {}", dest, v(*l), v(*r)),
            InstKind::FCmp(pred, l, r) => {
                let pred = match pred {
                    FloatPredicate::One => "one",
                    FloatPredicate::Ult => "ult",
                };
                writeln!(f, "  {} = fcmp {} double {}, {}", dest, pred, v(*l), v(*r))
            }
            InstKind::UIToFP(x) => writeln!(f, "  {} = uitofp i1 {} to double", dest, v(*x)),
            InstKind::Call { callee, args } => {
                let args: Vec<String> = args.iter().map(|a| format!("double {}", v(*a))).collect();
                writeln!(f, "  {} = call double @{}({})", dest, callee, args.join(", "))
            }
            InstKind::Phi(incoming) => {
                let incoming: Vec<String> = incoming
                    .iter()
                    .map(|(val, bb)| format!("[ {}, %{} ]", v(*val), self.block_label(*bb)))
                    .collect();
                writeln!(f, "  {} = phi double {}", dest, incoming.join(", "))
            }
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params: Vec<String> = self.params.iter().map(|p| format!("double %{}", p)).collect();
        let params = params.join(", ");

        if self.is_declaration() {
            return writeln!(f, "declare double @{}({})", self.name, params);
        }

        writeln!(f, "define double @{}({}) {{", self.name, params)?;
        for (i, (id, block)) in self.blocks().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{}:", self.block_label(id))?;
            for &inst in &block.insts {
                self.fmt_inst(f, inst)?;
            }
            match block.terminator {
                Some(Terminator::Br(b)) => writeln!(f, "  br label %{}", self.block_label(b))?,
                Some(Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                }) => writeln!(
                    f,
                    "  br i1 {}, label %{}, label %{}",
                    self.value(cond),
                    self.block_label(then_block),
                    self.block_label(else_block)
                )?,
                Some(Terminator::Ret(v)) => writeln!(f, "  ret double {}", self.value(v))?,
                None => {}
            }
        }
        writeln!(f, "}}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    functions: Vec<Function>,
}

impl Module {
    pub fn new(name: &str) -> Self {
        Module {
            name: name.to_owned(),
            functions: Vec::new(),
        }
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Adds `function`, replacing any function of the same name.
    pub fn add_function(&mut self, function: Function) {
        match self.functions.iter_mut().find(|f| f.name == function.name) {
            Some(slot) => *slot = function,
            None => self.functions.push(function),
        }
    }

    pub fn remove_function(&mut self, name: &str) -> Option<Function> {
        let pos = self.functions.iter().position(|f| f.name == name)?;
        Some(self.functions.remove(pos))
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        for func in self.functions() {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

/// Appends instructions to a function under construction.
pub struct Builder {
    func: Function,
    block: BlockId,
    allocas: usize,
}

impl Builder {
    /// Starts a definition of `name` with an `entry` block as insertion point.
    pub fn new(name: &str, params: Vec<String>) -> Self {
        let mut builder = Builder {
            func: Function::declaration(name, params),
            block: BlockId(0),
            allocas: 0,
        };
        let entry = builder.create_block("entry");
        builder.append_block(entry);
        builder.position_at_end(entry);
        builder
    }

    pub fn finish(self) -> Function {
        self.func
    }

    pub fn create_block(&mut self, name: &str) -> BlockId {
        let id = BlockId(self.func.blocks.len());
        self.func.blocks.push(BasicBlock {
            name: name.to_owned(),
            insts: Vec::new(),
            terminator: None,
        });
        id
    }

    pub fn append_block(&mut self, id: BlockId) {
        self.func.layout.push(id);
    }

    pub fn position_at_end(&mut self, id: BlockId) {
        self.block = id;
    }

    pub fn insert_block(&self) -> BlockId {
        self.block
    }

    fn push(&mut self, name: &str, kind: InstKind) -> InstId {
        let id = InstId(self.func.insts.len());
        self.func.insts.push(Instruction {
            name: name.to_owned(),
            kind,
        });
        self.func.blocks[self.block.0].insts.push(id);
        id
    }

    /// Allocates a slot at the top of the entry block, wherever the insertion
    /// point currently is.
    pub fn build_entry_alloca(&mut self, name: &str) -> Value {
        let id = InstId(self.func.insts.len());
        self.func.insts.push(Instruction {
            name: name.to_owned(),
            kind: InstKind::Alloca,
        });
        self.func.blocks[0].insts.insert(self.allocas, id);
        self.allocas += 1;
        Value::Inst(id)
    }

    pub fn build_load(&mut self, slot: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::Load(slot)))
    }

    pub fn build_store(&mut self, value: Value, slot: Value) {
        self.push("", InstKind::Store { value, slot });
    }

    pub fn build_fadd(&mut self, l: Value, r: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::FAdd(l, r)))
    }

    pub fn build_fsub(&mut self, l: Value, r: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::FSub(l, r)))
    }

    pub fn build_fmul(&mut self, l: Value, r: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::FMul(l, r)))
    }

    pub fn build_fcmp(&mut self, pred: FloatPredicate, l: Value, r: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::FCmp(pred, l, r)))
    }

    pub fn build_uitofp(&mut self, v: Value, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::UIToFP(v)))
    }

    pub fn build_call(&mut self, callee: &str, args: Vec<Value>, name: &str) -> Value {
        let kind = InstKind::Call {
            callee: callee.to_owned(),
            args,
        };
        Value::Inst(self.push(name, kind))
    }

    pub fn build_phi(&mut self, incoming: Vec<(Value, BlockId)>, name: &str) -> Value {
        Value::Inst(self.push(name, InstKind::Phi(incoming)))
    }

    fn terminate(&mut self, t: Terminator) {
        self.func.blocks[self.block.0].terminator = Some(t);
    }

    pub fn build_br(&mut self, dest: BlockId) {
        self.terminate(Terminator::Br(dest));
    }

    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn build_ret(&mut self, v: Value) {
        self.terminate(Terminator::Ret(v));
    }
}
