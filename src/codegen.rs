use std::collections::HashMap;

use super::ast::{Expr, Function, Prototype};
use super::error::Error;
use super::ir::{self, Builder, FloatPredicate, Value};
use super::operators::OperatorTable;

type Result<T> = std::result::Result<T, Error>;

/// Lowers AST into the IR module.
///
/// `named_values` maps each variable in scope to its `alloca` slot and is
/// reset at the start of every function. `protos` remembers every signature
/// seen through `extern` or `def` so calls can be declared on demand.
pub struct CodeGen {
    module: ir::Module,
    protos: HashMap<String, Prototype>,
    named_values: HashMap<String, Value>,
}

impl CodeGen {
    pub fn new(module_name: &str) -> Self {
        CodeGen {
            module: ir::Module::new(module_name),
            protos: HashMap::new(),
            named_values: HashMap::new(),
        }
    }

    pub fn module(&self) -> &ir::Module {
        &self.module
    }

    pub fn prototype(&self, name: &str) -> Option<&Prototype> {
        self.protos.get(name)
    }

    /// Forgets `name` entirely: both its IR and its cached signature.
    pub fn remove_function(&mut self, name: &str) -> Option<ir::Function> {
        self.protos.remove(name);
        self.module.remove_function(name)
    }

    fn function(&self, name: &str) -> Result<&ir::Function> {
        self.module
            .get_function(name)
            .ok_or_else(|| Error::codegen(format!("Function '{}' vanished from the module", name)))
    }

    /// Returns the arity of `name`, declaring it in the module from the cached
    /// prototype if it is not there yet.
    fn resolve_function(&mut self, name: &str) -> Option<usize> {
        if let Some(f) = self.module.get_function(name) {
            return Some(f.arity());
        }

        let proto = self.prototype(name)?;
        let decl = ir::Function::declaration(&proto.name, proto.args.clone());
        let arity = decl.arity();
        self.module.add_function(decl);
        Some(arity)
    }

    pub fn gen_prototype(&mut self, proto: &Prototype) -> Result<&ir::Function> {
        let keep_existing = match self.module.get_function(&proto.name) {
            Some(f) if !f.is_declaration() => {
                if f.arity() != proto.args.len() {
                    return Err(Error::codegen(format!(
                        "Function '{}' redeclared with a different number of arguments",
                        proto.name
                    )));
                }
                true
            }
            _ => false,
        };

        if !keep_existing {
            self.module
                .add_function(ir::Function::declaration(&proto.name, proto.args.clone()));
        }
        self.function(&proto.name)
    }

    /// Declares an external function and remembers its signature.
    pub fn gen_extern(&mut self, proto: Prototype) -> Result<&ir::Function> {
        self.gen_prototype(&proto)?;
        let name = proto.name.clone();
        self.protos.insert(name.clone(), proto);
        self.function(&name)
    }

    /// Generates a full definition. On failure every table it touched is put
    /// back the way it was.
    pub fn gen_function(&mut self, ops: &mut OperatorTable, function: &Function) -> Result<&ir::Function> {
        let proto = &function.proto;
        let name = proto.name.clone();

        let old_decl = match self.module.get_function(&name) {
            Some(f) if !f.is_declaration() => {
                return Err(Error::codegen(format!("Function '{}' cannot be redefined.", name)));
            }
            Some(f) => Some(f.clone()),
            None => None,
        };

        // The body may call itself, possibly with a different arity than an
        // earlier extern declared.
        self.module
            .add_function(ir::Function::declaration(&name, proto.args.clone()));
        let old_proto = self.protos.insert(name.clone(), proto.clone());
        let snapshot = match (proto.operator_name(), proto.binary_precedence()) {
            (Some(op), Some(prec)) => Some(ops.define(op, prec)),
            _ => None,
        };

        match self.gen_body(function) {
            Ok(func) => {
                self.module.add_function(func);
                self.function(&name)
            }
            Err(e) => {
                if let Some(snapshot) = snapshot {
                    ops.restore(snapshot);
                }
                match old_proto {
                    Some(p) => self.protos.insert(name.clone(), p),
                    None => self.protos.remove(&name),
                };
                match old_decl {
                    Some(decl) => self.module.add_function(decl),
                    None => {
                        self.module.remove_function(&name);
                    }
                }
                Err(e)
            }
        }
    }

    fn gen_body(&mut self, function: &Function) -> Result<ir::Function> {
        let proto = &function.proto;
        let mut b = Builder::new(&proto.name, proto.args.clone());

        self.named_values.clear();
        for (i, arg) in proto.args.iter().enumerate() {
            let slot = b.build_entry_alloca(arg);
            b.build_store(Value::Arg(i), slot);
            self.named_values.insert(arg.clone(), slot);
        }

        let ret = self.gen_expr(&mut b, &function.body)?;
        b.build_ret(ret);
        Ok(b.finish())
    }

    fn bind(&mut self, name: &str, slot: Value) -> Option<Value> {
        self.named_values.insert(name.to_owned(), slot)
    }

    fn unbind(&mut self, name: &str, old: Option<Value>) {
        match old {
            Some(v) => self.named_values.insert(name.to_owned(), v),
            None => self.named_values.remove(name),
        };
    }

    fn gen_expr(&mut self, b: &mut Builder, e: &Expr) -> Result<Value> {
        match e {
            Expr::Number(n) => Ok(Value::Const(*n)),
            Expr::Variable(name) => {
                let slot = *self
                    .named_values
                    .get(name)
                    .ok_or_else(|| Error::codegen(format!("Unknown variable name: '{}'", name)))?;
                Ok(b.build_load(slot, name))
            }
            Expr::Unary(op, operand) => {
                let callee = format!("unary{}", op);
                if self.resolve_function(&callee).is_none() {
                    return Err(Error::codegen(format!("Unknown unary operator: '{}'", op)));
                }
                let v = self.gen_expr(b, operand)?;
                Ok(b.build_call(&callee, vec![v], "unop"))
            }
            Expr::Binary('=', lhs, rhs) => {
                let name = match &**lhs {
                    Expr::Variable(name) => name,
                    _ => return Err(Error::codegen("destination of '=' must be a variable")),
                };
                let val = self.gen_expr(b, rhs)?;
                let slot = *self
                    .named_values
                    .get(name)
                    .ok_or_else(|| Error::codegen("Unknown variable name"))?;
                b.build_store(val, slot);
                Ok(val)
            }
            Expr::Binary(op, lhs, rhs) => {
                let l = self.gen_expr(b, lhs)?;
                let r = self.gen_expr(b, rhs)?;
                match op {
                    '+' => Ok(b.build_fadd(l, r, "addtmp")),
                    '-' => Ok(b.build_fsub(l, r, "subtmp")),
                    '*' => Ok(b.build_fmul(l, r, "multmp")),
                    '<' => {
                        let i = b.build_fcmp(FloatPredicate::Ult, l, r, "cmptmp");
                        Ok(b.build_uitofp(i, "booltmp"))
                    }
                    _ => {
                        let callee = format!("binary{}", op);
                        if self.resolve_function(&callee).is_none() {
                            return Err(Error::codegen(format!("Unknown binary operator: '{}'", op)));
                        }
                        Ok(b.build_call(&callee, vec![l, r], "binop"))
                    }
                }
            }
            Expr::Call(callee, args) => {
                let arity = self.resolve_function(callee).ok_or_else(|| {
                    Error::codegen(format!("Unknown function referenced: '{}'", callee))
                })?;
                if arity != args.len() {
                    return Err(Error::codegen(format!(
                        "Incorrect # arguments passed to '{}'",
                        callee
                    )));
                }

                let args = args
                    .iter()
                    .map(|a| self.gen_expr(b, a))
                    .collect::<Result<Vec<_>>>()?;
                Ok(b.build_call(callee, args, "calltmp"))
            }
            Expr::If(cond, then, els) => self.gen_if(b, cond, then, els),
            Expr::For(id, start, end, step, body) => {
                self.gen_for(b, id, start, end, step.as_deref(), body)
            }
            Expr::Var(vars, body) => self.gen_var(b, vars, body),
        }
    }

    fn gen_if(&mut self, b: &mut Builder, cond: &Expr, then: &Expr, els: &Expr) -> Result<Value> {
        let cond = self.gen_expr(b, cond)?;
        let cond = b.build_fcmp(FloatPredicate::One, cond, Value::Const(0.0), "ifcond");

        let then_bb = b.create_block("then");
        let else_bb = b.create_block("else");
        let merge_bb = b.create_block("ifcont");

        b.build_cond_br(cond, then_bb, else_bb);

        b.append_block(then_bb);
        b.position_at_end(then_bb);
        let then_v = self.gen_expr(b, then)?;
        b.build_br(merge_bb);
        // codegen of 'then' can change the current block
        let then_end = b.insert_block();

        b.append_block(else_bb);
        b.position_at_end(else_bb);
        let else_v = self.gen_expr(b, els)?;
        b.build_br(merge_bb);
        let else_end = b.insert_block();

        b.append_block(merge_bb);
        b.position_at_end(merge_bb);
        Ok(b.build_phi(vec![(then_v, then_end), (else_v, else_end)], "iftmp"))
    }

    fn gen_for(
        &mut self,
        b: &mut Builder,
        id: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<Value> {
        let slot = b.build_entry_alloca(id);

        // The start value is computed before `id` comes into scope.
        let start = self.gen_expr(b, start)?;
        b.build_store(start, slot);

        let loop_bb = b.create_block("loop");
        b.build_br(loop_bb);
        b.append_block(loop_bb);
        b.position_at_end(loop_bb);

        let old = self.bind(id, slot);
        let result = self.gen_loop_tail(b, id, slot, loop_bb, end, step, body);
        self.unbind(id, old);
        result?;

        Ok(Value::Const(0.0))
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_loop_tail(
        &mut self,
        b: &mut Builder,
        id: &str,
        slot: Value,
        loop_bb: ir::BlockId,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
    ) -> Result<()> {
        self.gen_expr(b, body)?;

        let step = match step {
            Some(step) => self.gen_expr(b, step)?,
            None => Value::Const(1.0),
        };

        let cur = b.build_load(slot, id);
        let next = b.build_fadd(cur, step, "nextvar");
        b.build_store(next, slot);

        let end = self.gen_expr(b, end)?;
        let end = b.build_fcmp(FloatPredicate::One, end, Value::Const(0.0), "loopcond");

        let after_bb = b.create_block("afterloop");
        b.build_cond_br(end, loop_bb, after_bb);
        b.append_block(after_bb);
        b.position_at_end(after_bb);
        Ok(())
    }

    fn gen_var(&mut self, b: &mut Builder, vars: &[(String, Option<Expr>)], body: &Expr) -> Result<Value> {
        let mut old_bindings = Vec::with_capacity(vars.len());
        let result = self
            .bind_vars(b, vars, &mut old_bindings)
            .and_then(|()| self.gen_expr(b, body));

        for (name, old) in old_bindings.into_iter().rev() {
            self.unbind(name, old);
        }
        result
    }

    fn bind_vars<'e>(
        &mut self,
        b: &mut Builder,
        vars: &'e [(String, Option<Expr>)],
        old_bindings: &mut Vec<(&'e str, Option<Value>)>,
    ) -> Result<()> {
        for (name, init) in vars {
            // Evaluated before `name` is bound, so `var a = a` sees the outer `a`.
            let init = match init {
                Some(init) => self.gen_expr(b, init)?,
                None => Value::Const(0.0),
            };

            let slot = b.build_entry_alloca(name);
            b.build_store(init, slot);
            old_bindings.push((name.as_str(), self.bind(name, slot)));
        }
        Ok(())
    }
}
