//! Statement lowering.
//!
//! Blocks are pushed and popped in the same order as the body planner does,
//! so every identifier claimed here matches the one the plan recorded.

use crate::context::{mentions_ident, CatchTarget, ConversionContext};
use crate::effects::method_may_fail;
use crate::emit::{CodeBuffer, Emitter};
use crate::error::Result;
use crate::oracle::element_type;
use crate::scope::Binding;
use crate::shadow::{AssignmentPlan, Resolution};
use crate::usage::analyze_body;
use ferrule_hir::{BinOp, Constant, ExceptHandler, Expr, Stmt, Target, UnaryOp, WithItem};
use ferrule_types::{Type, DYNAMIC_VALUE};

impl<'a> ConversionContext<'a> {
    pub fn emit_body(&mut self, body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        for stmt in body {
            self.emit_stmt(stmt, out)?;
        }
        Ok(())
    }

    /// Run `f` inside a fresh block frame. The frame is popped on every path.
    pub(crate) fn in_block<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scope.push_block();
        let result = f(self);
        let popped = self.scope.pop();
        let value = result?;
        popped?;
        Ok(value)
    }

    /// `body` one level deeper, in its own block frame.
    fn emit_nested(&mut self, body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        self.in_block(|cx| {
            out.indent();
            let result = cx.emit_body(body, out);
            out.dedent();
            result
        })
    }

    fn emit_braced(&mut self, body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        out.emit_line("{");
        self.emit_nested(body, out)?;
        out.emit_line("}");
        Ok(())
    }

    pub fn emit_stmt(&mut self, stmt: &Stmt, out: &mut dyn Emitter) -> Result<()> {
        match stmt {
            Stmt::Assign {
                target,
                value,
                annotation,
            } => self.emit_assign(target, value, annotation.as_ref(), out),
            Stmt::AugAssign { target, op, value } => self.emit_aug_assign(target, *op, value, out),
            Stmt::Expr(e) => self.emit_expr_stmt(e, out),
            Stmt::Return(value) => {
                if let Some(v) = value {
                    let ty = self.type_of(v);
                    self.current.record_return(ty);
                }
                match value {
                    None | Some(Expr::Constant(Constant::None)) => out.emit_line("return;"),
                    Some(v) => {
                        let text = self.render_expr(v)?;
                        self.flush_prelude(out);
                        out.emit_line(&format!("return {};", text));
                    }
                }
                Ok(())
            }
            Stmt::If { test, body, orelse } => {
                let t = self.render_condition(test)?;
                self.flush_prelude(out);
                out.emit_line(&format!("if ({}) {{", t));
                self.emit_if_tail(body, orelse, out)
            }
            Stmt::While { test, body } => self.emit_while(test, body, out),
            Stmt::For { target, iter, body } => {
                let used = analyze_body("", &[], body).reads;
                self.in_block(|cx| {
                    let closers = cx.open_loop(target, iter, &used, out)?;
                    let result = cx.emit_body(body, out);
                    close_loop(closers, out);
                    result
                })
            }
            Stmt::Break => {
                out.emit_line("break;");
                Ok(())
            }
            Stmt::Continue => {
                out.emit_line("continue;");
                Ok(())
            }
            Stmt::Pass | Stmt::Nonlocal(_) => Ok(()),
            Stmt::Raise(exc) => {
                let error = match exc {
                    Some(e) => self.raised_error(e),
                    None => self
                        .current
                        .handler_errors
                        .last()
                        .cloned()
                        .unwrap_or_else(|| "error.Exception".to_string()),
                };
                self.emit_error_exit(&error, out);
                Ok(())
            }
            Stmt::Assert { test, .. } => {
                let t = self.render_condition(test)?;
                self.flush_prelude(out);
                out.emit_line(&format!("if (!({})) {{", t));
                out.indent();
                self.emit_error_exit("error.AssertionError", out);
                out.dedent();
                out.emit_line("}");
                Ok(())
            }
            Stmt::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => self.emit_try(body, handlers, orelse, finalbody, out),
            Stmt::With { items, body } => self.emit_with(items, body, out),
            Stmt::FunctionDef(f) => {
                self.synthesize(f, out, true)?;
                Ok(())
            }
            Stmt::Global(names) => {
                self.current.globals.extend(names.iter().cloned());
                Ok(())
            }
            Stmt::Delete(targets) => {
                for t in targets {
                    self.emit_delete(t, out)?;
                }
                Ok(())
            }
        }
    }

    fn emit_expr_stmt(&mut self, e: &Expr, out: &mut dyn Emitter) -> Result<()> {
        if matches!(e, Expr::Constant(Constant::Str(_))) {
            // docstring
            return Ok(());
        }
        let ty = self.type_of(e);
        let text = self.render_expr(e)?;
        self.flush_prelude(out);
        if ty == Type::None {
            out.emit_line(&format!("{};", text));
        } else {
            out.emit_line(&format!("_ = {};", text));
        }
        Ok(())
    }

    fn emit_assign(
        &mut self,
        target: &Target,
        value: &Expr,
        annotation: Option<&Type>,
        out: &mut dyn Emitter,
    ) -> Result<()> {
        match target {
            Target::Name(n) => self.assign_name(n, value, annotation, out),
            Target::Tuple(parts) => {
                let ty = self.type_of(value);
                let text = self.render_expr(value)?;
                self.flush_prelude(out);
                let tmp = self.temp("tuple");
                out.emit_line(&format!("const {} = {};", tmp, text));
                self.assign_parts(parts, &tmp, &ty, out)
            }
            Target::Attribute { value: obj, attr } => {
                let v = self.render_expr(value)?;
                let o = self.render_operand(obj)?;
                self.flush_prelude(out);
                out.emit_line(&format!("{}.{} = {};", o, attr, v));
                Ok(())
            }
            Target::Subscript { value: obj, index } => {
                let v = self.render_expr(value)?;
                self.emit_store(obj, index, &v, out)
            }
            Target::Starred(_) => Err(self.unsupported("starred assignment target")),
        }
    }

    fn assign_name(
        &mut self,
        name: &str,
        value: &Expr,
        annotation: Option<&Type>,
        out: &mut dyn Emitter,
    ) -> Result<()> {
        if self.is_declared_global(name) {
            let v = self.render_expr(value)?;
            self.flush_prelude(out);
            out.emit_line(&format!("{} = {};", name, v));
            return Ok(());
        }

        if let Expr::Lambda { params, body } = value {
            // The binding takes the synthesized wrapper's type
            let (wrapper, ty) = self.render_lambda(params, body)?;
            let plan = AssignmentPlan::new(name, ty, &self.scope);
            self.flush_prelude(out);
            self.bind_name(plan, &wrapper, None, out);
            return Ok(());
        }

        let ty = annotation.cloned().unwrap_or_else(|| self.type_of(value));
        let plan = AssignmentPlan::new(name, ty, &self.scope);
        let expected = match plan.resolution {
            Resolution::Reuse => self.scope.lookup(name).map(|b| b.ty.clone()),
            _ => annotation.cloned(),
        };
        let text = self.render_expr_as(value, expected.as_ref())?;
        self.flush_prelude(out);
        self.bind_name(plan, &text, value.as_name(), out);
        Ok(())
    }

    /// Emit the declaration or store for `plan`, then commit it.
    fn bind_name(
        &mut self,
        plan: AssignmentPlan,
        text: &str,
        alias_source: Option<&str>,
        out: &mut dyn Emitter,
    ) {
        let ident = plan.ident().to_string();
        let mutable = self.current.plan.is_mutable(&ident);
        if plan.declares() {
            let keyword = if mutable { "var" } else { "const" };
            match declared_type(&plan.ty, mutable) {
                Some(t) => out.emit_line(&format!("{} {}: {} = {};", keyword, ident, t, text)),
                None => out.emit_line(&format!("{} {} = {};", keyword, ident, text)),
            }
            if !self.is_read(&plan.name) {
                out.emit_line(&format!("_ = {};", ident));
            }
        } else {
            out.emit_line(&format!("{} = {};", ident, text));
        }
        plan.commit(&mut self.scope, mutable, alias_source);
    }

    /// Destructure the tuple held in `source` into `parts`.
    fn assign_parts(
        &mut self,
        parts: &[Target],
        source: &str,
        ty: &Type,
        out: &mut dyn Emitter,
    ) -> Result<()> {
        for (i, part) in parts.iter().enumerate() {
            let (elem, access) = match ty {
                Type::Tuple(ts) => (
                    ts.get(i).cloned().unwrap_or(Type::Unknown),
                    format!("{}[{}]", source, i),
                ),
                Type::List(t) => ((**t).clone(), format!("{}.items[{}]", source, i)),
                other => (
                    element_type(other),
                    self.fallible(format!("runtime.getItem({}, {})", source, i)),
                ),
            };
            match part {
                Target::Name(n) if self.is_declared_global(n) => {
                    out.emit_line(&format!("{} = {};", n, access));
                }
                Target::Name(n) => {
                    let plan = AssignmentPlan::new(n, elem, &self.scope);
                    self.bind_name(plan, &access, None, out);
                }
                Target::Tuple(inner) => {
                    let tmp = self.temp("tuple");
                    out.emit_line(&format!("const {} = {};", tmp, access));
                    self.assign_parts(inner, &tmp, &elem, out)?;
                }
                Target::Attribute { value, attr } => {
                    let o = self.render_operand(value)?;
                    self.flush_prelude(out);
                    out.emit_line(&format!("{}.{} = {};", o, attr, access));
                }
                Target::Subscript { value, index } => self.emit_store(value, index, &access, out)?,
                Target::Starred(_) => return Err(self.unsupported("starred assignment target")),
            }
        }
        Ok(())
    }

    /// `obj[index] = value` for an already rendered `value`.
    fn emit_store(&mut self, obj: &Expr, index: &Expr, value: &str, out: &mut dyn Emitter) -> Result<()> {
        let container = self.type_of(obj);
        let o = self.render_operand(obj)?;
        let i = self.render_expr(index)?;
        let line = match container {
            Type::List(_) => format!("{}.items[@intCast({})] = {};", o, i, value),
            Type::Dict(_, _) => {
                let put = format!("{}.put({}, {})", o, i, value);
                format!("{};", self.maybe_fallible(self.options.allocation_is_fallible, put))
            }
            _ => format!("{};", self.fallible(format!("runtime.setItem({}, {}, {})", o, i, value))),
        };
        self.flush_prelude(out);
        out.emit_line(&line);
        Ok(())
    }

    fn emit_aug_assign(
        &mut self,
        target: &Target,
        op: BinOp,
        value: &Expr,
        out: &mut dyn Emitter,
    ) -> Result<()> {
        let name = match target {
            Target::Name(n) => n,
            Target::Attribute { value: obj, attr } => {
                let current = Expr::Attribute {
                    value: Box::new(obj.clone()),
                    attr: attr.clone(),
                };
                return self.emit_assign(target, &combine(current, op, value), None, out);
            }
            Target::Subscript { value: obj, index } => {
                let current = Expr::Subscript {
                    value: Box::new(obj.clone()),
                    index: Box::new(index.clone()),
                };
                return self.emit_assign(target, &combine(current, op, value), None, out);
            }
            _ => return Err(self.unsupported("augmented assignment to a destructuring target")),
        };

        let current = Expr::Name(name.clone());
        if !self.is_declared_global(name) {
            // A combined value that no longer fits the binding is a new binding
            let combined = combine(current.clone(), op, value);
            let plan = AssignmentPlan::new(name, self.type_of(&combined), &self.scope);
            if let Resolution::ShadowRename(_) = plan.resolution {
                let text = self.render_expr(&combined)?;
                self.flush_prelude(out);
                self.bind_name(plan, &text, None, out);
                return Ok(());
            }
        }
        let target_ty = self.type_of(&current);
        let value_ty = self.type_of(value);
        let ident = self.render_name(name);
        let in_place = match op {
            BinOp::Add => Some("+="),
            BinOp::Sub => Some("-="),
            BinOp::Mult => Some("*="),
            BinOp::BitAnd => Some("&="),
            BinOp::BitOr => Some("|="),
            BinOp::BitXor => Some("^="),
            _ => None,
        };

        if let (Some(assign_op), true) = (in_place, target_ty.is_numeric() && target_ty == value_ty) {
            let v = self.render_expr(value)?;
            self.flush_prelude(out);
            out.emit_line(&format!("{} {} {};", ident, assign_op, v));
            return Ok(());
        }
        if op == BinOp::Add && matches!(target_ty, Type::List(_)) {
            let v = self.render_expr(value)?;
            let extend = format!("{}.extend({})", ident, v);
            let text = self.maybe_fallible(method_may_fail("extend", self.options), extend);
            self.flush_prelude(out);
            out.emit_line(&format!("{};", text));
            return Ok(());
        }
        let text = self.render_expr(&combine(current, op, value))?;
        self.flush_prelude(out);
        out.emit_line(&format!("{} = {};", ident, text));
        Ok(())
    }

    fn emit_if_tail(&mut self, body: &[Stmt], orelse: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        self.emit_nested(body, out)?;
        match orelse {
            [] => {
                out.emit_line("}");
                Ok(())
            }
            [Stmt::If {
                test,
                body: inner_body,
                orelse: inner_else,
            }] => self.in_block(|cx| {
                let (t, prelude) = cx.isolated(|cx| cx.render_condition(test))?;
                if prelude.is_empty() {
                    out.emit_line(&format!("}} else if ({}) {{", t));
                    return cx.emit_if_tail(inner_body, inner_else, out);
                }
                out.emit_line("} else {");
                out.indent();
                out.emit_block(&prelude);
                out.emit_line(&format!("if ({}) {{", t));
                let result = cx.emit_if_tail(inner_body, inner_else, out);
                out.dedent();
                out.emit_line("}");
                result
            }),
            _ => {
                out.emit_line("} else {");
                self.emit_nested(orelse, out)?;
                out.emit_line("}");
                Ok(())
            }
        }
    }

    fn emit_while(&mut self, test: &Expr, body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        let (t, prelude) = self.isolated(|cx| cx.render_condition(test))?;
        if prelude.is_empty() {
            out.emit_line(&format!("while ({}) {{", t));
            self.emit_nested(body, out)?;
            out.emit_line("}");
            return Ok(());
        }
        // The test needs statements of its own on every iteration
        out.emit_line("while (true) {");
        out.indent();
        out.emit_block(&prelude);
        out.emit_line(&format!("if (!({})) break;", t));
        let result = self.in_block(|cx| cx.emit_body(body, out));
        out.dedent();
        out.emit_line("}");
        result
    }

    /// Open a loop binding `target` to each element of `iter`, leaving the
    /// emitter inside the loop body. Returns how many braces to close.
    ///
    /// `used` holds the names the loop body reads; payloads nobody reads are
    /// captured as `_`.
    pub(crate) fn open_loop(
        &mut self,
        target: &Target,
        iter: &Expr,
        used: &[String],
        out: &mut dyn Emitter,
    ) -> Result<usize> {
        if let Some(closers) = self.open_counted_loop(target, iter, out)? {
            return Ok(closers);
        }

        let iter_ty = self.type_of(iter);
        let elem = element_type(&iter_ty);
        let it = self.render_operand(iter)?;
        self.flush_prelude(out);
        let (payload, destructure) = self.loop_payload(target, &elem, used)?;

        let closers = match iter_ty {
            Type::List(_) => {
                out.emit_line(&format!("for ({}.items) |{}| {{", it, payload));
                1
            }
            Type::Set(_) | Type::Dict(_, _) => {
                out.emit_line(&format!("for ({}.keys()) |{}| {{", it, payload));
                1
            }
            _ => {
                let cursor = self.temp("it");
                out.emit_line("{");
                out.indent();
                out.emit_line(&format!("var {} = runtime.iterate({});", cursor, it));
                out.emit_line(&format!("while ({}.next()) |{}| {{", cursor, payload));
                2
            }
        };
        out.indent();
        for line in destructure {
            out.emit_line(&line);
        }
        Ok(closers)
    }

    /// `for i in range(...)` over a plain name becomes a counted `while`.
    fn open_counted_loop(
        &mut self,
        target: &Target,
        iter: &Expr,
        out: &mut dyn Emitter,
    ) -> Result<Option<usize>> {
        let (name, args) = match (target, iter) {
            (
                Target::Name(n),
                Expr::Call {
                    func,
                    args,
                    keywords,
                },
            ) if func.as_name() == Some("range")
                && keywords.is_empty()
                && (1..=3).contains(&args.len())
                && self.scope.lookup("range").is_none() =>
            {
                (n, args)
            }
            _ => return Ok(None),
        };

        let mut bounds = Vec::with_capacity(args.len());
        for a in args {
            bounds.push(self.render_expr(a)?);
        }
        self.flush_prelude(out);
        let (start, stop, step) = match bounds.as_slice() {
            [stop] => ("0".to_string(), stop.clone(), "1".to_string()),
            [start, stop] => (start.clone(), stop.clone(), "1".to_string()),
            [start, stop, step, ..] => (start.clone(), stop.clone(), step.clone()),
            [] => return Ok(None),
        };
        let descending = match args.get(2) {
            Some(Expr::Constant(Constant::Int(k))) => *k < 0,
            Some(Expr::UnaryOp {
                op: UnaryOp::Neg, ..
            }) => true,
            _ => false,
        };
        let ident = self.bind_payload(name, Type::Int);
        let cmp = if descending { ">" } else { "<" };
        out.emit_line("{");
        out.indent();
        out.emit_line(&format!("var {}: i64 = {};", ident, start));
        out.emit_line(&format!(
            "while ({} {} {}) : ({} += {}) {{",
            ident, cmp, stop, ident, step
        ));
        out.indent();
        Ok(Some(2))
    }

    /// Declare a loop or `with` payload in the current block.
    fn bind_payload(&mut self, name: &str, ty: Type) -> String {
        let ident = self.scope.fresh_ident(name);
        self.scope.declare_as(name, &ident, Binding::local(ty));
        ident
    }

    /// Capture text for a loop target plus the lines that unpack it.
    fn loop_payload(
        &mut self,
        target: &Target,
        elem: &Type,
        used: &[String],
    ) -> Result<(String, Vec<String>)> {
        match target {
            Target::Name(n) => {
                let ident = self.bind_payload(n, elem.clone());
                if used.iter().any(|u| u == n) {
                    Ok((ident, Vec::new()))
                } else {
                    Ok(("_".to_string(), Vec::new()))
                }
            }
            Target::Tuple(parts) => {
                let item = self.temp("item");
                let mut lines = Vec::new();
                self.destructure_payload(parts, &item, elem, used, &mut lines)?;
                if lines.is_empty() {
                    Ok(("_".to_string(), lines))
                } else {
                    Ok((item, lines))
                }
            }
            _ => Err(self.unsupported("loop target other than names")),
        }
    }

    fn destructure_payload(
        &mut self,
        parts: &[Target],
        source: &str,
        ty: &Type,
        used: &[String],
        lines: &mut Vec<String>,
    ) -> Result<()> {
        for (i, part) in parts.iter().enumerate() {
            let elem = match ty {
                Type::Tuple(ts) => ts.get(i).cloned().unwrap_or(Type::Unknown),
                other => element_type(other),
            };
            match part {
                Target::Name(n) => {
                    let ident = self.bind_payload(n, elem);
                    if used.iter().any(|u| u == n) {
                        lines.push(format!("const {} = {}[{}];", ident, source, i));
                    }
                }
                Target::Tuple(inner) => {
                    let nested = format!("{}[{}]", source, i);
                    self.destructure_payload(inner, &nested, &elem, used, lines)?;
                }
                _ => return Err(self.unsupported("loop target other than names")),
            }
        }
        Ok(())
    }

    /// Error value named by a `raise` operand.
    fn raised_error(&self, exc: &Expr) -> String {
        if let Expr::Name(n) = exc {
            // A caught error bound by `except ... as n`
            if self.scope.lookup_in_function(n).is_some() {
                return self.scope.ident(n);
            }
        }
        format!("error.{}", exception_name(exc).unwrap_or("Exception"))
    }

    /// Lower `try` to a labeled block. Failures inside the body store the
    /// error in a slot and leave the block; the handler chain then tests
    /// the slot.
    fn emit_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        out: &mut dyn Emitter,
    ) -> Result<()> {
        if !finalbody.is_empty()
            && (leaves_block(body, false)
                || leaves_block(orelse, false)
                || handlers.iter().any(|h| leaves_block(&h.body, false)))
        {
            // The trailing `finally` block would be skipped
            return Err(self.unsupported("`return`, `break` or `continue` out of a `try` with `finally`"));
        }
        let n = self.next_id();
        let slot = self.scope.claim_ident(&format!("__err{}", n));
        let label = format!("try{}", n);

        let mut guarded = CodeBuffer::new();
        self.current.catches.push(CatchTarget {
            slot: slot.clone(),
            label: label.clone(),
        });
        let result = self.in_block(|cx| cx.emit_body(body, &mut guarded));
        self.current.catches.pop();
        result?;
        let guarded = guarded.finish();

        if !mentions_ident(&guarded, &slot) {
            // Nothing in the body can fail, so no handler can run
            out.emit_line("{");
            out.indent();
            out.emit_block(&guarded);
            out.dedent();
            out.emit_line("}");
            if !orelse.is_empty() {
                self.emit_braced(orelse, out)?;
            }
        } else {
            out.emit_line(&format!("var {}: ?anyerror = null;", slot));
            out.emit_line(&format!("{}: {{", label));
            out.indent();
            out.emit_block(&guarded);
            out.dedent();
            out.emit_line("}");

            let payload = self.scope.claim_ident(&format!("__exc{}", n));
            let mut chain = CodeBuffer::new();
            self.current.handler_errors.push(payload.clone());
            let result = self.emit_handler_chain(handlers, &payload, &mut chain);
            self.current.handler_errors.pop();
            result?;
            let chain = chain.finish();

            out.emit_line(&format!("if ({}) |{}| {{", slot, payload));
            out.indent();
            if !mentions_ident(&chain, &payload) {
                out.emit_line(&format!("_ = {};", payload));
            }
            out.emit_block(&chain);
            out.dedent();
            if orelse.is_empty() {
                out.emit_line("}");
            } else {
                out.emit_line("} else {");
                self.emit_nested(orelse, out)?;
                out.emit_line("}");
            }
        }

        if !finalbody.is_empty() {
            self.emit_braced(finalbody, out)?;
        }
        Ok(())
    }

    fn emit_handler_chain(
        &mut self,
        handlers: &[ExceptHandler],
        payload: &str,
        out: &mut dyn Emitter,
    ) -> Result<()> {
        let mut first = true;
        let mut caught_all = false;
        for h in handlers {
            let condition = handler_condition(h.kind.as_ref(), payload);
            let header = match (&condition, first) {
                (Some(c), true) => format!("if ({}) {{", c),
                (Some(c), false) => format!("}} else if ({}) {{", c),
                (None, true) => "{".to_string(),
                (None, false) => "} else {".to_string(),
            };
            out.emit_line(&header);
            self.in_block(|cx| {
                out.indent();
                if let Some(name) = &h.name {
                    let ident = cx.scope.claim_ident(name);
                    cx.scope.declare_as(name, &ident, Binding::local(Type::Unknown));
                    if analyze_body("", &[], &h.body).reads(name) {
                        out.emit_line(&format!("const {} = {};", ident, payload));
                    }
                }
                let result = cx.emit_body(&h.body, out);
                out.dedent();
                result
            })?;
            first = false;
            if condition.is_none() {
                caught_all = true;
                break;
            }
        }

        if caught_all {
            out.emit_line("}");
        } else if first {
            self.emit_error_exit(payload, out);
        } else {
            // No handler matched: re-raise
            out.emit_line("} else {");
            out.indent();
            self.emit_error_exit(payload, out);
            out.dedent();
            out.emit_line("}");
        }
        Ok(())
    }

    fn emit_with(&mut self, items: &[WithItem], body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        out.emit_line("{");
        let result = self.in_block(|cx| {
            out.indent();
            let result = cx.emit_with_items(items, body, out);
            out.dedent();
            result
        });
        out.emit_line("}");
        result
    }

    fn emit_with_items(&mut self, items: &[WithItem], body: &[Stmt], out: &mut dyn Emitter) -> Result<()> {
        for item in items {
            let ty = self.type_of(&item.context);
            let ctx = self.render_expr(&item.context)?;
            self.flush_prelude(out);
            let ident = match &item.target {
                Some(Target::Name(n)) => self.bind_payload(n, ty),
                None => self.temp("ctx"),
                Some(_) => return Err(self.unsupported("`with` target other than a name")),
            };
            out.emit_line(&format!("const {} = {};", ident, ctx));
            out.emit_line(&format!("defer {}.close();", ident));
        }
        self.emit_body(body, out)
    }

    fn emit_delete(&mut self, target: &Target, out: &mut dyn Emitter) -> Result<()> {
        match target {
            Target::Subscript { value, index } => {
                let container = self.type_of(value);
                let o = self.render_operand(value)?;
                let i = self.render_expr(index)?;
                let line = match container {
                    Type::Dict(_, _) => format!("_ = {}.remove({});", o, i),
                    Type::List(_) => format!("_ = {}.orderedRemove(@intCast({}));", o, i),
                    _ => format!("{};", self.fallible(format!("runtime.delItem({}, {})", o, i))),
                };
                self.flush_prelude(out);
                out.emit_line(&line);
                Ok(())
            }
            Target::Name(n) => {
                // Storage is released with the frame
                log::trace!("dropping `del {}`", n);
                Ok(())
            }
            Target::Tuple(parts) => {
                for p in parts {
                    self.emit_delete(p, out)?;
                }
                Ok(())
            }
            Target::Attribute { .. } | Target::Starred(_) => {
                Err(self.unsupported("`del` of an attribute"))
            }
        }
    }
}

fn close_loop(closers: usize, out: &mut dyn Emitter) {
    for _ in 0..closers {
        out.dedent();
        out.emit_line("}");
    }
}

/// Whether `body` can transfer control out of itself: any `return`, or a
/// `break`/`continue` that is not inside a loop of its own.
fn leaves_block(body: &[Stmt], in_loop: bool) -> bool {
    body.iter().any(|s| match s {
        Stmt::Return(_) => true,
        Stmt::Break | Stmt::Continue => !in_loop,
        Stmt::If { body, orelse, .. } => leaves_block(body, in_loop) || leaves_block(orelse, in_loop),
        Stmt::While { body, .. } | Stmt::For { body, .. } => leaves_block(body, true),
        Stmt::With { body, .. } => leaves_block(body, in_loop),
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            leaves_block(body, in_loop)
                || leaves_block(orelse, in_loop)
                || leaves_block(finalbody, in_loop)
                || handlers.iter().any(|h| leaves_block(&h.body, in_loop))
        }
        _ => false,
    })
}

pub(crate) fn combine(current: Expr, op: BinOp, value: &Expr) -> Expr {
    Expr::BinOp {
        op,
        left: Box::new(current),
        right: Box::new(value.clone()),
    }
}

/// Type annotation for a local declaration, if one is needed.
fn declared_type(ty: &Type, mutable: bool) -> Option<String> {
    match ty {
        Type::Unknown if mutable => Some(DYNAMIC_VALUE.to_string()),
        Type::Unknown => None,
        Type::None => Some(format!("?{}", DYNAMIC_VALUE)),
        Type::Closure(_) | Type::Tuple(_) | Type::Function(_) => None,
        other => Some(other.target_name()),
    }
}

/// Class name of a raised or caught exception expression.
fn exception_name(exc: &Expr) -> Option<&str> {
    match exc {
        Expr::Name(n) => Some(n),
        Expr::Call { func, .. } => exception_name(func),
        Expr::Attribute { attr, .. } => Some(attr),
        _ => None,
    }
}

fn is_catch_all(name: &str) -> bool {
    matches!(name, "Exception" | "BaseException")
}

/// Test selecting a handler; `None` when the handler catches everything.
fn handler_condition(kind: Option<&Expr>, payload: &str) -> Option<String> {
    let kind = kind?;
    let names: Vec<&str> = match kind {
        Expr::Tuple(kinds) => kinds.iter().filter_map(exception_name).collect(),
        other => exception_name(other).into_iter().collect(),
    };
    if names.is_empty() || names.iter().any(|n| is_catch_all(n)) {
        return None;
    }
    let tests: Vec<String> = names
        .iter()
        .map(|n| format!("{} == error.{}", payload, n))
        .collect();
    Some(tests.join(" or "))
}
