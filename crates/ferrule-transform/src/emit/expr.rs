//! Expression rendering.
//!
//! Every method returns the target text of one expression. Statements an
//! expression needs beforehand (comprehension loops, lambda wrappers) are
//! queued in the context prelude; the statement being lowered flushes it
//! before its own line.

use crate::context::ConversionContext;
use crate::effects::{
    builtin_allocates, builtin_may_fail, concat_may_fail, division_may_fail, method_may_fail,
    subscript_may_fail,
};
use crate::emit::{CodeBuffer, Emitter};
use crate::error::Result;
use crate::scope::BindingKind;
use crate::usage::analyze_body;
use ferrule_hir::{
    BinOp, BoolOp, CmpOp, Comprehension, Constant, Expr, FStringPart, Function, Keyword, Param,
    Stmt, UnaryOp,
};
use ferrule_types::{Type, DYNAMIC_VALUE};

/// Builtins lowered to `runtime.<name>` helpers.
const BUILTINS: &[&str] = &[
    "abs", "all", "any", "bool", "callable", "chr", "dict", "divmod", "enumerate", "filter",
    "float", "format", "getattr", "hash", "input", "int", "isinstance", "iter", "len", "list",
    "map", "max", "min", "next", "open", "ord", "print", "range", "repr", "reversed", "round",
    "set", "sorted", "str", "sum", "tuple", "zip",
];

impl<'a> ConversionContext<'a> {
    pub(crate) fn type_of(&self, expr: &Expr) -> Type {
        self.oracle.inferred_expression_type(expr, &self.scope)
    }

    pub fn render_expr(&mut self, expr: &Expr) -> Result<String> {
        match expr {
            Expr::Name(n) => Ok(self.render_name(n)),
            Expr::Constant(c) => Ok(render_constant(c)),
            Expr::BinOp { op, left, right } => self.render_binop(*op, left, right),
            Expr::UnaryOp { op, operand } => {
                let v = self.render_operand(operand)?;
                Ok(match op {
                    UnaryOp::Neg => format!("-{}", v),
                    UnaryOp::Pos => v,
                    UnaryOp::Not => format!("!{}", v),
                    UnaryOp::Invert => format!("~{}", v),
                })
            }
            Expr::BoolOp { op, values } => {
                let joiner = match op {
                    BoolOp::And => " and ",
                    BoolOp::Or => " or ",
                };
                let parts = values
                    .iter()
                    .map(|v| self.render_operand(v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(parts.join(joiner))
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => self.render_compare(left, ops, comparators),
            Expr::Call {
                func,
                args,
                keywords,
            } => self.render_call(expr, func, args, keywords),
            Expr::Attribute { value, attr } => {
                Ok(format!("{}.{}", self.render_operand(value)?, attr))
            }
            Expr::Subscript { value, index } => self.render_subscript(value, index),
            Expr::Tuple(elems) => {
                let parts = self.render_all(elems)?;
                Ok(tuple_literal(&parts))
            }
            Expr::List(_) | Expr::Set(_) | Expr::Dict { .. } => {
                let ty = self.type_of(expr);
                self.render_collection(expr, &ty)
            }
            Expr::IfExp { test, body, orelse } => {
                let t = self.render_condition(test)?;
                let b = self.render_operand(body)?;
                let o = self.render_operand(orelse)?;
                Ok(format!("if ({}) {} else {}", t, b, o))
            }
            Expr::Lambda { params, body } => Ok(self.render_lambda(params, body)?.0),
            Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::GeneratorExp { .. }
            | Expr::DictComp { .. } => {
                let ty = self.type_of(expr);
                self.render_comprehension(expr, &ty)
            }
            Expr::FString(parts) => self.render_fstring(parts),
            Expr::Starred(_) => Err(self.unsupported("starred expression")),
        }
    }

    /// Render a value assigned to a binding of type `expected`. Container
    /// literals take their element types from it when their own are unknown.
    pub(crate) fn render_expr_as(&mut self, expr: &Expr, expected: Option<&Type>) -> Result<String> {
        let inferred = self.type_of(expr);
        let ty = match expected {
            Some(e) if e.is_compatible_with(&inferred) => e.join(&inferred),
            _ => inferred,
        };
        match expr {
            Expr::List(_) | Expr::Set(_) | Expr::Dict { .. } => self.render_collection(expr, &ty),
            Expr::ListComp { .. }
            | Expr::SetComp { .. }
            | Expr::GeneratorExp { .. }
            | Expr::DictComp { .. } => self.render_comprehension(expr, &ty),
            _ => self.render_expr(expr),
        }
    }

    /// Render an expression tested for truth. Values that are not already
    /// booleans go through `runtime.truthy`.
    pub(crate) fn render_condition(&mut self, expr: &Expr) -> Result<String> {
        let ty = self.type_of(expr);
        let text = self.render_expr(expr)?;
        match ty {
            Type::Bool | Type::Unknown => Ok(text),
            _ => Ok(format!("runtime.truthy({})", text)),
        }
    }

    /// Render an expression used as an operand, parenthesized when needed.
    pub(crate) fn render_operand(&mut self, expr: &Expr) -> Result<String> {
        let text = self.render_expr(expr)?;
        let compound = matches!(
            expr,
            Expr::BinOp { .. }
                | Expr::BoolOp { .. }
                | Expr::Compare { .. }
                | Expr::IfExp { .. }
                | Expr::UnaryOp { .. }
        );
        if compound || text.starts_with("try ") {
            Ok(format!("({})", text))
        } else {
            Ok(text)
        }
    }

    fn render_all(&mut self, exprs: &[Expr]) -> Result<Vec<String>> {
        exprs.iter().map(|e| self.render_expr(e)).collect()
    }

    pub(crate) fn render_name(&self, name: &str) -> String {
        if self.is_declared_global(name) {
            return name.to_string();
        }
        self.scope.ident(name)
    }

    fn render_binop(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Result<String> {
        let lt = self.type_of(left);
        let rt = self.type_of(right);
        let mut l = self.render_operand(left)?;
        let mut r = self.render_operand(right)?;
        if !matches!(op, BinOp::Div | BinOp::FloorDiv | BinOp::Mod) {
            match (&lt, &rt) {
                (Type::Int, Type::Float) => l = widen_to_float(&l),
                (Type::Float, Type::Int) => r = widen_to_float(&r),
                _ => {}
            }
        }
        let alloc = self.options.allocator.clone();
        let builds = concat_may_fail(op, &lt, &rt, self.options);
        let text = match op {
            BinOp::Add if lt == Type::Str || rt == Type::Str => {
                let text = format!("runtime.concat({}, {}, {})", alloc, l, r);
                return Ok(self.maybe_fallible(builds, text));
            }
            BinOp::Add if matches!(lt, Type::List(_)) => {
                let text = format!("runtime.listConcat({}, {}, {})", alloc, l, r);
                return Ok(self.maybe_fallible(builds, text));
            }
            BinOp::Mult if lt.is_sequence() || rt.is_sequence() => {
                let text = format!("runtime.repeat({}, {}, {})", alloc, l, r);
                return Ok(self.maybe_fallible(builds, text));
            }
            BinOp::Div | BinOp::FloorDiv | BinOp::Mod => {
                let helper = match op {
                    BinOp::Div => "trueDiv",
                    BinOp::FloorDiv => "floorDiv",
                    _ => "mod",
                };
                let text = format!("runtime.{}({}, {})", helper, l, r);
                return Ok(self.maybe_fallible(division_may_fail(op, right), text));
            }
            BinOp::Pow => format!("runtime.pow({}, {})", l, r),
            BinOp::Add => format!("{} + {}", l, r),
            BinOp::Sub => format!("{} - {}", l, r),
            BinOp::Mult => format!("{} * {}", l, r),
            BinOp::BitAnd => format!("{} & {}", l, r),
            BinOp::BitOr => format!("{} | {}", l, r),
            BinOp::BitXor => format!("{} ^ {}", l, r),
            BinOp::LShift => format!("runtime.shl({}, {})", l, r),
            BinOp::RShift => format!("runtime.shr({}, {})", l, r),
        };
        Ok(text)
    }

    fn render_compare(&mut self, left: &Expr, ops: &[CmpOp], comparators: &[Expr]) -> Result<String> {
        let mut parts = Vec::with_capacity(ops.len());
        let mut lhs_expr = left;
        let mut lhs = self.render_operand(left)?;
        for (op, rhs_expr) in ops.iter().zip(comparators) {
            let rhs = self.render_operand(rhs_expr)?;
            let strings = self.type_of(lhs_expr) == Type::Str || self.type_of(rhs_expr) == Type::Str;
            parts.push(compare_text(*op, &lhs, &rhs, strings));
            lhs_expr = rhs_expr;
            lhs = rhs;
        }
        if parts.len() == 1 {
            return Ok(parts.remove(0));
        }
        let wrapped: Vec<String> = parts.iter().map(|p| format!("({})", p)).collect();
        Ok(wrapped.join(" and "))
    }

    fn render_call(
        &mut self,
        call: &Expr,
        func: &Expr,
        args: &[Expr],
        keywords: &[Keyword],
    ) -> Result<String> {
        let mut rendered = Vec::with_capacity(args.len() + keywords.len());
        for a in args {
            if matches!(a, Expr::Starred(_)) {
                return Err(self.unsupported("starred call argument"));
            }
            rendered.push(self.render_expr(a)?);
        }
        // Keyword arguments are passed positionally, in source order
        for k in keywords {
            if k.arg.is_none() {
                return Err(self.unsupported("`**` call argument"));
            }
            rendered.push(self.render_expr(&k.value)?);
        }

        match func {
            Expr::Name(n) => Ok(self.render_named_call(call, n, &rendered)),
            Expr::Attribute { value, attr } => {
                let recv = self.render_operand(value)?;
                let text = format!("{}.{}({})", recv, attr, rendered.join(", "));
                Ok(self.maybe_fallible(method_may_fail(attr, self.options), text))
            }
            other => {
                let callee = self.render_operand(other)?;
                let text = if self.type_of(other).is_callable() {
                    format!("{}.call({})", callee, rendered.join(", "))
                } else {
                    format!("runtime.call({}, {})", callee, tuple_literal(&rendered))
                };
                Ok(self.fallible(text))
            }
        }
    }

    fn render_named_call(&mut self, call: &Expr, name: &str, args: &[String]) -> String {
        let joined = args.join(", ");
        if !self.is_declared_global(name) {
            if let Some(binding) = self.scope.lookup(name).cloned() {
                let ident = self.scope.ident(name);
                if binding.is_closure_like() {
                    let text = format!("{}.call({})", ident, joined);
                    return self.maybe_fallible(binding.ty.is_fallible_callable(), text);
                }
                if let Type::Function(f) = &binding.ty {
                    let text = format!("{}({})", ident, joined);
                    return self.maybe_fallible(f.fallible, text);
                }
                if binding.kind != BindingKind::Global {
                    // A local holding a callable of unknown shape
                    let text = format!("runtime.call({}, {})", ident, tuple_literal(args));
                    return self.fallible(text);
                }
            }
        }

        if let Type::Instance(class) = self.type_of(call) {
            if class == name {
                let mut all = vec![self.options.allocator.clone()];
                all.extend(args.iter().cloned());
                let text = format!("{}.init({})", name, all.join(", "));
                return self.maybe_fallible(self.options.allocation_is_fallible, text);
            }
        }

        if BUILTINS.contains(&name) && self.scope.lookup(name).is_none() {
            return self.render_builtin(name, args);
        }

        let text = format!("{}({})", name, joined);
        self.maybe_fallible(self.oracle.is_fallible(name), text)
    }

    fn render_builtin(&mut self, name: &str, args: &[String]) -> String {
        let text = match name {
            "print" => format!("runtime.print({})", tuple_literal(args)),
            n if builtin_allocates(n) => {
                let mut all = vec![self.options.allocator.clone()];
                all.extend(args.iter().cloned());
                format!("runtime.{}({})", n, all.join(", "))
            }
            n => format!("runtime.{}({})", n, args.join(", ")),
        };
        self.maybe_fallible(builtin_may_fail(name, self.options), text)
    }

    fn render_subscript(&mut self, value: &Expr, index: &Expr) -> Result<String> {
        let container = self.type_of(value);
        let v = self.render_operand(value)?;
        let i = self.render_expr(index)?;
        let negative = match index {
            Expr::Constant(Constant::Int(k)) if *k < 0 => Some(-k),
            _ => None,
        };
        let text = match &container {
            Type::List(_) => match negative {
                Some(k) => format!("{}.items[{}.items.len - {}]", v, v, k),
                None => format!("{}.items[@intCast({})]", v, i),
            },
            Type::Tuple(ts) => match negative {
                Some(k) => format!("{}[{}]", v, ts.len() as i64 - k),
                None => format!("{}[{}]", v, i),
            },
            Type::Str | Type::Bytes => format!("runtime.charAt({}, {})", v, i),
            Type::Dict(_, _) => {
                let text = format!("{}.get({})", v, i);
                self.maybe_fallible(subscript_may_fail(&container), text)
            }
            _ => self.fallible(format!("runtime.getItem({}, {})", v, i)),
        };
        Ok(text)
    }

    fn render_collection(&mut self, expr: &Expr, ty: &Type) -> Result<String> {
        let alloc = self.options.allocator.clone();
        let text = match expr {
            Expr::List(elems) | Expr::Set(elems) => {
                let (kind, elem) = match (expr, ty) {
                    (Expr::List(_), Type::List(t)) => ("List", t.target_name()),
                    (Expr::Set(_), Type::Set(t)) => ("Set", t.target_name()),
                    (Expr::List(_), _) => ("List", DYNAMIC_VALUE.to_string()),
                    _ => ("Set", DYNAMIC_VALUE.to_string()),
                };
                let items = self.render_all(elems)?;
                if items.is_empty() {
                    format!("runtime.{}({}).init({})", kind, elem, alloc)
                } else {
                    format!(
                        "runtime.{}({}).fromSlice({}, &.{{ {} }})",
                        kind,
                        elem,
                        alloc,
                        items.join(", ")
                    )
                }
            }
            Expr::Dict { keys, values } => {
                let (k, v) = match ty {
                    Type::Dict(k, v) => (k.target_name(), v.target_name()),
                    _ => (DYNAMIC_VALUE.to_string(), DYNAMIC_VALUE.to_string()),
                };
                let mut entries = Vec::with_capacity(keys.len());
                for (key, value) in keys.iter().zip(values) {
                    let key = self.render_expr(key)?;
                    let value = self.render_expr(value)?;
                    entries.push(format!(".{{ {}, {} }}", key, value));
                }
                if entries.is_empty() {
                    format!("runtime.Dict({}, {}).init({})", k, v, alloc)
                } else {
                    format!(
                        "runtime.Dict({}, {}).fromEntries({}, &.{{ {} }})",
                        k,
                        v,
                        alloc,
                        entries.join(", ")
                    )
                }
            }
            _ => return self.render_expr(expr),
        };
        Ok(self.maybe_fallible(self.options.allocation_is_fallible, text))
    }

    /// Lower a comprehension to a loop filling a fresh container; the loop
    /// goes to the prelude and the container's identifier is the value.
    fn render_comprehension(&mut self, expr: &Expr, ty: &Type) -> Result<String> {
        let (generators, container) = match (expr, ty) {
            (Expr::DictComp { generators, .. }, Type::Dict(k, v)) => (
                generators,
                format!("Dict({}, {})", k.target_name(), v.target_name()),
            ),
            (Expr::DictComp { generators, .. }, _) => (
                generators,
                format!("Dict({}, {})", DYNAMIC_VALUE, DYNAMIC_VALUE),
            ),
            (Expr::SetComp { generators, .. }, Type::Set(t)) => {
                (generators, format!("Set({})", t.target_name()))
            }
            (Expr::SetComp { generators, .. }, _) => (generators, format!("Set({})", DYNAMIC_VALUE)),
            (Expr::ListComp { generators, .. } | Expr::GeneratorExp { generators, .. }, Type::List(t)) => {
                (generators, format!("List({})", t.target_name()))
            }
            (Expr::ListComp { generators, .. } | Expr::GeneratorExp { generators, .. }, _) => {
                (generators, format!("List({})", DYNAMIC_VALUE))
            }
            _ => return self.render_expr(expr),
        };

        let acc = self.temp("comp");
        let init = format!("runtime.{}.init({})", container, self.options.allocator);
        let init = self.maybe_fallible(self.options.allocation_is_fallible, init);

        // Names the element and conditions read decide which loop payloads
        // are named and which are discarded
        let mut probe: Vec<Stmt> = Vec::new();
        match expr {
            Expr::DictComp { key, value, .. } => {
                probe.push(Stmt::Expr((**key).clone()));
                probe.push(Stmt::Expr((**value).clone()));
            }
            Expr::ListComp { elt, .. } | Expr::SetComp { elt, .. } | Expr::GeneratorExp { elt, .. } => {
                probe.push(Stmt::Expr((**elt).clone()))
            }
            _ => {}
        }
        for g in generators {
            probe.push(Stmt::Expr(g.iter.clone()));
            probe.extend(g.ifs.iter().cloned().map(Stmt::Expr));
        }
        let used = analyze_body("", &[], &probe).reads;

        let mut buf = CodeBuffer::new();
        buf.emit_line(&format!("const {} = {};", acc, init));
        self.scope.push_block();
        let result = self.emit_generators(expr, generators, &acc, &used, &mut buf);
        let popped = self.scope.pop();
        result?;
        popped?;
        self.prelude.emit_block(buf.as_str());
        Ok(acc)
    }

    fn emit_generators(
        &mut self,
        expr: &Expr,
        generators: &[Comprehension],
        acc: &str,
        used: &[String],
        out: &mut dyn Emitter,
    ) -> Result<()> {
        let (g, rest) = match generators.split_first() {
            Some(split) => split,
            None => {
                let (line, prelude) = self.isolated(|cx| cx.comprehension_insert(expr, acc))?;
                out.emit_block(&prelude);
                out.emit_line(&line);
                return Ok(());
            }
        };
        let closers = self.open_loop(&g.target, &g.iter, used, out)?;
        for cond in &g.ifs {
            let (c, prelude) = self.isolated(|cx| cx.render_condition(cond))?;
            out.emit_block(&prelude);
            out.emit_line(&format!("if (!({})) continue;", c));
        }
        self.emit_generators(expr, rest, acc, used, out)?;
        for _ in 0..closers {
            out.dedent();
            out.emit_line("}");
        }
        Ok(())
    }

    fn comprehension_insert(&mut self, expr: &Expr, acc: &str) -> Result<String> {
        let text = match expr {
            Expr::DictComp { key, value, .. } => {
                let k = self.render_expr(key)?;
                let v = self.render_expr(value)?;
                format!("{}.put({}, {})", acc, k, v)
            }
            Expr::SetComp { elt, .. } => format!("{}.add({})", acc, self.render_expr(elt)?),
            Expr::ListComp { elt, .. } | Expr::GeneratorExp { elt, .. } => {
                format!("{}.append({})", acc, self.render_expr(elt)?)
            }
            other => self.render_expr(other)?,
        };
        let text = self.maybe_fallible(self.options.allocation_is_fallible, text);
        Ok(format!("{};", text))
    }

    /// Synthesize a lambda as an anonymous closure; its wrapper instance
    /// goes to the prelude. Returns the wrapper identifier and its type.
    pub(crate) fn render_lambda(&mut self, params: &[Param], body: &Expr) -> Result<(String, Type)> {
        let function = Function {
            name: "lambda".to_string(),
            params: params.to_vec(),
            vararg: None,
            kwarg: None,
            return_annotation: None,
            body: vec![Stmt::Return(Some(body.clone()))],
            decorators: Vec::new(),
            span: self.current.span,
        };
        let mut instance = CodeBuffer::new();
        let built = self.synthesize(&function, &mut instance, false)?;
        self.prelude.emit_block(instance.as_str());
        Ok((built.wrapper_ident, Type::Closure(built.closure_type)))
    }

    fn render_fstring(&mut self, parts: &[FStringPart]) -> Result<String> {
        let mut format = String::new();
        let mut args = Vec::new();
        for part in parts {
            match part {
                FStringPart::Literal(s) => {
                    format.push_str(&escape_string(s).replace('{', "{{").replace('}', "}}"))
                }
                FStringPart::Interpolation(e) => {
                    let spec = match self.type_of(e) {
                        Type::Str => "{s}",
                        Type::Int | Type::BigInt | Type::Float => "{d}",
                        _ => "{any}",
                    };
                    format.push_str(spec);
                    args.push(self.render_expr(e)?);
                }
            }
        }
        let text = format!(
            "runtime.format({}, \"{}\", {})",
            self.options.allocator,
            format,
            tuple_literal(&args)
        );
        Ok(self.maybe_fallible(self.options.allocation_is_fallible, text))
    }
}

fn compare_text(op: CmpOp, l: &str, r: &str, strings: bool) -> String {
    match op {
        CmpOp::Eq if strings => format!("std.mem.eql(u8, {}, {})", l, r),
        CmpOp::NotEq if strings => format!("!std.mem.eql(u8, {}, {})", l, r),
        CmpOp::Eq | CmpOp::Is => format!("{} == {}", l, r),
        CmpOp::NotEq | CmpOp::IsNot => format!("{} != {}", l, r),
        CmpOp::Lt => format!("{} < {}", l, r),
        CmpOp::LtE => format!("{} <= {}", l, r),
        CmpOp::Gt => format!("{} > {}", l, r),
        CmpOp::GtE => format!("{} >= {}", l, r),
        CmpOp::In => format!("runtime.contains({}, {})", r, l),
        CmpOp::NotIn => format!("!runtime.contains({}, {})", r, l),
    }
}

/// Anonymous tuple literal, `.{}` when empty.
pub(crate) fn tuple_literal(items: &[String]) -> String {
    if items.is_empty() {
        ".{}".to_string()
    } else {
        format!(".{{ {} }}", items.join(", "))
    }
}

pub(crate) fn render_constant(c: &Constant) -> String {
    match c {
        Constant::None => "null".to_string(),
        Constant::Bool(b) => b.to_string(),
        Constant::Int(i) => i.to_string(),
        Constant::Float(f) => render_float(*f),
        Constant::Str(s) => format!("\"{}\"", escape_string(s)),
    }
}

fn render_float(f: f64) -> String {
    if f.is_nan() {
        "std.math.nan(f64)".to_string()
    } else if f.is_infinite() {
        if f > 0.0 {
            "std.math.inf(f64)".to_string()
        } else {
            "-std.math.inf(f64)".to_string()
        }
    } else {
        // Debug keeps the fractional part: 1.0, 0.5, 1e300
        format!("{:?}", f)
    }
}

/// Escape `s` for a double-quoted string literal.
pub(crate) fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn widen_to_float(int_text: &str) -> String {
    format!("@as(f64, @floatFromInt({}))", int_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ConvertOptions;
    use crate::oracle::InferenceTable;
    use crate::scope::{Binding, Scope};
    use ferrule_hir::build::*;
    use ferrule_types::{ClosureType, FunctionType};

    fn scope() -> Scope {
        let mut scope = Scope::new();
        scope.push_function("f", vec![]);
        scope.declare_var_with_type("n", Type::Int);
        scope.declare_var_with_type("s", Type::Str);
        scope.declare_var_with_type("xs", Type::list(Type::Int));
        scope.declare_var_with_type("m", Type::dict(Type::Str, Type::Int));
        scope
    }

    fn render(e: &Expr) -> (String, bool) {
        let oracle = InferenceTable::new().with_class("Point");
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(scope(), &oracle, &options);
        let text = cx.render_expr(e).unwrap();
        (text, cx.current.failed)
    }

    #[test]
    fn test_constants() {
        assert_eq!(render(&none()).0, "null");
        assert_eq!(render(&float(1.0)).0, "1.0");
        assert_eq!(render(&string("say \"hi\"\n")).0, "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn test_arithmetic_and_division() {
        assert_eq!(render(&add(name("n"), int(1))).0, "n + 1");
        assert_eq!(
            render(&mul(add(name("n"), int(1)), int(2))).0,
            "(n + 1) * 2"
        );
        let (text, failed) = render(&binop(name("n"), BinOp::FloorDiv, int(2)));
        assert_eq!(text, "runtime.floorDiv(n, 2)");
        assert!(!failed);
        let (text, failed) = render(&binop(name("n"), BinOp::Div, name("n")));
        assert_eq!(text, "try runtime.trueDiv(n, n)");
        assert!(failed);
    }

    #[test]
    fn test_string_concat_allocates() {
        let (text, failed) = render(&add(name("s"), string("!")));
        assert_eq!(text, "try runtime.concat(allocator, s, \"!\")");
        assert!(failed);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            render(&compare(name("s"), CmpOp::Eq, string("a"))).0,
            "std.mem.eql(u8, s, \"a\")"
        );
        assert_eq!(
            render(&compare(name("n"), CmpOp::In, name("xs"))).0,
            "runtime.contains(xs, n)"
        );
        let chained = Expr::Compare {
            left: Box::new(int(0)),
            ops: vec![CmpOp::Lt, CmpOp::LtE],
            comparators: vec![name("n"), int(9)],
        };
        assert_eq!(render(&chained).0, "(0 < n) and (n <= 9)");
    }

    #[test]
    fn test_subscripts() {
        assert_eq!(render(&subscript(name("xs"), int(0))).0, "xs.items[@intCast(0)]");
        assert_eq!(render(&subscript(name("xs"), int(-1))).0, "xs.items[xs.items.len - 1]");
        let (text, failed) = render(&subscript(name("m"), string("k")));
        assert_eq!(text, "try m.get(\"k\")");
        assert!(failed);
    }

    #[test]
    fn test_calls() {
        assert_eq!(render(&call("print", vec![name("n")])).0, "runtime.print(.{ n })");
        assert_eq!(render(&call("len", vec![name("xs")])).0, "runtime.len(xs)");
        assert_eq!(
            render(&call("Point", vec![int(1), int(2)])).0,
            "try Point.init(allocator, 1, 2)"
        );
        assert_eq!(
            render(&method_call(name("xs"), "append", vec![int(1)])).0,
            "try xs.append(1)"
        );
        assert_eq!(render(&call("helper", vec![])).0, "helper()");
    }

    #[test]
    fn test_closure_binding_is_called_through_wrapper() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut s = scope();
        let ty = Type::Closure(ClosureType {
            wrapper: "inner__Closure".to_string(),
            signature: FunctionType {
                params: vec![Type::Int],
                return_type: Box::new(Type::Int),
                fallible: true,
            },
        });
        s.declare_as("inner", "inner__1", Binding::new(BindingKind::Closure, ty));
        let mut cx = ConversionContext::new(s, &oracle, &options);
        let text = cx.render_expr(&call("inner", vec![int(3)])).unwrap();
        assert_eq!(text, "try inner__1.call(3)");
        // As an operand the error union is unwrapped first
        let text = cx.render_expr(&add(call("inner", vec![int(3)]), int(1))).unwrap();
        assert_eq!(text, "(try inner__1.call(3)) + 1");
    }

    #[test]
    fn test_list_literal_and_expected_type() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(scope(), &oracle, &options);
        assert_eq!(
            cx.render_expr(&list(vec![int(1), int(2)])).unwrap(),
            "try runtime.List(i64).fromSlice(allocator, &.{ 1, 2 })"
        );
        let expected = Type::list(Type::Str);
        assert_eq!(
            cx.render_expr_as(&list(vec![]), Some(&expected)).unwrap(),
            "try runtime.List([]const u8).init(allocator)"
        );
    }

    #[test]
    fn test_fstring_escapes_braces() {
        let e = fstring(vec![
            FStringPart::Literal("{n} = ".to_string()),
            FStringPart::Interpolation(name("n")),
            FStringPart::Literal(", s = ".to_string()),
            FStringPart::Interpolation(name("s")),
        ]);
        assert_eq!(
            render(&e).0,
            "try runtime.format(allocator, \"{{n}} = {d}, s = {s}\", .{ n, s })"
        );
    }

    #[test]
    fn test_comprehension_goes_to_prelude() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(scope(), &oracle, &options);
        let e = list_comp(
            mul(name("x"), int(2)),
            "x",
            name("xs"),
            vec![compare(name("x"), CmpOp::Gt, int(0))],
        );
        let text = cx.render_expr(&e).unwrap();
        assert_eq!(text, "__comp1");
        assert_eq!(
            cx.prelude.as_str(),
            "const __comp1 = try runtime.List(i64).init(allocator);\n\
             for (xs.items) |x| {\n    \
                 if (!(x > 0)) continue;\n    \
                 try __comp1.append(x * 2);\n\
             }\n"
        );
        // The loop variable does not outlive the comprehension
        assert!(cx.scope.lookup("x").is_none());
    }

    #[test]
    fn test_starred_expression_is_unsupported() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut cx = ConversionContext::new(scope(), &oracle, &options);
        let err = cx.render_expr(&Expr::Starred(Box::new(name("xs")))).unwrap_err();
        assert_eq!(err.code(), ferrule_diagnostics::DiagnosticCode::UnsupportedConstruct);
    }
}
