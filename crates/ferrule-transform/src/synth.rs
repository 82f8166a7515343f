//! Closure synthesis.
//!
//! A nested function becomes a container-level wrapper type plus an
//! instance of it bound where the function was defined. The wrapper's shape
//! depends on what the function captures:
//!
//! ```text
//! // zero-capture
//! const inner__Closure = struct {
//!     fn inner__impl(x: i64) i64 { ... }
//!
//!     pub fn call(_: *const @This(), x: i64) i64 {
//!         return inner__impl(x);
//!     }
//! };
//!
//! // struct-capture
//! const inner__Env = struct {
//!     k: i64,
//! };
//!
//! const inner__Closure = struct {
//!     env: inner__Env,
//!
//!     fn inner__impl(env: *const inner__Env, x: i64) i64 { ... }
//!
//!     pub fn call(self: *const @This(), x: i64) i64 {
//!         return inner__impl(&self.env, x);
//!     }
//! };
//!
//! // recursive
//! const fact__Closure = struct {
//!     pub fn call(self: *const @This(), n: i64) i64 { ... self.call(n - 1) ... }
//! };
//! ```

use crate::capture::{resolve_captures, Capture, CaptureMode};
use crate::context::{mentions_ident, ClosureSummary, ConversionContext, FunctionState};
use crate::effects::may_fail;
use crate::emit::{CodeBuffer, Emitter};
use crate::error::Result;
use crate::options::ConvertOptions;
use crate::oracle::TypeOracle;
use crate::plan::plan_body;
use crate::rename::RenameDelta;
use crate::scope::{Binding, BindingKind, Scope};
use crate::shape::{select_representation, ClosureRepresentation, ClosureShape};
use crate::usage::{analyze_function, Usage};
use ferrule_diagnostics::{Diagnostic, DiagnosticCode, Diagnostics};
use ferrule_hir::Function;
use ferrule_types::{ClosureType, FunctionType, Type, DYNAMIC_VALUE};

/// Field names the wrapper types use themselves.
const RESERVED_FIELDS: &[&str] = &["call", "env", "invoke", "self"];

/// A formal parameter as declared in the function's frame.
#[derive(Debug, Clone)]
pub(crate) struct Formal {
    pub name: String,
    pub ident: String,
    pub ty: Type,
    pub used: bool,
    /// Written in the body, so it is copied into a local `var`
    pub reassigned: bool,
}

impl Formal {
    /// Spelling in a routine that runs the body.
    fn body_param(&self) -> String {
        let ty = self.ty.target_name();
        if !self.used {
            format!("_: {}", ty)
        } else if self.reassigned {
            format!("{}__arg: {}", self.ident, ty)
        } else {
            format!("{}: {}", self.ident, ty)
        }
    }

    fn forwarding_param(&self) -> String {
        format!("{}: {}", self.ident, self.ty.target_name())
    }
}

/// Output of [`ConversionContext::render_function_body`].
pub(crate) struct RenderedBody {
    pub text: String,
    /// Something in the body was rendered as failing
    pub failed: bool,
    /// Join of the returned values' types
    pub return_type: Option<Type>,
}

/// Result of synthesizing one nested function inside a conversion.
pub(crate) struct BuiltClosure {
    pub delta: RenameDelta,
    pub representation: ClosureRepresentation,
    pub wrapper_ident: String,
    pub closure_type: ClosureType,
}

/// Result of [`synthesize_closure`].
#[derive(Debug, Clone)]
pub struct SynthesizedClosure {
    /// Container-level declarations: the wrapper type, its environment and
    /// those of any closures nested inside
    pub declarations: String,
    /// Statements binding the wrapper instance at the definition site
    pub instance: String,
    /// Renames the caller must apply to its own frame
    pub delta: RenameDelta,
    pub representation: ClosureRepresentation,
    /// Identifier the instance is bound to
    pub wrapper_ident: String,
    pub closure_type: ClosureType,
    pub diagnostics: Diagnostics,
}

impl SynthesizedClosure {
    pub fn shape(&self) -> ClosureShape {
        self.representation.shape
    }

    /// Declarations followed by the instance.
    pub fn code(&self) -> String {
        format!("{}{}", self.declarations, self.instance)
    }
}

/// Synthesize `fragment`, a function defined in the innermost function of
/// `scope`.
///
/// On success `scope` has the wrapper bound under the function's name. On
/// failure `scope` is left as it was, apart from container names already
/// reserved.
pub fn synthesize_closure(
    fragment: &Function,
    scope: &mut Scope,
    oracle: &dyn TypeOracle,
    options: &ConvertOptions,
) -> Result<SynthesizedClosure> {
    let mut cx = ConversionContext::new(std::mem::take(scope), oracle, options);
    cx.current.qualname = cx.scope.current_function().unwrap_or_default().to_string();
    let mut instance = CodeBuffer::new();
    let result = cx.synthesize(fragment, &mut instance, false);
    let (restored, diagnostics, declarations) = cx.into_parts();
    *scope = restored;
    let built = result?;
    Ok(SynthesizedClosure {
        declarations,
        instance: instance.finish(),
        delta: built.delta,
        representation: built.representation,
        wrapper_ident: built.wrapper_ident,
        closure_type: built.closure_type,
        diagnostics,
    })
}

/// Everything a closure render changes that a retry has to undo.
struct Snapshot {
    scope: Scope,
    diagnostics: usize,
    decls: CodeBuffer,
    closures: usize,
    counter: usize,
}

/// Names of the container-level declarations for one closure.
struct ClosureNames {
    wrapper: String,
    env: Option<String>,
    implementation: Option<String>,
}

/// The rendered pieces of one closure.
struct ClosureParts {
    formals: Vec<Formal>,
    body: String,
    env_param: Option<String>,
    self_param: Option<String>,
    fallible: bool,
    /// Fallibility the self handle was rendered with
    assumed_fallible: bool,
    return_type: Option<Type>,
}

impl<'a> ConversionContext<'a> {
    /// Synthesize the nested function `f`.
    ///
    /// Declarations go to the container-level buffer, the instance to `out`,
    /// and the wrapper is bound under `f.name` in the current frame. With
    /// `discard_unused`, a wrapper the enclosing body never reads is
    /// explicitly discarded.
    pub(crate) fn synthesize(
        &mut self,
        f: &Function,
        out: &mut dyn Emitter,
        discard_unused: bool,
    ) -> Result<BuiltClosure> {
        let qualname = self.qualify(&f.name);
        let usage = analyze_function(f);
        let resolution = resolve_captures(f, &usage, &self.scope, &qualname)?;
        for d in resolution.diagnostics {
            self.push_diagnostic(d);
        }
        let representation = select_representation(resolution.captures, usage.self_recursive);
        let shape = representation.shape;
        log::debug!(
            "synthesizing `{}` as {} ({} captures)",
            qualname,
            shape,
            representation.captures.len()
        );

        let names = ClosureNames {
            wrapper: self
                .scope
                .claim_module_ident(&format!("{}{}", f.name, self.options.wrapper_suffix)),
            env: match shape {
                ClosureShape::StructCapture => Some(
                    self.scope
                        .claim_module_ident(&format!("{}{}", f.name, self.options.env_suffix)),
                ),
                _ => None,
            },
            implementation: match shape {
                ClosureShape::RecursiveSelfCapture => None,
                _ => Some(
                    self.scope
                        .claim_module_ident(&format!("{}{}", f.name, self.options.impl_suffix)),
                ),
            },
        };
        let wrapper_ident = self.scope.claim_ident(&f.name);
        let param_types = self.formal_types(f, &qualname);
        let declared_return = f
            .return_annotation
            .clone()
            .or_else(|| self.oracle.inferred_return_type(&qualname))
            .or_else(|| self.oracle.inferred_return_type(&f.name))
            .filter(|t| !t.is_unknown());

        // The enclosing statement's pending prelude must not leak into the
        // closure body
        let saved_prelude = std::mem::take(&mut self.prelude);
        let mut assumed = None;
        let rendered = loop {
            let snapshot = self.snapshot();
            let attempt = self.render_closure(
                f,
                &qualname,
                &usage,
                &representation,
                &names,
                &param_types,
                declared_return.as_ref(),
                assumed,
            );
            match attempt {
                Ok(parts)
                    if representation.recursive && parts.fallible && !parts.assumed_fallible =>
                {
                    log::debug!("`{}` fails through its own recursion; rendering again", qualname);
                    self.restore(snapshot);
                    assumed = Some(true);
                }
                other => break other,
            }
        };
        self.prelude = saved_prelude;
        let parts = rendered?;

        let return_type = declared_return.clone().or_else(|| parts.return_type.clone());
        let ret = self.return_text(return_type.as_ref(), parts.fallible, &qualname, f);
        let closure_type = ClosureType {
            wrapper: names.wrapper.clone(),
            signature: FunctionType {
                params: param_types,
                return_type: Box::new(return_type.unwrap_or(Type::None)),
                fallible: parts.fallible,
            },
        };

        let mut decls = CodeBuffer::new();
        emit_declarations(&mut decls, &names, &representation, &parts, &ret);
        self.decls.emit_raw(decls.as_str());
        self.decls.emit_raw("\n");

        // Instance, wrapped by decorators innermost first
        let mut init = instance_init(&names.wrapper, &representation);
        for d in f.decorators.iter().rev() {
            let decorator = self.render_expr(d)?;
            init = format!("{}({})", decorator, init);
        }
        self.flush_prelude(out);
        let mutable = self.current.plan.is_mutable(&wrapper_ident);
        let keyword = if mutable { "var" } else { "const" };
        out.emit_line(&format!("{} {} = {};", keyword, wrapper_ident, init));
        if discard_unused && !self.is_read(&f.name) {
            out.emit_line(&format!("_ = {};", wrapper_ident));
        }

        self.scope.declare_as(
            &f.name,
            &wrapper_ident,
            Binding::new(BindingKind::Closure, Type::Closure(closure_type.clone())).mutable(mutable),
        );
        let mut delta = RenameDelta::default();
        delta.push(f.name.clone(), wrapper_ident.clone());

        self.closures.push(ClosureSummary {
            qualname,
            shape,
            wrapper: names.wrapper.clone(),
            captures: representation
                .captures
                .names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            fallible: parts.fallible,
        });

        Ok(BuiltClosure {
            delta,
            representation,
            wrapper_ident,
            closure_type,
        })
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            scope: self.scope.clone(),
            diagnostics: self.diagnostics.len(),
            decls: self.decls.clone(),
            closures: self.closures.len(),
            counter: self.counter,
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        self.scope = snapshot.scope;
        self.diagnostics.items.truncate(snapshot.diagnostics);
        self.decls = snapshot.decls;
        self.closures.truncate(snapshot.closures);
        self.counter = snapshot.counter;
    }

    /// Render the body of `f` in a frame of its own. The frame is popped and
    /// the outer function state restored on every path.
    #[allow(clippy::too_many_arguments)]
    fn render_closure(
        &mut self,
        f: &Function,
        qualname: &str,
        usage: &Usage,
        representation: &ClosureRepresentation,
        names: &ClosureNames,
        param_types: &[Type],
        declared_return: Option<&Type>,
        assumed: Option<bool>,
    ) -> Result<ClosureParts> {
        let formal_names = f.formal_names().into_iter().map(str::to_string).collect();
        self.scope.push_function(qualname, formal_names);
        let result = self.render_closure_frame(
            f,
            qualname,
            usage,
            representation,
            names,
            param_types,
            declared_return,
            assumed,
        );
        let popped = self.scope.pop();
        let parts = result?;
        popped?;
        Ok(parts)
    }

    #[allow(clippy::too_many_arguments)]
    fn render_closure_frame(
        &mut self,
        f: &Function,
        qualname: &str,
        usage: &Usage,
        representation: &ClosureRepresentation,
        names: &ClosureNames,
        param_types: &[Type],
        declared_return: Option<&Type>,
        assumed: Option<bool>,
    ) -> Result<ClosureParts> {
        let env_param = match representation.shape {
            ClosureShape::StructCapture => Some(self.scope.claim_ident("env")),
            _ => None,
        };
        let self_param = match representation.shape {
            ClosureShape::ZeroCapture => None,
            _ => Some(self.scope.claim_ident("self")),
        };

        // Captured names resolve to environment fields
        let receiver = env_param.as_ref().or(self_param.as_ref());
        if let Some(recv) = receiver {
            for c in representation.captures.iter() {
                let mut ident = format!("{}.{}", recv, field_name(&c.name));
                if c.mode == CaptureMode::ByReference {
                    ident.push_str(".*");
                }
                let binding = Binding::new(BindingKind::Captured, c.ty.clone())
                    .mutable(c.mode == CaptureMode::ByReference);
                self.scope.declare_as(&c.name, &ident, binding);
            }
        }

        if let (true, Some(handle)) = (representation.recursive, &self_param) {
            let ty = self_handle_type(
                &names.wrapper,
                param_types,
                declared_return,
                assumed.unwrap_or(false),
            );
            self.scope
                .declare_as(&f.name, handle, Binding::new(BindingKind::SelfHandle, ty));
        }

        let mut formals = self.declare_formals(f, param_types, usage);

        let effects_fail = may_fail(&f.body, &self.scope, self.oracle, self.options);
        let assumed_fallible = assumed.unwrap_or(effects_fail);
        if representation.recursive {
            if let Some(Binding {
                ty: Type::Closure(c),
                ..
            }) = self.scope.lookup_mut(&f.name)
            {
                c.signature.fallible = assumed_fallible;
            }
        }

        let rendered = self.render_function_body(f, qualname, &mut formals, usage.clone())?;
        Ok(ClosureParts {
            formals,
            body: rendered.text,
            env_param,
            self_param,
            fallible: rendered.failed || effects_fail,
            assumed_fallible,
            return_type: rendered.return_type,
        })
    }

    /// Parameter types of `f`, resolved in the enclosing scope.
    pub(crate) fn formal_types(&mut self, f: &Function, qualname: &str) -> Vec<Type> {
        let mut types = Vec::with_capacity(f.formal_names().len());
        for p in &f.params {
            let ty = p
                .annotation
                .clone()
                .or_else(|| self.oracle.inferred_param_type(qualname, &p.name))
                .or_else(|| p.default.as_ref().map(|d| self.type_of(d)))
                .unwrap_or(Type::Unknown);
            if ty.is_unknown() {
                self.push_diagnostic(
                    Diagnostic::new(
                        DiagnosticCode::UnresolvedParamType,
                        format!(
                            "type of parameter `{}` is unknown; passing it as a dynamic value",
                            p.name
                        ),
                    )
                    .in_function(qualname)
                    .with_span(f.span)
                    .build(),
                );
            }
            types.push(ty);
        }
        if let Some(v) = &f.vararg {
            types.push(Type::list(v.annotation.clone().unwrap_or(Type::Unknown)));
        }
        if let Some(k) = &f.kwarg {
            types.push(Type::dict(
                Type::Str,
                k.annotation.clone().unwrap_or(Type::Unknown),
            ));
        }
        types
    }

    /// Declare the formals of `f` in the current frame.
    pub(crate) fn declare_formals(&mut self, f: &Function, types: &[Type], usage: &Usage) -> Vec<Formal> {
        f.formal_names()
            .into_iter()
            .zip(types)
            .map(|(name, ty)| {
                let ident = self.scope.claim_ident(name);
                self.scope
                    .declare_as(name, &ident, Binding::new(BindingKind::Param, ty.clone()));
                Formal {
                    name: name.to_string(),
                    ident,
                    ty: ty.clone(),
                    used: usage.uses_formal(name),
                    reassigned: false,
                }
            })
            .collect()
    }

    /// Plan and emit the body of `f` into a fresh buffer, prologue first.
    ///
    /// Runs in the function frame already on top of the scope, with the
    /// formals declared. Marks reassigned formals in `formals`.
    pub(crate) fn render_function_body(
        &mut self,
        f: &Function,
        qualname: &str,
        formals: &mut [Formal],
        usage: Usage,
    ) -> Result<RenderedBody> {
        let plan = plan_body(&f.body, &self.scope, self.oracle);
        for formal in formals.iter_mut() {
            formal.reassigned = plan.is_mutable(&formal.ident);
            if formal.reassigned {
                self.scope.set_mutable(&formal.name);
            }
        }
        let planned_return = plan.return_type.clone();
        let hoisted = plan.hoisted.clone();
        let state = FunctionState::new(qualname, f.span, plan, usage);
        let outer = self.enter_function(state);

        let mut body = CodeBuffer::new();
        for formal in formals.iter().filter(|p| p.reassigned) {
            if formal.used {
                body.emit_line(&format!("var {} = {}__arg;", formal.ident, formal.ident));
            } else {
                body.emit_line(&format!(
                    "var {}: {} = undefined;",
                    formal.ident,
                    formal.ty.target_name()
                ));
            }
        }
        // Names first bound inside a block live for the whole body
        for (name, ty) in &hoisted {
            let ident = self.scope.claim_ident(name);
            self.scope
                .declare_in_function(name, &ident, Binding::local(ty.clone()).mutable(true));
            body.emit_line(&format!("var {}: {} = undefined;", ident, hoisted_type(ty)));
        }
        let result = self.emit_body(&f.body, &mut body);

        let state = self.leave_function(outer);
        result?;
        // Closures defined in the body are only typed once synthesized
        let return_type = match (state.returned, planned_return) {
            (Some(emitted), Some(planned)) => Some(emitted.join(&planned)),
            (emitted, planned) => emitted.or(planned),
        };
        Ok(RenderedBody {
            text: body.finish(),
            failed: state.failed,
            return_type,
        })
    }

    /// Target return type of a function; pushes A001 when nothing is known.
    pub(crate) fn return_text(
        &mut self,
        return_type: Option<&Type>,
        fallible: bool,
        qualname: &str,
        f: &Function,
    ) -> String {
        let base = match return_type {
            None => "void".to_string(),
            Some(t) if t.is_unknown() => {
                self.push_diagnostic(
                    Diagnostic::new(
                        DiagnosticCode::UnresolvedReturnType,
                        format!(
                            "return type of `{}` could not be inferred; using `{}`",
                            qualname,
                            self.options.unknown_return_type()
                        ),
                    )
                    .in_function(qualname)
                    .with_span(f.span)
                    .with_help("annotate the return type")
                    .build(),
                );
                self.options.unknown_return_type().to_string()
            }
            Some(Type::Union(_)) => DYNAMIC_VALUE.to_string(),
            Some(t) => t.target_name(),
        };
        if fallible {
            format!("anyerror!{}", base)
        } else {
            base
        }
    }
}

fn self_handle_type(
    wrapper: &str,
    params: &[Type],
    declared_return: Option<&Type>,
    fallible: bool,
) -> Type {
    Type::Closure(ClosureType {
        wrapper: wrapper.to_string(),
        signature: FunctionType {
            params: params.to_vec(),
            return_type: Box::new(declared_return.cloned().unwrap_or(Type::Unknown)),
            fallible,
        },
    })
}

/// Field name of a capture; names the wrapper uses itself get a `_` suffix.
pub(crate) fn field_name(name: &str) -> String {
    if RESERVED_FIELDS.contains(&name) {
        format!("{}_", name)
    } else {
        name.to_string()
    }
}

fn field_type(c: &Capture) -> String {
    match (c.mode, c.kind) {
        (_, BindingKind::SelfHandle) => format!("*const {}", c.ty.target_name()),
        (CaptureMode::ByReference, _) => format!("*{}", c.ty.target_name()),
        _ => c.ty.target_name(),
    }
}

fn field_init(c: &Capture) -> String {
    match c.mode {
        CaptureMode::ByReference => match c.source_ident.strip_suffix(".*") {
            // Already a pointer into an outer environment
            Some(pointer) => pointer.to_string(),
            None => format!("&{}", c.source_ident),
        },
        _ => c.source_ident.clone(),
    }
}

fn hoisted_type(ty: &Type) -> String {
    match ty {
        Type::Unknown | Type::Union(_) => DYNAMIC_VALUE.to_string(),
        Type::None => format!("?{}", DYNAMIC_VALUE),
        other => other.target_name(),
    }
}

fn instance_init(wrapper: &str, representation: &ClosureRepresentation) -> String {
    let fields: Vec<String> = representation
        .captures
        .iter()
        .map(|c| format!(".{} = {}", field_name(&c.name), field_init(c)))
        .collect();
    match representation.shape {
        ClosureShape::ZeroCapture => format!("{}{{}}", wrapper),
        ClosureShape::StructCapture => {
            format!("{}{{ .env = .{{ {} }} }}", wrapper, fields.join(", "))
        }
        ClosureShape::RecursiveSelfCapture if fields.is_empty() => format!("{}{{}}", wrapper),
        ClosureShape::RecursiveSelfCapture => format!("{}{{ {} }}", wrapper, fields.join(", ")),
    }
}

fn emit_declarations(
    out: &mut dyn Emitter,
    names: &ClosureNames,
    representation: &ClosureRepresentation,
    parts: &ClosureParts,
    ret: &str,
) {
    let body_params: Vec<String> = parts.formals.iter().map(Formal::body_param).collect();
    let call_params: Vec<String> = parts.formals.iter().map(Formal::forwarding_param).collect();
    let args: Vec<String> = parts.formals.iter().map(|p| p.ident.clone()).collect();
    let receiver = |param: &Option<String>| match param {
        Some(p) if mentions_ident(&parts.body, p) => p.clone(),
        _ => "_".to_string(),
    };

    match (&names.env, &names.implementation) {
        (Some(env), Some(implementation)) => {
            out.emit_line(&format!("const {} = struct {{", env));
            out.indent();
            for c in representation.captures.iter() {
                out.emit_line(&format!("{}: {},", field_name(&c.name), field_type(c)));
            }
            out.dedent();
            out.emit_line("};");
            out.emit_line("");

            let self_param = parts.self_param.as_deref().unwrap_or("self");
            let mut impl_params = vec![format!("{}: *const {}", receiver(&parts.env_param), env)];
            impl_params.extend(body_params);
            let mut forwarded = vec![format!("&{}.env", self_param)];
            forwarded.extend(args);
            let mut call_sig = vec![format!("{}: *const @This()", self_param)];
            call_sig.extend(call_params);

            out.emit_line(&format!("const {} = struct {{", names.wrapper));
            out.indent();
            out.emit_line(&format!("env: {},", env));
            out.emit_line("");
            emit_routine(out, "fn", implementation, &impl_params, ret, &parts.body);
            out.emit_line("");
            emit_forwarder(out, &call_sig, ret, implementation, &forwarded);
            out.dedent();
            out.emit_line("};");
        }
        (None, Some(implementation)) => {
            let mut call_sig = vec!["_: *const @This()".to_string()];
            call_sig.extend(call_params);
            out.emit_line(&format!("const {} = struct {{", names.wrapper));
            out.indent();
            emit_routine(out, "fn", implementation, &body_params, ret, &parts.body);
            out.emit_line("");
            emit_forwarder(out, &call_sig, ret, implementation, &args);
            out.dedent();
            out.emit_line("};");
        }
        _ => {
            let mut call_sig = vec![format!("{}: *const @This()", receiver(&parts.self_param))];
            call_sig.extend(body_params);
            out.emit_line(&format!("const {} = struct {{", names.wrapper));
            out.indent();
            if !representation.captures.is_empty() {
                for c in representation.captures.iter() {
                    out.emit_line(&format!("{}: {},", field_name(&c.name), field_type(c)));
                }
                out.emit_line("");
            }
            emit_routine(out, "pub fn", "call", &call_sig, ret, &parts.body);
            out.dedent();
            out.emit_line("};");
        }
    }
}

fn emit_routine(
    out: &mut dyn Emitter,
    keyword: &str,
    name: &str,
    params: &[String],
    ret: &str,
    body: &str,
) {
    out.emit_line(&format!("{} {}({}) {} {{", keyword, name, params.join(", "), ret));
    out.indent();
    out.emit_block(body);
    out.dedent();
    out.emit_line("}");
}

fn emit_forwarder(out: &mut dyn Emitter, params: &[String], ret: &str, target: &str, args: &[String]) {
    out.emit_line(&format!("pub fn call({}) {} {{", params.join(", "), ret));
    out.indent();
    out.emit_line(&format!("return {}({});", target, args.join(", ")));
    out.dedent();
    out.emit_line("}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::InferenceTable;
    use ferrule_hir::build::*;
    use ferrule_hir::{BinOp, Expr};

    fn outer_scope() -> Scope {
        let mut scope = Scope::new();
        scope.push_function("outer", vec!["k".to_string()]);
        scope.declare("k", Binding::new(BindingKind::Param, Type::Int));
        scope
    }

    #[test]
    fn test_field_names_avoid_wrapper_members() {
        assert_eq!(field_name("env"), "env_");
        assert_eq!(field_name("call"), "call_");
        assert_eq!(field_name("total"), "total");
    }

    #[test]
    fn test_zero_capture_shape() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        let inner = typed_func(
            "inner",
            vec![typed_param("x", Type::Int)],
            Type::Int,
            vec![ret(mul(name("x"), int(2)))],
        );
        let out = synthesize_closure(&inner, &mut scope, &oracle, &options).unwrap();
        assert_eq!(out.shape(), ClosureShape::ZeroCapture);
        assert_eq!(
            out.declarations,
            "const inner__Closure = struct {\n    \
                 fn inner__impl(x: i64) i64 {\n        \
                     return x * 2;\n    \
                 }\n\
             \n    \
                 pub fn call(_: *const @This(), x: i64) i64 {\n        \
                     return inner__impl(x);\n    \
                 }\n\
             };\n\n"
        );
        assert_eq!(out.instance, "const inner = inner__Closure{};\n");
        assert_eq!(scope.ident("inner"), "inner");
    }

    #[test]
    fn test_struct_capture_reads_environment() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        let inner = typed_func(
            "inner",
            vec![typed_param("x", Type::Int)],
            Type::Int,
            vec![ret(add(name("x"), name("k")))],
        );
        let out = synthesize_closure(&inner, &mut scope, &oracle, &options).unwrap();
        assert_eq!(out.shape(), ClosureShape::StructCapture);
        assert!(out.declarations.contains("const inner__Env = struct {\n    k: i64,\n};\n"));
        assert!(out
            .declarations
            .contains("fn inner__impl(env: *const inner__Env, x: i64) i64 {\n        return x + env.k;\n"));
        assert!(out
            .declarations
            .contains("return inner__impl(&self.env, x);"));
        assert_eq!(out.instance, "const inner = inner__Closure{ .env = .{ .k = k } };\n");
    }

    #[test]
    fn test_nonlocal_write_captures_by_reference() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        scope.declare("count", Binding::local(Type::Int).mutable(true));
        let bump = func(
            "bump",
            &[],
            vec![nonlocal(&["count"]), aug_assign("count", BinOp::Add, int(1))],
        );
        let out = synthesize_closure(&bump, &mut scope, &oracle, &options).unwrap();
        assert!(out.declarations.contains("count: *i64,"));
        assert!(out.declarations.contains("env.count.* += 1;"));
        assert!(out.declarations.contains("fn bump__impl(env: *const bump__Env) void {"));
        assert_eq!(out.instance, "const bump = bump__Closure{ .env = .{ .count = &count } };\n");
    }

    #[test]
    fn test_unknown_param_gets_a_hint() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        let inner = func("inner", &["v"], vec![expr(call("print", vec![name("v")]))]);
        let out = synthesize_closure(&inner, &mut scope, &oracle, &options).unwrap();
        assert_eq!(
            out.diagnostics
                .with_code(DiagnosticCode::UnresolvedParamType)
                .count(),
            1
        );
        assert!(out.declarations.contains("fn inner__impl(v: runtime.Value) "));
    }

    #[test]
    fn test_reassigned_formal_is_copied() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        let inner = typed_func(
            "inner",
            vec![typed_param("x", Type::Int)],
            Type::Int,
            vec![aug_assign("x", BinOp::Add, int(1)), ret(name("x"))],
        );
        let out = synthesize_closure(&inner, &mut scope, &oracle, &options).unwrap();
        assert!(out
            .declarations
            .contains("fn inner__impl(x__arg: i64) i64 {\n        var x = x__arg;\n        x += 1;\n"));
        assert!(out.declarations.contains("return inner__impl(x);"));
    }

    #[test]
    fn test_failed_synthesis_restores_scope() {
        let oracle = InferenceTable::new();
        let options = ConvertOptions::default();
        let mut scope = outer_scope();
        let bad = func(
            "bad",
            &[],
            vec![expr(Expr::Starred(Box::new(name("k"))))],
        );
        assert!(synthesize_closure(&bad, &mut scope, &oracle, &options).is_err());
        assert_eq!(scope.current_function(), Some("outer"));
        assert!(scope.lookup("bad").is_none());
        assert!(scope.is_declared("k"));
    }
}
