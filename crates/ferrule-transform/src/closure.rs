//! Module-level closure conversion.
//!
//! Every top-level function is converted on its own scope, with the other
//! functions visible as globals. Fallibility and return types flow between
//! functions, so conversion repeats until the signatures stop changing.

use crate::context::{ClosureSummary, ConversionContext};
use crate::effects::may_fail;
use crate::emit::{CodeBuffer, Emitter};
use crate::error::Result;
use crate::options::ConvertOptions;
use crate::oracle::TypeOracle;
use crate::scope::Scope;
use crate::synth::Formal;
use crate::usage::analyze_function;
use ferrule_diagnostics::Diagnostics;
use ferrule_hir::{Function, Module};
use ferrule_types::{FunctionType, Type};
use serde::Serialize;
use std::collections::HashMap;

/// Imports every converted module starts with.
const HEADER: &str = "const std = @import(\"std\");\nconst runtime = @import(\"runtime\");\n";

/// One converted top-level function.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedFunction {
    pub name: String,
    /// Closure wrapper types hoisted out of the function
    pub declarations: String,
    /// The function itself
    pub code: String,
    pub return_type: Type,
    pub fallible: bool,
    pub closures: Vec<ClosureSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversionOutput {
    pub module: String,
    /// Functions that converted, in source order
    pub functions: Vec<ConvertedFunction>,
    pub diagnostics: Diagnostics,
}

impl ConversionOutput {
    pub fn function(&self, name: &str) -> Option<&ConvertedFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn closures(&self) -> impl Iterator<Item = &ClosureSummary> {
        self.functions.iter().flat_map(|f| f.closures.iter())
    }

    /// The whole module as target source.
    pub fn render(&self) -> String {
        let mut out = CodeBuffer::new();
        out.emit_raw(HEADER);
        for f in &self.functions {
            out.emit_raw("\n");
            if !f.declarations.is_empty() {
                out.emit_raw(&f.declarations);
            }
            out.emit_raw(&f.code);
        }
        out.finish()
    }
}

/// Convert every function of `module`.
///
/// A function that cannot be converted is reported as an error diagnostic
/// and left out of the output; the others still convert.
pub fn convert_closures(
    module: &Module,
    oracle: &dyn TypeOracle,
    options: &ConvertOptions,
) -> ConversionOutput {
    let mut signatures = initial_signatures(module, oracle, options);
    let rounds = module.functions.len() + 2;
    let mut round = 0;
    loop {
        round += 1;
        let (functions, diagnostics) = convert_pass(module, &signatures, oracle, options);
        let changed = refine_signatures(&mut signatures, &functions);
        if !changed || round >= rounds {
            if changed {
                log::warn!(
                    "signatures of `{}` still changing after {} rounds",
                    module.name,
                    round
                );
            }
            log::info!(
                "converted {} of {} functions in `{}` ({} rounds)",
                functions.len(),
                module.functions.len(),
                module.name,
                round
            );
            return ConversionOutput {
                module: module.name.clone(),
                functions,
                diagnostics,
            };
        }
        log::debug!("signatures changed in round {}; converting again", round);
    }
}

fn initial_signatures(
    module: &Module,
    oracle: &dyn TypeOracle,
    options: &ConvertOptions,
) -> HashMap<String, FunctionType> {
    // Parameter hints are reported when the function itself converts
    let mut cx = ConversionContext::new(Scope::new(), oracle, options);
    module
        .functions
        .iter()
        .map(|f| {
            let params = cx.formal_types(f, &f.name);
            let return_type = f
                .return_annotation
                .clone()
                .or_else(|| oracle.inferred_return_type(&f.name))
                .unwrap_or(Type::Unknown);
            let signature = FunctionType {
                params,
                return_type: Box::new(return_type),
                fallible: oracle.is_fallible(&f.name),
            };
            (f.name.clone(), signature)
        })
        .collect()
}

/// Adopt what a pass learned. Signatures only ever become fallible, and an
/// unknown return type only ever becomes known, so this terminates.
fn refine_signatures(
    signatures: &mut HashMap<String, FunctionType>,
    functions: &[ConvertedFunction],
) -> bool {
    let mut changed = false;
    for f in functions {
        if let Some(sig) = signatures.get_mut(&f.name) {
            if f.fallible && !sig.fallible {
                sig.fallible = true;
                changed = true;
            }
            if sig.return_type.is_unknown() && !f.return_type.is_unknown() {
                sig.return_type = Box::new(f.return_type.clone());
                changed = true;
            }
        }
    }
    changed
}

fn convert_pass(
    module: &Module,
    signatures: &HashMap<String, FunctionType>,
    oracle: &dyn TypeOracle,
    options: &ConvertOptions,
) -> (Vec<ConvertedFunction>, Diagnostics) {
    let mut functions = Vec::new();
    let mut diagnostics = Diagnostics::new();
    let mut claimed: Vec<String> = Vec::new();

    for f in &module.functions {
        let mut scope = Scope::new();
        for g in &module.globals {
            scope.declare_global(&g.name, g.ty.clone());
        }
        for (name, sig) in signatures {
            scope.declare_global(name, Type::Function(sig.clone()));
        }
        for ident in &claimed {
            scope.reserve_module_ident(ident);
        }

        let mut cx = ConversionContext::new(scope, oracle, options);
        match cx.convert_function(f, signatures.get(&f.name)) {
            Ok(mut converted) => {
                converted.closures = cx.closures().to_vec();
                let (scope, found, decls) = cx.into_parts();
                claimed = scope.module_idents().map(str::to_string).collect();
                converted.declarations = decls;
                diagnostics.extend(found);
                functions.push(converted);
            }
            Err(e) => {
                log::warn!("skipping `{}`: {}", f.name, e);
                let (_, found, _) = cx.into_parts();
                diagnostics.extend(found);
                diagnostics.push(e.to_diagnostic());
            }
        }
    }
    (functions, diagnostics)
}

impl<'a> ConversionContext<'a> {
    /// Convert one top-level function; declarations of its closures are left
    /// in the context.
    pub(crate) fn convert_function(
        &mut self,
        f: &Function,
        signature: Option<&FunctionType>,
    ) -> Result<ConvertedFunction> {
        let param_types = self.formal_types(f, &f.name);
        let formal_names = f.formal_names().into_iter().map(str::to_string).collect();
        self.scope.push_function(&f.name, formal_names);
        let result = self.convert_function_frame(f, signature, &param_types);
        let popped = self.scope.pop();
        let converted = result?;
        popped?;
        Ok(converted)
    }

    fn convert_function_frame(
        &mut self,
        f: &Function,
        signature: Option<&FunctionType>,
        param_types: &[Type],
    ) -> Result<ConvertedFunction> {
        let usage = analyze_function(f);
        let mut formals: Vec<Formal> = self.declare_formals(f, param_types, &usage);
        let effects_fail = may_fail(&f.body, &self.scope, self.oracle, self.options);
        let rendered = self.render_function_body(f, &f.name, &mut formals, usage)?;
        let fallible = rendered.failed || effects_fail;

        let return_type = f
            .return_annotation
            .clone()
            .or_else(|| signature.map(|s| (*s.return_type).clone()))
            .filter(|t| !t.is_unknown())
            .or(rendered.return_type);
        let ret = self.return_text(return_type.as_ref(), fallible, &f.name, f);
        let params: Vec<String> = formals
            .iter()
            .map(|p| {
                let ty = p.ty.target_name();
                match (p.used, p.reassigned) {
                    (false, _) => format!("_: {}", ty),
                    (true, true) => format!("{}__arg: {}", p.ident, ty),
                    (true, false) => format!("{}: {}", p.ident, ty),
                }
            })
            .collect();

        let mut code = CodeBuffer::new();
        code.emit_line(&format!("pub fn {}({}) {} {{", f.name, params.join(", "), ret));
        code.indent();
        code.emit_block(&rendered.text);
        code.dedent();
        code.emit_line("}");

        Ok(ConvertedFunction {
            name: f.name.clone(),
            declarations: String::new(),
            code: code.finish(),
            return_type: return_type.unwrap_or(Type::None),
            fallible,
            closures: Vec::new(),
        })
    }
}
