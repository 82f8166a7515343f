//! End-to-end closure conversion over small modules.

use ferrule_diagnostics::DiagnosticCode;
use ferrule_hir::build::*;
use ferrule_hir::{BinOp, CmpOp, Function, Module, Stmt};
use ferrule_transform::{
    convert_closures, resolve_shadow_or_reuse, synthesize_closure, ClosureShape, ConversionOutput,
    ConvertOptions, InferenceTable, Scope, UnknownReturnPolicy,
};
use ferrule_transform::scope::{Binding, BindingKind};
use ferrule_transform::shadow::Resolution;
use ferrule_types::Type;

fn convert(functions: Vec<Function>, oracle: &InferenceTable) -> ConversionOutput {
    let module = Module {
        name: "scenarios".to_string(),
        globals: Vec::new(),
        functions,
    };
    convert_closures(&module, oracle, &ConvertOptions::default())
}

fn code_of(out: &ConversionOutput, name: &str) -> String {
    let f = out
        .function(name)
        .unwrap_or_else(|| panic!("`{}` did not convert: {:?}", name, out.diagnostics));
    format!("{}{}", f.declarations, f.code)
}

#[test]
fn test_enclosing_parameter_is_captured() {
    // def outer(outer: int): def inner(): return outer + 1
    let oracle = InferenceTable::new();
    let out = convert(
        vec![typed_func(
            "make",
            vec![typed_param("outer", Type::Int)],
            Type::Int,
            vec![
                def(typed_func("inner", vec![], Type::Int, vec![ret(add(name("outer"), int(1)))])),
                ret(call("inner", vec![])),
            ],
        )],
        &oracle,
    );
    let closures: Vec<_> = out.closures().collect();
    assert_eq!(closures.len(), 1);
    assert_eq!(closures[0].shape, ClosureShape::StructCapture);
    assert_eq!(closures[0].captures, vec!["outer".to_string()]);

    let code = code_of(&out, "make");
    assert!(code.contains("const inner__Env = struct {\n    outer: i64,\n};"));
    assert!(code.contains("return env.outer + 1;"));
    assert!(code.contains("const inner = inner__Closure{ .env = .{ .outer = outer } };"));
    assert!(code.contains("return inner.call();"));
}

#[test]
fn test_own_parameter_is_not_captured() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                def(typed_func(
                    "square",
                    vec![typed_param("x", Type::Int)],
                    Type::Int,
                    vec![ret(mul(name("x"), name("x")))],
                )),
                ret(call("square", vec![int(3)])),
            ],
        )],
        &oracle,
    );
    let closures: Vec<_> = out.closures().collect();
    assert_eq!(closures[0].shape, ClosureShape::ZeroCapture);
    assert!(closures[0].captures.is_empty());
    let code = code_of(&out, "outer");
    assert!(code.contains("fn square__impl(x: i64) i64 {"));
    assert!(code.contains("const square = square__Closure{};"));
    assert!(code.contains("square.call(3)"));
}

#[test]
fn test_recursive_closure_calls_itself_through_self() {
    // return 1 if n <= 1 else n * fact(n - 1)
    let oracle = InferenceTable::new();
    let body = vec![ret(if_exp(
        compare(name("n"), CmpOp::LtE, int(1)),
        int(1),
        mul(name("n"), call("fact", vec![sub(name("n"), int(1))])),
    ))];
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                def(typed_func("fact", vec![typed_param("n", Type::Int)], Type::Int, body)),
                ret(call("fact", vec![int(5)])),
            ],
        )],
        &oracle,
    );
    let closures: Vec<_> = out.closures().collect();
    assert_eq!(closures[0].shape, ClosureShape::RecursiveSelfCapture);
    assert!(closures[0].captures.is_empty());

    let code = code_of(&out, "outer");
    assert!(code.contains("pub fn call(self: *const @This(), n: i64) i64 {"));
    assert!(code.contains("self.call(n - 1)"));
    assert!(!code.contains("fact__impl"));
    assert!(code.contains("const fact = fact__Closure{};"));
}

#[test]
fn test_recursive_closure_reads_captures_from_self() {
    let oracle = InferenceTable::new();
    let body = vec![
        if_(
            compare(name("i"), CmpOp::Eq, int(0)),
            vec![ret(name("k"))],
            vec![],
        ),
        ret(call("walk", vec![sub(name("i"), int(1))])),
    ];
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                assign("k", int(7)),
                def(typed_func("walk", vec![typed_param("i", Type::Int)], Type::Int, body)),
                ret(call("walk", vec![int(3)])),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "outer");
    assert!(code.contains("const walk__Closure = struct {\n    k: i64,\n"));
    assert!(code.contains("return self.k;"));
    assert!(code.contains("const walk = walk__Closure{ .k = k };"));
}

#[test]
fn test_incompatible_rebinding_shadows() {
    // total = 0; total = Point(total); return total
    let oracle = InferenceTable::new().with_class("Point");
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                assign("total", int(0)),
                assign("total", call("Point", vec![name("total")])),
                ret(name("total")),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "outer");
    assert!(code.contains("const total: i64 = 0;"));
    assert!(code.contains("const total__1: *Point = try Point.init(allocator, total);"));
    assert!(code.contains("return total__1;"));
}

#[test]
fn test_resolution_follows_binding_types() {
    let mut scope = Scope::new();
    scope.push_function("outer", Vec::new());
    assert_eq!(resolve_shadow_or_reuse("n", &Type::Int, &scope), Resolution::Fresh);
    scope.declare("n", Binding::new(BindingKind::Local, Type::Int));
    assert_eq!(resolve_shadow_or_reuse("n", &Type::Int, &scope), Resolution::Reuse);
    assert!(matches!(
        resolve_shadow_or_reuse("n", &Type::dict(Type::Str, Type::Int), &scope),
        Resolution::ShadowRename(_)
    ));
}

#[test]
fn test_nonlocal_counter_is_shared() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![typed_func(
            "counter",
            vec![],
            Type::Int,
            vec![
                assign("count", int(0)),
                def(func(
                    "bump",
                    &[],
                    vec![nonlocal(&["count"]), aug_assign("count", BinOp::Add, int(1))],
                )),
                expr(call("bump", vec![])),
                expr(call("bump", vec![])),
                ret(name("count")),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "counter");
    assert!(code.contains("count: *i64,"));
    assert!(code.contains("env.count.* += 1;"));
    assert!(code.contains("var count"));
    assert!(code.contains(".count = &count"));
    assert!(code.contains("bump.call();"));
}

#[test]
fn test_wrapper_name_avoids_existing_local() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                assign("inner", int(1)),
                expr(call("print", vec![name("inner")])),
                def(typed_func("inner", vec![], Type::Int, vec![ret(int(2))])),
                ret(call("inner", vec![])),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "outer");
    assert!(code.contains("const inner__1 = inner__Closure{};"));
    assert!(code.contains("return inner__1.call();"));
}

#[test]
fn test_unknown_return_follows_policy() {
    let oracle = InferenceTable::new();
    let function = func("outer", &[], vec![ret(call("mystery", vec![]))]);

    let module = Module {
        name: "m".to_string(),
        globals: Vec::new(),
        functions: vec![function.clone()],
    };
    let out = convert_closures(&module, &oracle, &ConvertOptions::default());
    assert_eq!(
        out.diagnostics.with_code(DiagnosticCode::UnresolvedReturnType).count(),
        1
    );
    assert!(code_of(&out, "outer").contains("runtime.Unknown {"));

    let options = ConvertOptions {
        unknown_return: UnknownReturnPolicy::Placeholder,
        placeholder_type: "f64".to_string(),
        ..ConvertOptions::default()
    };
    let out = convert_closures(&module, &oracle, &options);
    assert!(!out.diagnostics.has_errors());
    assert!(code_of(&out, "outer").starts_with("pub fn outer() f64 {")
        || code_of(&out, "outer").starts_with("pub fn outer() anyerror!f64 {"));
}

#[test]
fn test_except_handler_catches_in_place() {
    let oracle = InferenceTable::new();
    let body = vec![
        Stmt::Try {
            body: vec![assign("v", call("int", vec![name("s")]))],
            handlers: vec![ferrule_hir::ExceptHandler {
                kind: Some(name("ValueError")),
                name: None,
                body: vec![assign("v", int(0))],
            }],
            orelse: vec![],
            finalbody: vec![],
        },
        ret(name("v")),
    ];
    let out = convert(
        vec![typed_func(
            "parse",
            vec![typed_param("s", Type::Str)],
            Type::Int,
            body,
        )],
        &oracle,
    );
    let code = code_of(&out, "parse");
    assert!(code.contains("catch |__e|"));
    assert!(code.contains("error.ValueError"));
    assert!(code.contains("var v: i64 = undefined;"));
}

#[test]
fn test_lambda_becomes_closure() {
    let oracle = InferenceTable::new().with_param("outer.lambda", "v", Type::Int);
    let out = convert(
        vec![typed_func(
            "outer",
            vec![typed_param("k", Type::Int)],
            Type::Int,
            vec![
                assign("shift", lambda(&["v"], add(name("v"), name("k")))),
                ret(call("shift", vec![int(2)])),
            ],
        )],
        &oracle,
    );
    let closures: Vec<_> = out.closures().collect();
    assert_eq!(closures.len(), 1);
    assert_eq!(closures[0].qualname, "outer.lambda");
    let code = code_of(&out, "outer");
    assert!(code.contains("lambda__Closure{ .env = .{ .k = k } }"));
    assert!(code.contains("shift.call(2)"));
}

#[test]
fn test_comprehension_reads_capture() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![typed_func(
            "scale",
            vec![
                typed_param("xs", Type::list(Type::Int)),
                typed_param("k", Type::Int),
            ],
            Type::list(Type::Int),
            vec![ret(list_comp(mul(name("x"), name("k")), "x", name("xs"), vec![]))],
        )],
        &oracle,
    );
    let code = code_of(&out, "scale");
    assert!(code.contains("for (xs.items) |x| {"));
    assert!(code.contains("try __comp1.append(x * k);"));
    assert!(code.contains("return __comp1;"));
    assert!(out.function("scale").unwrap().fallible);
}

#[test]
fn test_synthesize_closure_reports_renames() {
    let oracle = InferenceTable::new();
    let mut scope = Scope::new();
    scope.push_function("outer", Vec::new());
    scope.declare("helper", Binding::local(Type::Str));
    let helper = typed_func("helper", vec![], Type::Int, vec![ret(int(1))]);
    let out = synthesize_closure(&helper, &mut scope, &oracle, &ConvertOptions::default()).unwrap();
    assert_eq!(out.wrapper_ident, "helper__1");
    assert_eq!(out.delta.get("helper"), Some("helper__1"));
    assert_eq!(scope.ident("helper"), "helper__1");
    assert!(out.code().ends_with("const helper__1 = helper__Closure{};\n"));
}

/// Function with annotated parameters whose return type is left to inference.
fn inferred_func(n: &str, params: Vec<ferrule_hir::Param>, body: Vec<Stmt>) -> Function {
    Function {
        params,
        ..func(n, &[], body)
    }
}

#[test]
fn test_returned_closure_types_maker_and_callers() {
    // def make_adder(x: int): def adder(y: int) -> int: return x + y; return adder
    let oracle = InferenceTable::new();
    let out = convert(
        vec![
            inferred_func(
                "make_adder",
                vec![typed_param("x", Type::Int)],
                vec![
                    def(typed_func(
                        "adder",
                        vec![typed_param("y", Type::Int)],
                        Type::Int,
                        vec![ret(add(name("x"), name("y")))],
                    )),
                    ret(name("adder")),
                ],
            ),
            func(
                "use_adder",
                &[],
                vec![
                    assign("add5", call("make_adder", vec![int(5)])),
                    assign("result", call("add5", vec![int(10)])),
                    ret(name("result")),
                ],
            ),
        ],
        &oracle,
    );
    assert_eq!(
        out.diagnostics.with_code(DiagnosticCode::UnresolvedReturnType).count(),
        0,
        "{:?}",
        out.diagnostics
    );
    let maker = code_of(&out, "make_adder");
    assert!(maker.contains("pub fn make_adder(x: i64) adder__Closure {"), "{}", maker);
    assert!(maker.contains("return adder;"));

    let caller = code_of(&out, "use_adder");
    assert!(caller.contains("pub fn use_adder() i64 {"), "{}", caller);
    assert!(caller.contains("const add5 = make_adder(5);"));
    assert!(caller.contains("const result: i64 = add5.call(10);"));
    assert!(!caller.contains("runtime.call"));
}

#[test]
fn test_result_of_local_closure_call_is_typed() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![func(
            "outer",
            &[],
            vec![
                def(typed_func(
                    "double",
                    vec![typed_param("v", Type::Int)],
                    Type::Int,
                    vec![ret(mul(name("v"), int(2)))],
                )),
                ret(call("double", vec![int(5)])),
            ],
        )],
        &oracle,
    );
    assert!(out.diagnostics.is_empty(), "{:?}", out.diagnostics);
    assert!(code_of(&out, "outer").contains("pub fn outer() i64 {"));
}

#[test]
fn test_alias_shares_container_with_closure() {
    // a = [1, 2]; b = a; b.append(3); def show(): return len(b)
    let oracle = InferenceTable::new();
    let out = convert(
        vec![func(
            "share",
            &[],
            vec![
                assign("a", list(vec![int(1), int(2)])),
                assign("b", name("a")),
                expr(method_call(name("b"), "append", vec![int(3)])),
                def(typed_func("show", vec![], Type::Int, vec![ret(call("len", vec![name("b")]))])),
                ret(add(call("show", vec![]), call("len", vec![name("a")]))),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "share");
    // Both names hold the same list pointer
    assert!(code.contains("const b: *runtime.List(i64) = a;"), "{}", code);
    assert!(code.contains("b.append(3);"));
    assert!(code.contains("    b: *runtime.List(i64),\n"));
    assert!(code.contains("return runtime.len(env.b);"));
    assert!(code.contains("show__Closure{ .env = .{ .b = b } }"));
}

#[test]
fn test_alias_rebinding_repoints_same_binding() {
    let oracle = InferenceTable::new();
    let out = convert(
        vec![func(
            "repoint",
            &[],
            vec![
                assign("a", list(vec![int(1)])),
                assign("c", list(vec![int(2)])),
                assign("b", name("a")),
                assign("b", name("c")),
                expr(method_call(name("b"), "append", vec![int(4)])),
                ret(call("len", vec![name("a")])),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "repoint");
    assert!(code.contains("var b: *runtime.List(i64) = a;"), "{}", code);
    assert!(code.contains("b = c;"));
    assert!(!code.contains("b__1"));
}

#[test]
fn test_three_level_nesting_threads_capture() {
    // def level1(a): def level2(): def level3(): return a
    let oracle = InferenceTable::new();
    let level3 = typed_func("level3", vec![], Type::Int, vec![ret(name("a"))]);
    let level2 = typed_func(
        "level2",
        vec![],
        Type::Int,
        vec![def(level3), ret(call("level3", vec![]))],
    );
    let out = convert(
        vec![typed_func(
            "level1",
            vec![typed_param("a", Type::Int)],
            Type::Int,
            vec![def(level2), ret(call("level2", vec![]))],
        )],
        &oracle,
    );
    let closures: Vec<_> = out.closures().collect();
    assert_eq!(closures.len(), 2);
    for qualname in ["level1.level2", "level1.level2.level3"] {
        let c = closures
            .iter()
            .find(|c| c.qualname == qualname)
            .unwrap_or_else(|| panic!("no closure {}", qualname));
        assert_eq!(c.captures, vec!["a".to_string()]);
        assert_eq!(c.shape, ClosureShape::StructCapture);
    }
    let code = code_of(&out, "level1");
    assert!(code.contains("level2__Closure{ .env = .{ .a = a } }"));
    assert!(code.contains(".a = env.a"));
    assert!(code.contains("return env.a;"));
}

#[test]
fn test_aug_assign_changing_type_shadows() {
    // avg = n; avg /= 2; return avg
    let oracle = InferenceTable::new();
    let out = convert(
        vec![inferred_func(
            "mean",
            vec![typed_param("n", Type::Int)],
            vec![
                assign("avg", name("n")),
                aug_assign("avg", BinOp::Div, int(2)),
                ret(name("avg")),
            ],
        )],
        &oracle,
    );
    let code = code_of(&out, "mean");
    assert!(code.contains("pub fn mean(n: i64) f64 {"), "{}", code);
    assert!(code.contains("const avg: i64 = n;"));
    assert!(code.contains("const avg__1: f64 = runtime.trueDiv(avg, 2);"));
    assert!(code.contains("return avg__1;"));
}
