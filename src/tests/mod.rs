//! Whole programs run through the library with output captured.

use crate::{
    config::Config,
    driver::{self, ShapeError},
    runtime::Output,
};
use pretty_assertions::assert_eq;
use std::fs;

fn run_with(source: &str, config: Config) -> (Result<i32, ShapeError>, String) {
    let (output, buffer) = Output::buffer();
    let result = driver::run_source(source, config, output);
    let text = buffer.borrow().clone();
    (result, text)
}

fn run(source: &str) -> (Result<i32, ShapeError>, String) {
    run_with(source, Config::default())
}

fn output_of(source: &str) -> String {
    match run(source) {
        (Ok(0), text) => text,
        (Ok(code), text) => panic!("exited with {code}; output:\n{text}"),
        (Err(err), text) => panic!("{err:?}\noutput:\n{text}"),
    }
}

fn runtime_error(source: &str, config: Config) -> String {
    match run_with(source, config) {
        (Err(ShapeError::Runtime(failure)), _) => failure.to_string(),
        (other, text) => panic!("expected a runtime error, got {other:?}; output:\n{text}"),
    }
}

#[test]
fn adds_numbers() {
    let source = "fn add(a: Number, b: Number) => a + b\nprintln(add(2, 3))";
    assert_eq!(output_of(source), "5\n");
}

#[test]
fn dispatch_takes_the_first_matching_candidate() {
    let source = r#"
fn pick(x: Number) => "first"
fn pick(x: Number) => "second"
fn pick(x) => "fallback"
println(pick(1), pick("a"))
"#;
    assert_eq!(output_of(source), "first fallback\n");
}

#[test]
fn declared_type_mismatch_leaves_the_variable_unchanged() {
    let source = r#"
var s: String = "a"
try { s = 5 } catch (e) { println(e) }
println(s)
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("cannot assign"), "{output}");
    assert_eq!(lines[1], "a");
}

#[test]
fn constants_reject_assignment() {
    let source = r#"
const c = 1
try { c = 2 } catch (e) { println(e) }
println(c)
"#;
    let output = output_of(source);
    assert!(output.starts_with("cannot modify constant 'c'"), "{output}");
    assert!(output.ends_with("1\n"));
}

#[test]
fn refinement_types_run_their_predicate_only_when_the_base_type_matches() {
    let source = r#"
var calls = 0
type Positive(n: Number) => {
    calls = calls + 1
    n > 0
}
fn check(p: Positive) => p
println(check(5))
try { check(-5) } catch (e) { println(e) }
calls = 0
try { check("a") } catch (e) { println(e) }
println(calls)
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "5");
    assert!(
        lines[1].contains("refinement type 'Positive' rejected -5"),
        "{output}"
    );
    assert!(lines[2].contains("argument 'p' of 'check'"), "{output}");
    assert_eq!(lines[3], "0");
}

#[test]
fn on_change_fires_once_per_assignment_until_cleared() {
    let source = r#"
var x = 1
x::onChange((e) => println(e.name, e.old, e.new))
x = 2
x::onChange()
x = 3
println(x)
"#;
    assert_eq!(output_of(source), "x 1 2\n3\n");
}

#[test]
fn on_call_sees_arguments_and_result() {
    let source = r#"
fn square(n: Number) => n * n
square::onCall((info) => println(info.name, info.return))
square(3)
"#;
    assert_eq!(output_of(source), "square 9\n");
}

#[test]
fn objects_compare_by_value() {
    let source = r#"
println({ a: 1, b: [1, 2] } == { a: 1, b: [1, 2] })
println({ a: 1 } == { a: 2 })
"#;
    assert_eq!(output_of(source), "true\nfalse\n");
}

#[test]
fn recursive_types_can_be_instantiated() {
    let source = r#"
type Node { value: Number, next: Node | None }
var list = Node { value: 1, next: Node { value: 2, next: None } }
println(list.next.value)
"#;
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn instances_fill_defaults_and_check_fields() {
    let source = r#"
type Point { x: Number, y: Number = 10 }
var p = Point { x: 3 }
println(p.x + p.y, type(p))
try { Point { x: "a" } } catch (e) { println("rejected") }
"#;
    assert_eq!(output_of(source), "13 Point\nrejected\n");
}

#[test]
fn enum_types_accept_only_their_variants() {
    let source = r#"
enum Color { Red, Green }
var c: Color = "Red"
try { c = "Blue" } catch (e) { println("rejected") }
println(c)
"#;
    assert_eq!(output_of(source), "rejected\nRed\n");
}

#[test]
fn for_loops_bind_item_and_index() {
    let source = r#"
var total = 0
for x, i in [10, 20] { total = total + x + i }
for i in 0..3 { total = total + i }
println(total)
"#;
    assert_eq!(output_of(source), "34\n");
}

#[test]
fn tags_propagate_to_children() {
    let source = r#"
var v = [1, 2]
v::tag("a", "b")
println(tags(v)[1], tags(v[0])[0])
"#;
    assert_eq!(output_of(source), "b a\n");
}

#[test]
fn eval_runs_in_the_callers_scope() {
    let source = r#"
var a = 2
println(eval("a * 21"))
println(evals("1 + 1") + "!")
"#;
    assert_eq!(output_of(source), "42\n2!\n");
}

#[test]
fn exit_stops_with_the_given_code() {
    let (result, output) = run("println(\"a\")\nexit(3)\nprintln(\"b\")");
    assert_eq!(result.expect("exit code"), 3);
    assert_eq!(output, "a\n");
}

#[test]
fn native_modules_are_loaded_by_name() {
    let source = r#"
const math = load_lib("math")
println(math.sqrt(16), math.max(1, 7, 3))
try { math.sqrt(-1) } catch (e) { println(e) }
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "4 7");
    assert!(lines[1].contains("module 'math' failed"), "{output}");
}

#[test]
fn threading_runs_tasks_on_workers() {
    let source = r#"
const threading = load_lib("threading")
fn work(n: Number) => n * 2
var task = threading.async(work, [21])
println(threading.await(task))
"#;
    assert_eq!(output_of(source), "42\n");
}

#[test]
fn imports_bind_the_module_object() {
    let dir = std::env::temp_dir().join(format!("shape-import-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("temp dir");
    fs::write(
        dir.join("helpers.shape"),
        "fn double(n: Number) => n * 2\nvar version = 3\n",
    )
    .expect("write module");

    let source = "import \"helpers\" as lib\nprintln(lib.double(4), lib.version)";
    let (result, output) = run_with(source, Config::new(dir.join("main.shape")));
    let _ = fs::remove_dir_all(&dir);
    assert_eq!(result.expect("runs"), 0);
    assert_eq!(output, "8 3\n");
}

#[test]
fn undefined_functions_report_their_location() {
    let message = runtime_error("var a = 1\nfoo()", Config::default());
    assert_eq!(
        message,
        "Error in '<main>' @ (2, 1): undefined function 'foo'"
    );
}

#[test]
fn typecheck_rejects_certain_mismatches_before_running() {
    let (result, output) = run("println(\"never\")\nvar s: String = 5");
    assert!(matches!(result, Err(ShapeError::Type { .. })), "{result:?}");
    assert_eq!(output, "");
}

#[test]
fn runtime_catches_mismatches_when_typecheck_is_off() {
    let message = runtime_error(
        "var s: String = 5",
        Config::default().with_typecheck(false),
    );
    assert!(
        message.contains("'s' is declared as String but was given Number"),
        "{message}"
    );
}

#[test]
fn while_loops_test_truthiness_of_any_value() {
    let source = r#"
var s = "go"
var count = 0
while s {
    count = count + 1
    if count == 2 { s = None }
}
var zero_runs = 0
while 0 {
    zero_runs = zero_runs + 1
    break
}
println(count, zero_runs)
"#;
    assert_eq!(output_of(source), "2 1\n");
}

#[test]
fn break_and_continue_steer_the_innermost_loop() {
    let source = r#"
var total = 0
for i in 0..10 {
    if i % 2 == 0 { continue }
    if i > 6 { break }
    total = total + i
}
var n = 0
while true {
    n = n + 1
    if n == 4 { break }
}
println(total, n)
"#;
    assert_eq!(output_of(source), "9 4\n");
}

#[test]
fn ranges_truncate_fractional_bounds() {
    let source = r#"
for i in 2.7..5.9 { println(i) }
"#;
    assert_eq!(output_of(source), "2\n3\n4\n");
}

#[test]
fn init_runs_with_this_bound_to_the_new_instance() {
    let source = r#"
type Counter {
    n: Number = 1,
    _init: () => { this.n = this.n + 1 }
}
var c = Counter {}
println(c.n)
"#;
    assert_eq!(output_of(source), "2\n");
}

#[test]
fn on_init_hooks_run_after_construction() {
    let source = r#"
type Point { x: Number }
Point::onInit((p) => println("made", p.x))
var a = Point { x: 4 }
var b = Point { x: 5 }
"#;
    assert_eq!(output_of(source), "made 4\nmade 5\n");
}

#[test]
fn untyped_hook_parameters_take_the_payload_type() {
    let source = r#"
type Point { x: Number }
Point::onInit((p) => {
    try { p = 5 } catch (e) { println(e) }
})
var a = Point { x: 1 }
var b = Point { x: 2 }
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2, "{output}");
    assert!(lines.iter().all(|line| line.contains("cannot assign")), "{output}");
}

#[test]
fn type_functions_check_arity_and_argument_types() {
    let source = r#"
type Maybe(T) = T | None
type Sized(n: Number) = n
var m: Maybe(Number) = None
println(m)
try { Maybe(Number, String) } catch (e) { println(e) }
try { Sized("big") } catch (e) { println(e) }
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "None");
    assert!(
        lines[1].contains("type function 'Maybe' expects 1 arguments, got 2"),
        "{output}"
    );
    assert!(
        lines[2].contains("argument 'n' of type function 'Sized' expects Number"),
        "{output}"
    );
}

#[test]
fn list_indices_must_be_whole_numbers() {
    let source = r#"
var l = [1, 2, 3]
println(l[-1])
try { l[1.5] } catch (e) { println(e) }
"#;
    let output = output_of(source);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines[0], "3");
    assert!(
        lines[1].starts_with("unsupported operation: index 1.5"),
        "{output}"
    );
}
