use mystic::error::GenericResult;
use mystic::treewalk;
use mystic::treewalk::value::{NativeFunction, NativeResult, Value};
use mystic::{Interpreter, Options};

use pretty_assertions::assert_eq;

type TestResult = GenericResult<()>;

// run mystic code using a fresh interpreter and return a string containing the program output
fn run(code: &str) -> GenericResult<String> {
    run_with(code, Options::default())
}

fn run_with(code: &str, options: Options) -> GenericResult<String> {
    let mut buffer = Vec::new();
    {
        let mut interpreter = Interpreter::with_options(&mut buffer, options);
        treewalk::execute(code, &mut interpreter)?;
    }

    let output = std::str::from_utf8(buffer.as_slice())?;

    Ok(output.to_string())
}

#[test]
fn arithmetic_precedence() -> TestResult {
    let code = "\
        print 1 + 2 * 3;\n\
        print 2 + 3 * 4;\n\
        print (2 + 3) * 4;\n\
        print 10 - 4 - 3;\n\
        print -2 * -3;";

    let output = run(code)?;
    assert_eq!("7\n14\n20\n3\n6\n", output);

    Ok(())
}

#[test]
fn number_formatting() -> TestResult {
    let code = "\
        print 10 / 4;\n\
        print 3.0;\n\
        print 0.5 - 1;\n\
        print 100;";

    let output = run(code)?;
    assert_eq!("2.5\n3\n-0.5\n100\n", output);

    Ok(())
}

#[test]
fn string_concatenation() -> TestResult {
    let code = "\
        print \"a\" + \"b\";\n\
        print \"x\" + 1;\n\
        print 1 + \"x\";\n\
        print \"v\" + 2.5;";

    let output = run(code)?;
    assert_eq!("ab\nx1\n1x\nv2.5\n", output);

    Ok(())
}

#[test]
fn variable_scoping() -> TestResult {
    let code = "\
        store a = \"global a\";\n\
        store b = \"global b\";\n\
        store c = \"global c\";\n\
        {\n\
            store a = \"outer a\";\n\
            store b = \"outer b\";\n\
            {\n\
                store a = \"inner a\";\n\
                print a;\n\
                print b;\n\
                print c;\n\
            }\n\
            print a;\n\
            print b;\n\
            print c;\n\
        }\n\
        print a;\n\
        print b;\n\
        print c;";

    let output = run(code)?;

    let expected = "\
        inner a\n\
        outer b\n\
        global c\n\
        outer a\n\
        outer b\n\
        global c\n\
        global a\n\
        global b\n\
        global c\n";

    assert_eq!(expected, output);

    Ok(())
}

#[test]
fn uninitialized_variable_is_nil() -> TestResult {
    let output = run("store a; print a;")?;
    assert_eq!("nil\n", output);

    Ok(())
}

#[test]
fn reassignment() -> TestResult {
    let code = "\
        store a = \"original\";\n\
        a = \"updated\";\n\
        print a;\n\
        print a = \"again\";";

    let output = run(code)?;
    assert_eq!("updated\nagain\n", output);

    Ok(())
}

#[test]
fn global_redeclaration() -> TestResult {
    let output = run("store a = 1; store a = 2; print a;")?;
    assert_eq!("2\n", output);

    Ok(())
}

#[test]
fn if_statement_true() -> TestResult {
    let code = "\
        store a = \"do it\";\n\
        if (a == \"do it\") {\n\
            print \"condition was true\";\n\
        }";

    let output = run(code)?;
    assert_eq!("condition was true\n", output);

    Ok(())
}

#[test]
fn if_statement_false() -> TestResult {
    let code = "\
        store a = true;\n\
        if (!a) {\n\
            print \"condition was true\";\n\
        }";

    let output = run(code)?;
    assert!(output.is_empty());

    Ok(())
}

#[test]
fn if_else_statement() -> TestResult {
    let code = "\
        store a = \"cond2\";\n\
        if (a == \"cond1\") {\n\
            print \"if condition was true\";\n\
        } else if (a == \"cond2\") {\n\
            print \"else condition was true\";\n\
        }";

    let output = run(code)?;
    assert_eq!("else condition was true\n", output);

    Ok(())
}

#[test]
fn truthiness() -> TestResult {
    let code = "\
        if (0) print \"zero\"; else print \"not zero\";\n\
        if (0.1) print \"fraction\";\n\
        if (\"\") print \"empty\"; else print \"not empty\";\n\
        if (\"x\") print \"string\";\n\
        if (nil) print \"nil\"; else print \"not nil\";\n\
        if (clock) print \"callable\";\n\
        print !0;\n\
        print !\"text\";";

    let output = run(code)?;
    assert_eq!(
        "not zero\nfraction\nnot empty\nstring\nnot nil\ncallable\ntrue\nfalse\n",
        output
    );

    Ok(())
}

#[test]
fn equality() -> TestResult {
    let code = "\
        fun f() {}\n\
        fun g() {}\n\
        print \"a\" == \"a\";\n\
        print nil == nil;\n\
        print nil == false;\n\
        print 1 == \"1\";\n\
        print 2 != 3;\n\
        print f == f;\n\
        print f == g;";

    let output = run(code)?;
    assert_eq!("true\ntrue\nfalse\nfalse\ntrue\ntrue\nfalse\n", output);

    Ok(())
}

#[test]
fn strict_equality_accepts_numbers() -> TestResult {
    let options = Options {
        strict_equality: true,
        ..Options::default()
    };

    let output = run_with("print 1 == 1; print 1 != 1;", options)?;
    assert_eq!("true\nfalse\n", output);

    Ok(())
}

#[test]
fn logical_or() -> TestResult {
    let code = "\
        store a = true;\n\
        store b = false;\n\
        if (a or b) {\n\
            print \"condition was true\";\n\
        }";

    let output = run(code)?;
    assert_eq!("condition was true\n", output);

    Ok(())
}

#[test]
fn logical_and() -> TestResult {
    let code = "\
        store a = true;\n\
        store b = false;\n\
        if (a and b) {\n\
            print \"condition was true\";\n\
        }";

    let output = run(code)?;
    assert!(output.is_empty());

    Ok(())
}

#[test]
fn logical_operators_return_operands() -> TestResult {
    let code = "\
        print nil or \"fallback\";\n\
        print \"first\" or \"second\";\n\
        print 0 and \"unreached\";\n\
        print 1 and \"second\";\n\
        print false or nil or 3;";

    let output = run(code)?;
    assert_eq!("fallback\nfirst\n0\nsecond\n3\n", output);

    Ok(())
}

#[test]
fn logical_short_circuit() -> TestResult {
    let code = "\
        store calls = 0;\n\
        fun touch() { calls = calls + 1; return true; }\n\
        true or touch();\n\
        false and touch();\n\
        false or touch();\n\
        print calls;";

    let output = run(code)?;
    assert_eq!("1\n", output);

    Ok(())
}

#[test]
fn ternary() -> TestResult {
    let code = "\
        print true ? 1 : 2;\n\
        print 0 ? \"yes\" : \"no\";\n\
        print 1 == 1 ? \"eq\" : \"ne\";\n\
        store picked = nil ? \"a\" : \"b\";\n\
        print picked;";

    let output = run(code)?;
    assert_eq!("1\nno\neq\nb\n", output);

    Ok(())
}

#[test]
fn while_loop() -> TestResult {
    let code = "\
        store a = 0;\n\
        while (a < 5) {\n\
            print a;\n\
            a = a + 1;\n\
        }";

    let output = run(code)?;
    assert_eq!("0\n1\n2\n3\n4\n", output);

    Ok(())
}

#[test]
fn for_loop() -> TestResult {
    let code = "\
        for (store a = 0; a < 5; a = a + 1) { print a; }
        for (store a = 14; a >= 10; ) { print a; a = a - 1; }
        store a = 20;
        for (; a < 25;) { print a; a = a + 1; }";

    let output = run(code)?;
    assert_eq!(
        "0\n1\n2\n3\n4\n14\n13\n12\n11\n10\n20\n21\n22\n23\n24\n",
        output
    );

    Ok(())
}

#[test]
fn for_loop_variable_is_scoped_to_loop() -> TestResult {
    let code = "\
        store i = \"outside\";
        for (store i = 0; i < 2; i = i + 1) print i;
        print i;";

    let output = run(code)?;
    assert_eq!("0\n1\noutside\n", output);

    Ok(())
}

#[test]
fn break_exits_innermost_loop_only() -> TestResult {
    let code = "\
        for (store i = 0; i < 3; i = i + 1) {
            for (store j = 0; j < 3; j = j + 1) {
                if (j == 1) break;
                print i * 10 + j;
            }
        }
        print \"done\";";

    let output = run(code)?;
    assert_eq!("0\n10\n20\ndone\n", output);

    Ok(())
}

#[test]
fn break_out_of_infinite_loop() -> TestResult {
    let code = "\
        store n = 0;
        for (;;) {
            n = n + 1;
            if (n > 3) break;
        }
        print n;";

    let output = run(code)?;
    assert_eq!("4\n", output);

    Ok(())
}

#[test]
fn continue_in_while_retests_condition() -> TestResult {
    let code = "\
        store i = 0;
        while (i < 5) {
            i = i + 1;
            if (i == 3) continue;
            print i;
        }";

    let output = run(code)?;
    assert_eq!("1\n2\n4\n5\n", output);

    Ok(())
}

#[test]
fn continue_in_for_runs_increment() -> TestResult {
    let code = "\
        for (store i = 0; i < 5; i = i + 1) {
            if (i == 2) continue;
            print i;
        }
        for (store i = 0; i < 3; i = i + 1) if (i == 1) continue; else print i;";

    let output = run(code)?;
    assert_eq!("0\n1\n3\n4\n0\n2\n", output);

    Ok(())
}

#[test]
fn continue_in_nested_loops() -> TestResult {
    let code = "\
        for (store i = 0; i < 2; i = i + 1) {
            for (store j = 0; j < 3; j = j + 1) {
                if (j == 1) continue;
                print i * 10 + j;
            }
        }";

    let output = run(code)?;
    assert_eq!("0\n2\n10\n12\n", output);

    Ok(())
}

#[test]
fn function_declaration() -> TestResult {
    let code = "\
        fun say(n) {
            if (n > 2) print \"big one\";
            print n;
        }
        say(3);";

    let output = run(code)?;
    assert_eq!("big one\n3\n", output);

    Ok(())
}

#[test]
fn function_return() -> TestResult {
    let code = "\
        fun getNumber() {
            return 82;
            print \"Shouldn't reach this.\";
        }
        store result = getNumber();
        print result;";

    let output = run(code)?;
    assert_eq!("82\n", output);

    Ok(())
}

#[test]
fn function_without_return_value_is_nil() -> TestResult {
    let code = "\
        fun bare() { return; }
        fun empty() {}
        print bare();
        print empty();";

    let output = run(code)?;
    assert_eq!("nil\nnil\n", output);

    Ok(())
}

#[test]
fn return_from_inside_loop() -> TestResult {
    let code = "\
        fun find() {
            store i = 0;
            while (true) {
                for (store j = 0; j < 10; j = j + 1) {
                    if (i * j == 6) return i + j;
                }
                i = i + 1;
            }
        }
        print find();";

    let output = run(code)?;
    assert_eq!("7\n", output);

    Ok(())
}

#[test]
fn recursion() -> TestResult {
    let code = "\
        fun fib(n) {
            if (n <= 1) return n;
            return fib(n - 2) + fib(n - 1);
        }

        for (store i = 0; i < 20; i = i + 1) {
            print fib(i);
        }";

    let output = run(code)?;
    assert_eq!("0\n1\n1\n2\n3\n5\n8\n13\n21\n34\n55\n89\n144\n233\n377\n610\n987\n1597\n2584\n4181\n", output);

    Ok(())
}

#[test]
fn mutual_recursion() -> TestResult {
    let code = "\
        fun isEven(n) { if (n == 0) return true; return isOdd(n - 1); }
        fun isOdd(n) { if (n == 0) return false; return isEven(n - 1); }
        print isEven(10);
        print isOdd(7);";

    let output = run(code)?;
    assert_eq!("true\ntrue\n", output);

    Ok(())
}

#[test]
fn first_class_functions() -> TestResult {
    let code = "\
        fun say(n) {
            print n;
        }
        store sayAlias = say;
        sayAlias(\"test string\");
        print say;
        print clock;";

    let output = run(code)?;
    assert_eq!("test string\n<fn say>\n<native fn>\n", output);

    Ok(())
}

#[test]
fn function_capture() -> TestResult {
    let code = "\
        store funcRef;
        {
            store divisor = 2;
            fun printHalf(n) {
                store result = n / divisor;
                print result;
            }
            funcRef = printHalf;
        }
        store divisor = 300;
        funcRef(8);";

    let output = run(code)?;
    assert_eq!("4\n", output);

    Ok(())
}

#[test]
fn capture_with_reassignment() -> TestResult {
    let code = "\
        store funcRef;
        {
            store divisor = 2;
            fun printDivisionResult(n) {
                store result = n / divisor;
                print result;
            }
            printDivisionResult(32);
            divisor = 8;
            funcRef = printDivisionResult;
            printDivisionResult(32);
        }
        store divisor = 400; // not captured and shouldn't affect the function
        funcRef(32);";

    let output = run(code)?;
    assert_eq!("16\n4\n4\n", output);

    Ok(())
}

#[test]
fn closure_counter_keeps_state() -> TestResult {
    let code = "\
        fun makeCounter() {
            store i = 0;
            fun count() {
                i = i + 1;
                return i;
            }
            return count;
        }
        store counter = makeCounter();
        print counter();
        print counter();
        store other = makeCounter();
        print other();
        print counter();";

    let output = run(code)?;
    assert_eq!("1\n2\n1\n3\n", output);

    Ok(())
}

#[test]
fn closures_share_captured_scope() -> TestResult {
    let code = "\
        store get;
        store set;
        {
            store value = \"initial\";
            fun getter() { return value; }
            fun setter(v) { value = v; }
            get = getter;
            set = setter;
        }
        print get();
        set(\"changed\");
        print get();";

    let output = run(code)?;
    assert_eq!("initial\nchanged\n", output);

    Ok(())
}

#[test]
fn resolution_is_static() -> TestResult {
    let code = "\
        store a = \"global\";
        {
            fun showA() {
                print a;
            }
            showA();
            store a = \"block\";
            showA();
            print a;
        }";

    let output = run(code)?;
    assert_eq!("global\nglobal\nblock\n", output);

    Ok(())
}

#[test]
fn shadowing_keeps_outer_binding() -> TestResult {
    let code = "\
        {
            store a = 1;
            {
                store b = a;
                store a = 2;
                a = a + 10;
                print a;
                print b;
            }
            print a;
        }";

    let output = run(code)?;
    assert_eq!("12\n1\n1\n", output);

    Ok(())
}

#[test]
fn parameters_shadow_enclosing_names() -> TestResult {
    let code = "\
        store x = \"global\";
        fun show(x) { print x; }
        show(\"argument\");
        print x;";

    let output = run(code)?;
    assert_eq!("argument\nglobal\n", output);

    Ok(())
}

#[test]
fn native_functions() -> TestResult {
    let code = "\
        store start = clock();
        print start >= 0;
        print clock() >= start;
        print sqrt(16);
        print sqrt(2.25);";

    let output = run(code)?;
    assert_eq!("true\ntrue\n4\n1.5\n", output);

    Ok(())
}

fn native_shout(args: &[Value]) -> NativeResult {
    match args.first() {
        Some(Value::String(text)) => Ok(Value::from(text.to_uppercase())),
        Some(other) => Ok(Value::from(other.is_truthy())),
        None => Err("shout needs an argument.".to_string()),
    }
}

#[test]
fn host_defined_native() -> TestResult {
    let mut buffer = Vec::new();
    {
        let mut interpreter = Interpreter::new(&mut buffer);
        interpreter.define_native(NativeFunction {
            name: "shout".to_string(),
            arity: 1,
            func: native_shout,
        });
        treewalk::execute("print shout(\"hey\"); print shout(0); print shout;", &mut interpreter)?;
    }

    let output = std::str::from_utf8(buffer.as_slice())?;
    assert_eq!("HEY\nfalse\n<native fn>\n", output);

    Ok(())
}

#[test]
fn comments_are_ignored() -> TestResult {
    let code = "\
        // a line comment\n\
        print 1; /* a block\n\
        comment */ print 2;\n\
        print 3; // trailing";

    let output = run(code)?;
    assert_eq!("1\n2\n3\n", output);

    Ok(())
}

#[test]
fn echo_expressions_in_interactive_mode() -> TestResult {
    let output = run_with("1 + 2; nil; \"text\"; store a = 4; a;", Options::interactive())?;
    assert_eq!("3\ntext\n4\n", output);

    let output = run("1 + 2; \"text\";")?;
    assert!(output.is_empty());

    Ok(())
}

#[test]
fn state_persists_between_run_units() -> TestResult {
    let mut buffer = Vec::new();
    {
        let mut interpreter = Interpreter::new(&mut buffer);
        treewalk::execute("store a = 1;", &mut interpreter)?;
        treewalk::execute("fun get() { return a; }", &mut interpreter)?;
        treewalk::execute("a = a + 1; print get();", &mut interpreter)?;
    }

    let output = std::str::from_utf8(buffer.as_slice())?;
    assert_eq!("2\n", output);

    Ok(())
}

#[test]
fn resolutions_from_earlier_units_stay_valid() -> TestResult {
    let mut buffer = Vec::new();
    {
        let mut interpreter = Interpreter::new(&mut buffer);
        treewalk::execute(
            "store h; { store x = \"inner\"; fun f() { return x; } h = f; }",
            &mut interpreter,
        )?;
        treewalk::execute("store x = \"outer\"; print x; print h();", &mut interpreter)?;
    }

    let output = std::str::from_utf8(buffer.as_slice())?;
    assert_eq!("outer\ninner\n", output);

    Ok(())
}
