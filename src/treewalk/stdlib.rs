use std::time::Instant;

use once_cell::sync::Lazy;

use super::value::{NativeFunction, NativeResult, Value};

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

pub fn standard_library() -> Vec<NativeFunction> {
    // start the clock when the first interpreter is set up rather than on the first call
    Lazy::force(&EPOCH);

    vec![
        NativeFunction {
            arity: 0,
            func: native_clock,
            name: "clock".to_string(),
        },
        NativeFunction {
            arity: 1,
            func: native_sqrt,
            name: "sqrt".to_string(),
        },
    ]
}

fn native_clock(_args: &[Value]) -> NativeResult {
    Ok(Value::from(EPOCH.elapsed().as_secs_f64()))
}

fn native_sqrt(args: &[Value]) -> NativeResult {
    match args.first() {
        Some(Value::Number(value)) => Ok(Value::from(value.sqrt())),
        _ => Err("Expected number argument for sqrt function.".to_string()),
    }
}
