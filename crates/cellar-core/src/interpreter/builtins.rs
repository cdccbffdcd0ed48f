//! Built-in functions available in every session.

use super::ExecutionFault;
use super::value::Value;

pub type NativeFn = fn(&[Value]) -> Result<Value, ExecutionFault>;

/// Upper bound on the length of lists built by `range` and repetition.
pub(super) const MAX_SEQUENCE_LEN: usize = 10_000_000;

pub(super) fn lookup(name: &str) -> Option<NativeFn> {
    let f: NativeFn = match name {
        "len" => len,
        "abs" => abs,
        "min" => min,
        "max" => max,
        "sum" => sum,
        "round" => round,
        "str" => stringify,
        "int" => to_int,
        "float" => to_float,
        "bool" => truth,
        "type" => type_of,
        "range" => range,
        "list" => list,
        _ => return None,
    };
    Some(f)
}

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ExecutionFault> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("{min}")
    } else {
        format!("{min} to {max}")
    };
    Err(ExecutionFault::type_error(format!(
        "{name}() takes {expected} argument(s) ({} given)",
        args.len()
    )))
}

fn len(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("len", args, 1, 1)?;
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.len(),
        other => {
            return Err(ExecutionFault::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )));
        }
    };
    Ok(Value::Int(n as i64))
}

fn abs(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("abs", args, 1, 1)?;
    match &args[0] {
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => match other.as_int() {
            Some(i) => i.checked_abs().map(Value::Int).ok_or_else(ExecutionFault::overflow),
            None => Err(ExecutionFault::type_error(format!(
                "bad operand type for abs(): '{}'",
                other.type_name()
            ))),
        },
    }
}

/// Arguments to `min`/`max`: either a single list or several values.
fn candidates<'a>(name: &str, args: &'a [Value]) -> Result<&'a [Value], ExecutionFault> {
    let items = match args {
        [Value::List(items)] => items.as_slice(),
        [_] => {
            return Err(ExecutionFault::type_error(format!(
                "'{}' object is not iterable",
                args[0].type_name()
            )));
        }
        _ => args,
    };
    if items.is_empty() {
        return Err(ExecutionFault::value(format!("{name}() arg is an empty sequence")));
    }
    Ok(items)
}

fn extreme(name: &str, args: &[Value], wanted: std::cmp::Ordering) -> Result<Value, ExecutionFault> {
    let items = candidates(name, args)?;
    let mut best = &items[0];
    for item in &items[1..] {
        if item.compare(best, if name == "min" { "<" } else { ">" })? == wanted {
            best = item;
        }
    }
    Ok(best.clone())
}

fn min(args: &[Value]) -> Result<Value, ExecutionFault> {
    extreme("min", args, std::cmp::Ordering::Less)
}

fn max(args: &[Value]) -> Result<Value, ExecutionFault> {
    extreme("max", args, std::cmp::Ordering::Greater)
}

fn sum(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("sum", args, 1, 1)?;
    let Value::List(items) = &args[0] else {
        return Err(ExecutionFault::type_error(format!(
            "'{}' object is not iterable",
            args[0].type_name()
        )));
    };
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;
    for item in items {
        if let Value::Float(f) = item {
            float_total = Some(float_total.unwrap_or(int_total as f64) + f);
            continue;
        }
        let i = item.as_int().ok_or_else(|| {
            ExecutionFault::type_error(format!(
                "unsupported operand type(s) for +: 'int' and '{}'",
                item.type_name()
            ))
        })?;
        match float_total.as_mut() {
            Some(total) => *total += i as f64,
            None => int_total = int_total.checked_add(i).ok_or_else(ExecutionFault::overflow)?,
        }
    }
    Ok(float_total.map_or(Value::Int(int_total), Value::Float))
}

fn round(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("round", args, 1, 2)?;
    let x = args[0].expect_number("round()")?;
    match args.get(1) {
        None => {
            let rounded = round_half_even(x);
            if !rounded.is_finite() || rounded.abs() >= i64::MAX as f64 {
                return Err(ExecutionFault::overflow());
            }
            Ok(Value::Int(rounded as i64))
        }
        Some(digits) => {
            let digits = digits
                .as_int()
                .ok_or_else(|| ExecutionFault::type_error("round() digits must be an integer"))?;
            let scale = 10f64.powi(digits.clamp(-308, 308) as i32);
            Ok(Value::Float(round_half_even(x * scale) / scale))
        }
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 && rounded % 2.0 != 0.0 {
        rounded - x.signum()
    } else {
        rounded
    }
}

fn stringify(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("str", args, 0, 1)?;
    Ok(Value::Str(args.first().map(ToString::to_string).unwrap_or_default()))
}

fn to_int(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("int", args, 0, 1)?;
    let Some(arg) = args.first() else {
        return Ok(Value::Int(0));
    };
    match arg {
        Value::Float(f) => {
            if !f.is_finite() || f.abs() >= i64::MAX as f64 {
                return Err(ExecutionFault::overflow());
            }
            Ok(Value::Int(f.trunc() as i64))
        }
        Value::Str(s) => s.trim().parse().map(Value::Int).map_err(|_| {
            ExecutionFault::value(format!("invalid literal for int(): {}", arg.repr()))
        }),
        other => other.as_int().map(Value::Int).ok_or_else(|| {
            ExecutionFault::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("float", args, 0, 1)?;
    let Some(arg) = args.first() else {
        return Ok(Value::Float(0.0));
    };
    match arg {
        Value::Str(s) => s.trim().parse().map(Value::Float).map_err(|_| {
            ExecutionFault::value(format!("could not convert string to float: {}", arg.repr()))
        }),
        other => other.expect_number("float()").map(Value::Float),
    }
}

fn truth(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("bool", args, 0, 1)?;
    Ok(Value::Bool(args.first().is_some_and(Value::is_truthy)))
}

fn type_of(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("type", args, 1, 1)?;
    Ok(Value::Str(args[0].type_name().to_string()))
}

fn range(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|arg| {
            arg.as_int().ok_or_else(|| {
                ExecutionFault::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    arg.type_name()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(ExecutionFault::value("range() arg 3 must not be zero"));
    }

    let span = if step > 0 {
        i128::from(stop) - i128::from(start)
    } else {
        i128::from(start) - i128::from(stop)
    };
    let count = if span <= 0 {
        0
    } else {
        (span + i128::from(step.unsigned_abs()) - 1) / i128::from(step.unsigned_abs())
    };
    if count > MAX_SEQUENCE_LEN as i128 {
        return Err(ExecutionFault::value("range() result too large"));
    }

    // Every element lies between start and stop, but `k * step` alone may not.
    let items = (0..count)
        .map(|k| Value::Int((i128::from(start) + k * i128::from(step)) as i64))
        .collect();
    Ok(Value::List(items))
}

fn list(args: &[Value]) -> Result<Value, ExecutionFault> {
    arity("list", args, 0, 1)?;
    match args.first() {
        None => Ok(Value::List(Vec::new())),
        Some(Value::List(items)) => Ok(Value::List(items.clone())),
        Some(Value::Str(s)) => Ok(Value::List(
            s.chars().map(|c| Value::Str(c.to_string())).collect(),
        )),
        Some(other) => Err(ExecutionFault::type_error(format!(
            "'{}' object is not iterable",
            other.type_name()
        ))),
    }
}
