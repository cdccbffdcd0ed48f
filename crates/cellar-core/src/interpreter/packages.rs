//! Extension packages loaded into a session during bootstrap.
//!
//! Members are addressed with dotted names (`math.sqrt(2)`) and only resolve
//! once their package has been loaded.

use super::ExecutionFault;
use super::builtins::NativeFn;
use super::value::Value;

/// A package member.
#[derive(Clone, Copy)]
pub enum Member {
    Constant(f64),
    Function(NativeFn),
}

/// A named collection of members.
pub struct Package {
    pub name: &'static str,
    members: &'static [(&'static str, Member)],
}

impl Package {
    pub(super) fn member(&self, name: &str) -> Option<Member> {
        self.members
            .iter()
            .find(|(member, _)| *member == name)
            .map(|(_, member)| *member)
    }

    /// Names of all members, in declaration order.
    pub fn member_names(&self) -> impl Iterator<Item = &'static str> {
        self.members.iter().map(|(name, _)| *name)
    }
}

static MATH: Package = Package {
    name: "math",
    members: &[
        ("pi", Member::Constant(std::f64::consts::PI)),
        ("e", Member::Constant(std::f64::consts::E)),
        ("sqrt", Member::Function(sqrt)),
        ("floor", Member::Function(floor)),
        ("ceil", Member::Function(ceil)),
        ("pow", Member::Function(pow)),
        ("log", Member::Function(log)),
        ("exp", Member::Function(exp)),
    ],
};

static STATS: Package = Package {
    name: "stats",
    members: &[
        ("mean", Member::Function(mean)),
        ("median", Member::Function(median)),
        ("variance", Member::Function(variance)),
        ("stdev", Member::Function(stdev)),
    ],
};

/// Every package that can be requested at bootstrap.
pub static AVAILABLE: &[&Package] = &[&MATH, &STATS];

/// Find a package by name.
pub fn find(name: &str) -> Option<&'static Package> {
    AVAILABLE.iter().copied().find(|package| package.name == name)
}

fn one_number(name: &str, args: &[Value]) -> Result<f64, ExecutionFault> {
    match args {
        [x] => x.expect_number(name),
        _ => Err(ExecutionFault::type_error(format!(
            "{name}() takes exactly one argument ({} given)",
            args.len()
        ))),
    }
}

fn sqrt(args: &[Value]) -> Result<Value, ExecutionFault> {
    let x = one_number("sqrt", args)?;
    if x < 0.0 {
        return Err(ExecutionFault::value("math domain error"));
    }
    Ok(Value::Float(x.sqrt()))
}

fn to_int(x: f64) -> Result<Value, ExecutionFault> {
    if !x.is_finite() || x.abs() >= i64::MAX as f64 {
        return Err(ExecutionFault::overflow());
    }
    Ok(Value::Int(x as i64))
}

fn floor(args: &[Value]) -> Result<Value, ExecutionFault> {
    to_int(one_number("floor", args)?.floor())
}

fn ceil(args: &[Value]) -> Result<Value, ExecutionFault> {
    to_int(one_number("ceil", args)?.ceil())
}

fn pow(args: &[Value]) -> Result<Value, ExecutionFault> {
    let [base, exponent] = args else {
        return Err(ExecutionFault::type_error(format!(
            "pow() takes exactly 2 arguments ({} given)",
            args.len()
        )));
    };
    Ok(Value::Float(
        base.expect_number("pow")?.powf(exponent.expect_number("pow")?),
    ))
}

fn log(args: &[Value]) -> Result<Value, ExecutionFault> {
    let (x, base) = match args {
        [x] => (x.expect_number("log")?, None),
        [x, base] => (x.expect_number("log")?, Some(base.expect_number("log")?)),
        _ => {
            return Err(ExecutionFault::type_error(format!(
                "log() takes 1 or 2 arguments ({} given)",
                args.len()
            )));
        }
    };
    if x <= 0.0 || base.is_some_and(|b| b <= 0.0 || b == 1.0) {
        return Err(ExecutionFault::value("math domain error"));
    }
    Ok(Value::Float(match base {
        Some(b) => x.ln() / b.ln(),
        None => x.ln(),
    }))
}

fn exp(args: &[Value]) -> Result<Value, ExecutionFault> {
    let y = one_number("exp", args)?.exp();
    if y.is_infinite() {
        return Err(ExecutionFault::new(
            super::FaultKind::OverflowError,
            "math range error",
        ));
    }
    Ok(Value::Float(y))
}

/// The numeric contents of a single list argument.
fn data(name: &str, args: &[Value], min_len: usize) -> Result<Vec<f64>, ExecutionFault> {
    let [Value::List(items)] = args else {
        return Err(ExecutionFault::type_error(format!(
            "{name}() takes a single list argument"
        )));
    };
    if items.len() < min_len {
        return Err(ExecutionFault::value(format!(
            "{name}() requires at least {min_len} data point(s)"
        )));
    }
    items.iter().map(|item| item.expect_number(name)).collect()
}

fn mean_of(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn mean(args: &[Value]) -> Result<Value, ExecutionFault> {
    Ok(Value::Float(mean_of(&data("mean", args, 1)?)))
}

fn median(args: &[Value]) -> Result<Value, ExecutionFault> {
    let mut xs = data("median", args, 1)?;
    xs.sort_by(f64::total_cmp);
    let mid = xs.len() / 2;
    let value = if xs.len() % 2 == 1 {
        xs[mid]
    } else {
        (xs[mid - 1] + xs[mid]) / 2.0
    };
    Ok(Value::Float(value))
}

/// Sample variance.
fn sample_variance(name: &str, args: &[Value]) -> Result<f64, ExecutionFault> {
    let xs = data(name, args, 2)?;
    let m = mean_of(&xs);
    Ok(xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64)
}

fn variance(args: &[Value]) -> Result<Value, ExecutionFault> {
    sample_variance("variance", args).map(Value::Float)
}

fn stdev(args: &[Value]) -> Result<Value, ExecutionFault> {
    sample_variance("stdev", args).map(|v| Value::Float(v.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(package: &str, member: &str, args: &[Value]) -> Result<Value, ExecutionFault> {
        match find(package).unwrap().member(member) {
            Some(Member::Function(f)) => f(args),
            _ => panic!("{package}.{member} is not a function"),
        }
    }

    fn floats(xs: &[f64]) -> Value {
        Value::List(xs.iter().copied().map(Value::Float).collect())
    }

    #[test]
    fn test_find() {
        assert!(find("math").is_some());
        assert!(find("pandas").is_none());
        assert!(find("stats").unwrap().member_names().any(|name| name == "median"));
    }

    #[test]
    fn test_math_members() {
        assert_eq!(call("math", "sqrt", &[Value::Int(16)]).unwrap(), Value::Float(4.0));
        assert!(call("math", "sqrt", &[Value::Int(-1)]).is_err());
        assert_eq!(call("math", "floor", &[Value::Float(-1.5)]).unwrap(), Value::Int(-2));
        assert_eq!(call("math", "ceil", &[Value::Float(1.2)]).unwrap(), Value::Int(2));
        assert_eq!(
            call("math", "log", &[Value::Int(8), Value::Int(2)]).unwrap(),
            Value::Float(3.0)
        );
        assert!(matches!(
            find("math").unwrap().member("pi"),
            Some(Member::Constant(pi)) if pi == std::f64::consts::PI
        ));
    }

    #[test]
    fn test_stats_members() {
        let xs = floats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(call("stats", "mean", &[xs.clone()]).unwrap(), Value::Float(5.0));
        assert_eq!(call("stats", "median", &[xs.clone()]).unwrap(), Value::Float(4.5));
        let Value::Float(var) = call("stats", "variance", &[xs]).unwrap() else {
            panic!("expected float");
        };
        assert!((var - 32.0 / 7.0).abs() < 1e-12);
        assert!(call("stats", "stdev", &[floats(&[1.0])]).is_err());
    }
}
