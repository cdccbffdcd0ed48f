//! Tree-walking evaluator holding the session's bindings.

use rustc_hash::FxHashMap;

use super::builtins::{self, MAX_SEQUENCE_LEN};
use super::packages::{self, Member, Package};
use super::parser::{BinOp, CmpOp, Expr, Stmt, UnaryOp, parse};
use super::value::{MAX_NESTING, Value};
use super::{ExecutionFault, FaultKind, Interpreter};

/// The built-in interpreter.
///
/// Bindings and loaded packages persist for the lifetime of the session. A
/// fault aborts the remaining statements of the current source text, but
/// bindings made before the fault are kept.
#[derive(Default)]
pub struct Session {
    globals: FxHashMap<String, Value>,
    packages: FxHashMap<&'static str, &'static Package>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value bound to `name`, if any.
    pub fn binding(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Names of the packages loaded so far.
    pub fn loaded_packages(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.packages.keys().copied()
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Value, ExecutionFault> {
        match stmt {
            Stmt::Expr(expr) => self.eval(expr),
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.globals.insert(name.clone(), value);
                Ok(Value::None)
            }
            Stmt::Update(name, op, expr) => {
                let current = self
                    .globals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ExecutionFault::name(name))?;
                let rhs = self.eval(expr)?;
                let updated = binary(*op, current, rhs)?;
                self.globals.insert(name.clone(), updated);
                Ok(Value::None)
            }
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Value, ExecutionFault> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.resolve(name),
            Expr::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                let depth = 1 + items.iter().map(Value::nesting_depth).max().unwrap_or(0);
                if depth > MAX_NESTING {
                    return Err(ExecutionFault::new(
                        FaultKind::OverflowError,
                        format!("list nesting exceeds {MAX_NESTING} levels"),
                    ));
                }
                Ok(Value::List(items))
            }
            Expr::Unary(op, operand) => unary(*op, self.eval(operand)?),
            Expr::Binary(op, lhs, rhs) => binary(*op, self.eval(lhs)?, self.eval(rhs)?),
            Expr::Compare(first, chain) => {
                let mut left = self.eval(first)?;
                for (op, expr) in chain {
                    let right = self.eval(expr)?;
                    if !compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::And(lhs, rhs) => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { self.eval(rhs) } else { Ok(left) }
            }
            Expr::Or(lhs, rhs) => {
                let left = self.eval(lhs)?;
                if left.is_truthy() { Ok(left) } else { self.eval(rhs) }
            }
            Expr::Call(callee, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                self.call(callee, &args)
            }
            Expr::Index(target, index) => subscript(self.eval(target)?, self.eval(index)?),
        }
    }

    /// Look up a package member, `Ok(None)` meaning the name is not dotted.
    fn member(&self, name: &str) -> Result<Option<Member>, ExecutionFault> {
        let Some((package, member)) = name.split_once('.') else {
            return Ok(None);
        };
        let package = self
            .packages
            .get(package)
            .ok_or_else(|| ExecutionFault::name(package))?;
        package.member(member).map(Some).ok_or_else(|| {
            ExecutionFault::new(
                FaultKind::NameError,
                format!("package '{}' has no member '{member}'", package.name),
            )
        })
    }

    fn resolve(&self, name: &str) -> Result<Value, ExecutionFault> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        match self.member(name)? {
            Some(Member::Constant(c)) => Ok(Value::Float(c)),
            Some(Member::Function(_)) => Err(ExecutionFault::type_error(format!(
                "function '{name}' must be called"
            ))),
            None if builtins::lookup(name).is_some() => Err(ExecutionFault::type_error(format!(
                "builtin '{name}' must be called"
            ))),
            None => Err(ExecutionFault::name(name)),
        }
    }

    fn call(&self, callee: &str, args: &[Value]) -> Result<Value, ExecutionFault> {
        if let Some(value) = self.globals.get(callee) {
            return Err(ExecutionFault::type_error(format!(
                "'{}' object is not callable",
                value.type_name()
            )));
        }
        match self.member(callee)? {
            Some(Member::Function(f)) => f(args),
            Some(Member::Constant(_)) => Err(ExecutionFault::type_error(
                "'float' object is not callable",
            )),
            None => match builtins::lookup(callee) {
                Some(f) => f(args),
                None => Err(ExecutionFault::name(callee)),
            },
        }
    }
}

impl Interpreter for Session {
    fn evaluate(&mut self, source: &str) -> Result<Value, ExecutionFault> {
        let stmts = parse(source)?;
        let mut last = Value::None;
        for stmt in &stmts {
            last = self.exec(stmt)?;
        }
        Ok(last)
    }

    fn load_package(&mut self, name: &str) -> Result<(), ExecutionFault> {
        let package = packages::find(name).ok_or_else(|| {
            ExecutionFault::new(FaultKind::ImportError, format!("no package named '{name}'"))
        })?;
        self.packages.insert(package.name, package);
        tracing::debug!(package = name, "package loaded");
        Ok(())
    }
}

fn unary(op: UnaryOp, operand: Value) -> Result<Value, ExecutionFault> {
    let symbol = match op {
        UnaryOp::Not => return Ok(Value::Bool(!operand.is_truthy())),
        UnaryOp::Neg => "-",
        UnaryOp::Pos => "+",
    };
    match (&operand, operand.as_int()) {
        (Value::Float(f), _) => Ok(Value::Float(if op == UnaryOp::Neg { -f } else { *f })),
        (_, Some(i)) if op == UnaryOp::Neg => {
            i.checked_neg().map(Value::Int).ok_or_else(ExecutionFault::overflow)
        }
        (_, Some(i)) => Ok(Value::Int(i)),
        _ => Err(ExecutionFault::type_error(format!(
            "bad operand type for unary {symbol}: '{}'",
            operand.type_name()
        ))),
    }
}

fn repeat<T: Clone>(items: &[T], count: &Value) -> Result<Vec<T>, ExecutionFault> {
    let count = count.as_int().unwrap_or(0).max(0) as usize;
    if items.len().saturating_mul(count) > MAX_SEQUENCE_LEN {
        return Err(ExecutionFault::new(
            FaultKind::OverflowError,
            "repeated sequence too large",
        ));
    }
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend_from_slice(items);
    }
    Ok(out)
}

/// Fail if a sequence built by concatenation would exceed the length cap.
fn check_concat_len(lhs: usize, rhs: usize) -> Result<(), ExecutionFault> {
    if lhs.saturating_add(rhs) > MAX_SEQUENCE_LEN {
        return Err(ExecutionFault::new(
            FaultKind::OverflowError,
            "concatenated sequence too large",
        ));
    }
    Ok(())
}

fn binary(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, ExecutionFault> {
    match (op, &lhs, &rhs) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => {
            check_concat_len(a.chars().count(), b.chars().count())?;
            Ok(Value::Str(format!("{a}{b}")))
        }
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            check_concat_len(a.len(), b.len())?;
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (BinOp::Mul, Value::Str(s), n) | (BinOp::Mul, n, Value::Str(s)) if n.as_int().is_some() => {
            let chars: Vec<char> = s.chars().collect();
            Ok(Value::Str(repeat(&chars, n)?.into_iter().collect()))
        }
        (BinOp::Mul, Value::List(items), n) | (BinOp::Mul, n, Value::List(items))
            if n.as_int().is_some() =>
        {
            Ok(Value::List(repeat(items, n)?))
        }
        _ => {
            if let (Some(a), Some(b)) = (lhs.as_int(), rhs.as_int()) {
                return int_arith(op, a, b);
            }
            match (lhs.as_f64(), rhs.as_f64()) {
                (Some(a), Some(b)) => float_arith(op, a, b),
                _ => Err(ExecutionFault::type_error(format!(
                    "unsupported operand type(s) for {}: '{}' and '{}'",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ))),
            }
        }
    }
}

fn int_arith(op: BinOp, a: i64, b: i64) -> Result<Value, ExecutionFault> {
    let checked = |result: Option<i64>| result.map(Value::Int).ok_or_else(ExecutionFault::overflow);
    match op {
        BinOp::Add => checked(a.checked_add(b)),
        BinOp::Sub => checked(a.checked_sub(b)),
        BinOp::Mul => checked(a.checked_mul(b)),
        BinOp::Div => {
            if b == 0 {
                return Err(ExecutionFault::zero_division("division by zero"));
            }
            Ok(Value::Float(a as f64 / b as f64))
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(ExecutionFault::zero_division(
                    "integer division or modulo by zero",
                ));
            }
            let q = a.checked_div(b).ok_or_else(ExecutionFault::overflow)?;
            let r = a.wrapping_rem(b);
            Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }))
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(ExecutionFault::zero_division("integer modulo by zero"));
            }
            let r = a.wrapping_rem(b);
            Ok(Value::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        BinOp::Pow => {
            if b >= 0 {
                let exp = u32::try_from(b).map_err(|_| ExecutionFault::overflow())?;
                checked(a.checked_pow(exp))
            } else if a == 0 {
                Err(ExecutionFault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ))
            } else {
                Ok(Value::Float((a as f64).powf(b as f64)))
            }
        }
    }
}

fn float_arith(op: BinOp, a: f64, b: f64) -> Result<Value, ExecutionFault> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div | BinOp::FloorDiv | BinOp::Mod if b == 0.0 => {
            let what = match op {
                BinOp::Div => "division",
                BinOp::FloorDiv => "floor division",
                _ => "modulo",
            };
            return Err(ExecutionFault::zero_division(format!("float {what} by zero")));
        }
        BinOp::Div => a / b,
        BinOp::FloorDiv => (a / b).floor(),
        BinOp::Mod => {
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(ExecutionFault::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(ExecutionFault::value(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            a.powf(b)
        }
    };
    Ok(Value::Float(value))
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<bool, ExecutionFault> {
    use std::cmp::Ordering::*;

    Ok(match op {
        CmpOp::Eq => lhs.loose_eq(rhs),
        CmpOp::NotEq => !lhs.loose_eq(rhs),
        CmpOp::Lt => lhs.compare(rhs, op.symbol())? == Less,
        CmpOp::LtEq => lhs.compare(rhs, op.symbol())? != Greater,
        CmpOp::Gt => lhs.compare(rhs, op.symbol())? == Greater,
        CmpOp::GtEq => lhs.compare(rhs, op.symbol())? != Less,
    })
}

fn subscript(target: Value, index: Value) -> Result<Value, ExecutionFault> {
    let len = match &target {
        Value::List(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        other => {
            return Err(ExecutionFault::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            )));
        }
    };
    let i = index.as_int().ok_or_else(|| {
        ExecutionFault::type_error(format!(
            "{} indices must be integers, not '{}'",
            target.type_name(),
            index.type_name()
        ))
    })?;
    let resolved = if i < 0 { i + len as i64 } else { i };
    if resolved < 0 || resolved >= len as i64 {
        return Err(ExecutionFault::index(format!(
            "{} index out of range",
            target.type_name()
        )));
    }
    let resolved = resolved as usize;
    Ok(match target {
        Value::List(mut items) => items.swap_remove(resolved),
        Value::Str(s) => Value::Str(s.chars().nth(resolved).map(String::from).unwrap_or_default()),
        _ => unreachable!("checked above"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(session: &mut Session, source: &str) -> Value {
        session
            .evaluate(source)
            .unwrap_or_else(|fault| panic!("{source:?} faulted: {fault}"))
    }

    fn fault(source: &str) -> ExecutionFault {
        Session::new()
            .evaluate(source)
            .expect_err("expected a fault")
    }

    #[test]
    fn test_bindings_persist_across_calls() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "x = 5"), Value::None);
        assert_eq!(eval(&mut session, "x + 1"), Value::Int(6));
        assert_eq!(session.binding("x"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_last_statement_decides_outcome() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "a = 2\nb = 3\na * b"), Value::Int(6));
        assert_eq!(eval(&mut session, "a * b; c = 1"), Value::None);
        assert_eq!(eval(&mut session, ""), Value::None);
    }

    #[test]
    fn test_arithmetic_semantics() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "7 / 2"), Value::Float(3.5));
        assert_eq!(eval(&mut session, "-7 // 2"), Value::Int(-4));
        assert_eq!(eval(&mut session, "-7 % 3"), Value::Int(2));
        assert_eq!(eval(&mut session, "7 % -3"), Value::Int(-2));
        assert_eq!(eval(&mut session, "2 ** 10"), Value::Int(1024));
        assert_eq!(eval(&mut session, "2 ** -1"), Value::Float(0.5));
        assert_eq!(eval(&mut session, "-2 ** 2"), Value::Int(-4));
        assert_eq!(eval(&mut session, "1 + 2.5"), Value::Float(3.5));
        assert_eq!(eval(&mut session, "True + 1"), Value::Int(2));
        assert_eq!(eval(&mut session, "'ab' * 2 + 'c'"), Value::Str("ababc".into()));
        assert_eq!(
            eval(&mut session, "[0] * 3"),
            Value::List(vec![Value::Int(0); 3])
        );
    }

    #[test]
    fn test_concatenation_respects_length_cap() {
        let mut session = Session::new();
        eval(&mut session, "s = 'a' * 10000000");
        let fault = session.evaluate("s = s + s").unwrap_err();
        assert_eq!(fault.kind, FaultKind::OverflowError);
        let fault = session.evaluate("s += 'b'").unwrap_err();
        assert_eq!(fault.kind, FaultKind::OverflowError);
        assert_eq!(eval(&mut session, "len(s)"), Value::Int(10_000_000));

        eval(&mut session, "xs = [1, 2] + [3]");
        assert_eq!(eval(&mut session, "len(xs * 2)"), Value::Int(6));
    }

    #[test]
    fn test_list_nesting_is_bounded() {
        let mut session = Session::new();
        eval(&mut session, "x = 0");
        let wrap = format!("x = {}x{}", "[".repeat(10), "]".repeat(10));
        for _ in 0..10 {
            eval(&mut session, &wrap);
        }
        assert_eq!(session.binding("x").map(Value::nesting_depth), Some(MAX_NESTING));

        let fault = session.evaluate("x = [x]").unwrap_err();
        assert_eq!(fault.kind, FaultKind::OverflowError);
        assert_eq!(session.binding("x").map(Value::nesting_depth), Some(MAX_NESTING));
        assert_eq!(eval(&mut session, "len(x)"), Value::Int(1));
    }

    #[test]
    fn test_logic_returns_operands() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "0 or 'x'"), Value::Str("x".into()));
        assert_eq!(eval(&mut session, "1 and 0"), Value::Int(0));
        assert_eq!(eval(&mut session, "not []"), Value::Bool(true));
        // Short-circuit skips the undefined name.
        assert_eq!(eval(&mut session, "False and missing"), Value::Bool(false));
    }

    #[test]
    fn test_comparison_chain() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "1 < 2 <= 2 != 3"), Value::Bool(true));
        assert_eq!(eval(&mut session, "3 > 2 > 2"), Value::Bool(false));
        assert_eq!(eval(&mut session, "[1, 2] < [1, 3]"), Value::Bool(true));
    }

    #[test]
    fn test_indexing() {
        let mut session = Session::new();
        eval(&mut session, "xs = [10, 20, 30]");
        assert_eq!(eval(&mut session, "xs[-1]"), Value::Int(30));
        assert_eq!(eval(&mut session, "'abc'[1]"), Value::Str("b".into()));
        assert_eq!(fault("[1][5]").kind, FaultKind::IndexError);
        assert_eq!(fault("5[0]").kind, FaultKind::TypeError);
    }

    #[test]
    fn test_update_statements() {
        let mut session = Session::new();
        eval(&mut session, "n = 10\nn += 5\nn -= 1\nn *= 2");
        assert_eq!(eval(&mut session, "n"), Value::Int(28));
        eval(&mut session, "n /= 8");
        assert_eq!(eval(&mut session, "n"), Value::Float(3.5));
        assert_eq!(fault("undefined += 1").kind, FaultKind::NameError);
    }

    #[test]
    fn test_fault_kinds() {
        assert_eq!(fault("1/0").kind, FaultKind::ZeroDivisionError);
        assert_eq!(fault("1 // 0").kind, FaultKind::ZeroDivisionError);
        assert_eq!(fault("1.0 % 0").kind, FaultKind::ZeroDivisionError);
        assert_eq!(fault("1 +").kind, FaultKind::SyntaxError);
        assert_eq!(fault("y").kind, FaultKind::NameError);
        assert_eq!(fault("'a' - 1").kind, FaultKind::TypeError);
        assert_eq!(fault("9223372036854775807 + 1").kind, FaultKind::OverflowError);
        assert_eq!(fault("x = 1\nx()").kind, FaultKind::TypeError);
        assert_eq!(fault("len").kind, FaultKind::TypeError);
    }

    #[test]
    fn test_fault_keeps_earlier_bindings() {
        let mut session = Session::new();
        assert!(session.evaluate("a = 1\nb = 1/0\nc = 3").is_err());
        assert_eq!(session.binding("a"), Some(&Value::Int(1)));
        assert_eq!(session.binding("b"), None);
        assert_eq!(session.binding("c"), None);
    }

    #[test]
    fn test_syntax_error_has_no_effect() {
        let mut session = Session::new();
        assert!(session.evaluate("a = 1\nb = (").is_err());
        assert_eq!(session.binding("a"), None);
    }

    #[test]
    fn test_packages_require_loading() {
        let mut session = Session::new();
        assert_eq!(
            session.evaluate("math.sqrt(4)").unwrap_err().kind,
            FaultKind::NameError
        );
        session.load_package("math").unwrap();
        assert_eq!(eval(&mut session, "math.sqrt(4)"), Value::Float(2.0));
        assert_eq!(eval(&mut session, "math.floor(math.pi)"), Value::Int(3));
        assert_eq!(
            session.evaluate("math.nope").unwrap_err().kind,
            FaultKind::NameError
        );
        assert_eq!(
            session.load_package("pandas").unwrap_err().kind,
            FaultKind::ImportError
        );
        assert_eq!(session.loaded_packages().collect::<Vec<_>>(), vec!["math"]);
    }

    #[test]
    fn test_builtins_in_expressions() {
        let mut session = Session::new();
        assert_eq!(eval(&mut session, "len(range(5)) + max(1, 7)"), Value::Int(12));
        assert_eq!(eval(&mut session, "sum([1, 2, 3]) / len([1, 2, 3])"), Value::Float(2.0));
        assert_eq!(eval(&mut session, "str(1) + str(2.0)"), Value::Str("12.0".into()));
    }
}
