use crate::error::{EngineError, Result};
use crate::sexpr;
use crate::traits::{DynamicalSystem, Scalar};
use crate::State;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Names of the state variables, in state-vector order.
pub const STATE_VARIABLES: [&str; 3] = ["x", "y", "z"];

// --- AST ---

/// Expression tree produced by the reader.
///
/// An application is kept as the raw list it was read from (operator first);
/// the compiler decides whether its shape is one it can evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Symbol(String),
    Application(Vec<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // The reader only accepts finite literals, so infinities and NaN
            // are written as the divisions that produce them.
            Expr::Number(n) if n.is_nan() => f.write_str("(/ 0 0)"),
            Expr::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "(/ 1 0)" } else { "(/ -1 0)" })
            }
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Symbol(name) => f.write_str(name),
            Expr::Application(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

// --- Bytecode & VM ---

/// OpCodes for the stack-based virtual machine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant onto the stack.
    LoadConst(f64),
    /// Pushes the value of a state variable (0=x, 1=y, 2=z).
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b). IEEE semantics, no zero guard.
    Div,
}

/// A compiled expression. Only the `Compiler` produces these, so every
/// instance is known to leave exactly one value on the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    ops: Vec<OpCode>,
}

impl Bytecode {
    pub fn ops(&self) -> &[OpCode] {
        &self.ops
    }
}

/// Stateless evaluator for compiled expressions.
pub struct VM;

impl VM {
    /// Executes the bytecode against `vars`, using `stack` as scratch space.
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(val).unwrap_or_else(T::nan)),
                OpCode::LoadVar(idx) => stack.push(vars[idx]),
                OpCode::Add => binary(stack, |a, b| a + b),
                OpCode::Sub => binary(stack, |a, b| a - b),
                OpCode::Mul => binary(stack, |a, b| a * b),
                OpCode::Div => binary(stack, |a, b| a / b),
            }
        }

        stack.pop().unwrap_or_else(T::nan)
    }
}

fn binary<T: Scalar>(stack: &mut Vec<T>, f: impl Fn(T, T) -> T) {
    let (Some(b), Some(a)) = (stack.pop(), stack.pop()) else {
        unreachable!("compiled bytecode underflowed the VM stack");
    };
    stack.push(f(a, b));
}

// --- Compiler ---

/// Compiles an AST (`Expr`) into `Bytecode`, resolving variable names to
/// state indices. All structural checks happen here so that evaluation
/// itself cannot fail.
///
/// Only the state variables can be bound, so every `LoadVar` index is in
/// range for a `State`.
pub struct Compiler {
    var_map: HashMap<String, usize>,
}

impl Compiler {
    fn new(var_names: &[&str]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Symbol(name) => {
                let idx = self
                    .var_map
                    .get(name)
                    .ok_or_else(|| EngineError::UnknownVariable(name.clone()))?;
                ops.push(OpCode::LoadVar(*idx));
            }
            Expr::Application(items) => {
                let [head, lhs, rhs] = items.as_slice() else {
                    return Err(EngineError::UnsupportedExpression(format!(
                        "{expr} must have the form (op a b)"
                    )));
                };
                let op = match head {
                    Expr::Symbol(op) => match op.as_str() {
                        "+" => OpCode::Add,
                        "-" => OpCode::Sub,
                        "*" => OpCode::Mul,
                        "/" => OpCode::Div,
                        _ => {
                            return Err(EngineError::UnsupportedExpression(format!(
                                "unknown operator '{op}'"
                            )))
                        }
                    },
                    other => {
                        return Err(EngineError::UnsupportedExpression(format!(
                            "operator position holds {other}, expected one of + - * /"
                        )))
                    }
                };
                self.compile_recursive(lhs, ops)?;
                self.compile_recursive(rhs, ops)?;
                ops.push(op);
            }
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(&STATE_VARIABLES)
    }
}

/// Evaluates a single expression at `state`.
///
/// Unknown symbols and malformed applications are reported before any
/// arithmetic takes place.
pub fn evaluate(expr: &Expr, state: &State) -> Result<f64> {
    let code = Compiler::default().compile(expr)?;
    let mut stack = Vec::new();
    Ok(VM::execute(&code, state.as_slice(), &mut stack))
}

// --- EquationSet ---

/// The three compiled right-hand sides `dx/dt`, `dy/dt`, `dz/dt`.
///
/// Construction either succeeds for all three equations or fails as a whole.
#[derive(Debug, Clone)]
pub struct EquationSet {
    equations: [Bytecode; 3],
    sources: [String; 3],
    // Scratch stack reused across evaluations. Makes the set !Sync.
    stack: RefCell<Vec<f64>>,
}

impl EquationSet {
    pub fn compile(exprs: &[Expr; 3]) -> Result<Self> {
        let compiler = Compiler::default();
        let [ex, ey, ez] = exprs;
        let equations = [
            compiler.compile(ex)?,
            compiler.compile(ey)?,
            compiler.compile(ez)?,
        ];
        Ok(Self {
            equations,
            sources: [ex.to_string(), ey.to_string(), ez.to_string()],
            stack: RefCell::new(Vec::with_capacity(32)),
        })
    }

    /// Reads and compiles three equations written in prefix notation.
    pub fn parse(sources: [&str; 3]) -> Result<Self> {
        let [sx, sy, sz] = sources;
        let exprs = [sexpr::parse(sx)?, sexpr::parse(sy)?, sexpr::parse(sz)?];
        let mut set = Self::compile(&exprs)?;
        set.sources = sources.map(|s| s.trim().to_string());
        Ok(set)
    }

    /// The equations as text, in axis order.
    pub fn sources(&self) -> &[String; 3] {
        &self.sources
    }

    /// Evaluates all three right-hand sides at the same `state`.
    pub fn derivative(&self, state: &State) -> State {
        let mut out = State::zeros();
        self.apply(state.as_slice(), out.as_mut_slice());
        out
    }
}

impl DynamicalSystem<f64> for EquationSet {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, x: &[f64], out: &mut [f64]) {
        let mut stack = self.stack.borrow_mut();
        for (slot, eq) in out.iter_mut().zip(&self.equations) {
            *slot = VM::execute(eq, x, &mut stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sexpr::parse;

    fn state(x: f64, y: f64, z: f64) -> State {
        State::new(x, y, z)
    }

    #[test]
    fn evaluates_literals_and_symbols() {
        let s = state(1.5, -2.0, 4.0);
        assert_eq!(evaluate(&Expr::Number(7.0), &s).expect("number"), 7.0);
        assert_eq!(evaluate(&parse("y").expect("parse"), &s).expect("y"), -2.0);
        assert_eq!(evaluate(&parse("z").expect("parse"), &s).expect("z"), 4.0);
    }

    #[test]
    fn evaluates_nested_arithmetic() {
        let expr = parse("(- (* x (- 28 z)) y)").expect("parse");
        let value = evaluate(&expr, &state(2.0, 3.0, 8.0)).expect("evaluate");
        assert_eq!(value, 2.0 * (28.0 - 8.0) - 3.0);

        let expr = parse("(/ 8 3)").expect("parse");
        let value = evaluate(&expr, &state(0.0, 0.0, 0.0)).expect("evaluate");
        assert!((value - 8.0 / 3.0).abs() < 1e-15);
    }

    #[test]
    fn operand_order_is_preserved_for_non_commutative_ops() {
        let s = state(10.0, 4.0, 0.0);
        assert_eq!(evaluate(&parse("(- x y)").expect("parse"), &s).expect("sub"), 6.0);
        assert_eq!(evaluate(&parse("(/ x y)").expect("parse"), &s).expect("div"), 2.5);
    }

    #[test]
    fn division_by_zero_follows_ieee() {
        let s = state(1.0, 0.0, 0.0);
        let inf = evaluate(&parse("(/ x y)").expect("parse"), &s).expect("evaluate");
        assert!(inf.is_infinite() && inf.is_sign_positive());
        let nan = evaluate(&parse("(/ y y)").expect("parse"), &s).expect("evaluate");
        assert!(nan.is_nan());
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let err = evaluate(&parse("(+ x w)").expect("parse"), &state(0.0, 0.0, 0.0))
            .expect_err("w is not a state variable");
        assert_eq!(err, EngineError::UnknownVariable("w".to_string()));
    }

    #[test]
    fn malformed_applications_are_rejected() {
        for src in ["(+ x)", "(+ x y z)", "()", "(^ x y)", "((+ x y) x y)", "(3 x y)"] {
            let expr = parse(src).expect("reader accepts any list");
            let err = Compiler::default()
                .compile(&expr)
                .expect_err("compiler should reject the shape");
            assert!(
                matches!(err, EngineError::UnsupportedExpression(_)),
                "{src}: unexpected error {err:?}"
            );
        }
    }

    #[test]
    fn compiles_to_postfix() {
        let code = Compiler::default()
            .compile(&parse("(* 10 (- y x))").expect("parse"))
            .expect("compile");
        assert_eq!(
            code.ops(),
            &[
                OpCode::LoadConst(10.0),
                OpCode::LoadVar(1),
                OpCode::LoadVar(0),
                OpCode::Sub,
                OpCode::Mul,
            ]
        );
    }

    #[test]
    fn equation_set_is_all_or_nothing() {
        let err = EquationSet::parse(["(* 10 (- y x))", "(+ x w)", "z"])
            .expect_err("second equation references w");
        assert_eq!(err, EngineError::UnknownVariable("w".to_string()));

        let err = EquationSet::parse(["x", "y", "(+ z"]).expect_err("third does not parse");
        assert!(matches!(err, EngineError::Parse(_)));
    }

    #[test]
    fn equation_set_evaluates_each_axis_at_the_same_state() {
        let set = EquationSet::parse(["y", "z", "x"]).expect("system");
        assert_eq!(set.dimension(), 3);
        let d = set.derivative(&state(1.0, 2.0, 3.0));
        assert_eq!(d, state(2.0, 3.0, 1.0));
        assert_eq!(set.sources()[0], "y");
    }

    #[test]
    fn compiled_sources_read_back_to_the_same_tree() {
        for src in [
            "(* 10 (- y x))",
            "(- (* x (- 28 z)) y)",
            "(+ -0.5 (* 1e308 z))",
            "(/ 2.5e-300 x)",
        ] {
            let expr = parse(src).expect("parse");
            let exprs = [expr.clone(), Expr::Symbol("y".to_string()), Expr::Symbol("z".to_string())];
            let set = EquationSet::compile(&exprs).expect("system");
            assert_eq!(parse(&set.sources()[0]).expect("reparse"), expr, "{src}");
        }
    }

    #[test]
    fn non_finite_constants_display_as_readable_text() {
        let s = state(0.0, 0.0, 0.0);
        for value in [f64::INFINITY, f64::NEG_INFINITY] {
            let text = Expr::Number(value).to_string();
            let reread = evaluate(&parse(&text).expect("reparse"), &s).expect("evaluate");
            assert_eq!(reread, value, "{text}");
        }
        let text = Expr::Number(f64::NAN).to_string();
        assert!(evaluate(&parse(&text).expect("reparse"), &s).expect("evaluate").is_nan());

        let exprs = [
            Expr::Application(vec![
                Expr::Symbol("*".to_string()),
                Expr::Number(f64::INFINITY),
                Expr::Symbol("x".to_string()),
            ]),
            Expr::Symbol("y".to_string()),
            Expr::Symbol("z".to_string()),
        ];
        let set = EquationSet::compile(&exprs).expect("system");
        let sources = set.sources();
        EquationSet::parse([sources[0].as_str(), sources[1].as_str(), sources[2].as_str()])
            .expect("sources read back");
    }

    #[test]
    fn compiled_variables_stay_inside_the_state() {
        for preset in crate::presets::Preset::ALL {
            for src in preset.sources() {
                let code = Compiler::default()
                    .compile(&parse(src).expect("parse"))
                    .expect("compile");
                assert!(code.ops().iter().all(|op| match op {
                    OpCode::LoadVar(idx) => *idx < STATE_VARIABLES.len(),
                    _ => true,
                }));
            }
        }
    }

    #[test]
    fn compiled_sets_keep_canonical_sources() {
        let exprs = [
            parse("( - 0 ( + y z))").expect("parse"),
            parse("x").expect("parse"),
            parse("2.5").expect("parse"),
        ];
        let set = EquationSet::compile(&exprs).expect("system");
        assert_eq!(set.sources()[0], "(- 0 (+ y z))");
        assert_eq!(set.sources()[2], "2.5");
    }
}
