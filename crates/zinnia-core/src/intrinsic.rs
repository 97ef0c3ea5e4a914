//! Math functions the evaluator folds when every argument is constant.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};

use crate::const_value::ConstValue;

/// A foldable math function. Functions tagged with one of these in the
/// identifier table are evaluated at compile time on constant arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathIntrinsic {
    Abs,
    Sqrt,
    Sign,
    /// Natural logarithm, or logarithm to a base with two arguments.
    Log,
    Log2,
    Log10,
    Exp,
    Pow2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Asinh,
    Acosh,
    Atanh,
    Pow,
    Atan2,
}

impl MathIntrinsic {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Abs" => MathIntrinsic::Abs,
            "Sqrt" => MathIntrinsic::Sqrt,
            "Sign" => MathIntrinsic::Sign,
            "Log" => MathIntrinsic::Log,
            "Log2" => MathIntrinsic::Log2,
            "Log10" => MathIntrinsic::Log10,
            "Exp" => MathIntrinsic::Exp,
            "Pow2" => MathIntrinsic::Pow2,
            "Sin" => MathIntrinsic::Sin,
            "Cos" => MathIntrinsic::Cos,
            "Tan" => MathIntrinsic::Tan,
            "Asin" => MathIntrinsic::Asin,
            "Acos" => MathIntrinsic::Acos,
            "Atan" => MathIntrinsic::Atan,
            "Sinh" => MathIntrinsic::Sinh,
            "Cosh" => MathIntrinsic::Cosh,
            "Tanh" => MathIntrinsic::Tanh,
            "Asinh" => MathIntrinsic::Asinh,
            "Acosh" => MathIntrinsic::Acosh,
            "Atanh" => MathIntrinsic::Atanh,
            "Pow" => MathIntrinsic::Pow,
            "Atan2" => MathIntrinsic::Atan2,
            _ => return None,
        })
    }

    /// Whether the function accepts `count` arguments.
    pub fn accepts_arity(self, count: usize) -> bool {
        match self {
            MathIntrinsic::Log => count == 1 || count == 2,
            MathIntrinsic::Pow | MathIntrinsic::Atan2 => count == 2,
            _ => count == 1,
        }
    }

    /// Fold a one-argument call. `Abs` and `Sign` keep integer arguments
    /// integral; everything else produces a double.
    pub fn apply1(self, arg: &ConstValue) -> Option<ConstValue> {
        if let ConstValue::Integer(v) = arg {
            match self {
                MathIntrinsic::Abs => return Some(ConstValue::Integer(v.abs())),
                MathIntrinsic::Sign => {
                    let sign = if v.is_zero() {
                        0
                    } else if v.is_negative() {
                        -1
                    } else {
                        1
                    };
                    return Some(ConstValue::Integer(BigInt::from(sign)));
                }
                _ => {}
            }
        }

        let x = arg.as_f64()?;
        let result = match self {
            MathIntrinsic::Abs => x.abs(),
            MathIntrinsic::Sqrt => x.sqrt(),
            MathIntrinsic::Sign => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
            MathIntrinsic::Log => x.ln(),
            MathIntrinsic::Log2 => x.log2(),
            MathIntrinsic::Log10 => x.log10(),
            MathIntrinsic::Exp => x.exp(),
            MathIntrinsic::Pow2 => 2f64.powf(x),
            MathIntrinsic::Sin => x.sin(),
            MathIntrinsic::Cos => x.cos(),
            MathIntrinsic::Tan => x.tan(),
            MathIntrinsic::Asin => x.asin(),
            MathIntrinsic::Acos => x.acos(),
            MathIntrinsic::Atan => x.atan(),
            MathIntrinsic::Sinh => x.sinh(),
            MathIntrinsic::Cosh => x.cosh(),
            MathIntrinsic::Tanh => x.tanh(),
            MathIntrinsic::Asinh => (x + (x * x + 1.0).sqrt()).ln(),
            MathIntrinsic::Acosh => (x + (x * x - 1.0).sqrt()).ln(),
            MathIntrinsic::Atanh => 0.5 * ((1.0 + x) / (1.0 - x)).ln(),
            MathIntrinsic::Pow | MathIntrinsic::Atan2 => return None,
        };

        Some(match arg {
            ConstValue::Float(_) => ConstValue::Float(result as f32),
            _ => ConstValue::Double(result),
        })
    }

    /// Fold a two-argument call.
    pub fn apply2(self, a: &ConstValue, b: &ConstValue) -> Option<ConstValue> {
        let (x, y) = (a.as_f64()?, b.as_f64()?);
        let result = match self {
            MathIntrinsic::Pow => x.powf(y),
            MathIntrinsic::Log => x.log(y),
            MathIntrinsic::Atan2 => x.atan2(y),
            _ => return None,
        };
        Some(ConstValue::Double(result))
    }
}
