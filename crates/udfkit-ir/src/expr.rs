//! Immutable expression tree rewritten by Expr-macro functions

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::types::{DataType, TypeAttr};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    /// Floating division, always yields double
    FDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "DIV",
            BinOp::FDiv => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "=",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
            BinOp::Or => "OR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Expr {
    Literal {
        value: Value,
    },
    /// Positional argument of the enclosing function or aggregate step
    Arg {
        index: usize,
        attr: TypeAttr,
    },
    Cast {
        to: DataType,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<TypeAttr>,
    },
    /// `if cond then .. else ..`; a null condition takes the else branch
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    GetField {
        expr: Box<Expr>,
        index: usize,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<TypeAttr>,
    },
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn arg(index: usize, attr: TypeAttr) -> Self {
        Expr::Arg { index, attr }
    }

    pub fn cast(expr: Expr, to: DataType) -> Self {
        Expr::Cast {
            to,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            output: None,
        }
    }

    pub fn cond(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::Cond {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn get_field(expr: Expr, index: usize) -> Self {
        Expr::GetField {
            expr: Box::new(expr),
            index,
        }
    }

    pub fn call(func: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            args,
            output: None,
        }
    }

    pub fn make_tuple(fields: Vec<Expr>) -> Self {
        Expr::call("make_tuple", fields)
    }

    /// Pins the output type of an operator or call node.
    ///
    /// Nodes produced by expansion carry their type explicitly because they
    /// are created before inference over the whole tree has finished.
    pub fn with_output(self, attr: TypeAttr) -> Self {
        match self {
            Expr::BinaryOp {
                op, left, right, ..
            } => Expr::BinaryOp {
                op,
                left,
                right,
                output: Some(attr),
            },
            Expr::Call { func, args, .. } => Expr::Call {
                func,
                args,
                output: Some(attr),
            },
            other => other,
        }
    }

    /// Output type computed from this node and its children only.
    ///
    /// Returns `None` for unannotated calls and for untyped null literals.
    pub fn output_attr(&self) -> Option<TypeAttr> {
        match self {
            Expr::Literal { value } => value.data_type().map(TypeAttr::new),
            Expr::Arg { attr, .. } => Some(attr.clone()),
            Expr::Cast { to, expr } => {
                let nullable = expr.output_attr().map(|a| a.nullable).unwrap_or(true);
                Some(TypeAttr::new(to.clone()).with_nullable(nullable))
            }
            Expr::BinaryOp {
                op,
                left,
                right,
                output,
            } => {
                if let Some(attr) = output {
                    return Some(attr.clone());
                }
                let (l, r) = (left.output_attr()?, right.output_attr()?);
                let nullable = l.nullable || r.nullable;
                let data_type = if op.is_comparison() || op.is_logical() {
                    DataType::Bool
                } else if *op == BinOp::FDiv {
                    DataType::Double
                } else {
                    DataType::promote(&l.data_type, &r.data_type)?
                };
                Some(TypeAttr::new(data_type).with_nullable(nullable))
            }
            Expr::Cond {
                then, otherwise, ..
            } => {
                let then_attr = then.output_attr();
                let else_attr = otherwise.output_attr();
                match (then_attr, else_attr) {
                    (Some(t), Some(e)) => {
                        let nullable = t.nullable || e.nullable;
                        Some(t.with_nullable(nullable))
                    }
                    (Some(t), None) | (None, Some(t)) => Some(t.with_nullable(true)),
                    (None, None) => None,
                }
            }
            Expr::GetField { expr, index } => {
                let parent = expr.output_attr()?;
                let field = parent.data_type.generic(*index)?.clone();
                let nullable = field.nullable || parent.nullable;
                Some(field.with_nullable(nullable))
            }
            Expr::Call { output, .. } => output.clone(),
        }
    }

    /// Number of call nodes still naming `func`
    pub fn count_calls(&self, func: &str) -> usize {
        let own = matches!(self, Expr::Call { func: f, .. } if f == func) as usize;
        own + self.children().iter().map(|c| c.count_calls(func)).sum::<usize>()
    }

    pub fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal { .. } | Expr::Arg { .. } => vec![],
            Expr::Cast { expr, .. } | Expr::GetField { expr, .. } => vec![expr],
            Expr::BinaryOp { left, right, .. } => vec![left, right],
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => vec![cond, then, otherwise],
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// SHA-256 of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal { value } => match value {
                Value::String(s) => write!(f, "'{}'", s),
                other => write!(f, "{}", other),
            },
            Expr::Arg { index, .. } => write!(f, "${}", index),
            Expr::Cast { to, expr } => write!(f, "CAST({} AS {})", expr, to),
            Expr::BinaryOp {
                op, left, right, ..
            } => write!(f, "({} {} {})", left, op.symbol(), right),
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => write!(f, "IF({}, {}, {})", cond, then, otherwise),
            Expr::GetField { expr, index } => write!(f, "{}.{}", expr, index),
            Expr::Call { func, args, .. } => {
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", func, args.join(", "))
            }
        }
    }
}
