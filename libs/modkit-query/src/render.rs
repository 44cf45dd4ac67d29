//! Textual rendering of filters and orderings. The output is the exact
//! grammar accepted by [`crate::parser`], so `parse(render(x)) == x`.

use std::fmt;

use crate::ast::{CompareOperator, Expr, TextFunction, Value};
use crate::lexer::quote;
use crate::{OrderBy, SortDir};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Ctx {
    Top,
    And,
    Not,
}

fn write_expr(e: &Expr, f: &mut fmt::Formatter<'_>, ctx: Ctx) -> fmt::Result {
    match e {
        Expr::Or(parts) => {
            let wrap = ctx != Ctx::Top;
            if wrap {
                f.write_str("(")?;
            }
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(" or ")?;
                }
                write_expr(p, f, Ctx::Top)?;
            }
            if wrap {
                f.write_str(")")?;
            }
            Ok(())
        }
        Expr::And(parts) => {
            let wrap = ctx == Ctx::Not;
            if wrap {
                f.write_str("(")?;
            }
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    f.write_str(" and ")?;
                }
                write_expr(p, f, Ctx::And)?;
            }
            if wrap {
                f.write_str(")")?;
            }
            Ok(())
        }
        Expr::Not(inner) => {
            f.write_str("not ")?;
            write_expr(inner, f, Ctx::Not)
        }
        Expr::Compare { field, op, value } => write!(f, "{field} {op} {value}"),
        Expr::In { field, values } => {
            write!(f, "{field} in (")?;
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{v}")?;
            }
            f.write_str(")")
        }
        Expr::Text { func, field, value } => write!(f, "{func}({field},{})", quote(value)),
        Expr::IsEmpty { field } => write!(f, "isempty({field})"),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_expr(self, f, Ctx::Top)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(&quote(s)),
        }
    }
}

impl fmt::Display for CompareOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOperator::Eq => "eq",
            CompareOperator::Ne => "ne",
            CompareOperator::Gt => "gt",
            CompareOperator::Ge => "ge",
            CompareOperator::Lt => "lt",
            CompareOperator::Le => "le",
        })
    }
}

impl fmt::Display for TextFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextFunction::Contains => "contains",
            TextFunction::StartsWith => "startswith",
            TextFunction::EndsWith => "endswith",
        })
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(&key.field)?;
            if key.dir == SortDir::Desc {
                f.write_str(" desc")?;
            }
        }
        Ok(())
    }
}
