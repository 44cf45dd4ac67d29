//! Composable query plans.
//!
//! A [`QueryPlan`] is everything a [`Storage`](crate::storage::Storage)
//! needs to run a read: table schema, projection, predicate, ordering and the
//! skip/take window. [`QueryBuilder`] assembles one from a parsed [`Query`]
//! or piece by piece.

use modkit_query::ast::Expr;
use modkit_query::{OrderBy, Query};

use crate::error::QueryError;
use crate::model::{EntityDescriptor, TableSchema};
use crate::translate::{translate_expr, translate_order, OrderTerm, Predicate};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPlan {
    pub schema: TableSchema,
    /// Canonical column names to return; empty means all.
    pub columns: Vec<String>,
    pub includes: Vec<String>,
    pub predicate: Option<Predicate>,
    pub order: Vec<OrderTerm>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
}

impl QueryPlan {
    pub fn table(&self) -> &str {
        &self.schema.table
    }

    /// Same filter without window, projection or includes.
    pub fn count_plan(&self) -> QueryPlan {
        QueryPlan {
            schema: self.schema.clone(),
            columns: Vec::new(),
            includes: Vec::new(),
            predicate: self.predicate.clone(),
            order: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Columns actually read: the projection, or every schema column.
    pub fn selected_columns(&self) -> Vec<String> {
        if self.columns.is_empty() {
            self.schema.column_names()
        } else {
            self.columns.clone()
        }
    }
}

pub struct QueryBuilder<'d, E> {
    desc: &'d EntityDescriptor<E>,
    plan: QueryPlan,
}

impl<'d, E> QueryBuilder<'d, E> {
    pub fn new(desc: &'d EntityDescriptor<E>) -> Self {
        Self {
            desc,
            plan: QueryPlan {
                schema: desc.schema().clone(),
                ..Default::default()
            },
        }
    }

    /// Includes first, then filter, order and window. `select` is left to the
    /// caller.
    pub fn from_query(query: &Query, desc: &'d EntityDescriptor<E>) -> Result<Self, QueryError> {
        let mut b = Self::new(desc);
        for name in &query.include {
            if name.trim().is_empty() {
                continue;
            }
            b = b.include(name)?;
        }
        if let Some(expr) = &query.filter {
            b = b.filter_expr(expr)?;
        }
        b = b.order(&query.order)?;
        Ok(b.window(query.skip, query.take))
    }

    pub fn include(mut self, name: &str) -> Result<Self, QueryError> {
        let def = self
            .desc
            .include_def(name.trim())
            .ok_or_else(|| QueryError::UnknownInclude(name.to_string()))?;
        if !self.plan.includes.contains(&def.name) {
            self.plan.includes.push(def.name.clone());
        }
        Ok(self)
    }

    /// AND-ed onto any predicate already present.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.plan.predicate = Some(match self.plan.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn filter_expr(self, expr: &Expr) -> Result<Self, QueryError> {
        let p = translate_expr(expr, &self.plan.schema)?;
        Ok(self.filter(p))
    }

    /// Appends after any ordering already present.
    pub fn order(mut self, order: &OrderBy) -> Result<Self, QueryError> {
        let terms = translate_order(order, &self.plan.schema)?;
        self.plan.order.extend(terms);
        Ok(self)
    }

    pub fn window(mut self, skip: Option<u64>, take: Option<u64>) -> Self {
        self.plan.skip = skip;
        self.plan.take = take;
        self
    }

    pub fn select(mut self, columns: Vec<String>) -> Self {
        self.plan.columns = columns;
        self
    }

    pub fn build(self) -> QueryPlan {
        self.plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, IncludeDef};
    use crate::value::FieldKind;
    use modkit_query::{parse_filter, parse_order_by, SortDir};
    use once_cell::sync::Lazy;

    #[derive(Clone, Default)]
    struct Note {
        id: i64,
        body: String,
    }

    static NOTE_SCHEMA: Lazy<TableSchema> = Lazy::new(|| desc().schema().clone());

    fn desc() -> EntityDescriptor<Note> {
        EntityDescriptor::new("Note", "notes")
            .field(FieldDef::new("Id", FieldKind::I64, |n: &Note| n.id.into(), |n, v| {
                n.id = v.try_into()?;
                Ok(())
            }))
            .field(FieldDef::new(
                "Body",
                FieldKind::String,
                |n: &Note| n.body.clone().into(),
                |n, v| {
                    n.body = v.try_into()?;
                    Ok(())
                },
            ))
            .primary_key("Id")
            .include(IncludeDef::new("Replies", || &*NOTE_SCHEMA, "Id", "Id", |_, _| Ok(())))
    }

    #[test]
    fn from_query_translates_every_part() {
        let d = desc();
        let q = Query::new()
            .include("replies")
            .filter(parse_filter("body eq 'x'").unwrap())
            .order_by(modkit_query::OrderKey::desc("id"))
            .skip(5)
            .take(10);
        let plan = QueryBuilder::from_query(&q, &d).unwrap().build();
        assert_eq!(plan.includes, vec!["Replies"]);
        assert!(plan.predicate.is_some());
        assert_eq!(plan.order[0].column, "Id");
        assert_eq!(plan.order[0].dir, SortDir::Desc);
        assert_eq!((plan.skip, plan.take), (Some(5), Some(10)));
    }

    #[test]
    fn unknown_include_is_rejected_and_blank_is_skipped() {
        let d = desc();
        let err = QueryBuilder::from_query(&Query::new().include("Comments"), &d)
            .err()
            .unwrap();
        assert_eq!(err, QueryError::UnknownInclude("Comments".into()));
        assert!(QueryBuilder::from_query(&Query::new().include("  "), &d).is_ok());
    }

    #[test]
    fn filters_and_orders_accumulate() {
        let d = desc();
        let plan = QueryBuilder::new(&d)
            .filter(Predicate::eq("Id", 1_i64))
            .filter(Predicate::eq("Body", "x"))
            .order(&parse_order_by("Body").unwrap())
            .unwrap()
            .order(&parse_order_by("Id desc").unwrap())
            .unwrap()
            .build();
        match plan.predicate {
            Some(Predicate::All(parts)) => assert_eq!(parts.len(), 2),
            other => panic!("expected conjunction, got {other:?}"),
        }
        assert_eq!(plan.order.len(), 2);
    }

    #[test]
    fn count_plan_drops_window() {
        let d = desc();
        let plan = QueryBuilder::new(&d)
            .filter(Predicate::eq("Id", 1_i64))
            .window(Some(10), Some(10))
            .select(vec!["Id".into()])
            .build();
        let count = plan.count_plan();
        assert_eq!(count.predicate, plan.predicate);
        assert!(count.skip.is_none() && count.take.is_none() && count.columns.is_empty());
        assert_eq!(plan.selected_columns(), vec!["Id"]);
        assert_eq!(count.selected_columns(), vec!["Id", "Body"]);
    }
}
