use super::Resolver;
use crate::schema::ResolvedRelation;
use crate::stmt::{Expr, FieldOp, Filter, Select, Value};
use crate::Result;

impl Resolver<'_> {
    /// Lowers relation predicates within a filter into correlated
    /// existence subqueries:
    ///
    /// - `$some(q)`  -> `EXISTS (child where fk = parent.pk and q)`
    /// - `$none(q)`  -> `NOT EXISTS (...)`
    /// - `$every(q)` -> `NOT EXISTS (child where fk = parent.pk and not q)`
    /// - `{relation: null}` -> `NOT EXISTS (child where fk = parent.pk)`
    ///
    /// Predicates on non-relation paths pass through untouched; the
    /// evaluator handles them over materialized rows.
    pub(super) fn lower_filter(
        &self,
        model: &str,
        alias: &str,
        filter: Filter,
    ) -> Result<Filter> {
        Ok(match filter {
            Filter::And(branches) => Filter::And(
                branches
                    .into_iter()
                    .map(|branch| self.lower_filter(model, alias, branch))
                    .collect::<Result<_>>()?,
            ),
            Filter::Or(branches) => Filter::Or(
                branches
                    .into_iter()
                    .map(|branch| self.lower_filter(model, alias, branch))
                    .collect::<Result<_>>()?,
            ),
            Filter::Not(branch) => {
                Filter::Not(Box::new(self.lower_filter(model, alias, *branch)?))
            }
            Filter::Field(path, op) => {
                let is_relation = path.len() == 1
                    && self
                        .schema
                        .get_model(model)
                        .and_then(|m| m.field(path.first().unwrap()))
                        .is_some_and(|field| field.is_relation());

                if !is_relation {
                    return Ok(Filter::Field(path, op));
                }

                let resolved = self
                    .schema
                    .resolve_relation(model, path.first().unwrap())?;

                match op {
                    FieldOp::Some(query) => {
                        let select = self.existence_subquery(alias, &resolved, *query, false)?;
                        Filter::Exists(Box::new(select))
                    }
                    FieldOp::None(query) => {
                        let select = self.existence_subquery(alias, &resolved, *query, false)?;
                        Filter::negate(Filter::Exists(Box::new(select)))
                    }
                    FieldOp::Every(query) => {
                        let select = self.existence_subquery(alias, &resolved, *query, true)?;
                        Filter::negate(Filter::Exists(Box::new(select)))
                    }
                    // `{relation: null}`: no associated row.
                    FieldOp::Eq(Value::Null) => {
                        let select = self.existence_subquery(
                            alias,
                            &resolved,
                            Filter::all_rows(),
                            false,
                        )?;
                        Filter::negate(Filter::Exists(Box::new(select)))
                    }
                    FieldOp::Ne(Value::Null) => {
                        let select = self.existence_subquery(
                            alias,
                            &resolved,
                            Filter::all_rows(),
                            false,
                        )?;
                        Filter::Exists(Box::new(select))
                    }
                    // A bare scalar is shorthand for a primary-key match.
                    FieldOp::Eq(value) => {
                        let pk = resolved.target.pk_single()?.to_string();
                        let query = FieldOp::shorthand_relation_query(value, &pk);
                        let select = self.existence_subquery(alias, &resolved, query, false)?;
                        Filter::Exists(Box::new(select))
                    }
                    FieldOp::In(items) => {
                        let pk = resolved.target.pk_single()?.to_string();
                        let query = Filter::is_in(pk.as_str(), items);
                        let select = self.existence_subquery(alias, &resolved, query, false)?;
                        Filter::Exists(Box::new(select))
                    }
                    op => Filter::Field(path, op),
                }
            }
            filter @ (Filter::Expr(_) | Filter::Exists(_)) => filter,
        })
    }

    /// A correlated subselection testing for related rows. `negate_inner`
    /// inverts the caller's query inside the child scope, which is how
    /// `$every` becomes a double negation.
    fn existence_subquery(
        &self,
        parent_alias: &str,
        resolved: &ResolvedRelation<'_>,
        query: Filter,
        negate_inner: bool,
    ) -> Result<Select> {
        let child_alias = format!("{parent_alias}:{}", resolved.field);

        let inner = self.lower_filter(&resolved.target.name, &child_alias, query)?;
        let inner = if negate_inner {
            Filter::negate(inner)
        } else {
            inner
        };

        match &resolved.link {
            None => {
                let mut correlation = Filter::all_rows();
                for (local, remote) in resolved.local.iter().zip(&resolved.remote) {
                    correlation = correlation.and(Filter::Expr(Expr::eq(
                        Expr::col(remote.as_str()),
                        Expr::scoped(parent_alias, local.as_str()),
                    )));
                }

                Ok(Select::table(&resolved.target.name)
                    .with_alias(child_alias)
                    .where_(correlation.and(inner)))
            }
            Some(link) => {
                let link_alias = format!("{child_alias}:link");

                let mut link_correlation = Filter::all_rows();
                for (local, column) in resolved.local.iter().zip(&link.owner_columns) {
                    link_correlation = link_correlation.and(Filter::Expr(Expr::eq(
                        Expr::col(column.as_str()),
                        Expr::scoped(parent_alias, local.as_str()),
                    )));
                }

                let mut child_correlation = Filter::all_rows();
                for (remote, column) in resolved.remote.iter().zip(&link.target_columns) {
                    child_correlation = child_correlation.and(Filter::Expr(Expr::eq(
                        Expr::col(remote.as_str()),
                        Expr::scoped(&link_alias, column.as_str()),
                    )));
                }

                let child = Select::table(&resolved.target.name)
                    .with_alias(child_alias)
                    .where_(child_correlation.and(inner));

                Ok(Select::table(&link.table)
                    .with_alias(link_alias)
                    .where_(link_correlation.and(Filter::Exists(Box::new(child)))))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::Resolver;
    use crate::schema::{Field, FieldDef, FieldTy, ModelConfig, Relation, Schema};

    fn schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .extend(
                "user",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    (
                        "posts".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::List)
                                .relation(Relation::one_to_many("post", "author")),
                        ),
                    ),
                ],
                Some(ModelConfig::default()),
            )
            .unwrap();
        schema
            .extend(
                "post",
                [
                    ("id".to_string(), FieldDef::from("unsigned")),
                    (
                        "author".to_string(),
                        FieldDef::Field(
                            Field::new(FieldTy::Unsigned(None))
                                .nullable()
                                .relation(Relation::many_to_one("user", "posts")),
                        ),
                    ),
                ],
                None,
            )
            .unwrap();
        schema
    }

    #[test]
    fn some_lowers_to_exists() {
        let schema = schema();
        let resolver = Resolver::new(&schema);

        let select = Select::table("user").where_(Filter::some(
            "posts",
            Filter::gt("score", Value::I64(1)),
        ));
        let lowered = resolver.resolve_select(&select).unwrap();

        let Filter::And(branches) = &lowered.filter else {
            panic!("expected conjunction");
        };
        assert!(matches!(branches[0], Filter::Exists(_)));
    }

    #[test]
    fn every_lowers_to_double_negation() {
        let schema = schema();
        let resolver = Resolver::new(&schema);

        let select = Select::table("user").where_(Filter::every(
            "posts",
            Filter::eq("author", Value::Null),
        ));
        let lowered = resolver.resolve_select(&select).unwrap();

        let Filter::And(branches) = &lowered.filter else {
            panic!("expected conjunction");
        };
        let Filter::Not(inner) = &branches[0] else {
            panic!("expected negation, got {:?}", branches[0]);
        };
        let Filter::Exists(child) = &**inner else {
            panic!("expected existence subquery");
        };
        // The inner query is negated inside the child scope.
        let Filter::And(child_branches) = &child.filter else {
            panic!("expected child conjunction");
        };
        assert!(child_branches
            .iter()
            .any(|branch| matches!(branch, Filter::Not(_))));
    }

    #[test]
    fn relation_null_is_absence() {
        let schema = schema();
        let resolver = Resolver::new(&schema);

        let select =
            Select::table("user").where_(Filter::eq("posts", Value::Null));
        let lowered = resolver.resolve_select(&select).unwrap();

        let Filter::And(branches) = &lowered.filter else {
            panic!("expected conjunction");
        };
        assert!(matches!(branches[0], Filter::Not(_)));
    }
}
