//! Index-start rewrite.
//!
//! A query that scans every vertex and then filters on the id or the label
//! can start from the matching vertices directly. The rewrite only inspects
//! the filter prefix right after the scan; anything else ends the analysis.
use smallvec::SmallVec;
use tracing::debug;

use crate::model::path::FieldPath;
use crate::model::Value;
use crate::query::{Condition, HasExpression, Operator, Statement};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Id,
    Label,
}

/// Prefix positions of the filters addressing ids and labels, in order.
#[derive(Debug, Default)]
struct Prefix {
    ids: SmallVec<[usize; 2]>,
    labels: SmallVec<[usize; 2]>,
}

fn condition_kind(cond: &Condition) -> Option<Kind> {
    let path = FieldPath::parse(&cond.key);
    if path.is_current_id() {
        Some(Kind::Id)
    } else if path.is_current_label() {
        Some(Kind::Label)
    } else {
        None
    }
}

/// Strings an equality or membership condition pins the field to. Any other
/// operator, or a non-string operand, yields nothing.
fn condition_values(cond: &Condition) -> Vec<String> {
    match (cond.condition, &cond.value) {
        (Operator::Eq, Value::String(s)) => vec![s.clone()],
        (Operator::Within, Value::List(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned))
            .collect::<Option<Vec<_>>>()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn extract(stmt: &Statement) -> Vec<String> {
    match stmt {
        Statement::HasId(items) | Statement::HasLabel(items) => items.clone(),
        Statement::Has(HasExpression::Condition(cond)) => condition_values(cond),
        _ => Vec::new(),
    }
}

/// Rewrites `V() + id/label filter` prefixes into direct lookups.
///
/// The first id filter wins over any label filter; only the first filter of
/// the winning kind is consumed and every other statement keeps its
/// position. Applying the function to its own output changes nothing.
pub fn index_start_optimize(stmts: &[Statement]) -> Vec<Statement> {
    match stmts.first() {
        Some(Statement::V(ids)) if ids.is_empty() => {}
        _ => return stmts.to_vec(),
    }

    let mut prefix = Prefix::default();
    for (i, stmt) in stmts.iter().enumerate().skip(1) {
        match stmt {
            Statement::HasId(_) => prefix.ids.push(i),
            Statement::HasLabel(_) => prefix.labels.push(i),
            Statement::Has(HasExpression::And(items)) => {
                let mut flattened = Vec::with_capacity(stmts.len() + items.len());
                flattened.extend_from_slice(&stmts[..i]);
                flattened.extend(items.iter().cloned().map(Statement::Has));
                flattened.extend_from_slice(&stmts[i + 1..]);
                return index_start_optimize(&flattened);
            }
            Statement::Has(HasExpression::Condition(cond)) => match condition_kind(cond) {
                Some(Kind::Id) => prefix.ids.push(i),
                Some(Kind::Label) => prefix.labels.push(i),
                None => {}
            },
            Statement::Has(_) => {}
            _ => break,
        }
    }

    let rewrite = prefix
        .ids
        .first()
        .map(|&i| (i, Kind::Id, extract(&stmts[i])))
        .filter(|(_, _, values)| !values.is_empty())
        .or_else(|| {
            prefix
                .labels
                .first()
                .map(|&i| (i, Kind::Label, extract(&stmts[i])))
                .filter(|(_, _, values)| !values.is_empty())
        });

    let Some((consumed, kind, values)) = rewrite else {
        return stmts.to_vec();
    };
    debug!(kind = ?kind, consumed, count = values.len(), "engine.optimize.index_start");
    let start = match kind {
        Kind::Id => Statement::V(values),
        Kind::Label => Statement::LookupVertsIndex(values),
    };
    let mut out = Vec::with_capacity(stmts.len() - 1);
    out.push(start);
    out.extend(
        stmts
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(i, _)| *i != consumed)
            .map(|(_, s)| s.clone()),
    );
    out
}
