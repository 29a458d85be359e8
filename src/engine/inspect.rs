//! Static inspection of statement lists.
//!
//! Statements are grouped into *steps*: every statement that moves the
//! traveler onto a freshly fetched element opens a new step, and every other
//! statement works on the element of the step it follows. A backward scan
//! then records which fields of each step's element are read downstream, so
//! lookups know whether properties must be loaded.
use std::collections::{BTreeMap, BTreeSet};

use crate::model::path::{Field, FieldPath, Namespace};
use crate::model::Value;
use crate::query::{HasExpression, Statement};

/// Marker meaning "every property".
pub const ALL_FIELDS: &str = "*";

const START_STEP: &str = "0";

fn opens_step(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::V(_)
            | Statement::E(_)
            | Statement::LookupVertsIndex(_)
            | Statement::In(_)
            | Statement::Out(_)
            | Statement::Both(_)
            | Statement::InE(_)
            | Statement::OutE(_)
            | Statement::BothE(_)
    )
}

fn walk_steps(stmts: &[Statement]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut steps = Vec::with_capacity(stmts.len());
    let mut marks = BTreeMap::new();
    let mut counter = 0usize;
    let mut cur = START_STEP.to_owned();
    for stmt in stmts {
        if opens_step(stmt) {
            counter += 1;
            cur = counter.to_string();
        }
        match stmt {
            Statement::As(name) => {
                marks.insert(name.clone(), cur.clone());
            }
            Statement::Select(names) if names.len() == 1 => {
                if let Some(step) = marks.get(&names[0]) {
                    cur = step.clone();
                }
            }
            Statement::Jump { mark, .. } => {
                if let Some(step) = marks.get(mark) {
                    cur = step.clone();
                }
            }
            _ => {}
        }
        steps.push(cur.clone());
    }
    (steps, marks)
}

/// Step id of every statement.
pub fn pipeline_steps(stmts: &[Statement]) -> Vec<String> {
    walk_steps(stmts).0
}

/// Step id each mark name refers to.
pub fn mark_steps(stmts: &[Statement]) -> BTreeMap<String, String> {
    walk_steps(stmts).1
}

struct Outputs<'a> {
    steps: &'a [String],
    marks: &'a BTreeMap<String, String>,
    out: BTreeMap<String, BTreeSet<String>>,
}

impl Outputs<'_> {
    fn add(&mut self, step: &str, field: &str) {
        self.out
            .entry(step.to_owned())
            .or_default()
            .insert(field.to_owned());
    }

    fn need(&mut self, index: usize, raw: &str) {
        let path = FieldPath::parse(raw);
        let step = match &path.namespace {
            Namespace::Current => self.steps[index].clone(),
            Namespace::Mark(name) => match self.marks.get(name) {
                Some(step) => step.clone(),
                None => return,
            },
        };
        match path.field {
            Field::Id | Field::From | Field::To => {}
            Field::Label => self.add(&step, "_label"),
            Field::Element | Field::Data(_) => self.add(&step, ALL_FIELDS),
        }
    }

    fn need_expr(&mut self, index: usize, expr: &HasExpression) {
        match expr {
            HasExpression::And(items) | HasExpression::Or(items) => {
                for item in items {
                    self.need_expr(index, item);
                }
            }
            HasExpression::Not(inner) => self.need_expr(index, inner),
            HasExpression::Condition(cond) => {
                self.need(index, &cond.key);
                if let Value::String(s) = &cond.value {
                    if s.starts_with('$') {
                        self.need(index, s);
                    }
                }
            }
        }
    }

    fn need_template(&mut self, index: usize, template: &Value) {
        match template {
            Value::String(s) if s.starts_with('$') => self.need(index, s),
            Value::List(items) => {
                for item in items {
                    self.need_template(index, item);
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    self.need_template(index, item);
                }
            }
            _ => {}
        }
    }

    fn need_mark(&mut self, name: &str) {
        if let Some(step) = self.marks.get(name).cloned() {
            self.add(&step, ALL_FIELDS);
        }
    }
}

/// Fields of each step read downstream, keyed by step id.
///
/// `_label` means only the label is read; [`ALL_FIELDS`] means properties are
/// read. Steps absent from the map are never inspected beyond their id.
pub fn pipeline_step_outputs(
    stmts: &[Statement],
    store_marks: bool,
) -> BTreeMap<String, BTreeSet<String>> {
    let (steps, marks) = walk_steps(stmts);
    let mut outputs = Outputs {
        steps: &steps,
        marks: &marks,
        out: BTreeMap::new(),
    };
    let mut on_last = true;
    for (i, stmt) in stmts.iter().enumerate().rev() {
        match stmt {
            Statement::Count | Statement::Path => on_last = false,
            Statement::Aggregate(aggs) => {
                for agg in aggs {
                    if let Some(field) = agg.kind.field() {
                        outputs.need(i, field);
                    }
                }
                on_last = false;
            }
            Statement::Render(template) => {
                outputs.need_template(i, template);
                on_last = false;
            }
            Statement::Select(names) => {
                if on_last {
                    for name in names {
                        outputs.need_mark(name);
                    }
                }
                on_last = false;
            }
            Statement::Jump { mark, condition, .. } => {
                if let Some(cond) = condition {
                    outputs.need_expr(i, cond);
                }
                if on_last {
                    outputs.need_mark(mark);
                }
            }
            Statement::Has(expr) => outputs.need_expr(i, expr),
            Statement::HasLabel(_) => {
                let step = steps[i].clone();
                outputs.add(&step, "_label");
            }
            Statement::HasKey(_) | Statement::Fields(_) => {
                let step = steps[i].clone();
                outputs.add(&step, ALL_FIELDS);
            }
            Statement::Unwind(field)
            | Statement::Set { field, .. }
            | Statement::Increment { field, .. } => outputs.need(i, field),
            Statement::Distinct(fields) => {
                for field in fields {
                    outputs.need(i, field);
                }
            }
            stmt if opens_step(stmt) => {
                if on_last {
                    let step = steps[i].clone();
                    outputs.add(&step, ALL_FIELDS);
                    on_last = false;
                }
            }
            _ => {}
        }
    }
    if store_marks {
        for step in marks.values() {
            outputs.add(step, ALL_FIELDS);
        }
    }
    outputs.out
}
