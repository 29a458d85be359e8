//! Projection and mutation stages.
use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::model::path::{Field, FieldPath, Namespace};
use crate::model::{Payload, Traveler, Value};

/// Renders `template` against a traveler: strings starting with `$` are
/// path lookups (absent paths render as null), maps and lists render their
/// items, and every other value is copied as is.
pub fn render(t: &Traveler, template: &Value) -> Value {
    match template {
        Value::String(s) if s.starts_with('$') => {
            t.resolve(&FieldPath::parse(s)).unwrap_or_default()
        }
        Value::List(items) => Value::List(items.iter().map(|i| render(t, i)).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), render(t, v)))
                .collect::<BTreeMap<_, _>>(),
        ),
        other => other.clone(),
    }
}

/// Builds a document per traveler from a template.
#[derive(Debug, Clone)]
pub struct Render {
    template: Value,
}

impl Render {
    /// Stage rendering `template`.
    pub fn new(template: Value) -> Self {
        Self { template }
    }
}

#[async_trait]
impl Processor for Render {
    fn name(&self) -> &'static str {
        "Render"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() {
                t
            } else {
                let doc = render(&t, &self.template);
                t.with_payload(Payload::Render(doc))
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Emits the path each traveler walked.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathStage;

#[async_trait]
impl Processor for PathStage {
    fn name(&self) -> &'static str {
        "Path"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() {
                t
            } else {
                let path = t.path();
                t.with_payload(Payload::Path(path))
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Keeps the listed properties of the current element, then drops the ones
/// prefixed with `-`. Identity fields are always kept.
#[derive(Debug, Clone)]
pub struct Fields {
    include: Vec<Vec<String>>,
    exclude: Vec<Vec<String>>,
}

fn property_path(raw: &str) -> Option<Vec<String>> {
    let path = FieldPath::parse(raw);
    match (path.namespace, path.field) {
        (Namespace::Current, Field::Data(segs)) if !segs.is_empty() => Some(segs),
        _ => {
            debug!(field = raw, "engine.fields.not_a_property");
            None
        }
    }
}

impl Fields {
    /// Projection over `fields`.
    pub fn new(fields: &[String]) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for field in fields {
            match field.strip_prefix('-') {
                Some(rest) => exclude.extend(property_path(rest)),
                None => include.extend(property_path(field)),
            }
        }
        Self { include, exclude }
    }

    fn project(&self, t: &Traveler) -> Option<Traveler> {
        let current = t.current()?;
        let mut el = current.clone();
        if !self.include.is_empty() {
            el.data.clear();
            for segs in &self.include {
                if let Some(v) = current.get_path(segs) {
                    el.set_path(segs, v.clone());
                }
            }
        }
        for segs in &self.exclude {
            el.remove_path(segs);
        }
        Some(t.with_current_updated(el))
    }
}

#[async_trait]
impl Processor for Fields {
    fn name(&self) -> &'static str {
        "Fields"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() {
                t
            } else {
                self.project(&t).unwrap_or(t)
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Fans a list-valued field out into one traveler per item.
#[derive(Debug, Clone)]
pub struct Unwind {
    field: FieldPath,
}

impl Unwind {
    /// Stage unwinding `field`.
    pub fn new(field: &str) -> Self {
        Self {
            field: FieldPath::parse(field),
        }
    }

    fn expand(&self, t: &Traveler) -> Vec<Traveler> {
        let items = match t.resolve(&self.field) {
            Some(Value::List(items)) if !items.is_empty() => items,
            _ => vec![Value::Null],
        };
        let out: Vec<Traveler> = items
            .into_iter()
            .filter_map(|item| t.with_field(&self.field, item))
            .collect();
        if out.is_empty() {
            debug!(field = ?self.field, "engine.unwind.not_writable");
            return vec![t.clone()];
        }
        out
    }
}

#[async_trait]
impl Processor for Unwind {
    fn name(&self) -> &'static str {
        "Unwind"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let batch = if t.is_signal() { vec![t] } else { self.expand(&t) };
            for next in batch {
                if !emit(&ctx, &output, next).await {
                    return;
                }
            }
        }
    }
}

/// Writes a property on a copy of the addressed element.
#[derive(Debug, Clone)]
pub struct Set {
    field: FieldPath,
    value: Value,
}

impl Set {
    /// Stage writing `value` at `field`.
    pub fn new(field: &str, value: Value) -> Self {
        Self {
            field: FieldPath::parse(field),
            value,
        }
    }
}

#[async_trait]
impl Processor for Set {
    fn name(&self) -> &'static str {
        "Set"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() {
                t
            } else {
                match t.with_field(&self.field, self.value.clone()) {
                    Some(next) => next,
                    None => {
                        debug!(field = ?self.field, "engine.set.not_writable");
                        t
                    }
                }
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Adds to a numeric property; an absent property counts as 0.
#[derive(Debug, Clone)]
pub struct Increment {
    field: FieldPath,
    amount: i64,
}

impl Increment {
    /// Stage adding `amount` at `field`.
    pub fn new(field: &str, amount: i64) -> Self {
        Self {
            field: FieldPath::parse(field),
            amount,
        }
    }

    fn apply(&self, t: &Traveler) -> Option<Traveler> {
        let next = match t.resolve(&self.field) {
            None | Some(Value::Null) => Value::Int(self.amount),
            Some(Value::Int(v)) => Value::Int(v.saturating_add(self.amount)),
            Some(Value::Float(v)) => Value::Float(v + self.amount as f64),
            Some(other) => {
                debug!(
                    field = ?self.field,
                    found = other.type_name(),
                    "engine.increment.not_numeric"
                );
                return None;
            }
        };
        t.with_field(&self.field, next)
    }
}

#[async_trait]
impl Processor for Increment {
    fn name(&self) -> &'static str {
        "Increment"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() {
                t
            } else {
                self.apply(&t).unwrap_or(t)
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryGraph;
    use crate::engine::processors::testing::{at, context, run_stage};
    use crate::model::{DataElement, PathStep};
    use std::sync::Arc;

    fn ann() -> DataElement {
        DataElement::vertex("1", "person")
            .with_property("name", "ann")
            .with_property("age", 30)
            .with_property("tags", vec!["a", "b"])
    }

    fn ctx() -> ProcessContext {
        context(Arc::new(MemoryGraph::new()))
    }

    #[test]
    fn templates_render_recursively() {
        let t = at(ann()).with_mark("me");
        let template: Value = serde_json::from_str(
            r#"{"who": "$.name", "ids": ["$me._gid", "$.missing"], "n": 1, "lit": "plain"}"#,
        )
        .unwrap();
        let doc = render(&t, &template);
        let expected: Value = serde_json::from_str(
            r#"{"who": "ann", "ids": ["1", null], "n": 1, "lit": "plain"}"#,
        )
        .unwrap();
        assert_eq!(doc, expected);
    }

    #[tokio::test]
    async fn path_stage_reports_walk() {
        let t = at(ann()).with_current(Some(DataElement::edge("e", "knows", "1", "2")));
        let out = run_stage(&PathStage, ctx(), vec![t]).await;
        assert_eq!(
            out[0].payload(),
            Some(&Payload::Path(vec![PathStep::Vertex("1".into()), PathStep::Edge("e".into())]))
        );
    }

    #[tokio::test]
    async fn fields_include_then_exclude() {
        let stage = Fields::new(&["name".into(), "age".into(), "-age".into(), "$x.name".into()]);
        let out = run_stage(&stage, ctx(), vec![at(ann()), Traveler::new()]).await;
        let el = out[0].current().unwrap();
        assert_eq!(el.data.keys().collect::<Vec<_>>(), vec!["name"]);
        assert_eq!(el.id, "1");
        assert!(out[1].current().is_none());

        let drop_only = run_stage(&Fields::new(&["-tags".into()]), ctx(), vec![at(ann())]).await;
        assert_eq!(drop_only[0].current().unwrap().data.len(), 2);
    }

    #[tokio::test]
    async fn unwind_fans_out_lists() {
        let out = run_stage(&Unwind::new("tags"), ctx(), vec![at(ann())]).await;
        let tags: Vec<_> = out
            .iter()
            .map(|t| t.current().unwrap().data["tags"].clone())
            .collect();
        assert_eq!(tags, vec![Value::from("a"), Value::from("b")]);

        let out = run_stage(&Unwind::new("missing"), ctx(), vec![at(ann())]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].current().unwrap().data["missing"], Value::Null);
    }

    #[tokio::test]
    async fn set_and_increment() {
        let t = at(ann()).with_mark("me");
        let out = run_stage(&Set::new("$me.city", "oslo".into()), ctx(), vec![t]).await;
        assert_eq!(out[0].mark("me").unwrap().data["city"], Value::from("oslo"));
        assert!(out[0].current().unwrap().data.get("city").is_none());

        let stage = Increment::new("age", 2);
        let out = run_stage(&stage, ctx(), vec![at(ann())]).await;
        assert_eq!(out[0].current().unwrap().data["age"], Value::Int(32));

        let out = run_stage(&Increment::new("visits", 5), ctx(), vec![at(ann())]).await;
        assert_eq!(out[0].current().unwrap().data["visits"], Value::Int(5));

        let out = run_stage(&Increment::new("name", 1), ctx(), vec![at(ann())]).await;
        assert_eq!(out[0].current().unwrap().data["name"], Value::from("ann"));
    }
}
