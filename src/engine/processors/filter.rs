//! Filtering stages.
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::engine::eval;
use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::model::path::FieldPath;
use crate::model::Traveler;
use crate::query::HasExpression;

/// Test applied by a [`Filter`].
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Boolean expression over traveler fields.
    Expr(HasExpression),
    /// Current element carries one of the labels.
    Label(Vec<String>),
    /// Current element carries every property key.
    Key(Vec<String>),
    /// Current element id is listed.
    Id(Vec<String>),
}

impl Predicate {
    fn test(&self, t: &Traveler) -> bool {
        match self {
            Predicate::Expr(expr) => eval::matches(t, expr),
            Predicate::Label(labels) => t.current().is_some_and(|c| labels.contains(&c.label)),
            Predicate::Id(ids) => t.current().is_some_and(|c| ids.contains(&c.id)),
            Predicate::Key(keys) => {
                t.current().is_some()
                    && keys
                        .iter()
                        .all(|k| t.resolve(&FieldPath::property(k)).is_some())
            }
        }
    }
}

/// Forwards travelers passing a predicate.
#[derive(Debug, Clone)]
pub struct Filter {
    predicate: Predicate,
}

impl Filter {
    /// Filter stage for `predicate`.
    pub fn new(predicate: Predicate) -> Self {
        Self { predicate }
    }
}

#[async_trait]
impl Processor for Filter {
    fn name(&self) -> &'static str {
        match self.predicate {
            Predicate::Expr(_) => "Has",
            Predicate::Label(_) => "HasLabel",
            Predicate::Key(_) => "HasKey",
            Predicate::Id(_) => "HasId",
        }
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            if (t.is_signal() || self.predicate.test(&t)) && !emit(&ctx, &output, t).await {
                return;
            }
        }
    }
}

/// Drops travelers whose selected field values were already seen.
///
/// Keys are the JSON encodings of the selected values joined by a zero byte,
/// kept in a scratch store private to the stage. Absent fields contribute an
/// empty segment; a traveler with every field absent is always forwarded.
#[derive(Debug, Clone)]
pub struct Distinct {
    fields: Vec<FieldPath>,
}

impl Distinct {
    /// Stage deduplicating on `fields`; an empty list uses the element id.
    pub fn new(fields: &[String]) -> Self {
        let fields = if fields.is_empty() {
            vec![FieldPath::parse("_gid")]
        } else {
            fields.iter().map(|f| FieldPath::parse(f)).collect()
        };
        Self { fields }
    }

    fn key(&self, t: &Traveler) -> Option<Vec<u8>> {
        let mut key = Vec::new();
        let mut present = false;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                key.push(0);
            }
            if let Some(value) = t.resolve(field) {
                present = true;
                // Encoding a Value cannot fail: map keys are always strings.
                if let Ok(bytes) = serde_json::to_vec(&value) {
                    key.extend(bytes);
                }
            }
        }
        present.then_some(key)
    }
}

#[async_trait]
impl Processor for Distinct {
    fn name(&self) -> &'static str {
        "Distinct"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        let seen = ctx.manager.open_kv();
        while let Some(t) = recv(&ctx, &mut input).await {
            if !t.is_signal() {
                if let Some(key) = self.key(&t) {
                    match seen.insert_new(&key, &[]) {
                        Ok(true) => {}
                        Ok(false) => continue,
                        Err(err) => {
                            warn!(error = %err, "engine.distinct.store_failed");
                            return;
                        }
                    }
                }
            }
            if !emit(&ctx, &output, t).await {
                return;
            }
        }
    }
}
