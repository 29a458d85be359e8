//! Mark, select and jump stages.
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::engine::eval;
use crate::engine::processors::{emit, recv, ProcessContext, Processor};
use crate::model::{Payload, Traveler};
use crate::query::HasExpression;

/// Captures the current element under a name.
#[derive(Debug, Clone)]
pub struct Mark {
    name: String,
}

impl Mark {
    /// Stage capturing under `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Processor for Mark {
    fn name(&self) -> &'static str {
        "As"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            let next = if t.is_signal() { t } else { t.with_mark(&self.name) };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Replaces the current element with one mark, or emits a selection of
/// several.
#[derive(Debug, Clone)]
pub struct Select {
    marks: Vec<String>,
}

impl Select {
    /// Stage selecting `marks`.
    pub fn new(marks: Vec<String>) -> Self {
        Self { marks }
    }

    fn select(&self, t: &Traveler) -> Option<Traveler> {
        if let [single] = self.marks.as_slice() {
            return t.jump_to(single);
        }
        let selection = self
            .marks
            .iter()
            .map(|name| (name.clone(), t.mark(name).cloned()))
            .collect();
        Some(t.with_payload(Payload::Selection(selection)))
    }
}

#[async_trait]
impl Processor for Select {
    fn name(&self) -> &'static str {
        "Select"
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
                match self.select(&t) {
                    Some(next) => next,
                    None => {
                        debug!(marks = ?self.marks, "engine.select.mark_missing");
                        continue;
                    }
                }
            };
            if !emit(&ctx, &output, next).await {
                return;
            }
        }
    }
}

/// Moves travelers matching an optional condition back to a marked element.
/// With `emit` set the traveler is also forwarded where it stood.
#[derive(Debug, Clone)]
pub struct Jump {
    mark: String,
    condition: Option<HasExpression>,
    emit: bool,
}

impl Jump {
    /// Jump stage.
    pub fn new(mark: impl Into<String>, condition: Option<HasExpression>, emit: bool) -> Self {
        Self {
            mark: mark.into(),
            condition,
            emit,
        }
    }
}

#[async_trait]
impl Processor for Jump {
    fn name(&self) -> &'static str {
        "Jump"
    }

    async fn process(
        &self,
        ctx: ProcessContext,
        mut input: mpsc::Receiver<Traveler>,
        output: mpsc::Sender<Traveler>,
    ) {
        while let Some(t) = recv(&ctx, &mut input).await {
            if t.is_signal() {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            let jumps = self.condition.as_ref().map_or(true, |c| eval::matches(&t, c));
            if !jumps {
                if !emit(&ctx, &output, t).await {
                    return;
                }
                continue;
            }
            let Some(moved) = t.jump_to(&self.mark) else {
                debug!(mark = %self.mark, "engine.jump.mark_missing");
                continue;
            };
            if self.emit && !emit(&ctx, &output, t).await {
                return;
            }
            if !emit(&ctx, &output, moved).await {
                return;
            }
        }
    }
}
