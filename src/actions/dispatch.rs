//! Validation and delegation of action requests.

use std::sync::Arc;

use super::{ActionExecutor, ActionKind, ActionResult};

/// Maps action identifiers to the executor and normalises the outcome.
///
/// The table never returns an error: unknown kinds and missing parameters are
/// reported as unsuccessful [`ActionResult`]s, and the executor is called at
/// most once per dispatch.
#[derive(Clone)]
pub struct ActionTable {
    executor: Arc<dyn ActionExecutor>,
}

impl ActionTable {
    pub fn new(executor: Arc<dyn ActionExecutor>) -> Self {
        Self { executor }
    }

    pub fn dispatch(&self, kind: &str, parameter: Option<&str>) -> ActionResult {
        let Some(kind) = ActionKind::from_identifier(kind) else {
            return ActionResult::failed(format!("Ação desconhecida: {kind}"));
        };

        if kind == ActionKind::NoAction {
            return ActionResult::ok("Sem ação");
        }

        let parameter = parameter.map(str::trim).filter(|p| !p.is_empty());
        if kind.requires_parameter() && parameter.is_none() {
            return ActionResult::failed(format!("{kind} requer um parâmetro"));
        }

        log::debug!("actions: dispatching {kind} ({parameter:?})");
        self.executor.execute(kind, parameter)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
