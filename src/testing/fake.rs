//! In-memory application used by unit tests

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::actions::click_expression;
use crate::common::{Error, Result};
use crate::connection::Connection;
use crate::driver::{Driver, Target};

const DEFAULT_CONTEXT: &str = "default";

/// A page target in the default context
pub(crate) fn page(id: &str, url: &str) -> Target {
    Target {
        id: id.to_string(),
        url: url.to_string(),
        title: id.to_string(),
        context_id: Some(DEFAULT_CONTEXT.to_string()),
    }
}

/// Something a click does to the application
#[derive(Debug, Clone)]
pub(crate) enum Effect {
    Open(Target),
    Set {
        target: String,
        expression: String,
        value: Value,
    },
    Exit,
}

#[derive(Default)]
struct FakeState {
    targets: Vec<Target>,
    values: HashMap<(String, String), Value>,
    clicks: HashMap<String, Vec<(Duration, Effect)>>,
    pending: Vec<(Instant, Effect)>,
    exited: bool,
}

impl FakeState {
    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Open(target) => self.targets.push(target),
            Effect::Set {
                target,
                expression,
                value,
            } => {
                self.values.insert((target, expression), value);
            }
            Effect::Exit => {
                self.exited = true;
                self.targets.clear();
            }
        }
    }

    fn apply_due(&mut self) {
        let now = Instant::now();
        let (due, later): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.pending = later;
        for (_, effect) in due {
            self.apply(effect);
        }
    }
}

/// Handle used by a test to script the application
#[derive(Clone, Default)]
pub(crate) struct FakeApp {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApp {
    pub(crate) fn new(targets: Vec<Target>) -> Self {
        let app = Self::default();
        app.state.lock().unwrap().targets = targets;
        app
    }

    pub(crate) fn connect(&self) -> Connection {
        Connection::from_driver(
            "fake://app",
            FakeDriver {
                state: Arc::clone(&self.state),
                closed: false,
            },
        )
    }

    pub(crate) fn open(&self, target: Target) {
        self.state.lock().unwrap().targets.push(target);
    }

    pub(crate) fn close_window(&self, id: &str) {
        self.state.lock().unwrap().targets.retain(|t| t.id != id);
    }

    pub(crate) fn set(&self, target: &str, expression: &str, value: Value) {
        self.state
            .lock()
            .unwrap()
            .values
            .insert((target.to_string(), expression.to_string()), value);
    }

    pub(crate) fn exit(&self) {
        self.state.lock().unwrap().apply(Effect::Exit);
    }

    /// Register what clicking `selector` does, `delay` after the click
    pub(crate) fn on_click(&self, selector: &str, delay: Duration, effect: Effect) {
        self.state
            .lock()
            .unwrap()
            .clicks
            .entry(selector.to_string())
            .or_default()
            .push((delay, effect));
    }
}

struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
    closed: bool,
}

#[async_trait]
impl Driver for FakeDriver {
    async fn targets(&mut self) -> Result<Vec<Target>> {
        let mut state = self.state.lock().unwrap();
        state.apply_due();
        if state.exited {
            return Err(Error::Disconnected);
        }
        Ok(state.targets.clone())
    }

    async fn evaluate(&mut self, target_id: &str, expression: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        state.apply_due();
        if state.exited {
            return Err(Error::Disconnected);
        }
        if !state.targets.iter().any(|t| t.id == target_id) {
            return Err(Error::evaluation(expression, "No target with given id found"));
        }

        let clicked = state
            .clicks
            .iter()
            .find(|(selector, _)| click_expression(selector) == expression)
            .map(|(_, effects)| effects.clone());
        if let Some(effects) = clicked {
            let now = Instant::now();
            for (delay, effect) in effects {
                if delay.is_zero() {
                    state.apply(effect);
                } else {
                    state.pending.push((now + delay, effect));
                }
            }
            if state.exited {
                return Err(Error::Disconnected);
            }
            return Ok(Value::Bool(true));
        }
        if expression.starts_with("(() => { const el = document.querySelector(") {
            return Err(Error::evaluation(expression, "Error: no element matches selector"));
        }

        state
            .values
            .get(&(target_id.to_string(), expression.to_string()))
            .cloned()
            .ok_or_else(|| Error::evaluation(expression, "ReferenceError: not defined"))
    }

    async fn close(&mut self) {
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed || self.state.lock().unwrap().exited
    }
}
