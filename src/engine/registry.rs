//! Component call registry. The compiler reports every component invocation
//! it encounters through a [`CallSink`]; tooling (usage reports, attribute
//! checking) consumes the collected calls. Recording is best-effort and never
//! affects compilation.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::ast::{ComponentRef, Expr};

/// Shape of an attribute value, as far as it is statically known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LiteralKind {
    String,
    List,
    Map,
    Integer,
    Float,
    Boolean,
    Symbol,
    Function { arity: usize },
    Unknown,
}

pub fn literal_kind(expr: &Expr) -> LiteralKind {
    match expr {
        Expr::Str(_) => LiteralKind::String,
        Expr::List(_) => LiteralKind::List,
        Expr::Map(_) => LiteralKind::Map,
        Expr::Int(_) => LiteralKind::Integer,
        Expr::Float(_) => LiteralKind::Float,
        Expr::Bool(_) => LiteralKind::Boolean,
        Expr::Sym(_) => LiteralKind::Symbol,
        Expr::Capture { arity, .. } => LiteralKind::Function { arity: *arity },
        _ => LiteralKind::Unknown,
    }
}

/// Where and how one attribute was given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttrInfo {
    pub line: usize,
    pub column: usize,
    pub kind: LiteralKind,
}

/// One slot entry as seen at a call site.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SlotCallInfo {
    pub line: usize,
    pub attrs: BTreeMap<String, AttrInfo>,
}

/// One component invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentCall {
    pub target: ComponentRef,
    pub file: String,
    pub line: usize,
    /// Call carried an opaque spread attribute, so the attribute set is not
    /// statically complete.
    pub root: bool,
    pub attrs: BTreeMap<String, AttrInfo>,
    pub slots: BTreeMap<String, Vec<SlotCallInfo>>,
}

/// The sink refused the call because collection has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Receiver for component calls. Shared across compilations, so recording
/// takes `&self`.
pub trait CallSink: Sync {
    fn record(&self, call: ComponentCall) -> Result<(), SinkClosed>;
}

/// Default in-memory sink.
#[derive(Debug, Default)]
pub struct CallRegistry {
    calls: Mutex<Vec<ComponentCall>>,
    closed: AtomicBool,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop accepting calls. Later `record`s return [`SinkClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<ComponentCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CallSink for CallRegistry {
    fn record(&self, call: ComponentCall) -> Result<(), SinkClosed> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SinkClosed);
        }
        match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(call);
                Ok(())
            }
            Err(_) => Err(SinkClosed),
        }
    }
}
