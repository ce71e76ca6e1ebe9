//! Shared fixtures for the workspace integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use planx::core::prelude::*;
use planx::optimizer::OptimizerContext;

/// Session-scoped state an optimizer run borrows.
pub struct Env {
    pub session: Session,
    pub warnings: WarningCollector,
    pub ids: PlanNodeIdAllocator,
}

impl Env {
    pub fn new() -> Self {
        Self {
            session: Session::default(),
            warnings: WarningCollector::new(),
            ids: PlanNodeIdAllocator::new(),
        }
    }

    pub fn ctx(&self) -> OptimizerContext<'_> {
        OptimizerContext::new(&self.session, &self.warnings, &self.ids)
    }
}

pub fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Every node id reachable from `root`, in pre-order.
pub fn all_ids(root: &PlanRef) -> Vec<PlanNodeId> {
    let mut out = Vec::new();
    planx::core::plan::for_each_node(root, &mut |n| out.push(n.id()));
    out
}

/// In-memory log sink for asserting on emitted `tracing` events.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Run `f` with a WARN-level subscriber writing into this capture.
    pub fn capture<T>(&self, f: impl FnOnce() -> T) -> T {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
