//! Stable structural hashing for plans.
//!
//! A fingerprint ignores node ids: two trees with the same shape and payloads
//! hash equal even when one was rebuilt with fresh ids. The pipeline uses this
//! to report whether a pass changed the plan or only renumbered it.

use blake3::Hasher;

use crate::plan::{ExchangeScope, JoinType, PlanKind, PlanNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        // blake3 hex(32b) is 64 hex chars
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }

    /// First 12 hex chars; enough to eyeball traces.
    pub fn short(&self) -> String {
        let mut s = self.to_hex();
        s.truncate(12);
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Id-free structural hash of the tree rooted at `plan`.
pub fn fingerprint(plan: &PlanNode) -> Hash256 {
    let mut h = Hasher::new();
    feed(plan, &mut h);
    Hash256(h.finalize().into())
}

fn feed(node: &PlanNode, h: &mut Hasher) {
    feed_payload(node.kind(), h);
    let children = node.children();
    h.update(&(children.len() as u64).to_le_bytes());
    for child in children {
        feed(child, h);
    }
}

/// Every non-child field of `kind`, each length-prefixed so adjacent fields
/// cannot run together.
fn feed_payload(kind: &PlanKind, h: &mut Hasher) {
    feed_str(h, kind.name());
    match kind {
        PlanKind::Scan(n) => {
            feed_str(h, &n.table);
            feed_strs(h, &n.columns);
        }
        PlanKind::Values(n) => {
            feed_strs(h, &n.columns);
            h.update(&(n.rows.len() as u64).to_le_bytes());
            for row in &n.rows {
                feed_strs(h, row);
            }
        }
        PlanKind::Filter(n) => feed_str(h, &n.predicate),
        PlanKind::Project(n) => feed_strs(h, &n.columns),
        PlanKind::Limit(n) => {
            h.update(&n.count.to_le_bytes());
            h.update(&[u8::from(n.partial)]);
        }
        PlanKind::Sort(n) => feed_strs(h, &n.order_by),
        PlanKind::Aggregate(n) => {
            feed_strs(h, &n.group_by);
            feed_strs(h, &n.aggregates);
        }
        PlanKind::Exchange(n) => {
            let scope: u8 = match n.scope {
                ExchangeScope::Local => 0,
                ExchangeScope::Remote => 1,
            };
            h.update(&[scope]);
            feed_strs(h, &n.partitioning);
        }
        PlanKind::Join(n) => {
            let join_type: u8 = match n.join_type {
                JoinType::Inner => 0,
                JoinType::Left => 1,
                JoinType::Right => 2,
                JoinType::Full => 3,
            };
            h.update(&[join_type]);
            h.update(&(n.on.len() as u64).to_le_bytes());
            for (left, right) in &n.on {
                feed_str(h, left);
                feed_str(h, right);
            }
        }
        PlanKind::Output(n) => feed_strs(h, &n.columns),
    }
}

fn feed_str(h: &mut Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

fn feed_strs(h: &mut Hasher, items: &[String]) {
    h.update(&(items.len() as u64).to_le_bytes());
    for item in items {
        feed_str(h, item);
    }
}
