//! Query execution history
//!
//! Append-only log of executed statements per owner scope, consumed by the
//! history and progress collaborators. Each scope keeps at most `capacity`
//! records; the oldest are evicted first.

use crate::types::{OwnerScope, Timestamp};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExecutionRecord {
    pub statement_text: String,
    pub success: bool,
    pub execution_time_ms: f64,
    pub owner_scope: OwnerScope,
    pub timestamp: Timestamp,
}

pub struct QueryHistory {
    capacity: usize,
    logs: DashMap<OwnerScope, VecDeque<QueryExecutionRecord>>,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: DashMap::new(),
        }
    }

    pub fn append(&self, record: QueryExecutionRecord) {
        let mut log = self.logs.entry(record.owner_scope.clone()).or_default();
        if log.len() == self.capacity {
            log.pop_front();
        }
        log.push_back(record);
    }

    /// Records of `scope`, oldest first.
    pub fn records(&self, scope: &OwnerScope) -> Vec<QueryExecutionRecord> {
        self.logs
            .get(scope)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, scope: &OwnerScope) -> usize {
        self.logs.get(scope).map(|log| log.len()).unwrap_or(0)
    }

    /// Hand a session's records to the user that claimed it. Existing
    /// records are left untouched; the moved ones keep their original
    /// scope.
    pub fn transfer(&self, from: &OwnerScope, to: &OwnerScope) {
        let moved = match self.logs.remove(from) {
            Some((_, log)) => log,
            None => return,
        };
        let mut log = self.logs.entry(to.clone()).or_default();
        let mut merged: Vec<QueryExecutionRecord> = log.drain(..).chain(moved).collect();
        merged.sort_by_key(|r| r.timestamp);
        let skip = merged.len().saturating_sub(self.capacity);
        log.extend(merged.into_iter().skip(skip));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(scope: &OwnerScope, text: &str, at: i64) -> QueryExecutionRecord {
        QueryExecutionRecord {
            statement_text: text.into(),
            success: true,
            execution_time_ms: 0.1,
            owner_scope: scope.clone(),
            timestamp: Timestamp::from_millis(at),
        }
    }

    #[test]
    fn test_bounded_per_scope() {
        let history = QueryHistory::new(2);
        let a = OwnerScope::session("a");
        let b = OwnerScope::session("b");

        history.append(record(&a, "SELECT 1", 1));
        history.append(record(&a, "SELECT 2", 2));
        history.append(record(&a, "SELECT 3", 3));
        history.append(record(&b, "SELECT 4", 4));

        let texts: Vec<String> = history
            .records(&a)
            .into_iter()
            .map(|r| r.statement_text)
            .collect();
        assert_eq!(texts, vec!["SELECT 2", "SELECT 3"]);
        assert_eq!(history.len(&b), 1);
        assert!(history.records(&OwnerScope::user("nobody")).is_empty());
    }

    #[test]
    fn test_transfer_merges_in_time_order() {
        let history = QueryHistory::new(3);
        let session = OwnerScope::session("s");
        let user = OwnerScope::user("u");

        history.append(record(&user, "u1", 1));
        history.append(record(&session, "s1", 2));
        history.append(record(&user, "u2", 3));
        history.append(record(&session, "s2", 4));

        history.transfer(&session, &user);
        let texts: Vec<String> = history
            .records(&user)
            .into_iter()
            .map(|r| r.statement_text)
            .collect();
        assert_eq!(texts, vec!["s1", "u2", "s2"]);
        assert_eq!(history.len(&session), 0);
    }
}
