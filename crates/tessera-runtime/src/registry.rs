use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tessera_schema::OperatorSchema;
use tracing::{info, warn};

use crate::operator::Operator;

/// Operators exposed by this node, keyed by operator id.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
  operators: Arc<RwLock<HashMap<String, Arc<Operator>>>>,
}

impl OperatorRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an operator. An operator already registered under the same id is
  /// replaced.
  pub fn register(&self, operator: Operator) {
    let id = operator.id().to_string();
    let mut operators = self.operators.write().unwrap_or_else(|e| e.into_inner());
    if operators.insert(id.clone(), Arc::new(operator)).is_some() {
      warn!(operator_id = %id, "operator re-registered, replacing previous definition");
    } else {
      info!(operator_id = %id, "operator registered");
    }
  }

  pub fn get(&self, operator_id: &str) -> Option<Arc<Operator>> {
    self
      .operators
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(operator_id)
      .cloned()
  }

  pub fn len(&self) -> usize {
    self.operators.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Metadata for every operator, sorted by id.
  pub fn schemas(&self) -> Vec<OperatorSchema> {
    let mut schemas: Vec<OperatorSchema> = self
      .operators
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .values()
      .map(|op| op.schema().clone())
      .collect();
    schemas.sort_by(|a, b| a.operator_id.cmp(&b.operator_id));
    schemas
  }
}
