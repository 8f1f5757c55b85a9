use std::collections::HashSet;

use inkflow_config::{BlockKind, NodeDef, NodeKind};

use crate::error::PlanError;
use crate::plan::{Block, Plan, Step};

/// An open block while scanning.
struct Frame {
  kind: BlockKind,
  block_id: String,
  start: NodeDef,
  body: Vec<Step>,
  else_node: Option<NodeDef>,
  else_body: Option<Vec<Step>>,
}

impl Frame {
  fn target(&mut self) -> &mut Vec<Step> {
    match &mut self.else_body {
      Some(else_body) => else_body,
      None => &mut self.body,
    }
  }
}

/// Nest a flat node list into a [`Plan`].
///
/// Nodes are ordered by `order_index` (stable, so ties keep list order) and
/// scanned once left to right with a stack of open blocks. Errors report the
/// node at which the problem was detected.
pub fn resolve(nodes: &[NodeDef]) -> Result<Plan, PlanError> {
  let mut ordered: Vec<&NodeDef> = nodes.iter().collect();
  ordered.sort_by_key(|node| node.order_index);

  validate_nodes(&ordered)?;

  let mut root: Vec<Step> = Vec::new();
  let mut stack: Vec<Frame> = Vec::new();

  for node in ordered {
    if let Some(kind) = node.kind.opens_block() {
      let block_id = block_id_of(node)?;
      stack.push(Frame {
        kind,
        block_id,
        start: node.clone(),
        body: Vec::new(),
        else_node: None,
        else_body: None,
      });
      continue;
    }

    if node.kind == NodeKind::ConditionElse {
      let block_id = block_id_of(node)?;
      let frame = match stack.last_mut() {
        Some(frame) if frame.kind == BlockKind::Condition && frame.block_id == block_id => frame,
        _ => {
          return Err(PlanError::MisplacedElse {
            node_id: node.id.clone(),
          });
        }
      };
      if frame.else_node.is_some() {
        return Err(PlanError::DuplicateElse {
          node_id: node.id.clone(),
        });
      }
      frame.else_node = Some(node.clone());
      frame.else_body = Some(Vec::new());
      continue;
    }

    if let Some(kind) = node.kind.closes_block() {
      let block_id = block_id_of(node)?;
      let Some(frame) = stack.pop() else {
        return Err(PlanError::DanglingEnd {
          node_id: node.id.clone(),
        });
      };
      if frame.block_id != block_id {
        return Err(PlanError::UnbalancedEnd {
          node_id: node.id.clone(),
          expected: frame.block_id,
          found: block_id,
        });
      }
      if frame.kind != kind {
        return Err(PlanError::KindMismatch {
          node_id: node.id.clone(),
          expected: frame.kind,
          found: kind,
        });
      }

      let block = Step::Block(Block {
        kind: frame.kind,
        block_id: frame.block_id,
        start: frame.start,
        body: frame.body,
        else_node: frame.else_node,
        else_body: frame.else_body,
        end: node.clone(),
      });
      match stack.last_mut() {
        Some(parent) => parent.target().push(block),
        None => root.push(block),
      }
      continue;
    }

    let step = Step::Node(node.clone());
    match stack.last_mut() {
      Some(frame) => frame.target().push(step),
      None => root.push(step),
    }
  }

  if let Some(frame) = stack.pop() {
    return Err(PlanError::UnterminatedBlock {
      node_id: frame.start.id,
      block_id: frame.block_id,
    });
  }

  Ok(Plan { steps: root })
}

/// Check ids and the start node before building any structure.
fn validate_nodes(ordered: &[&NodeDef]) -> Result<(), PlanError> {
  let mut seen = HashSet::new();
  for node in ordered {
    if !seen.insert(node.id.as_str()) {
      return Err(PlanError::DuplicateNodeId {
        node_id: node.id.clone(),
      });
    }
  }

  let mut starts = ordered.iter().enumerate().filter(|(_, n)| n.kind == NodeKind::Start);
  let Some((position, first_start)) = starts.next() else {
    return Err(PlanError::MissingStart);
  };
  if position != 0 {
    return Err(PlanError::StartNotFirst {
      node_id: first_start.id.clone(),
    });
  }
  if let Some((_, extra)) = starts.next() {
    return Err(PlanError::DuplicateStart {
      node_id: extra.id.clone(),
    });
  }

  Ok(())
}

fn block_id_of(node: &NodeDef) -> Result<String, PlanError> {
  match node.block_id.as_deref() {
    Some(id) if !id.is_empty() => Ok(id.to_string()),
    _ => Err(PlanError::MissingBlockId {
      node_id: node.id.clone(),
      kind: node.kind,
    }),
  }
}
