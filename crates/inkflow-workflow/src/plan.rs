use inkflow_config::{BlockKind, NodeDef};
use serde::{Deserialize, Serialize};

/// A validated, nested workflow ready for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  pub steps: Vec<Step>,
}

/// One unit of the plan: a single node or a whole block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum Step {
  Node(NodeDef),
  Block(Block),
}

/// A matched start/end pair and the steps between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
  pub kind: BlockKind,
  pub block_id: String,
  pub start: NodeDef,
  pub body: Vec<Step>,
  /// Only condition blocks have an else branch.
  pub else_node: Option<NodeDef>,
  pub else_body: Option<Vec<Step>>,
  pub end: NodeDef,
}

impl Plan {
  /// Number of non-marker nodes in the plan, counting every branch once.
  pub fn node_count(&self) -> usize {
    count_nodes(&self.steps)
  }

  /// Render an indented outline of the plan, one line per step.
  pub fn outline(&self) -> String {
    let mut out = String::new();
    write_outline(&self.steps, 0, &mut out);
    out
  }
}

impl Step {
  pub fn id(&self) -> &str {
    match self {
      Step::Node(node) => &node.id,
      Step::Block(block) => &block.start.id,
    }
  }
}

fn count_nodes(steps: &[Step]) -> usize {
  steps
    .iter()
    .map(|step| match step {
      Step::Node(_) => 1,
      Step::Block(block) => {
        count_nodes(&block.body) + block.else_body.as_deref().map_or(0, count_nodes)
      }
    })
    .sum()
}

fn write_outline(steps: &[Step], depth: usize, out: &mut String) {
  let indent = "  ".repeat(depth);
  for step in steps {
    match step {
      Step::Node(node) => {
        out.push_str(&format!("{indent}{} [{}] {}\n", node.id, node.kind, node.name));
      }
      Step::Block(block) => {
        out.push_str(&format!(
          "{indent}{} block '{}' ({})\n",
          block.kind, block.block_id, block.start.name
        ));
        write_outline(&block.body, depth + 1, out);
        if let Some(else_body) = &block.else_body {
          out.push_str(&format!("{indent}else\n"));
          write_outline(else_body, depth + 1, out);
        }
        out.push_str(&format!("{indent}end '{}'\n", block.block_id));
      }
    }
  }
}
