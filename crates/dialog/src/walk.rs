//! Debug traversal along a fixed choice path
//!
//! Walks the graph from a start node, taking the given child index at each
//! step, resolving jump and alias redirects, and rendering one printable line
//! per visited node. Inspection only; nothing is mutated.

use stagehand_document::Localization;

use crate::error::DialogError;
use crate::graph::DialogTree;
use crate::types::DialogNodeKind;

/// One visited node on a walked path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub uuid: String,
    pub kind: DialogNodeKind,
    pub speaker: Option<i64>,
    /// Resolved default line, if the node (or its alias source) has one
    pub text: Option<String>,
}

impl PathStep {
    pub fn render(&self) -> String {
        let speaker = self
            .speaker
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        match &self.text {
            Some(text) => format!("[{}] speaker={speaker} {text}", self.kind.tag()),
            None => format!("[{}] speaker={speaker}", self.kind.tag()),
        }
    }
}

/// Walk from `start_uuid`, taking `choices[i]` at the i-th branching point
///
/// Jump and alias nodes are followed transparently: the redirect target's
/// text is reported under the redirecting node's step. The walk ends when
/// choices are exhausted or a node has no children.
pub fn walk_path(
    tree: &mut DialogTree,
    start_uuid: &str,
    choices: &[usize],
    localization: &dyn Localization,
) -> Result<Vec<PathStep>, DialogError> {
    let mut steps = Vec::new();
    let mut current = start_uuid.to_string();
    let mut choices = choices.iter().copied();

    loop {
        let node = tree.node_by_uuid(&current)?;
        let (handle, kind, speaker, uuid) =
            (node.handle, node.kind.clone(), node.speaker, node.uuid.clone());

        // text comes from the node itself, or from the alias source
        let text_handle = match kind {
            DialogNodeKind::Alias => match tree.alias_source(handle) {
                Some(source) => {
                    let source = source.to_string();
                    let source_handle = tree.node_by_uuid(&source)?.handle;
                    tree.tagged_lines(source_handle)?.first().map(|l| l.handle.clone())
                }
                None => None,
            },
            _ => tree.tagged_lines(handle)?.first().map(|l| l.handle.clone()),
        };
        steps.push(PathStep {
            uuid: uuid.clone(),
            kind: kind.clone(),
            speaker,
            text: text_handle.map(|h| localization.resolve_or_handle(&h).to_string()),
        });

        if kind == DialogNodeKind::Jump {
            if let Some(target) = tree.jump_target(handle) {
                current = target.to_string();
                continue;
            }
        }

        let children = tree.children_uuids(handle)?;
        if children.is_empty() {
            break;
        }
        let choice = match children.len() {
            1 => 0,
            _ => match choices.next() {
                Some(c) => c,
                None => break,
            },
        };
        let next = children.get(choice).ok_or_else(|| DialogError::PathExhausted {
            node: uuid,
            choice,
            children: children.len(),
        })?;
        current = next.clone();
    }
    Ok(steps)
}
