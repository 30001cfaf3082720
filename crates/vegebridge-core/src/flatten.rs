// ── Topic flattener ──
//
// Turns a settings tree into `(topic path, payload)` pairs for the bus.
// `{"hub": {"name": "gate"}}` yields `hub_name -> gate` and then
// `hub -> {"name":"gate"}`: children come before their container.

use crate::model::SettingsNode;

/// Lazily flatten the children of `root`.
///
/// The iterator borrows the tree and holds only a traversal stack, so
/// calling `flatten` again (or cloning the iterator before use) yields the
/// identical sequence. A root that is not an object yields nothing.
pub fn flatten(root: &SettingsNode) -> Flatten<'_> {
    let mut stack = Vec::new();
    if let SettingsNode::Object(map) = root {
        for (key, child) in map.iter().rev() {
            stack.push(Frame::Enter {
                path: key.clone(),
                node: child,
            });
        }
    }
    Flatten { stack }
}

/// Iterator returned by [`flatten`].
#[derive(Debug, Clone)]
pub struct Flatten<'a> {
    stack: Vec<Frame<'a>>,
}

#[derive(Debug, Clone)]
enum Frame<'a> {
    /// Visit `node` for the first time.
    Enter { path: String, node: &'a SettingsNode },
    /// All children of a container have been emitted; emit the container.
    Exit { path: String, node: &'a SettingsNode },
}

impl<'a> Iterator for Flatten<'a> {
    type Item = (String, String);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Exit { path, node } => return Some((path, node.render())),
                Frame::Enter { path, node } => match node {
                    SettingsNode::Leaf(_) => return Some((path, node.render())),
                    SettingsNode::Object(map) => {
                        let children: Vec<Frame<'a>> = map
                            .iter()
                            .map(|(key, child)| Frame::Enter {
                                path: format!("{path}_{key}"),
                                node: child,
                            })
                            .collect();
                        self.stack.push(Frame::Exit { path, node });
                        self.stack.extend(children.into_iter().rev());
                    }
                    SettingsNode::Array(items) => {
                        let children: Vec<Frame<'a>> = items
                            .iter()
                            .enumerate()
                            .map(|(pos, item)| Frame::Enter {
                                path: element_path(&path, pos, item),
                                node: item,
                            })
                            .collect();
                        self.stack.push(Frame::Exit { path, node });
                        self.stack.extend(children.into_iter().rev());
                    }
                },
            }
        }
        None
    }
}

/// `P_k_{slot}` for slot objects, `P_k` for bare values. An object without
/// a slot identifier falls back to its position in the array.
fn element_path(array_path: &str, pos: usize, item: &SettingsNode) -> String {
    match item {
        SettingsNode::Object(_) => match item.slot_id() {
            Some(slot) => format!("{array_path}_{slot}"),
            None => format!("{array_path}_{pos}"),
        },
        _ => array_path.to_owned(),
    }
}
