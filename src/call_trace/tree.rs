use serde_json::json;

use super::record::*;
use super::sexpr::*;

#[derive(Debug, Clone)]
pub struct CallPathTip {
    pub call: CallInfo,
    pub path_id: usize,
}

/// Prefix-sharing tree over the terminated call paths. The root carries no
/// call; among the children of any node no two tips are structurally equal.
#[derive(Debug)]
pub struct CallTree {
    tip: Option<CallPathTip>,
    children: Vec<CallTree>,
}

/// Consumer of the prefix dump: vends storage for one prefix file per group
/// and receives the warnings the walk produces.
pub trait PrefixSink {
    fn emit_prefix_file(&mut self, content: &str) -> Result<(), String>;

    fn warn_truncated(&mut self, callee: &str);
}

impl CallTree {
    pub fn new() -> Self {
        Self {
            tip: None,
            children: Vec::new(),
        }
    }

    pub fn tip(&self) -> Option<&CallPathTip> {
        self.tip.as_ref()
    }

    pub fn children(&self) -> &[CallTree] {
        &self.children
    }

    /// Number of nodes excluding the root; equals the number of distinct
    /// call-path prefixes inserted so far.
    pub fn size(&self) -> usize {
        self.children.iter().map(|c| 1 + c.size()).sum()
    }

    pub fn add_call_path(&mut self, path: &[CallInfo], path_id: usize) {
        if path.is_empty() {
            return;
        }
        let head = &path[0];
        let tail = &path[1..];
        for child in self.children.iter_mut() {
            if child.tip.as_ref().map_or(false, |t| t.call == *head) {
                child.add_call_path(tail, path_id);
                return;
            }
        }
        let mut node = CallTree {
            tip: Some(CallPathTip {
                call: head.clone(),
                path_id,
            }),
            children: Vec::new(),
        };
        node.add_call_path(tail, path_id);
        self.children.push(node);
    }

    /// Partition the children tips by invocation equivalence. Group order is
    /// first-appearance order of the representatives; within a group the
    /// order follows `children`.
    pub fn group_children(&self) -> Vec<Vec<&CallPathTip>> {
        let mut groups: Vec<Vec<&CallPathTip>> = Vec::new();
        for child in self.children.iter() {
            let tip = child.tip.as_ref().unwrap();
            match groups.iter_mut().find(|g| g[0].call.same_invocation(&tip.call)) {
                Some(group) => group.push(tip),
                None => groups.push(vec![tip]),
            }
        }
        groups
    }

    /// Number of prefix files a full dump would emit.
    pub fn count_prefix_groups(&self) -> usize {
        self.group_children().len() + self.children.iter().map(|c| c.count_prefix_groups()).sum::<usize>()
    }

    /// Pre-order walk emitting one prefix file per group of sibling tips:
    /// the accumulated history from the root, then the serialized tip of
    /// every call in the group. A record that fails to serialize truncates
    /// the file at that record and is reported through the sink.
    pub fn dump_call_prefixes_sexpr(
        &self,
        accumulated_prefix: &mut Vec<CallInfo>,
        sink: &mut dyn PrefixSink,
    ) -> Result<(), String> {
        for group in self.group_children() {
            let mut content = String::new();
            let mut truncated = false;
            content.push_str("((history (\n");
            for ci in accumulated_prefix.iter() {
                let mut record = String::new();
                match dump_call_info_sexpr(ci, &mut record) {
                    Ok(()) => content.push_str(&record),
                    Err(_) => {
                        sink.warn_truncated(&ci.callee);
                        truncated = true;
                        break;
                    }
                }
            }
            if !truncated {
                content.push_str("))\n");
                content.push_str("(tip_calls (\n");
                for tip in group.iter() {
                    let mut record = String::new();
                    content.push_str(&format!("; id: {}({})\n", tip.path_id, tip.call.call_line));
                    match dump_call_info_sexpr(&tip.call, &mut record) {
                        Ok(()) => content.push_str(&record),
                        Err(_) => {
                            sink.warn_truncated(&tip.call.callee);
                            truncated = true;
                            break;
                        }
                    }
                }
            }
            if !truncated {
                content.push_str(")))\n");
            }
            sink.emit_prefix_file(&content)?;
        }
        for child in self.children.iter() {
            accumulated_prefix.push(child.tip.as_ref().unwrap().call.clone());
            child.dump_call_prefixes_sexpr(accumulated_prefix, sink)?;
            accumulated_prefix.pop();
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        let children: Vec<serde_json::Value> = self.children.iter().map(|c| c.to_json()).collect();
        match &self.tip {
            Some(tip) => json!({
                "call": tip.call,
                "path_id": tip.path_id,
                "children": children,
            }),
            None => json!({ "children": children }),
        }
    }
}
