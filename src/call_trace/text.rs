//! Plaintext rendering of call paths: one line per call, `extra:` lines for
//! the additional traced pointers.

use crate::expr::ExprRef;

use super::record::*;

pub fn dump_call_info(ci: &CallInfo, out: &mut String) -> Result<(), String> {
    assert!(ci.returned);
    out.push_str(&format!("{}:{}(", ci.call_line, ci.callee));
    for (i, arg) in ci.args.iter().enumerate() {
        out.push_str(&format!("{}:{}", arg.name, arg.expr));
        if arg.is_ptr {
            out.push_str("&");
            match &arg.fun_ptr {
                None => {
                    if arg.pointee.traced() {
                        out.push_str("[");
                        if arg.pointee.do_trace_value_in {
                            out.push_str(&format!("{}", traced_in(&arg.pointee)?));
                        }
                        out.push_str("->");
                        if arg.pointee.do_trace_value_out {
                            out.push_str(&format!("{}", traced_out(&arg.pointee)?));
                        }
                        out.push_str("]");
                        for field in arg.pointee.fields.values() {
                            out.push_str(&format!("[{}:", field.name));
                            if field.traced() {
                                if field.do_trace_value_in {
                                    out.push_str(&format!("{}", traced_in(field)?));
                                }
                                out.push_str("->");
                                if field.do_trace_value_out {
                                    out.push_str(&format!("{}", traced_out(field)?));
                                }
                                out.push_str("]");
                            } else {
                                out.push_str("(...)]");
                            }
                        }
                    } else {
                        out.push_str("[...]");
                    }
                }
                Some(fun_name) => {
                    out.push_str(fun_name);
                }
            }
        }
        if i + 1 != ci.args.len() {
            out.push_str(",");
        }
    }
    out.push_str(") -> ");
    match &ci.ret.expr {
        None => {
            out.push_str("[]");
        }
        Some(expr) => {
            out.push_str(&format!("{}", expr));
            if ci.ret.is_ptr {
                out.push_str("&");
                match &ci.ret.fun_ptr {
                    None => {
                        if ci.ret.pointee.do_trace_value_out {
                            out.push_str(&format!("[{}]", traced_out(&ci.ret.pointee)?));
                            for field in ci.ret.pointee.fields.values() {
                                out.push_str(&format!("[{}:", field.name));
                                if field.do_trace_value_out {
                                    out.push_str(&format!("{}]", traced_out(field)?));
                                } else {
                                    out.push_str("(...)]");
                                }
                            }
                        } else {
                            out.push_str("[...]");
                        }
                    }
                    Some(fun_name) => {
                        out.push_str(fun_name);
                    }
                }
            }
        }
    }
    out.push_str("\n");
    for extra in ci.extra_ptrs.values() {
        // Observed rendering: raw in/out values, asymmetric arrow spacing.
        out.push_str(&format!("extra: {}&{} = &[", extra.name, extra.ptr));
        if extra.pointee.do_trace_value_in {
            out.push_str(&format!("{}", traced_in(&extra.pointee)?));
        } else {
            out.push_str("(...)");
        }
        if extra.pointee.do_trace_value_out {
            out.push_str(&format!(" -> {}", traced_out(&extra.pointee)?));
        } else {
            out.push_str("-> (...)");
        }
        out.push_str("]\n");
    }
    Ok(())
}

fn traced_in(pointee: &FieldDescr) -> Result<&ExprRef, String> {
    pointee
        .in_val
        .as_ref()
        .ok_or_else(|| format!("absent traced in-value for {}", pointee.name))
}

fn traced_out(pointee: &FieldDescr) -> Result<&ExprRef, String> {
    pointee
        .out_val
        .as_ref()
        .ok_or_else(|| format!("absent traced out-value for {}", pointee.name))
}

/// Render a terminated path's plaintext trace. A call whose record fails to
/// serialize truncates the dump at that call; the constraint section is
/// still emitted. Returns the content and the callee of the truncating call,
/// if any.
pub fn render_call_path(path: &[CallInfo], constraints: &[ExprRef]) -> (String, Option<String>) {
    let mut out = String::new();
    let mut truncated = None;
    for ci in path.iter() {
        let mut record = String::new();
        match dump_call_info(ci, &mut record) {
            Ok(()) => out.push_str(&record),
            Err(_) => {
                truncated = Some(ci.callee.clone());
                break;
            }
        }
    }
    out.push_str(";;-- Constraints --\n");
    for c in constraints.iter() {
        out.push_str(&format!("{}\n", c));
    }
    (out, truncated)
}

/// The per-test variant of the trace: the delegated kquery dump first, then
/// the calls and the constraint section.
pub fn render_call_trace_with_query(
    query: &str,
    path: &[CallInfo],
    constraints: &[ExprRef],
) -> (String, Option<String>) {
    let mut out = String::new();
    out.push_str(";;-- kQuery --\n");
    out.push_str(query);
    if !query.ends_with('\n') && !query.is_empty() {
        out.push_str("\n");
    }
    out.push_str(";;-- Calls --\n");
    let (calls, truncated) = render_call_path(path, constraints);
    out.push_str(&calls);
    (out, truncated)
}
