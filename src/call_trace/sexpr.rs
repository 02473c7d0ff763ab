//! S-expression rendering of call records, the shape consumed by downstream
//! verification tooling. Serializers write into a per-record buffer so that a
//! failing record leaves no partial output behind.

use std::collections::BTreeMap;

use crate::expr::ExprRef;

use super::record::*;

fn traced_in_val(pointee: &FieldDescr) -> Result<&ExprRef, String> {
    pointee
        .in_val
        .as_ref()
        .ok_or_else(|| format!("absent traced in-value for {}", pointee.name))
}

fn traced_out_val(pointee: &FieldDescr) -> Result<&ExprRef, String> {
    pointee
        .out_val
        .as_ref()
        .ok_or_else(|| format!("absent traced out-value for {}", pointee.name))
}

pub fn dump_fields_in_sexpr(fields: &BTreeMap<i32, FieldDescr>, out: &mut String) -> Result<(), String> {
    out.push_str("(break_down (");
    for field in fields.values() {
        out.push_str(&format!("\n((fname \"{}\") (value ", field.name));
        dump_pointee_in_sexpr(field, out)?;
        out.push_str(&format!(") (addr {}))", field.addr));
    }
    out.push_str("))");
    Ok(())
}

pub fn dump_pointee_in_sexpr(pointee: &FieldDescr, out: &mut String) -> Result<(), String> {
    out.push_str("((full (");
    if pointee.do_trace_value_in {
        out.push_str(&format!("{}", traced_in_val(pointee)?));
    }
    out.push_str("))\n (sname (");
    if !pointee.ty.is_empty() {
        out.push_str(&pointee.ty);
    }
    out.push_str("))\n");
    dump_fields_in_sexpr(&pointee.fields, out)?;
    out.push_str(")");
    Ok(())
}

pub fn dump_fields_out_sexpr(fields: &BTreeMap<i32, FieldDescr>, out: &mut String) -> Result<(), String> {
    out.push_str("(break_down (");
    for field in fields.values() {
        out.push_str(&format!("\n((fname \"{}\") (value ", field.name));
        dump_pointee_out_sexpr(field, out)?;
        out.push_str(&format!(") (addr {}))", field.addr));
    }
    out.push_str("))");
    Ok(())
}

pub fn dump_pointee_out_sexpr(pointee: &FieldDescr, out: &mut String) -> Result<(), String> {
    out.push_str("((full (");
    if pointee.do_trace_value_out {
        out.push_str(&format!("{}", traced_out_val(pointee)?));
    }
    out.push_str("))\n (sname (");
    if !pointee.ty.is_empty() {
        out.push_str(&pointee.ty);
    }
    out.push_str("))\n");
    dump_fields_out_sexpr(&pointee.fields, out)?;
    out.push_str(")");
    Ok(())
}

pub fn dump_call_arg_sexpr(arg: &CallArg, out: &mut String) -> Result<(), String> {
    out.push_str(&format!("\n((aname \"{}\")\n", arg.name));
    out.push_str(&format!("(value {})\n", arg.expr));
    out.push_str("(ptr ");
    if arg.is_ptr {
        match &arg.fun_ptr {
            None => {
                if arg.pointee.traced() {
                    out.push_str("(Curioptr\n((before ");
                    dump_pointee_in_sexpr(&arg.pointee, out)?;
                    out.push_str(")\n(after ");
                    dump_pointee_out_sexpr(&arg.pointee, out)?;
                    out.push_str(")))\n");
                } else {
                    out.push_str("Apathptr");
                }
            }
            Some(fun_name) => {
                out.push_str(&format!("(Funptr \"{}\")", fun_name));
            }
        }
    } else {
        out.push_str("Nonptr");
    }
    out.push_str("))");
    Ok(())
}

pub fn dump_ret_sexpr(ret: &RetVal, out: &mut String) -> Result<(), String> {
    match &ret.expr {
        None => {
            out.push_str("(ret ())");
            Ok(())
        }
        Some(expr) => {
            out.push_str(&format!("(ret (((value {})\n", expr));
            out.push_str("(ptr ");
            if ret.is_ptr {
                match &ret.fun_ptr {
                    None => {
                        if ret.pointee.traced() {
                            out.push_str("(Curioptr ((before ((full ()) (break_down ()) (sname ()))) (after ");
                            dump_pointee_out_sexpr(&ret.pointee, out)?;
                            out.push_str(")))\n");
                        } else {
                            out.push_str("Apathptr");
                        }
                    }
                    Some(fun_name) => {
                        out.push_str(&format!("(Funptr \"{}\")", fun_name));
                    }
                }
            } else {
                out.push_str("Nonptr");
            }
            out.push_str("))))\n");
            Ok(())
        }
    }
}

pub fn dump_extra_ptr_sexpr(extra: &CallExtraPtr, out: &mut String) -> Result<(), String> {
    out.push_str(&format!("\n((pname \"{}\")\n", extra.name));
    out.push_str(&format!("(value {})\n", extra.ptr));
    out.push_str("(ptee ");
    if extra.accessible_in {
        if extra.accessible_out {
            out.push_str("(Changing (");
            dump_pointee_in_sexpr(&extra.pointee, out)?;
            out.push_str("\n");
            dump_pointee_out_sexpr(&extra.pointee, out)?;
            out.push_str("))\n");
        } else {
            out.push_str("(Closing ");
            dump_pointee_in_sexpr(&extra.pointee, out)?;
            out.push_str(")\n");
        }
    } else {
        if extra.accessible_out {
            out.push_str("(Opening ");
            dump_pointee_out_sexpr(&extra.pointee, out)?;
            out.push_str(")\n");
        } else {
            return Err(format!(
                "extra pointer {} is accessible neither at function entry nor at its end",
                extra.name
            ));
        }
    }
    out.push_str("))\n");
    Ok(())
}

pub fn dump_call_info_sexpr(ci: &CallInfo, out: &mut String) -> Result<(), String> {
    assert!(ci.returned);
    out.push_str(&format!("((fun_name \"{}\")\n (args (", ci.callee));
    for arg in ci.args.iter() {
        dump_call_arg_sexpr(arg, out)?;
    }
    out.push_str("))\n");
    out.push_str("(extra_ptrs (");
    for extra in ci.extra_ptrs.values() {
        dump_extra_ptr_sexpr(extra, out)?;
    }
    out.push_str("))\n");
    dump_ret_sexpr(&ci.ret, out)?;
    out.push_str("(call_context (");
    for expr in ci.call_context.iter() {
        out.push_str(&format!("\n{}", expr));
    }
    out.push_str("))\n");
    out.push_str("(ret_context (");
    for expr in ci.return_context.iter() {
        out.push_str(&format!("\n{}", expr));
    }
    out.push_str(")))\n");
    Ok(())
}
