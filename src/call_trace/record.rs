use serde::Serialize;
use std::collections::BTreeMap;

use crate::expr::*;

/// One named slot of a traced pointee. `in_val` is present iff the in-value
/// is traced; same for `out_val`, with the caveat that an out-value can be
/// found absent at dump time, which fails serialization of the enclosing
/// record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescr {
    pub name: String,
    pub ty: String,
    pub addr: u64,
    pub do_trace_value_in: bool,
    pub in_val: Option<ExprRef>,
    pub do_trace_value_out: bool,
    pub out_val: Option<ExprRef>,
    // Nested fields keyed by byte offset
    pub fields: BTreeMap<i32, FieldDescr>,
}

impl FieldDescr {
    /// A pointee with no traced value ("path pointer" target).
    pub fn opaque(name: &str, ty: &str, addr: u64) -> Self {
        Self {
            name: name.to_string(),
            ty: ty.to_string(),
            addr,
            do_trace_value_in: false,
            in_val: None,
            do_trace_value_out: false,
            out_val: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn traced(&self) -> bool {
        self.do_trace_value_in || self.do_trace_value_out
    }

    /// Structural comparison: trace flags and nested field offsets, ignoring
    /// the carried values. This is the field dimension of invocation
    /// equivalence.
    pub fn same_shape(&self, other: &FieldDescr) -> bool {
        self.do_trace_value_in == other.do_trace_value_in
            && self.do_trace_value_out == other.do_trace_value_out
            && self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(other.fields.iter())
                .all(|((off_a, fld_a), (off_b, fld_b))| off_a == off_b && fld_a.same_shape(fld_b))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallArg {
    pub name: String,
    pub expr: ExprRef,
    pub is_ptr: bool,
    pub fun_ptr: Option<String>,
    // Ignored when `fun_ptr` is set
    pub pointee: FieldDescr,
}

/// A pointer the user asked to trace across the call although it is not one
/// of the call's formal parameters. It must be accessible at entry, at
/// return, or both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallExtraPtr {
    pub name: String,
    pub ptr: u64,
    pub accessible_in: bool,
    pub accessible_out: bool,
    pub pointee: FieldDescr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetVal {
    // Absent for void calls
    pub expr: Option<ExprRef>,
    pub is_ptr: bool,
    pub fun_ptr: Option<String>,
    pub pointee: FieldDescr,
}

impl RetVal {
    pub fn void() -> Self {
        Self {
            expr: None,
            is_ptr: false,
            fun_ptr: None,
            pointee: FieldDescr::opaque("", "", 0),
        }
    }
}

/// One intercepted call, finalized when the callee returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallInfo {
    pub callee: String,
    pub call_line: u32,
    pub args: Vec<CallArg>,
    // Extra pointers keyed by the traced address
    pub extra_ptrs: BTreeMap<u64, CallExtraPtr>,
    pub ret: RetVal,
    pub returned: bool,
    // Path constraints accumulated at entry
    pub call_context: Vec<ExprRef>,
    // Constraints added during the call
    pub return_context: Vec<ExprRef>,
}

pub type CallPath = Vec<CallInfo>;

impl CallInfo {
    /// Invocation equivalence: same callee, same pointer shape of arguments
    /// and return value, same traced-field structure, same call context.
    /// Return context and out-values are exactly the dimensions grouped over.
    pub fn same_invocation(&self, other: &CallInfo) -> bool {
        if self.callee != other.callee || self.args.len() != other.args.len() {
            return false;
        }
        let args_match = self.args.iter().zip(other.args.iter()).all(|(a, b)| {
            a.is_ptr == b.is_ptr && a.fun_ptr.is_some() == b.fun_ptr.is_some() && a.pointee.same_shape(&b.pointee)
        });
        if !args_match {
            return false;
        }
        let extras_match = self.extra_ptrs.len() == other.extra_ptrs.len()
            && self
                .extra_ptrs
                .iter()
                .zip(other.extra_ptrs.iter())
                .all(|((ptr_a, a), (ptr_b, b))| {
                    ptr_a == ptr_b
                        && a.accessible_in == b.accessible_in
                        && a.accessible_out == b.accessible_out
                        && a.pointee.same_shape(&b.pointee)
                });
        extras_match
            && self.ret.expr.is_some() == other.ret.expr.is_some()
            && self.ret.is_ptr == other.ret.is_ptr
            && self.ret.fun_ptr.is_some() == other.ret.fun_ptr.is_some()
            && self.ret.pointee.same_shape(&other.ret.pointee)
            && self.call_context == other.call_context
    }

    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        serde_json::to_value(self).map_err(|_| String::from("Cannot serialize call record"))
    }
}
