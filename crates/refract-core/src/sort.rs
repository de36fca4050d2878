//! Canonical ordering of a change's ops.
//!
//! The converter walks ops one at a time, so placeholders must be filled
//! before anything references them: every `ins` is immediately followed by
//! its reifying op (`set`, or `make*` slotted before the `link`), and every
//! `make*` for a linked object immediately precedes its `link`. All other
//! ops keep their relative order.

use crate::error::TranslationError;
use refract_backend::{ActorId, Op};
use std::collections::{HashMap, HashSet};

pub fn sort_ops(actor: &ActorId, ops: &[Op]) -> Result<Vec<Op>, TranslationError> {
    let mut ins_at: HashMap<String, usize> = HashMap::new();
    let mut make_at: HashMap<String, usize> = HashMap::new();
    let mut linked: HashSet<String> = HashSet::new();
    let mut reified: HashSet<String> = HashSet::new();

    for (index, op) in ops.iter().enumerate() {
        match op {
            Op::Ins { elem, .. } => {
                ins_at.insert(format!("{}:{}", actor, elem), index);
            }
            Op::MakeMap { obj } | Op::MakeList { obj } => {
                make_at.insert(obj.to_string(), index);
            }
            Op::Set { key, .. } => {
                reified.insert(key.as_str().to_string());
            }
            Op::Link { key, value, .. } => {
                reified.insert(key.as_str().to_string());
                linked.insert(value.to_string());
            }
            Op::Del { .. } => {}
        }
    }
    for label in ins_at.keys() {
        if !reified.contains(label) {
            return Err(TranslationError::MissingReifier(label.clone()));
        }
    }

    let mut out = Vec::with_capacity(ops.len());
    let mut emitted = vec![false; ops.len()];
    for (index, op) in ops.iter().enumerate() {
        if emitted[index] {
            continue;
        }
        match op {
            // placed when the reifier is reached
            Op::Ins { .. } => continue,
            Op::MakeMap { obj } | Op::MakeList { obj } if linked.contains(obj.as_str()) => {
                continue;
            }
            Op::Set { key, .. } => {
                if let Some(&ins) = ins_at.get(key.as_str()) {
                    if !emitted[ins] {
                        out.push(ops[ins].clone());
                        emitted[ins] = true;
                    }
                }
                out.push(op.clone());
            }
            Op::Link { key, value, .. } => {
                if let Some(&ins) = ins_at.get(key.as_str()) {
                    if !emitted[ins] {
                        out.push(ops[ins].clone());
                        emitted[ins] = true;
                    }
                }
                if let Some(&make) = make_at.get(value.as_str()) {
                    if !emitted[make] {
                        out.push(ops[make].clone());
                        emitted[make] = true;
                    }
                }
                out.push(op.clone());
            }
            _ => out.push(op.clone()),
        }
        emitted[index] = true;
    }
    Ok(out)
}
