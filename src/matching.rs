use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use crate::tables::{ WILDCARD_TYPE, MEMREF_OP };
use crate::expr::{ Expr, OperandKind };

/// Two matchers live here. `compare` is the one the search engine asks
/// whether a query is implemented by an instruction semantic: it treats
/// the left side as the wanted expression and the right side as the
/// implementation proposal, so an implementation operating on *more* bits
/// than requested still matches. `rule_matches`/`rule_bindings` are the
/// stricter matcher used to apply transformation rules, where sizes must
/// agree exactly unless a side says "any", and where a rule variable may
/// bind a whole sub-expression.

/// Counter used to freshen operand names generated during substitution,
/// so two applications of the same rule can never alias operands.
/// Starts at 200.
pub static RENAME_SERIAL : AtomicU32 = AtomicU32::new(200);

/// Type ids match when equal or when either is the wildcard.
#[inline]
pub fn equal_types(t1 : u32, t2 : u32) -> bool {
    t1 == t2 || t1 == WILDCARD_TYPE || t2 == WILDCARD_TYPE
}

#[inline]
fn size_subsumes(s1 : u32, s2 : u32) -> bool {
    s1 <= s2 || s1 == 0 || s2 == 0
}

/// Structural equality between a wanted expression `e1` and an
/// implementation candidate `e2`. With `top_level_only` the verdict is
/// made at the root alone. Constants on the query side must find an equal
/// constant; guarded assignments must agree on having a predicate, on the
/// comparator, and on both guard expressions.
pub fn compare(e1 : &Expr, e2 : &Expr, top_level_only : bool) -> bool {
    match (e1, e2) {
        (Expr::Operand(o1), Expr::Operand(o2)) => {
            if !equal_types(o1.type_.type_id, o2.type_.type_id)
               || !size_subsumes(o1.type_.size, o2.type_.size) {
                return false
            }
            match o1.kind {
                OperandKind::Constant(v1) => match o2.kind {
                    OperandKind::Constant(v2) => v1 == v2,
                    _ => false
                },
                _ => true
            }
        }
        (Expr::Operator(p1), Expr::Operator(p2)) => {
            if !equal_types(p1.op.type_id, p2.op.type_id)
               || !size_subsumes(p1.ret.size, p2.ret.size) {
                return false
            }
            if top_level_only {
                return true
            }
            match (&p1.pred, &p2.pred) {
                (None, None) => (),
                (Some(g1), Some(g2)) => {
                    if g1.comparator != g2.comparator
                       || !compare(&g1.lhs, &g2.lhs, false)
                       || !compare(&g1.rhs, &g2.rhs, false) {
                        return false
                    }
                }
                _ => return false,
            }
            p1.children.len() == p2.children.len()
                && p1.children.iter()
                              .zip(p2.children.iter())
                              .all(|(c1, c2)| compare(c1, c2, false))
        }
        _ => false
    }
}

/// Captured bindings from a rule match: pattern operand name to the
/// matched sub-expression. A plain list; lookups are by name and the list
/// keeps first-bound-wins order.
pub type Bindings = Vec<(String, Expr)>;

/// The rule matcher. Stricter than `compare`: data sizes must match
/// exactly unless either side says 0 ("any"), and a wildcard-typed
/// pattern operand matches any node except a memory reference, which is
/// deliberately immune to wildcard rules. A typed pattern operand may
/// also swallow a whole operator whose return type agrees, which is what
/// lets a rule variable stand for a sub-expression.
fn match_exp_by_rule(r : &Expr, e : &Expr, mut caps : Option<&mut Bindings>) -> bool {
    let class_agrees = r.is_operator() == e.is_operator();
    let head_matches = class_agrees
        && ((r.type_id() == e.type_id()
             && (r.size() == e.size() || r.size() == 0 || e.size() == 0))
            || (r.type_id() == WILDCARD_TYPE
                && (!e.is_operator() || e.type_id() != MEMREF_OP)));

    if head_matches {
        match (r, e) {
            (Expr::Operand(ro), Expr::Operand(eo)) => {
                // Unless the pattern is a wildcard it must be a perfect
                // match: constants with constants (equal values),
                // immediates with immediates.
                if ro.type_.type_id != WILDCARD_TYPE {
                    match (ro.const_val(), eo.const_val()) {
                        (Some(v1), Some(v2)) if v1 == v2 => (),
                        (None, None) => (),
                        _ => return false,
                    }
                    if ro.is_immediate() != eo.is_immediate() {
                        return false
                    }
                }
                if let Some(list) = caps {
                    list.push((ro.name.clone(), e.clone()));
                }
                return true
            }
            (Expr::Operator(rp), Expr::Operator(ep)) => {
                match (&rp.pred, &ep.pred) {
                    (None, None) => (),
                    (Some(g1), Some(g2)) => {
                        if g1.comparator != g2.comparator {
                            return false
                        }
                        if !match_exp_by_rule(&g1.lhs, &g2.lhs, caps.as_deref_mut()) {
                            return false
                        }
                        if !match_exp_by_rule(&g1.rhs, &g2.rhs, caps.as_deref_mut()) {
                            return false
                        }
                    }
                    _ => return false,
                }
                if rp.children.len() != ep.children.len() {
                    return false
                }
                for (rc, ec) in rp.children.iter().zip(ep.children.iter()) {
                    if !match_exp_by_rule(rc, ec, caps.as_deref_mut()) {
                        return false
                    }
                }
                return true
            }
            _ => unreachable!("node class agreement was just checked")
        }
    }

    // A rule operand can still match an expression operator whose return
    // type it names; a wildcard operand matches any operator except a
    // memory reference.
    if let (Expr::Operand(ro), Expr::Operator(ep)) = (r, e) {
        let binds = if ro.type_.type_id == WILDCARD_TYPE {
            ep.op.type_id != MEMREF_OP
        } else {
            ep.ret.type_id == ro.type_.type_id
                && (ep.ret.size == ro.type_.size || ro.type_.size == 0)
        };
        if binds {
            if let Some(list) = caps {
                list.push((ro.name.clone(), e.clone()));
            }
            return true
        }
    }

    false
}

pub fn rule_matches(pattern : &Expr, e : &Expr) -> bool {
    match_exp_by_rule(pattern, e, None)
}

pub fn rule_bindings(pattern : &Expr, e : &Expr) -> Option<Bindings> {
    let mut binds = Bindings::new();
    if match_exp_by_rule(pattern, e, Some(&mut binds)) {
        Some(binds)
    } else {
        None
    }
}

/// Rewrites a freshly cloned rule side using the bindings captured by the
/// match: every leaf whose name was bound becomes a clone of the matched
/// sub-expression, and every leaf the match did not touch gets a fresh
/// sequence number appended to its name so that separate rule
/// applications can never alias. Newly generated names are recorded back
/// into the binding list, so repeated uses of one rule variable agree.
pub fn substitute_leafs(t : &mut Expr, bindings : &mut Bindings) {
    match t {
        Expr::Operator(o) => {
            if let Some(pred) = &mut o.pred {
                substitute_leafs(&mut pred.lhs, bindings);
                substitute_leafs(&mut pred.rhs, bindings);
            }
            for child in o.children.iter_mut() {
                substitute_leafs(child, bindings);
            }
        }
        Expr::Operand(o) => {
            let bound = bindings.iter()
                                .find(|(name, _)| *name == o.name)
                                .map(|(_, b)| b.clone());
            match bound {
                Some(replacement) => {
                    *t = replacement;
                }
                None => {
                    let old_name = o.name.clone();
                    let serial = RENAME_SERIAL.fetch_add(1, Relaxed);
                    o.change_name(format!("{}{}", old_name, serial));
                    let renamed = Expr::Operand(o.clone());
                    bindings.push((old_name, renamed));
                }
            }
        }
    }
}
