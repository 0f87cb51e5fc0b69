use crate::expr::Expr;
use crate::matching::{ rule_matches, rule_bindings, substitute_leafs };
use crate::tables::DECOMP_OP;
use crate::errors::{ SelgenResult, SelgenErr::* };

/// Algebraic transformation rules. A rule says its left side may be
/// rewritten into its right side; an *equivalent* rule may also be applied
/// in reverse. A side containing the decomposition connective turns the
/// rule into a decomposition (forward) or composition (backward): after
/// rewriting, the tree is severed at the connective and each piece is
/// implemented independently.

/// How a named operand on one side of a rule maps to an operand on the
/// other side. The expression is an opaque string the core carries through
/// for the collaborator that renders operand computations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandTransformation {
    pub lhs_operand : String,
    pub rhs_operand : String,
    pub transform_expression : String,
}

impl OperandTransformation {
    pub fn mk(lhs_operand : impl Into<String>,
              rhs_operand : impl Into<String>,
              transform_expression : impl Into<String>) -> Self {
        OperandTransformation {
            lhs_operand : lhs_operand.into(),
            rhs_operand : rhs_operand.into(),
            transform_expression : transform_expression.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub lhs : Expr,
    pub rhs : Expr,
    /// Whether the rule may be applied right-to-left as well.
    pub equivalent : bool,
    /// Rule ids start at 1, in definition order.
    pub id : u32,
    /// Derived at creation: the right side severs when applied forward.
    pub decomposes : bool,
    /// Derived at creation: the left side severs when applied backward.
    pub composes : bool,
    pub op_transforms : Vec<OperandTransformation>,
    lhs_primary : u32,
    rhs_primary : u32,
}

impl Rule {
    fn new(lhs : Expr,
           rhs : Expr,
           equivalent : bool,
           id : u32,
           op_transforms : Vec<OperandTransformation>) -> SelgenResult<Self> {
        let composes = lhs.contains_operator(DECOMP_OP);
        let decomposes = rhs.contains_operator(DECOMP_OP);

        // Severing is only defined with the connective at the root of the
        // rewritten side (or chained directly beneath another one), so
        // anything else is rejected up front rather than left to sever
        // unpredictably later.
        if decomposes && !decomp_well_placed(&rhs) {
            return Err(MisplacedDecompositionErr(id))
        }
        if composes && !decomp_well_placed(&lhs) {
            return Err(MisplacedDecompositionErr(id))
        }

        let lhs_primary = lhs.primary_op();
        let rhs_primary = rhs.primary_op();

        Ok(Rule {
            lhs,
            rhs,
            equivalent,
            id,
            decomposes,
            composes,
            op_transforms,
            lhs_primary,
            rhs_primary,
        })
    }

    pub fn lhs_primary_op(&self) -> u32 {
        self.lhs_primary
    }

    pub fn rhs_primary_op(&self) -> u32 {
        self.rhs_primary
    }

    pub fn forward_match(&self, e : &Expr) -> bool {
        rule_matches(&self.lhs, e)
    }

    pub fn backward_match(&self, e : &Expr) -> bool {
        rule_matches(&self.rhs, e)
    }

    pub fn forward_apply(&self, e : &Expr) -> Option<Expr> {
        apply(&self.lhs, &self.rhs, e)
    }

    /// Reverse application; refused unless the rule is an equivalence.
    pub fn backward_apply(&self, e : &Expr) -> Option<Expr> {
        if !self.equivalent {
            return None
        }
        apply(&self.rhs, &self.lhs, e)
    }

    /// Applies the severing side of the rule to `e` and splits the result
    /// at the decomposition connective. Returns the independent pieces in
    /// left-to-right order. `None` when the rule does not sever or does
    /// not match. Note this applies the stored sides directly, so a
    /// composing rule severs even when it is not an equivalence.
    pub fn decompose(&self, e : &Expr) -> Option<Vec<Expr>> {
        let transformed = if self.decomposes {
            apply(&self.lhs, &self.rhs, e)?
        } else if self.composes {
            apply(&self.rhs, &self.lhs, e)?
        } else {
            return None
        };
        sever_tree(transformed)
    }
}

/// Matches `e` against `pattern` and, on success, instantiates a clone of
/// `template` with the captured bindings.
fn apply(pattern : &Expr, template : &Expr, e : &Expr) -> Option<Expr> {
    let mut bindings = rule_bindings(pattern, e)?;
    let mut result = template.clone();
    substitute_leafs(&mut result, &mut bindings);
    Some(result)
}

/// Splits a tree at its decomposition root. Each child becomes an
/// independent piece; chained connectives flatten. The connective nodes
/// themselves are consumed.
fn sever_tree(t : Expr) -> Option<Vec<Expr>> {
    match t {
        Expr::Operator(o) => {
            if o.op.type_id != DECOMP_OP {
                return None
            }
            let mut pieces = Vec::with_capacity(o.children.len());
            for child in o.children {
                collect_severed(child, &mut pieces);
            }
            Some(pieces)
        }
        _ => None
    }
}

fn collect_severed(t : Expr, acc : &mut Vec<Expr>) {
    match t {
        Expr::Operator(o) => {
            if o.op.type_id == DECOMP_OP {
                for child in o.children {
                    collect_severed(child, acc);
                }
            } else {
                acc.push(Expr::Operator(o));
            }
        }
        leaf => acc.push(leaf),
    }
}

/// True when every decomposition connective in the tree sits at the root
/// or directly beneath another connective.
fn decomp_well_placed(t : &Expr) -> bool {
    match t {
        Expr::Operator(o) if o.op.type_id == DECOMP_OP => {
            o.children.iter().all(|child| match child {
                Expr::Operator(co) if co.op.type_id == DECOMP_OP => {
                    decomp_well_placed(child)
                }
                other => !other.contains_operator(DECOMP_OP),
            })
        }
        _ => false
    }
}

/// The rule library. Creation assigns ids (starting at 1) and derives the
/// decomposition flags; iteration is in definition order, which the search
/// engine's tie-breaking depends on.
pub struct RuleSet {
    rules : Vec<Rule>,
    current_rule_number : u32,
}

impl RuleSet {
    pub fn new() -> Self {
        RuleSet { rules : Vec::new(), current_rule_number : 1 }
    }

    pub fn create_rule(&mut self,
                       lhs : Expr,
                       rhs : Expr,
                       equivalent : bool,
                       op_transforms : Vec<OperandTransformation>) -> SelgenResult<u32> {
        let id = self.current_rule_number;
        let rule = Rule::new(lhs, rhs, equivalent, id, op_transforms)?;
        self.current_rule_number += 1;
        self.rules.push(rule);
        Ok(id)
    }

    pub fn iter(&self) -> std::slice::Iter<Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id : u32) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }
}

#[cfg(test)]
mod rules_tests {
    use super::*;
    use crate::expr::{ mk_operand, mk_operator, mk_assign, mk_register };
    use crate::matching::compare;
    use crate::tables::{ OperandTableManager, OperatorTableManager };
    use crate::regclass::RegisterClass;

    struct Ctx {
        types : OperandTableManager,
        ops : OperatorTableManager,
    }

    fn ctx() -> Ctx {
        Ctx { types : OperandTableManager::new(), ops : OperatorTableManager::new() }
    }

    // -(a, b) <=> +(a, ~(b))
    fn sub_to_add_rule(c : &mut Ctx, set : &mut RuleSet, equivalent : bool) -> u32 {
        let int = c.types.get_type("int");
        let sub = c.ops.get_type("-");
        let add = c.ops.get_type("+");
        let neg = c.ops.get_type("~");
        let lhs = mk_operator(sub, vec![mk_operand(int, "a"),
                                        mk_operand(int, "b")]).unwrap();
        let rhs = mk_operator(add, vec![
            mk_operand(int, "a"),
            mk_operator(neg, vec![mk_operand(int, "b")]).unwrap()]).unwrap();
        set.create_rule(lhs, rhs, equivalent, Vec::new()).unwrap()
    }

    #[test]
    fn ids_start_at_one_and_increment() {
        let mut c = ctx();
        let mut set = RuleSet::new();
        let id1 = sub_to_add_rule(&mut c, &mut set, true);
        let id2 = sub_to_add_rule(&mut c, &mut set, false);
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert!(set.get(2).is_some());
    }

    #[test]
    fn forward_apply_rewrites_with_bindings() {
        let mut c = ctx();
        let mut set = RuleSet::new();
        sub_to_add_rule(&mut c, &mut set, true);
        let rule = set.get(1).unwrap();

        let int = c.types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let sub = c.ops.get_type("-");
        let e = mk_operator(sub, vec![mk_register(&gpr, "y"),
                                      mk_register(&gpr, "z")]).unwrap();

        assert!(rule.forward_match(&e));
        let rewritten = rule.forward_apply(&e).unwrap();
        assert_eq!(rewritten.primary_op(), crate::tables::ADD_OP);
        assert_eq!(rewritten.leaf_names().unwrap(),
                   vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn backward_apply_restores_modulo_renames() {
        let mut c = ctx();
        let mut set = RuleSet::new();
        sub_to_add_rule(&mut c, &mut set, true);
        let rule = set.get(1).unwrap();

        let int = c.types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let sub = c.ops.get_type("-");
        let e = mk_operator(sub, vec![mk_register(&gpr, "y"),
                                      mk_register(&gpr, "z")]).unwrap();

        let there = rule.forward_apply(&e).unwrap();
        assert!(rule.backward_match(&there));
        let back = rule.backward_apply(&there).unwrap();
        // Structurally the round trip is the identity; operand names are
        // preserved here because both sides bound them.
        assert!(compare(&back, &e, false));
        assert!(compare(&e, &back, false));
    }

    #[test]
    fn backward_apply_refuses_one_way_rules() {
        let mut c = ctx();
        let mut set = RuleSet::new();
        sub_to_add_rule(&mut c, &mut set, false);
        let rule = set.get(1).unwrap();

        let int = c.types.get_type("int");
        let add = c.ops.get_type("+");
        let neg = c.ops.get_type("~");
        let e = mk_operator(add, vec![
            mk_operand(int, "p"),
            mk_operator(neg, vec![mk_operand(int, "q")]).unwrap()]).unwrap();
        assert!(rule.backward_match(&e));
        assert!(rule.backward_apply(&e).is_none());
    }

    #[test]
    fn decomposition_severs_into_pieces() {
        let mut c = ctx();
        let int = c.types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let dec = c.ops.get_type("dec");
        let sub = c.ops.get_type("-");
        let add = c.ops.get_type("+");
        let neg = c.ops.get_type("~");

        // transfer(d, -(a, b)) => dec(transfer(t, ~(b)), transfer(d, +(a, t)))
        let lhs = mk_assign(
            mk_operand(int, "d"),
            mk_operator(sub, vec![mk_operand(int, "a"),
                                  mk_operand(int, "b")]).unwrap(),
            None);
        let negate = mk_assign(
            mk_operand(int, "t"),
            mk_operator(neg, vec![mk_operand(int, "b")]).unwrap(),
            None);
        let accum = mk_assign(
            mk_operand(int, "d"),
            mk_operator(add, vec![mk_operand(int, "a"),
                                  mk_operand(int, "t")]).unwrap(),
            None);
        let rhs = mk_operator(dec, vec![negate, accum]).unwrap();

        let mut set = RuleSet::new();
        set.create_rule(lhs, rhs, false, Vec::new()).unwrap();
        let rule = set.get(1).unwrap();
        assert!(rule.decomposes);
        assert!(!rule.composes);

        let e = mk_assign(
            mk_register(&gpr, "x"),
            mk_operator(sub, vec![mk_register(&gpr, "y"),
                                  mk_register(&gpr, "z")]).unwrap(),
            None);
        let pieces = rule.decompose(&e).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].primary_op(), crate::tables::NEG_OP);
        assert_eq!(pieces[1].primary_op(), crate::tables::ADD_OP);
        // The fresh temporary is shared between the two pieces.
        let t_name = pieces[0].as_operator().unwrap().children[0]
            .as_operand().unwrap().name.clone();
        assert!(pieces[1].leaf_names().unwrap().contains(&t_name));
    }

    #[test]
    fn chained_connectives_flatten() {
        let mut c = ctx();
        let int = c.types.get_type("int");
        let dec = c.ops.get_type("dec");
        let lhs = mk_operand(int, "whole");
        let inner = mk_operator(dec, vec![mk_operand(int, "p1"),
                                          mk_operand(int, "p2")]).unwrap();
        let rhs = mk_operator(dec, vec![inner, mk_operand(int, "p3")]).unwrap();

        let mut set = RuleSet::new();
        set.create_rule(lhs, rhs, false, Vec::new()).unwrap();
        let rule = set.get(1).unwrap();

        let pieces = rule.decompose(&mk_operand(int, "e")).unwrap();
        assert_eq!(pieces.len(), 3);
    }

    #[test]
    fn misplaced_connective_is_rejected() {
        let mut c = ctx();
        let int = c.types.get_type("int");
        let dec = c.ops.get_type("dec");
        let add = c.ops.get_type("+");

        let lhs = mk_operand(int, "whole");
        let buried = mk_operator(dec, vec![mk_operand(int, "p1"),
                                           mk_operand(int, "p2")]).unwrap();
        let rhs = mk_operator(add, vec![mk_operand(int, "q"), buried]).unwrap();

        let mut set = RuleSet::new();
        let res = set.create_rule(lhs, rhs, false, Vec::new());
        assert_eq!(res, Err(crate::errors::SelgenErr::MisplacedDecompositionErr(1)));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn non_matching_rule_does_not_apply() {
        let mut c = ctx();
        let mut set = RuleSet::new();
        sub_to_add_rule(&mut c, &mut set, true);
        let rule = set.get(1).unwrap();

        let int = c.types.get_type("int");
        let add = c.ops.get_type("+");
        let e = mk_operator(add, vec![mk_operand(int, "p"),
                                      mk_operand(int, "q")]).unwrap();
        assert!(!rule.forward_match(&e));
        assert!(rule.forward_apply(&e).is_none());
    }
}
