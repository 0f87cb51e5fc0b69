use std::sync::Arc;

use hashbrown::HashMap;
use log::{ debug, trace };
use parking_lot::RwLock;

use crate::expr::Expr;
use crate::matching::{ compare, equal_types };
use crate::rules::{ Rule, OperandTransformation };
use crate::env::Env;
use crate::errors::SelgenResult;

/// The engine of the search for pattern implementations. Given a query
/// expression, it proves that some ordered sequence of library
/// instructions, with appropriate operand bindings, computes the query:
/// first by direct structural match, then by rewriting the query with the
/// transformation rules toward each instruction's semantics, recursing on
/// sub-expressions and decomposed pieces. The search is cost-biased and
/// depth-bounded, not globally optimal; bounded depth is also the only
/// cancellation mechanism.

/// `u32::MAX` marks "no implementation found"; a real sequence can never
/// cost this much.
pub const INFINITE_COST : u32 = u32::MAX;

/// Default ceiling on recursion depth, and the customary first ceiling
/// callers deepen from.
pub const DEFAULT_MAX_DEPTH : usize = 10;
pub const DEFAULT_STARTING_DEPTH : usize = 5;

/// The aggregate a search returns. `instructions` is in issue order (the
/// first entry executes first) and each element names a library index and
/// a semantic index within that instruction. `operand_defs` carries one
/// name list per instruction, positionally. While sub-results are being
/// assembled the last name list may be an *orphan*: operand names
/// collected for an instruction that has not been identified yet, present
/// exactly when there is one more definition list than instructions.
/// `rules_applied` and `op_transforms` are the accounting trails a
/// collaborator needs to replay or serialize the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub instructions : Vec<(usize, usize)>,
    pub cost : u32,
    pub operand_defs : Vec<Vec<String>>,
    pub rules_applied : Vec<u32>,
    pub op_transforms : Vec<Vec<OperandTransformation>>,
}

impl SearchResult {
    pub fn new() -> Self {
        SearchResult {
            instructions : Vec::new(),
            cost : INFINITE_COST,
            operand_defs : Vec::new(),
            rules_applied : Vec::new(),
            op_transforms : Vec::new(),
        }
    }

    pub fn found(&self) -> bool {
        self.cost != INFINITE_COST
    }

    /// Splices `src` in front of `self`, preserving intra-list order, and
    /// sums costs. When both sides carry an orphan definition list, the
    /// source's orphan is folded into the destination's; otherwise all
    /// source definitions go in front wholesale.
    fn merge(&mut self, mut src : SearchResult) {
        debug_assert!(src.found(), "merging a result that is not one");

        if self.operand_defs.len() > self.instructions.len()
           && src.operand_defs.len() > src.instructions.len() {
            if let (Some(src_orphan), Some(dst_orphan)) =
                (src.operand_defs.pop(), self.operand_defs.last_mut()) {
                dst_orphan.extend(src_orphan);
            }
        }
        src.operand_defs.extend(self.operand_defs.drain(..));
        self.operand_defs = src.operand_defs;

        src.instructions.extend(self.instructions.drain(..));
        self.instructions = src.instructions;

        src.rules_applied.extend(self.rules_applied.drain(..));
        self.rules_applied = src.rules_applied;

        src.op_transforms.extend(self.op_transforms.drain(..));
        self.op_transforms = src.op_transforms;

        if self.cost == INFINITE_COST {
            self.cost = 0;
        }
        self.cost = self.cost.saturating_add(src.cost);
    }

    /// Records operand names for the instruction currently being matched.
    /// Folded into the orphan list when one is open, otherwise the names
    /// open a new (orphan) list.
    fn update_current_operand_definition(&mut self, defs : Vec<String>) {
        if self.operand_defs.len() > self.instructions.len() {
            if let Some(orphan) = self.operand_defs.last_mut() {
                orphan.extend(defs);
            }
        } else {
            self.operand_defs.push(defs);
        }
    }
}

struct CacheEntry {
    query : Expr,
    goal : Expr,
    depth : usize,
}

/// Remembers `(query, goal)` pairs that were explored and led nowhere,
/// together with the remaining depth budget the failed attempt had. A
/// later attempt with no more budget than that is pruned immediately.
/// Chained on the combined structural hash of the pair; entries within a
/// chain keep insertion order, and each entry owns independent clones of
/// its key trees.
pub struct TransformationCache {
    table : HashMap<u64, Vec<CacheEntry>>,
    hits : u64,
}

impl TransformationCache {
    pub fn with_capacity(n : usize) -> Self {
        TransformationCache {
            table : HashMap::with_capacity(n),
            hits : 0,
        }
    }

    fn key(query : &Expr, goal : &Expr) -> u64 {
        query.hash_chain(goal.hash_chain(0))
    }

    pub fn add(&mut self, query : &Expr, goal : &Expr, depth : usize) {
        let entry = CacheEntry {
            query : query.clone(),
            goal : goal.clone(),
            depth,
        };
        self.table
            .entry(TransformationCache::key(query, goal))
            .or_insert_with(|| Vec::with_capacity(4))
            .push(entry);
    }

    /// True when a prior failed attempt at `query → goal` had at least
    /// `depth` budget left.
    pub fn lookup(&mut self, query : &Expr, goal : &Expr, depth : usize) -> bool {
        if let Some(chain) = self.table.get(&TransformationCache::key(query, goal)) {
            for entry in chain {
                if compare(query, &entry.query, false)
                   && compare(goal, &entry.goal, false)
                   && depth <= entry.depth {
                    self.hits += 1;
                    return true
                }
            }
        }
        false
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn len(&self) -> usize {
        self.table.values().map(|chain| chain.len()).sum()
    }
}

/// Does any rule take an expression whose primary operator is `expr_po`
/// toward one whose primary operator is `instr_po`? Primary operators
/// equal under the wildcard already qualify. This is the pruning
/// heuristic: one cheap scan instead of a doomed recursion.
fn has_close_semantic(env : &Env, instr_po : u32, expr_po : u32) -> bool {
    if equal_types(instr_po, expr_po) {
        return true
    }
    for rule in env.rules.iter() {
        if equal_types(rule.lhs_primary_op(), expr_po)
           && equal_types(rule.rhs_primary_op(), instr_po) {
            return true
        }
        if rule.equivalent
           && equal_types(rule.rhs_primary_op(), expr_po)
           && equal_types(rule.lhs_primary_op(), instr_po) {
            return true
        }
    }
    false
}

pub struct Search {
    env : Arc<RwLock<Env>>,
    max_depth : usize,
    trans_cache : TransformationCache,
}

impl Search {
    pub fn new(env : Arc<RwLock<Env>>) -> Self {
        Search {
            env,
            max_depth : DEFAULT_MAX_DEPTH,
            trans_cache : TransformationCache::with_capacity(1024),
        }
    }

    pub fn with_max_depth(env : Arc<RwLock<Env>>, max_depth : usize) -> Self {
        let mut s = Search::new(env);
        s.max_depth = max_depth;
        s
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn set_max_depth(&mut self, max_depth : usize) {
        self.max_depth = max_depth;
    }

    /// How often the transformation cache cut off a re-exploration.
    pub fn cache_hits(&self) -> u64 {
        self.trans_cache.hits()
    }

    /// Searches for an implementation of `expr`, starting `cur_depth`
    /// levels into the budget (0 for a fresh query). Infinite cost in the
    /// result means nothing was found within `max_depth`; the caller may
    /// raise the ceiling and retry.
    pub fn search(&mut self, expr : &Expr, cur_depth : usize) -> SelgenResult<SearchResult> {
        let env = self.env.clone();
        let env = env.read();
        self.search_core(&env, expr, cur_depth)
    }

    /// The customary driver: retry with the depth ceiling raised stepwise
    /// from 5 to 10, returning the first implementation found. Cached
    /// negative results key on the remaining budget, so raising the
    /// ceiling never suppresses a genuine find.
    pub fn search_deepening(&mut self, expr : &Expr) -> SelgenResult<SearchResult> {
        let env = self.env.clone();
        let env = env.read();
        let saved = self.max_depth;
        for ceiling in DEFAULT_STARTING_DEPTH..=DEFAULT_MAX_DEPTH {
            self.max_depth = ceiling;
            let result = self.search_core(&env, expr, 0)?;
            if result.found() {
                self.max_depth = saved;
                return Ok(result)
            }
        }
        self.max_depth = saved;
        Ok(SearchResult::new())
    }

    fn search_core(&mut self, env : &Env, expr : &Expr, cur_depth : usize) -> SelgenResult<SearchResult> {
        debug!("search started on {} (depth {})", expr, cur_depth);

        let mut result = SearchResult::new();

        if cur_depth == self.max_depth {
            trace!("maximum recursive depth reached");
            return Ok(result)
        }

        // Phase 1: the expression may be directly computable by an
        // available instruction, or by part of one. Library order decides
        // cost ties: a later instruction of equal cost wins.
        for (idx, instr) in env.instructions.iter().enumerate() {
            for (sem_idx, sem) in instr.semantics().enumerate() {
                if compare(expr, sem, false) && instr.cost() <= result.cost {
                    let mut direct = SearchResult::new();
                    direct.cost = instr.cost();
                    direct.instructions.push((idx, sem_idx));
                    direct.update_current_operand_definition(expr.leaf_names()?);
                    result = direct;
                    break;
                }
            }
        }

        if result.found() {
            trace!("direct match successful");
            return Ok(result)
        }

        // Phase 2: look for an instruction "semantically close" to the
        // expression and try to rewrite the expression into its
        // semantics. Operand definitions for the matched instruction are
        // collected by the transformation itself.
        for (idx, instr) in env.instructions.iter().enumerate() {
            for (sem_idx, sem) in instr.semantics().enumerate() {
                let mut candidate = self.transform_expression(env, expr, sem, cur_depth)?;
                if !candidate.found() {
                    continue;
                }
                candidate.cost = candidate.cost.saturating_add(instr.cost());
                candidate.instructions.push((idx, sem_idx));
                if candidate.cost <= result.cost {
                    result = candidate;
                }
            }
        }

        Ok(result)
    }

    /// Tries to prove that `expr` can be rewritten into `goal` (one
    /// semantic tree of a candidate instruction), possibly issuing helper
    /// instructions for decomposed pieces along the way. An infinite-cost
    /// result means the attempt failed; the failure is recorded in the
    /// transformation cache along with the budget it had.
    fn transform_expression(&mut self,
                            env : &Env,
                            expr : &Expr,
                            goal : &Expr,
                            cur_depth : usize) -> SelgenResult<SearchResult> {
        trace!("transform {} toward {} (depth {})", expr, goal, cur_depth);

        let mut result = SearchResult::new();

        if cur_depth == self.max_depth {
            trace!("maximum recursive depth reached");
            return Ok(result)
        }

        let budget = self.max_depth - cur_depth;
        if self.trans_cache.lookup(expr, goal, budget) {
            trace!("cache: no such transformation at this budget");
            return Ok(result)
        }

        let expr_po = expr.primary_op();
        let goal_po = goal.primary_op();

        if !has_close_semantic(env, goal_po, expr_po) {
            trace!("close-semantic heuristic pruned this trial");
            return Ok(result)
        }

        if compare(expr, goal, false) {
            trace!("already matches");
            result.cost = 0;
            result.update_current_operand_definition(expr.leaf_names()?);
            return Ok(result)
        }

        // See if success comes without rewriting this node, adapting the
        // children alone.
        if self.transform_aux(env, expr, goal, &mut result, cur_depth)? {
            return Ok(result)
        }

        for rule in env.rules.iter() {
            // Pick an application direction whose outcome can still reach
            // the goal's primary operator; skip the rule otherwise.
            let forward =
                if rule.forward_match(expr)
                   && equal_types(rule.rhs_primary_op(), goal_po) {
                    true
                } else if rule.backward_match(expr)
                          && equal_types(rule.lhs_primary_op(), goal_po) {
                    false
                } else {
                    continue
                };

            let severs = (forward && rule.decomposes) || (!forward && rule.composes);

            if !severs {
                trace!("applying non-decomposing rule {}", rule.id);
                let transformed = if forward {
                    rule.forward_apply(expr)
                } else {
                    rule.backward_apply(expr)
                };
                let transformed = match transformed {
                    Some(t) => t,
                    None => continue
                };
                if self.transform_aux(env, &transformed, goal, &mut result, cur_depth)? {
                    result.rules_applied.push(rule.id);
                    result.op_transforms.push(rule.op_transforms.clone());
                    return Ok(result)
                }
                continue;
            }

            trace!("applying decomposing rule {}", rule.id);
            let mut matched_goal : Option<Expr> = None;
            let child_result = self.apply_decomposition_rule(
                env, rule, expr, Some(goal), &mut matched_goal, cur_depth)?;
            let child_result = match child_result {
                Some(r) if r.found() => r,
                _ => continue
            };
            let matched = match matched_goal {
                Some(m) => m,
                None => continue
            };
            // The severed pieces have implementations; assert that the
            // piece reserved for the goal really reaches it.
            if self.transform_aux(env, &matched, goal, &mut result, cur_depth)? {
                trace!("decomposition was successful");
                result.merge(child_result);
                result.rules_applied.push(rule.id);
                result.op_transforms.push(rule.op_transforms.clone());
                return Ok(result)
            }
        }

        trace!("failed to prove the expressions equivalent");
        self.trans_cache.add(expr, goal, budget);
        Ok(result)
    }

    /// Given a candidate `t` whose root already matches `goal`, proves the
    /// predicates and every child pair equal (rewriting them where
    /// needed) and merges the collected sub-results into `result`. On
    /// failure `result` is left untouched.
    fn transform_aux(&mut self,
                     env : &Env,
                     t : &Expr,
                     goal : &Expr,
                     result : &mut SearchResult,
                     cur_depth : usize) -> SelgenResult<bool> {
        if !compare(t, goal, true) {
            return Ok(false)
        }

        // The transformation revealed a direct operand match.
        if t.is_operand() {
            result.cost = 0;
            result.update_current_operand_definition(t.leaf_names()?);
            return Ok(true)
        }

        let (t_op, goal_op) = match (t, goal) {
            (Expr::Operator(a), Expr::Operator(b)) => (a, b),
            _ => return Ok(false)
        };

        let mut gathered = SearchResult::new();

        match (&t_op.pred, &goal_op.pred) {
            (None, None) => (),
            (Some(g1), Some(g2)) => {
                if g1.comparator != g2.comparator {
                    return Ok(false)
                }
                let lhs_result = self.transform_expression(
                    env, &g1.lhs, &g2.lhs, cur_depth + 1)?;
                if !lhs_result.found() {
                    return Ok(false)
                }
                gathered.merge(lhs_result);
                let rhs_result = self.transform_expression(
                    env, &g1.rhs, &g2.rhs, cur_depth + 1)?;
                if !rhs_result.found() {
                    return Ok(false)
                }
                gathered.merge(rhs_result);
            }
            _ => return Ok(false),
        }

        if t_op.children.len() != goal_op.children.len() {
            return Ok(false)
        }
        for (t_child, goal_child) in t_op.children.iter().zip(goal_op.children.iter()) {
            let child_result = self.transform_expression(
                env, t_child, goal_child, cur_depth + 1)?;
            if !child_result.found() {
                trace!("recursive call failed");
                return Ok(false)
            }
            gathered.merge(child_result);
        }

        if !gathered.found() {
            gathered.cost = 0;
        }
        result.merge(gathered);
        Ok(true)
    }

    /// Applies a severing rule to `expr` and recursively finds an
    /// implementation for every resulting piece, except the one piece
    /// reserved for the goal: the first piece whose root matches `goal`
    /// is handed back through `matched_goal` unsearched. `None` when the
    /// rule does not apply or some piece has no implementation.
    fn apply_decomposition_rule(&mut self,
                                env : &Env,
                                rule : &Rule,
                                expr : &Expr,
                                goal : Option<&Expr>,
                                matched_goal : &mut Option<Expr>,
                                cur_depth : usize) -> SelgenResult<Option<SearchResult>> {
        if !rule.decomposes && !rule.composes {
            return Ok(None)
        }

        let pieces = match rule.decompose(expr) {
            Some(p) => p,
            None => return Ok(None)
        };

        let mut candidate = SearchResult::new();

        for piece in pieces {
            if let Some(g) = goal {
                if matched_goal.is_none() && compare(g, &piece, true) {
                    *matched_goal = Some(piece);
                    continue;
                }
            }
            let piece_result = self.search_core(env, &piece, cur_depth + 1)?;
            if !piece_result.found() {
                return Ok(None)
            }
            candidate.merge(piece_result);
        }

        Ok(Some(candidate))
    }
}
