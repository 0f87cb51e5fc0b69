use std::sync::Arc;

use parking_lot::RwLock;

use crate::tables::{ OperandTableManager, OperatorTableManager };
use crate::regclass::RegClassManager;
use crate::fragment::FragmentManager;
use crate::rules::{ RuleSet, OperandTransformation };
use crate::instruction::{ Instruction, InstrManager };
use crate::expr::Expr;
use crate::errors::SelgenResult;

/// Everything the enclosing generator registers before searching lives
/// here: the type tables, the register-side description of the machine,
/// the fragment library, the transformation rules and the instruction
/// library. Essentially "the place where everything goes" and "the place
/// the engine goes to get stuff". The engine holds it through an
/// `Arc<RwLock<_>>` handle and only ever reads.
pub struct Env {
    pub operand_types : OperandTableManager,
    pub operator_types : OperatorTableManager,
    pub reg_classes : RegClassManager,
    pub fragments : FragmentManager,
    pub rules : RuleSet,
    pub instructions : InstrManager,
}

impl Env {
    pub fn new() -> Self {
        Env {
            operand_types : OperandTableManager::new(),
            operator_types : OperatorTableManager::new(),
            reg_classes : RegClassManager::new(),
            fragments : FragmentManager::new(),
            rules : RuleSet::new(),
            instructions : InstrManager::new(),
        }
    }

    pub fn into_shared(self) -> Arc<RwLock<Env>> {
        Arc::new(RwLock::new(self))
    }

    /// Registers an instruction built from its parts; returns the library
    /// index. Semantic trees must already have had their fragments
    /// expanded (`expand_all`).
    pub fn add_instruction(&mut self,
                           name : &str,
                           cost : u32,
                           semantics : Vec<Expr>,
                           format : &str,
                           mnemonic : &str,
                           operands : Vec<String>) -> usize {
        let mut instr = Instruction::new(name, cost, format, mnemonic);
        for sem in semantics {
            instr.add_semantic(sem);
        }
        for op in operands {
            instr.add_operand(op);
        }
        self.instructions.add_instruction(instr)
    }

    /// Registers a rule; returns its id.
    pub fn add_rule(&mut self,
                    lhs : Expr,
                    rhs : Expr,
                    equivalent : bool,
                    op_transforms : Vec<OperandTransformation>) -> SelgenResult<u32> {
        self.rules.create_rule(lhs, rhs, equivalent, op_transforms)
    }

    pub fn add_fragment(&mut self, name : &str, frag : Expr) {
        self.fragments.add_fragment(name, frag);
    }

    /// Expands every fragment operand in `tree`, in place.
    pub fn expand_all(&self, tree : &mut Expr) -> SelgenResult<()> {
        self.fragments.expand_tree(tree)
    }
}

#[cfg(test)]
mod env_tests {
    use super::*;
    use crate::expr::{ mk_operand, mk_operator, mk_fragment, mk_assign };

    #[test]
    fn builder_surface_round_trips() {
        let mut env = Env::new();
        let int = env.operand_types.get_type("int");
        let add = env.operator_types.get_type("+");

        let sem = mk_assign(mk_operand(int, "rd"),
                            mk_operator(add, vec![mk_operand(int, "rs"),
                                                  mk_operand(int, "rt")]).unwrap(),
                            None);
        let idx = env.add_instruction("add", 1, vec![sem], "R", "add $rd, $rs, $rt",
                                      vec!["rd".into(), "rs".into(), "rt".into()]);
        assert_eq!(idx, 0);
        assert_eq!(env.instructions.get(0).unwrap().name(), "add");

        let id = env.add_rule(mk_operand(int, "a"),
                              mk_operand(int, "a"),
                              true, Vec::new()).unwrap();
        assert_eq!(id, 1);

        env.add_fragment("zero", mk_operand(int, "r0"));
        let mut tree = mk_assign(mk_operand(int, "dst"),
                                 mk_fragment("zero", vec![]), None);
        env.expand_all(&mut tree).unwrap();
        assert_eq!(tree.leaf_names().unwrap(),
                   vec!["dst".to_string(), "r0".to_string()]);
    }
}
