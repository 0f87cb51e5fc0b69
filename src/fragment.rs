use indexmap::IndexMap;

use crate::expr::{ Expr, OperandKind };
use crate::errors::{ SelgenResult, SelgenErr::* };

/// Named fragments are shared pieces of semantics the ISA description
/// factors out; a semantic tree refers to one through a fragment operand
/// naming it. Before a tree is usable by the matcher or the search engine,
/// every fragment operand must be expanded into a clone of the fragment's
/// definition, with the definition's register/immediate leaves renamed
/// from the referring operand's parameter list.
pub struct FragmentManager {
    frag_map : IndexMap<String, Vec<Expr>>,
}

impl FragmentManager {
    pub fn new() -> Self {
        FragmentManager { frag_map : IndexMap::new() }
    }

    /// Registering the same name again adds an alternative definition.
    pub fn add_fragment(&mut self, name : impl Into<String>, frag : Expr) {
        self.frag_map.entry(name.into()).or_insert_with(Vec::new).push(frag);
    }

    pub fn find_frag(&self, name : &str) -> Option<&Vec<Expr>> {
        self.frag_map.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<Expr>)> {
        self.frag_map.iter()
    }

    /// Expands every fragment operand reachable from `tree`, in place.
    /// When a fragment has several registered alternatives the slot takes
    /// the last one; expansion then recurses into the replacement, so a
    /// fragment definition may itself refer to further fragments.
    /// The root must not be a fragment operand (caller invariant).
    pub fn expand_tree(&self, tree : &mut Expr) -> SelgenResult<()> {
        if let Expr::Operand(o) = tree {
            if o.is_fragment() {
                return Err(FragmentAtRootErr)
            }
        }
        self.expand_core(tree)
    }

    fn expand_core(&self, tree : &mut Expr) -> SelgenResult<()> {
        let operator = match tree {
            Expr::Operator(o) => o,
            Expr::Operand(_) => return Ok(())
        };

        for child in operator.children.iter_mut() {
            let frag_ref = match child {
                Expr::Operand(o) => match &o.kind {
                    OperandKind::Fragment(params) => Some((o.name.clone(), params.clone())),
                    _ => None
                },
                _ => None
            };

            match frag_ref {
                None => self.expand_core(child)?,
                Some((name, params)) => {
                    let alternatives = self.frag_map
                                           .get(&name)
                                           .ok_or_else(|| UnknownFragmentErr(name.clone()))?;
                    let mut replacement = match alternatives.last() {
                        Some(alt) => alt.clone(),
                        None => return Err(UnknownFragmentErr(name.clone()))
                    };
                    if !params.is_empty() {
                        let mut pos = 0usize;
                        rename_leafs(&mut replacement, &params, &mut pos, &name)?;
                    }
                    *child = replacement;
                    self.expand_core(child)?;
                }
            }
        }
        Ok(())
    }
}

/// Renames the register/immediate leaves of a fragment definition, in
/// pre-order, from the referring operand's parameter list. Other leaves
/// keep the names the fragment was written with.
fn rename_leafs(tree : &mut Expr,
                names : &[String],
                pos : &mut usize,
                frag_name : &str) -> SelgenResult<()> {
    match tree {
        Expr::Operand(o) => {
            match o.kind {
                OperandKind::Register(_) | OperandKind::Immediate => {
                    if *pos >= names.len() {
                        return Err(FragmentParamsExhaustedErr(frag_name.to_string()))
                    }
                    o.change_name(names[*pos].clone());
                    *pos += 1;
                }
                _ => ()
            }
            Ok(())
        }
        Expr::Operator(o) => {
            for child in o.children.iter_mut() {
                rename_leafs(child, names, pos, frag_name)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod fragment_tests {
    use super::*;
    use crate::expr::{ mk_operand, mk_register, mk_immediate, mk_fragment,
                       mk_operator, mk_assign };
    use crate::tables::{ OperandTableManager, OperatorTableManager };
    use crate::regclass::RegisterClass;

    #[test]
    fn expands_with_parameter_renaming() {
        let mut types = OperandTableManager::new();
        let mut ops = OperatorTableManager::new();
        let int = types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let add = ops.get_type("+");

        let mut frags = FragmentManager::new();
        // addr_calc(base, off) = base + off
        let body = mk_operator(add, vec![mk_register(&gpr, "base"),
                                         mk_immediate(int, "off")]).unwrap();
        frags.add_fragment("addr_calc", body);

        let frag_ref = mk_fragment("addr_calc",
                                   vec!["sp".to_string(), "disp".to_string()]);
        let mut tree = mk_assign(mk_register(&gpr, "dst"), frag_ref, None);
        frags.expand_tree(&mut tree).unwrap();

        assert!(!tree.contains_fragment());
        assert_eq!(tree.leaf_names().unwrap(),
                   vec!["dst".to_string(), "sp".to_string()]);
        let rhs = tree.as_operator().unwrap().children[1].as_operator().unwrap();
        assert_eq!(rhs.children[0].as_operand().unwrap().name, "sp");
        assert_eq!(rhs.children[1].as_operand().unwrap().name, "disp");
    }

    #[test]
    fn empty_parameter_list_keeps_original_names() {
        let mut types = OperandTableManager::new();
        let mut ops = OperatorTableManager::new();
        let int = types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let add = ops.get_type("+");

        let mut frags = FragmentManager::new();
        let body = mk_operator(add, vec![mk_register(&gpr, "base"),
                                         mk_register(&gpr, "idx")]).unwrap();
        frags.add_fragment("sum", body);

        let mut tree = mk_assign(mk_register(&gpr, "dst"),
                                 mk_fragment("sum", vec![]), None);
        frags.expand_tree(&mut tree).unwrap();
        assert_eq!(tree.leaf_names().unwrap(),
                   vec!["dst".to_string(), "base".to_string(), "idx".to_string()]);
    }

    #[test]
    fn last_alternative_wins() {
        let mut types = OperandTableManager::new();
        let int = types.get_type("int");
        let frag_a = mk_operand(int, "first");
        let frag_b = mk_operand(int, "second");

        let mut frags = FragmentManager::new();
        frags.add_fragment("alt", frag_a);
        frags.add_fragment("alt", frag_b);

        let mut tree = mk_assign(mk_operand(int, "dst"),
                                 mk_fragment("alt", vec![]), None);
        frags.expand_tree(&mut tree).unwrap();
        assert_eq!(tree.leaf_names().unwrap(),
                   vec!["dst".to_string(), "second".to_string()]);
    }

    #[test]
    fn unknown_fragment_is_an_error() {
        let mut types = OperandTableManager::new();
        let int = types.get_type("int");
        let frags = FragmentManager::new();
        let mut tree = mk_assign(mk_operand(int, "dst"),
                                 mk_fragment("missing", vec![]), None);
        assert!(frags.expand_tree(&mut tree).is_err());
    }

    #[test]
    fn fragment_at_root_is_an_error() {
        let frags = FragmentManager::new();
        let mut tree = mk_fragment("anything", vec![]);
        assert_eq!(frags.expand_tree(&mut tree), Err(crate::errors::SelgenErr::FragmentAtRootErr));
    }

    #[test]
    fn exhausted_parameters_are_an_error() {
        let mut types = OperandTableManager::new();
        let mut ops = OperatorTableManager::new();
        let int = types.get_type("int");
        let gpr = RegisterClass::new("GPR", int);
        let add = ops.get_type("+");

        let mut frags = FragmentManager::new();
        let body = mk_operator(add, vec![mk_register(&gpr, "base"),
                                         mk_register(&gpr, "idx")]).unwrap();
        frags.add_fragment("sum", body);

        let mut tree = mk_assign(mk_register(&gpr, "dst"),
                                 mk_fragment("sum", vec!["only_one".to_string()]),
                                 None);
        assert!(frags.expand_tree(&mut tree).is_err());
    }
}
