use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::Relaxed;

use crate::tables::{ OperandType, OperatorType, CondCode, elf_hash, elf_mix,
                     ASSIGN_OP, DECOMP_OP };
use crate::regclass::RegisterClass;
use crate::errors::{ SelgenResult, SelgenErr::* };

/// The expression algebra. A tree is either an operand (a leaf naming some
/// storage, constant, or immediate) or an operator owning a fixed-arity
/// vector of children. An instruction's semantics, the compiler's query
/// patterns, and both sides of every transformation rule are all trees of
/// this one type.
///
/// Ownership is strict: an operator owns its children outright and a clone
/// is a fully independent deep copy. This matters because rule application
/// rewrites operand names in place; nothing may be shared between the tree
/// being rewritten and the rule that produced it.

/// Value carried by a constant operand.
pub type ConstVal = u32;

/// Globally visible incrementing counter used to name constants. Two
/// constants built independently never share a name, even when they carry
/// the same value.
pub static CONST_SERIAL : AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Operand(Operand),
    Operator(Operator),
}

/// What kind of leaf an operand is. The engine needs to tell these apart
/// in a handful of places (constants match by value, immediates must pair
/// with immediates, fragments may not reach the search at all), and a
/// closed set keeps every such place an exhaustive match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    /// Plain storage reference; the usual case.
    Storage,
    /// A compile-time known value. Constants are auto-named `CONST_<n>`.
    Constant(ConstVal),
    /// A value that must be encodable in the instruction word itself.
    Immediate,
    /// A reference to a register class, carrying the class name.
    Register(String),
    /// A placeholder naming a fragment tree and the parameters to rename
    /// its leaves with. Eliminated by expansion before any search.
    Fragment(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub type_ : OperandType,
    pub name : String,
    pub kind : OperandKind,
}

impl Operand {
    pub fn change_name(&mut self, new_name : impl Into<String>) {
        self.name = new_name.into();
    }

    pub fn is_constant(&self) -> bool {
        match self.kind {
            OperandKind::Constant(_) => true,
            _ => false
        }
    }

    pub fn is_immediate(&self) -> bool {
        match self.kind {
            OperandKind::Immediate => true,
            _ => false
        }
    }

    pub fn is_fragment(&self) -> bool {
        match self.kind {
            OperandKind::Fragment(_) => true,
            _ => false
        }
    }

    pub fn const_val(&self) -> Option<ConstVal> {
        match self.kind {
            OperandKind::Constant(v) => Some(v),
            _ => None
        }
    }

    pub fn register_class(&self) -> Option<&str> {
        match &self.kind {
            OperandKind::Register(class) => Some(class.as_str()),
            _ => None
        }
    }
}

/// The guard of a predicated assignment: `lhs <cmp> rhs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub comparator : CondCode,
    pub lhs : Box<Expr>,
    pub rhs : Box<Expr>,
}

impl Predicate {
    pub fn mk(comparator : CondCode, lhs : Expr, rhs : Expr) -> Self {
        Predicate { comparator, lhs : Box::new(lhs), rhs : Box::new(rhs) }
    }
}

/// An interior node. `ret` is the type of the value the operator produces;
/// it defaults to the wildcard until the enclosing generator annotates it.
/// `pred` is only ever present on assignment operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub op : OperatorType,
    pub ret : OperandType,
    pub children : Vec<Expr>,
    pub pred : Option<Predicate>,
}

impl Operator {
    pub fn is_assign(&self) -> bool {
        self.op.type_id == ASSIGN_OP
    }

    pub fn set_ret_type(&mut self, type_ : OperandType) {
        self.ret = type_;
    }
}

pub fn mk_operand(type_ : OperandType, name : impl Into<String>) -> Expr {
    Expr::Operand(Operand { type_, name : name.into(), kind : OperandKind::Storage })
}

/// Constants have no user-visible name; each one gets `CONST_<n>` off the
/// process-wide counter.
pub fn mk_constant(val : ConstVal, type_ : OperandType) -> Expr {
    let num = CONST_SERIAL.fetch_add(1, Relaxed);
    Expr::Operand(Operand {
        type_,
        name : format!("CONST_{}", num),
        kind : OperandKind::Constant(val),
    })
}

pub fn mk_immediate(type_ : OperandType, name : impl Into<String>) -> Expr {
    Expr::Operand(Operand { type_, name : name.into(), kind : OperandKind::Immediate })
}

/// A register operand takes its type from its class.
pub fn mk_register(class : &RegisterClass, name : impl Into<String>) -> Expr {
    Expr::Operand(Operand {
        type_ : class.operand_type(),
        name : name.into(),
        kind : OperandKind::Register(class.name().to_string()),
    })
}

pub fn mk_fragment(name : impl Into<String>, params : Vec<String>) -> Expr {
    Expr::Operand(Operand {
        type_ : OperandType::wildcard(),
        name : name.into(),
        kind : OperandKind::Fragment(params),
    })
}

/// Child count must equal the operator's declared arity at every
/// observable point, so violations are caught right here.
pub fn mk_operator(op : OperatorType, children : Vec<Expr>) -> SelgenResult<Expr> {
    if children.len() != op.arity {
        return Err(ArityMismatchErr(file!(), line!(), op.arity, children.len()))
    }
    Ok(Expr::Operator(Operator {
        op,
        ret : OperandType::wildcard(),
        children,
        pred : None,
    }))
}

/// The assignment operator, optionally guarded by a predicate.
pub fn mk_assign(lhs : Expr, rhs : Expr, pred : Option<Predicate>) -> Expr {
    Expr::Operator(Operator {
        op : OperatorType::mk(ASSIGN_OP, 2),
        ret : OperandType::wildcard(),
        children : vec![lhs, rhs],
        pred,
    })
}

impl Expr {
    pub fn is_operand(&self) -> bool {
        match self {
            Expr::Operand(_) => true,
            _ => false
        }
    }

    pub fn is_operator(&self) -> bool {
        match self {
            Expr::Operator(_) => true,
            _ => false
        }
    }

    /// The operand's type id for a leaf, the operator's id otherwise.
    pub fn type_id(&self) -> u32 {
        match self {
            Expr::Operand(o) => o.type_.type_id,
            Expr::Operator(o) => o.op.type_id,
        }
    }

    /// The operand's size for a leaf, the return-type size otherwise.
    pub fn size(&self) -> u32 {
        match self {
            Expr::Operand(o) => o.type_.size,
            Expr::Operator(o) => o.ret.size,
        }
    }

    pub fn as_operand(&self) -> Option<&Operand> {
        match self {
            Expr::Operand(o) => Some(o),
            _ => None
        }
    }

    pub fn as_operator(&self) -> Option<&Operator> {
        match self {
            Expr::Operator(o) => Some(o),
            _ => None
        }
    }

    pub fn as_operator_mut(&mut self) -> Option<&mut Operator> {
        match self {
            Expr::Operator(o) => Some(o),
            _ => None
        }
    }

    /// Seeded structural hash, folded post-order with the ELF mixing step.
    /// Operands hash their name bytes (constants hash their value instead,
    /// since their generated names carry no identity); an operator folds
    /// each child's hash into the chain and then mixes in its own id.
    /// Structurally equal subtrees hash equally; the converse is not
    /// required, the hash only keys the transformation cache.
    pub fn hash_chain(&self, seed : u64) -> u64 {
        match self {
            Expr::Operand(o) => match o.kind {
                OperandKind::Constant(v) => elf_hash(&v.to_le_bytes(), seed),
                _ => elf_hash(o.name.as_bytes(), seed),
            },
            Expr::Operator(o) => {
                let mut chain = seed;
                for child in &o.children {
                    chain = child.hash_chain(chain);
                }
                elf_mix(chain, u64::from(o.op.type_id))
            }
        }
    }

    /// The operator id the pruning heuristic keys on. Leaves have none; an
    /// assignment is represented by whatever it assigns (its second
    /// child); the decomposition connective constrains nothing and
    /// reports the wildcard.
    pub fn primary_op(&self) -> u32 {
        match self {
            Expr::Operand(_) => 0,
            Expr::Operator(o) => {
                if o.op.type_id == ASSIGN_OP {
                    o.children.get(1).map_or(0, |rhs| rhs.primary_op())
                } else if o.op.type_id == DECOMP_OP {
                    0
                } else {
                    o.op.type_id
                }
            }
        }
    }

    /// Left-to-right pre-order collection of operand names: the names that
    /// become an instruction's operand definition once the tree matches.
    /// Constants and immediates carry no binding and are skipped; the
    /// guard of a predicated assignment contributes its names first.
    /// Fragments must have been expanded long before anyone asks.
    pub fn leaf_names(&self) -> SelgenResult<Vec<String>> {
        let mut acc = Vec::new();
        self.leaf_names_core(&mut acc)?;
        Ok(acc)
    }

    fn leaf_names_core(&self, acc : &mut Vec<String>) -> SelgenResult<()> {
        match self {
            Expr::Operand(o) => {
                match &o.kind {
                    OperandKind::Constant(_) | OperandKind::Immediate => (),
                    OperandKind::Fragment(_) => {
                        return Err(FragmentInSearchErr(file!(), line!(), o.name.clone()))
                    }
                    _ => acc.push(o.name.clone()),
                }
                Ok(())
            }
            Expr::Operator(o) => {
                if let Some(pred) = &o.pred {
                    pred.lhs.leaf_names_core(acc)?;
                    pred.rhs.leaf_names_core(acc)?;
                }
                for child in &o.children {
                    child.leaf_names_core(acc)?;
                }
                Ok(())
            }
        }
    }

    /// Whether an operator with the given id occurs anywhere in the tree.
    pub fn contains_operator(&self, op_id : u32) -> bool {
        match self {
            Expr::Operand(_) => false,
            Expr::Operator(o) => {
                o.op.type_id == op_id
                || o.children.iter().any(|c| c.contains_operator(op_id))
            }
        }
    }

    /// Whether any leaf of the tree is a fragment operand.
    pub fn contains_fragment(&self) -> bool {
        match self {
            Expr::Operand(o) => o.is_fragment(),
            Expr::Operator(o) => {
                o.pred.as_ref().map_or(false, |p| {
                    p.lhs.contains_fragment() || p.rhs.contains_fragment()
                })
                || o.children.iter().any(|c| c.contains_fragment())
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Expr::Operand(o) => match &o.kind {
                OperandKind::Constant(v) => write!(f, "{}", v),
                OperandKind::Register(class) => write!(f, "{}:{}", class, o.name),
                _ => write!(f, "{}", o.name),
            },
            Expr::Operator(o) => {
                write!(f, "(op{}", o.op.type_id)?;
                for child in &o.children {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod expr_tests {
    use super::*;
    use crate::tables::{ OperandTableManager, OperatorTableManager };

    fn int_ty() -> OperandType {
        OperandTableManager::new().get_type("int")
    }

    fn add_op() -> OperatorType {
        OperatorTableManager::new().get_type("+")
    }

    #[test]
    fn clone_is_deep_and_equal() {
        let t = mk_assign(
            mk_operand(int_ty(), "a"),
            mk_operator(add_op(), vec![mk_operand(int_ty(), "b"),
                                       mk_operand(int_ty(), "c")]).unwrap(),
            None);
        let mut c = t.clone();
        assert_eq!(t, c);

        // Renaming a leaf of the clone must not touch the original.
        if let Expr::Operator(op) = &mut c {
            if let Expr::Operand(o) = &mut op.children[0] {
                o.change_name("z");
            }
        }
        assert_ne!(t, c);
    }

    #[test]
    fn hashes_agree_on_equal_structure() {
        let t1 = mk_operator(add_op(), vec![mk_operand(int_ty(), "x"),
                                            mk_operand(int_ty(), "y")]).unwrap();
        let t2 = mk_operator(add_op(), vec![mk_operand(int_ty(), "x"),
                                            mk_operand(int_ty(), "y")]).unwrap();
        for seed in &[0u64, 1, 0xdead_beef] {
            assert_eq!(t1.hash_chain(*seed), t2.hash_chain(*seed));
            assert_eq!(t1.hash_chain(*seed), t1.clone().hash_chain(*seed));
        }
        let t3 = mk_operator(add_op(), vec![mk_operand(int_ty(), "y"),
                                            mk_operand(int_ty(), "x")]).unwrap();
        assert_ne!(t1.hash_chain(0), t3.hash_chain(0));
    }

    #[test]
    fn equal_constants_hash_equal_despite_generated_names() {
        let c1 = mk_constant(7, int_ty());
        let c2 = mk_constant(7, int_ty());
        assert_ne!(c1.as_operand().unwrap().name, c2.as_operand().unwrap().name);
        assert_eq!(c1.hash_chain(0), c2.hash_chain(0));
    }

    #[test]
    fn constant_names_increment() {
        let c1 = mk_constant(1, int_ty());
        let c2 = mk_constant(2, int_ty());
        let n1 : u32 = c1.as_operand().unwrap().name["CONST_".len()..].parse().unwrap();
        let n2 : u32 = c2.as_operand().unwrap().name["CONST_".len()..].parse().unwrap();
        assert!(n2 > n1);
    }

    #[test]
    fn primary_op_looks_through_assign() {
        let add = mk_operator(add_op(), vec![mk_operand(int_ty(), "b"),
                                             mk_operand(int_ty(), "c")]).unwrap();
        let t = mk_assign(mk_operand(int_ty(), "a"), add, None);
        assert_eq!(t.primary_op(), crate::tables::ADD_OP);
        assert_eq!(mk_operand(int_ty(), "a").primary_op(), 0);
    }

    #[test]
    fn primary_op_of_decomp_is_wildcard() {
        let mut ops = OperatorTableManager::new();
        let dec = ops.get_type("dec");
        let t = mk_operator(dec, vec![mk_operand(int_ty(), "a"),
                                      mk_operand(int_ty(), "b")]).unwrap();
        assert_eq!(t.primary_op(), 0);
    }

    #[test]
    fn leaf_names_are_preorder_and_skip_const_imm() {
        let add = mk_operator(add_op(), vec![mk_constant(4, int_ty()),
                                             mk_operand(int_ty(), "y")]).unwrap();
        let t = mk_assign(mk_operand(int_ty(), "x"), add, None);
        assert_eq!(t.leaf_names().unwrap(), vec!["x".to_string(), "y".to_string()]);

        let imm = mk_assign(mk_operand(int_ty(), "x"),
                            mk_immediate(int_ty(), "i"), None);
        assert_eq!(imm.leaf_names().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn predicate_names_come_first() {
        let pred = Predicate::mk(CondCode::Eq,
                                 mk_operand(int_ty(), "p"),
                                 mk_operand(int_ty(), "q"));
        let t = mk_assign(mk_operand(int_ty(), "x"),
                          mk_operand(int_ty(), "y"),
                          Some(pred));
        assert_eq!(t.leaf_names().unwrap(),
                   vec!["p".to_string(), "q".to_string(), "x".to_string(), "y".to_string()]);
    }

    #[test]
    fn leaf_names_reject_fragments() {
        let t = mk_operator(add_op(), vec![mk_fragment("frag", vec![]),
                                           mk_operand(int_ty(), "y")]).unwrap();
        assert!(t.leaf_names().is_err());
        assert!(t.contains_fragment());
    }

    #[test]
    fn operator_arity_is_enforced() {
        let bad = mk_operator(add_op(), vec![mk_operand(int_ty(), "only")]);
        assert!(bad.is_err());
    }

    #[test]
    fn contains_operator_descends() {
        let mut ops = OperatorTableManager::new();
        let neg = ops.get_type("~");
        let inner = mk_operator(neg, vec![mk_operand(int_ty(), "z")]).unwrap();
        let t = mk_operator(add_op(), vec![mk_operand(int_ty(), "y"), inner]).unwrap();
        assert!(t.contains_operator(crate::tables::NEG_OP));
        assert!(!t.contains_operator(crate::tables::SUB_OP));
    }
}
