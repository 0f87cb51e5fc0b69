use fxhash::FxHashMap;
use indexmap::IndexMap;
use once_cell::sync::Lazy;

/// Operand and operator *types* are plain integer ids handed out by the two
/// table managers below. A fixed set of ids is reserved for the operators
/// and operand types the engine itself has to recognize; everything else is
/// minted on demand by hashing the user's name for it, so that the same
/// name always maps to the same id within a process, and collisions are
/// resolved by bumping the id until it is free.

/// Type id `0` is the wildcard; it compares equal to every type.
pub const WILDCARD_TYPE : u32 = 0;
pub const INT_TYPE      : u32 = 1;
pub const COND_TYPE     : u32 = 2;
/// First id available for user-defined operand types.
pub const LAST_TYPE     : u32 = 3;

pub const ADD_OP    : u32 = 1;
pub const SUB_OP    : u32 = 2;
pub const NEG_OP    : u32 = 3;
pub const DECOMP_OP : u32 = 4;
pub const IF_OP     : u32 = 5;
pub const ASSIGN_OP : u32 = 6;
pub const MEMREF_OP : u32 = 7;
pub const CALL_OP   : u32 = 8;
pub const RETURN_OP : u32 = 9;
/// First id available for user-defined operators.
pub const LAST_OP   : u32 = 10;

pub const INT_TYPE_STR  : &str = "int";
pub const COND_TYPE_STR : &str = "cond";
pub const ANY_TYPE_STR  : &str = "ANY";

/// Source spellings of the built-in operators, paired with their reserved
/// ids and default arities. `dec` is the decomposition connective and
/// `transfer` the assignment.
static KNOWN_OPERATORS : Lazy<Vec<(&'static str, u32, usize)>> = Lazy::new(|| {
    vec![("+",        ADD_OP,    2),
         ("-",        SUB_OP,    2),
         ("~",        NEG_OP,    1),
         ("dec",      DECOMP_OP, 2),
         ("if",       IF_OP,     3),
         ("transfer", ASSIGN_OP, 2),
         ("memref",   MEMREF_OP, 1),
         ("call",     CALL_OP,   1),
         ("ret",      RETURN_OP, 1)]
});

/// ELF-style hash step; `elf_hash` folds a byte string with it, and the
/// expression algebra folds child digests and operator ids with it.
#[inline]
pub fn elf_mix(h : u64, x : u64) -> u64 {
    let h = (h << 4).wrapping_add(x);
    let hi = h & 0xf000_0000;
    (h ^ hi) ^ (hi >> 24)
}

pub fn elf_hash(bytes : &[u8], seed : u64) -> u64 {
    let mut h = seed;
    for b in bytes {
        h = elf_mix(h, u64::from(*b));
    }
    h
}

/// The type of an operand node: its id, its size in bits, and the id of
/// the data type it is register-compatible with (`set_compatible` below).
/// Two types are considered equal when their ids match or either id is the
/// wildcard; sizes are compared asymmetrically by the matcher.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OperandType {
    pub type_id   : u32,
    pub size      : u32,
    pub data_type : u32,
}

impl OperandType {
    pub fn mk(type_id : u32, size : u32, data_type : u32) -> Self {
        OperandType { type_id, size, data_type }
    }

    pub fn wildcard() -> Self {
        OperandType::mk(WILDCARD_TYPE, 0, WILDCARD_TYPE)
    }

    pub fn is_wildcard(&self) -> bool {
        self.type_id == WILDCARD_TYPE
    }
}

/// An operator type; arity is fixed per id, and every operator node with
/// this type owns exactly `arity` children.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OperatorType {
    pub type_id : u32,
    pub arity   : usize,
}

impl OperatorType {
    pub fn mk(type_id : u32, arity : usize) -> Self {
        OperatorType { type_id, arity }
    }
}

/// Comparators available to predicate-guarded assignments.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CondCode {
    Lt,
    Gt,
    Ult,
    Ugt,
    Ne,
    Eq,
}

impl CondCode {
    pub fn parse(s : &str) -> Option<CondCode> {
        match s {
            "lt"  => Some(CondCode::Lt),
            "gt"  => Some(CondCode::Gt),
            "ult" => Some(CondCode::Ult),
            "ugt" => Some(CondCode::Ugt),
            "ne"  => Some(CondCode::Ne),
            "eq"  => Some(CondCode::Eq),
            _     => None
        }
    }
}

/// Table of all operand types the enclosing generator has registered.
/// Lookups by a name that was never seen *create* the type, so `get_type`
/// takes `&mut self`; registration order is preserved because collaborators
/// iterate the table when emitting their own summaries.
pub struct OperandTableManager {
    type_map    : IndexMap<String, OperandType>,
    reverse_map : FxHashMap<u32, String>,
}

impl OperandTableManager {
    pub fn new() -> Self {
        OperandTableManager {
            type_map    : IndexMap::with_capacity(32),
            reverse_map : FxHashMap::default(),
        }
    }

    pub fn get_type(&mut self, name : &str) -> OperandType {
        if let Some(already) = self.type_map.get(name) {
            return *already
        }

        let mut new_type = OperandType::mk(0, 32, 0);

        match name {
            INT_TYPE_STR  => { new_type.type_id = INT_TYPE; }
            COND_TYPE_STR => { new_type.type_id = COND_TYPE; }
            _ => {
                new_type.type_id = elf_hash(name.as_bytes(), 0) as u32;
                if new_type.type_id < LAST_TYPE {
                    new_type.type_id += LAST_TYPE;
                }
            }
        }

        // Avoiding collisions
        while self.reverse_map.contains_key(&new_type.type_id) {
            new_type.type_id += 1;
        }

        new_type.data_type = new_type.type_id;

        self.type_map.insert(name.to_string(), new_type);
        self.reverse_map.insert(new_type.type_id, name.to_string());
        new_type
    }

    /// Re-sizes an already registered type. Returns `None` when the type
    /// was never registered.
    pub fn update_size(&mut self, type_ : OperandType, new_size : u32) -> Option<OperandType> {
        let name = self.reverse_map.get(&type_.type_id)?.clone();
        let entry = self.type_map.get_mut(&name)?;
        entry.size = new_size;
        Some(*entry)
    }

    /// Declares that operands of type `o1` may live in storage declared
    /// for `o2` by pointing `o1`'s data type at `o2`'s.
    pub fn set_compatible(&mut self, o1 : &str, o2 : &str) {
        let data_type = self.get_type(o2).data_type;
        self.get_type(o1);
        if let Some(entry) = self.type_map.get_mut(o1) {
            entry.data_type = data_type;
        }
    }

    pub fn type_name(&self, type_ : &OperandType) -> &str {
        if type_.is_wildcard() {
            return ANY_TYPE_STR
        }
        self.reverse_map.get(&type_.type_id).map(|s| s.as_str()).unwrap_or(ANY_TYPE_STR)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OperandType)> {
        self.type_map.iter()
    }
}

/// Table of all operator types. Built-in names get their reserved ids and
/// natural arities; unknown names are minted with arity 0, which the
/// enclosing generator fixes up with `update_arity` once it has seen a use.
pub struct OperatorTableManager {
    operator_map : IndexMap<String, OperatorType>,
    reverse_map  : FxHashMap<u32, String>,
}

impl OperatorTableManager {
    pub fn new() -> Self {
        OperatorTableManager {
            operator_map : IndexMap::with_capacity(32),
            reverse_map  : FxHashMap::default(),
        }
    }

    pub fn get_type(&mut self, name : &str) -> OperatorType {
        if let Some(already) = self.operator_map.get(name) {
            return *already
        }

        let mut new_type = match KNOWN_OPERATORS.iter().find(|(s, ..)| *s == name) {
            Some((_, id, arity)) => OperatorType::mk(*id, *arity),
            None => {
                let mut id = elf_hash(name.as_bytes(), 0) as u32;
                if id < LAST_OP {
                    id += LAST_OP;
                }
                OperatorType::mk(id, 0)
            }
        };

        // Avoiding collisions
        while self.reverse_map.contains_key(&new_type.type_id) {
            new_type.type_id += 1;
        }

        self.operator_map.insert(name.to_string(), new_type);
        self.reverse_map.insert(new_type.type_id, name.to_string());
        new_type
    }

    /// Makes `op1` another spelling of `op2`.
    pub fn set_alias(&mut self, op1 : &str, op2 : &str) {
        let target = self.get_type(op2);
        self.operator_map.insert(op1.to_string(), target);
    }

    pub fn update_arity(&mut self, type_ : OperatorType, new_arity : usize) -> Option<OperatorType> {
        let name = self.reverse_map.get(&type_.type_id)?.clone();
        let entry = self.operator_map.get_mut(&name)?;
        entry.arity = new_arity;
        Some(*entry)
    }

    pub fn operator_name(&self, type_ : &OperatorType) -> Option<&str> {
        self.reverse_map.get(&type_.type_id).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OperatorType)> {
        self.operator_map.iter()
    }
}
