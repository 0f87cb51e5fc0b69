use crate::expr::Expr;

/// An instruction and its semantics. The semantics are an ordered list of
/// expression trees, all asserted in parallel: one machine step performs
/// every one of them. The format name, mnemonic string, and operand names
/// are carried opaquely for the collaborators that render backend files;
/// the search engine itself reads only the cost and the semantic trees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    name : String,
    cost : u32,
    semantics : Vec<Expr>,
    format : String,
    mnemonic : String,
    operands : Vec<String>,
}

impl Instruction {
    pub fn new(name : impl Into<String>,
               cost : u32,
               format : impl Into<String>,
               mnemonic : impl Into<String>) -> Self {
        Instruction {
            name : name.into(),
            cost,
            semantics : Vec::new(),
            format : format.into(),
            mnemonic : mnemonic.into(),
            operands : Vec::new(),
        }
    }

    pub fn add_semantic(&mut self, tree : Expr) {
        self.semantics.push(tree);
    }

    pub fn add_operand(&mut self, name : impl Into<String>) {
        self.operands.push(name.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn set_cost(&mut self, cost : u32) {
        self.cost = cost;
    }

    /// Stable enumeration; semantic indices recorded in a `SearchResult`
    /// index into this order.
    pub fn semantics(&self) -> impl Iterator<Item = &Expr> {
        self.semantics.iter()
    }

    pub fn semantic(&self, idx : usize) -> Option<&Expr> {
        self.semantics.get(idx)
    }

    pub fn num_semantics(&self) -> usize {
        self.semantics.len()
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn operands(&self) -> impl Iterator<Item = &String> {
        self.operands.iter()
    }
}

/// The instruction library. Insertion order is preserved and is part of
/// the search contract: phase iteration and cost tie-breaking follow it.
/// Several instructions may share a name (one per addressing variant);
/// lookups disambiguate by occurrence index.
pub struct InstrManager {
    instructions : Vec<Instruction>,
}

impl InstrManager {
    pub fn new() -> Self {
        InstrManager { instructions : Vec::new() }
    }

    /// Returns the instruction's library index.
    pub fn add_instruction(&mut self, instr : Instruction) -> usize {
        self.instructions.push(instr);
        self.instructions.len() - 1
    }

    pub fn get(&self, idx : usize) -> Option<&Instruction> {
        self.instructions.get(idx)
    }

    /// The `occurrence`-th instruction carrying `name` (0-based), with its
    /// library index.
    pub fn get_by_name(&self, name : &str, occurrence : usize) -> Option<(usize, &Instruction)> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| i.name() == name)
            .nth(occurrence)
    }

    pub fn iter(&self) -> std::slice::Iter<Instruction> {
        self.instructions.iter()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}
