use indexmap::{ IndexMap, IndexSet };

use crate::tables::OperandType;

/// The register-side description of the machine. The search core itself
/// only needs to know which class a register operand belongs to (the class
/// supplies the operand's type), but the enclosing generator registers the
/// full picture here so the template collaborators can read it back.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Register {
    name : String,
    sub_regs : Vec<String>,
}

impl Register {
    pub fn new(name : impl Into<String>) -> Self {
        Register { name : name.into(), sub_regs : Vec::new() }
    }

    pub fn add_sub_reg(&mut self, name : impl Into<String>) {
        self.sub_regs.push(name.into());
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sub_regs(&self) -> impl Iterator<Item = &String> {
        self.sub_regs.iter()
    }
}

/// A class of uniform registers. Operands referencing the class take its
/// operand type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterClass {
    name : String,
    type_ : OperandType,
    registers : IndexSet<String>,
}

impl RegisterClass {
    pub fn new(name : impl Into<String>, type_ : OperandType) -> Self {
        RegisterClass {
            name : name.into(),
            type_,
            registers : IndexSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operand_type(&self) -> OperandType {
        self.type_
    }

    /// Returns false if the register was already a member.
    pub fn add_register(&mut self, reg_name : impl Into<String>) -> bool {
        self.registers.insert(reg_name.into())
    }

    pub fn has_register(&self, reg_name : &str) -> bool {
        self.registers.contains(reg_name)
    }

    pub fn registers(&self) -> impl Iterator<Item = &String> {
        self.registers.iter()
    }
}

/// What registers (or how much stack) carry a parameter or return value of
/// a given operand type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallingConvention {
    pub is_return_convention : bool,
    pub use_stack : bool,
    pub stack_size : u32,
    pub stack_align : u32,
    pub type_ : OperandType,
    regs : Vec<String>,
}

impl CallingConvention {
    pub fn new(is_return_convention : bool, use_stack : bool, type_ : OperandType) -> Self {
        CallingConvention {
            is_return_convention,
            use_stack,
            stack_size : 0,
            stack_align : 0,
            type_,
            regs : Vec::new(),
        }
    }

    pub fn add_register(&mut self, name : impl Into<String>) {
        self.regs.push(name.into());
    }

    pub fn registers(&self) -> impl Iterator<Item = &String> {
        self.regs.iter()
    }
}

/// Owns every register, class and convention registered for the target,
/// plus the handful of registers with dedicated roles. Registration order
/// is preserved; collaborators emitting register definitions depend on it.
pub struct RegClassManager {
    classes : IndexMap<String, RegisterClass>,
    registers : IndexMap<String, Register>,
    callee_saved : IndexSet<String>,
    reserved : IndexSet<String>,
    auxiliar : IndexSet<String>,
    calling_conventions : Vec<CallingConvention>,
    program_counter : Option<String>,
    return_register : Option<String>,
    frame_pointer : Option<String>,
    stack_pointer : Option<String>,
}

impl RegClassManager {
    pub fn new() -> Self {
        RegClassManager {
            classes : IndexMap::new(),
            registers : IndexMap::new(),
            callee_saved : IndexSet::new(),
            reserved : IndexSet::new(),
            auxiliar : IndexSet::new(),
            calling_conventions : Vec::new(),
            program_counter : None,
            return_register : None,
            frame_pointer : None,
            stack_pointer : None,
        }
    }

    pub fn add_reg_class(&mut self, class : RegisterClass) -> bool {
        if self.classes.contains_key(class.name()) {
            return false
        }
        self.classes.insert(class.name().to_string(), class);
        true
    }

    pub fn add_register(&mut self, reg : Register) -> bool {
        if self.registers.contains_key(reg.name()) {
            return false
        }
        self.registers.insert(reg.name().to_string(), reg);
        true
    }

    /// Callee-saved registers must also exist in the plain register list;
    /// that list is the one collaborators use for definitions.
    pub fn add_callee_saved(&mut self, reg_name : impl Into<String>) -> bool {
        self.callee_saved.insert(reg_name.into())
    }

    pub fn add_reserved(&mut self, reg_name : impl Into<String>) -> bool {
        self.reserved.insert(reg_name.into())
    }

    pub fn add_auxiliar(&mut self, reg_name : impl Into<String>) -> bool {
        self.auxiliar.insert(reg_name.into())
    }

    pub fn add_calling_convention(&mut self, conv : CallingConvention) {
        self.calling_conventions.push(conv);
    }

    pub fn get_reg_class(&self, name : &str) -> Option<&RegisterClass> {
        self.classes.get(name)
    }

    pub fn get_reg_class_mut(&mut self, name : &str) -> Option<&mut RegisterClass> {
        self.classes.get_mut(name)
    }

    pub fn get_register(&self, name : &str) -> Option<&Register> {
        self.registers.get(name)
    }

    /// The class a register belongs to, if any class claims it.
    pub fn class_of(&self, reg_name : &str) -> Option<&RegisterClass> {
        self.classes.values().find(|c| c.has_register(reg_name))
    }

    /// Every register that is neither callee-saved nor reserved.
    pub fn caller_saved(&self) -> Vec<&Register> {
        self.registers
            .values()
            .filter(|r| !self.callee_saved.contains(r.name()))
            .collect()
    }

    pub fn classes(&self) -> impl Iterator<Item = &RegisterClass> {
        self.classes.values()
    }

    pub fn registers(&self) -> impl Iterator<Item = &Register> {
        self.registers.values()
    }

    pub fn callee_saved(&self) -> impl Iterator<Item = &String> {
        self.callee_saved.iter()
    }

    pub fn reserved(&self) -> impl Iterator<Item = &String> {
        self.reserved.iter()
    }

    pub fn auxiliar(&self) -> impl Iterator<Item = &String> {
        self.auxiliar.iter()
    }

    pub fn calling_conventions(&self) -> impl Iterator<Item = &CallingConvention> {
        self.calling_conventions.iter()
    }

    pub fn set_program_counter(&mut self, reg : impl Into<String>) {
        self.program_counter = Some(reg.into());
    }

    pub fn set_return_register(&mut self, reg : impl Into<String>) {
        self.return_register = Some(reg.into());
    }

    pub fn set_frame_pointer(&mut self, reg : impl Into<String>) {
        self.frame_pointer = Some(reg.into());
    }

    pub fn set_stack_pointer(&mut self, reg : impl Into<String>) {
        self.stack_pointer = Some(reg.into());
    }

    pub fn program_counter(&self) -> Option<&str> {
        self.program_counter.as_ref().map(|s| s.as_str())
    }

    pub fn return_register(&self) -> Option<&str> {
        self.return_register.as_ref().map(|s| s.as_str())
    }

    pub fn frame_pointer(&self) -> Option<&str> {
        self.frame_pointer.as_ref().map(|s| s.as_str())
    }

    pub fn stack_pointer(&self) -> Option<&str> {
        self.stack_pointer.as_ref().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod regclass_tests {
    use super::*;
    use crate::tables::OperandTableManager;

    #[test]
    fn class_membership_and_lookup() {
        let mut types = OperandTableManager::new();
        let int = types.get_type("int");

        let mut man = RegClassManager::new();
        let mut gpr = RegisterClass::new("GPR", int);
        assert!(gpr.add_register("r1"));
        assert!(!gpr.add_register("r1"));
        assert!(man.add_reg_class(gpr));

        man.add_register(Register::new("r1"));
        man.add_register(Register::new("r2"));
        man.add_callee_saved("r2");

        assert!(man.get_reg_class("GPR").unwrap().has_register("r1"));
        assert_eq!(man.class_of("r1").unwrap().name(), "GPR");
        assert!(man.class_of("r9").is_none());

        let caller_saved = man.caller_saved();
        assert_eq!(caller_saved.len(), 1);
        assert_eq!(caller_saved[0].name(), "r1");
    }

    #[test]
    fn dedicated_registers() {
        let mut man = RegClassManager::new();
        man.add_register(Register::new("r14"));
        man.set_stack_pointer("r14");
        assert_eq!(man.stack_pointer(), Some("r14"));
        assert_eq!(man.frame_pointer(), None);
    }
}
