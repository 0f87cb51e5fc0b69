#![forbid(unsafe_code)]
#![allow(unused_parens)]

//! Pattern-implementation search core of a compiler-backend generator.
//!
//! The enclosing generator parses a processor description into three
//! libraries: instructions (each with a cost and a list of semantic
//! expression trees, asserted in parallel), algebraic transformation
//! rules over the same expression algebra, and named semantic fragments.
//! All of that is registered in an [`env::Env`]. The engine in
//! [`search`] then takes a query expression tree and proves that some
//! ordered sequence of instructions, with appropriate operand bindings,
//! computes it: by direct structural match where possible, otherwise by
//! rewriting the query toward an instruction's semantics, recursing on
//! sub-expressions and on the pieces of decomposing rules.
//!
//! The engine is single-threaded and synchronous; bounded recursion
//! depth is its only cancellation mechanism. It never renders backend
//! source files, parses description text, or touches disk — those jobs
//! belong to its collaborators.

pub mod errors;
pub mod tables;
pub mod regclass;
pub mod expr;
pub mod fragment;
pub mod matching;
pub mod rules;
pub mod instruction;
pub mod env;
pub mod search;
