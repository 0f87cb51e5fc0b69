/// Errors here are internal-invariant violations; the search engine itself
/// is total and reports "no implementation found" as an infinite-cost
/// result, never as an error. Anything that does surface as a `SelgenErr`
/// means the caller handed the core a malformed tree or rule, and the
/// current invocation is abandoned. Most variants carry the `file!()` and
/// `line!()` of the detection site since the trees involved are usually
/// machine-generated and the message alone would not say much.

pub type SelgenResult<T> = Result<T, SelgenErr>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelgenErr {
    /// An operator was built with a child count different from its
    /// declared arity.
    ArityMismatchErr(&'static str, u32, usize, usize),
    /// A fragment operand survived until a phase that requires fragments
    /// to have been expanded away.
    FragmentInSearchErr(&'static str, u32, String),
    /// A fragment operand names a fragment that was never registered.
    UnknownFragmentErr(String),
    /// The root of a semantic tree is a fragment operand; expansion is
    /// only defined below an operator.
    FragmentAtRootErr,
    /// A fragment's parameter list ran out before its alternative's
    /// register/immediate leaves did.
    FragmentParamsExhaustedErr(String),
    /// A rule carries a decomposition operator somewhere other than the
    /// root of the rewritten side (or directly under another one).
    MisplacedDecompositionErr(u32),
}

impl std::fmt::Display for SelgenErr {
    fn fmt(&self, f : &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SelgenErr::ArityMismatchErr(file, loc, want, got) => write!(f, "Fatal error at {} line {}; operator built with {} children but its type declares arity {}\n", file, loc, got, want),
            SelgenErr::FragmentInSearchErr(file, loc, name) => write!(f, "Fatal error at {} line {}; fragment operand `{}` reached the search engine. Fragments must be expanded before searching.\n", file, loc, name),
            SelgenErr::UnknownFragmentErr(name) => write!(f, "Fragment operand references `{}`, but no fragment with that name was registered.\n", name),
            SelgenErr::FragmentAtRootErr => write!(f, "The root node of a tree is a fragment operand; expansion at the root is not supported.\n"),
            SelgenErr::FragmentParamsExhaustedErr(name) => write!(f, "Fragment `{}` has more register/immediate leaves than the parameter list naming them.\n", name),
            SelgenErr::MisplacedDecompositionErr(id) => write!(f, "Rule {} places a decomposition operator below an ordinary operator; severing such a tree is undefined, so the rule is rejected.\n", id),
        }
    }
}

impl std::error::Error for SelgenErr {}
