/// The explicit result of running one node.
///
/// `Outcome` represents "Control Flow as Data": a node never panics or
/// short-circuits the engine, it hands back either the next state or a fault.
/// Where the workflow goes after `Next` is decided by the graph, not the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    /// The node completed and produced the next state.
    Next(T),

    /// The node failed. The engine discards any partial state.
    Fault(E),
}

impl<T, E> Outcome<T, E> {
    pub fn next(value: T) -> Self {
        Outcome::Next(value)
    }

    pub fn fault(error: E) -> Self {
        Outcome::Fault(error)
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault(_))
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, op: F) -> Outcome<U, E> {
        match self {
            Outcome::Next(t) => Outcome::Next(op(t)),
            Outcome::Fault(e) => Outcome::Fault(e),
        }
    }

    pub fn map_fault<F2, F: FnOnce(E) -> F2>(self, op: F) -> Outcome<T, F2> {
        match self {
            Outcome::Next(t) => Outcome::Next(t),
            Outcome::Fault(e) => Outcome::Fault(op(e)),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Next(t) => Ok(t),
            Outcome::Fault(e) => Err(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(t) => Outcome::Next(t),
            Err(e) => Outcome::Fault(e),
        }
    }
}
