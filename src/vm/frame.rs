use std::rc::Rc;

use crate::object::Closure;

/// Activation record of one call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Offset of the next instruction to execute.
    pub ip: usize,
    /// Stack slot of the first argument; locals follow the arguments.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame { closure, ip: 0, base_pointer }
    }
}
