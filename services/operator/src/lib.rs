// operator: Interactive shell for managing rotation controllers and the
// relay session from the operator side.

pub mod render;
pub mod shell;
