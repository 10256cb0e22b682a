//! Request handlers module

pub mod assignment;
pub mod department;
pub mod division;
pub mod position;
pub mod settings;
