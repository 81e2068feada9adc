pub mod boundary;
pub mod global_variables;
pub mod table;
