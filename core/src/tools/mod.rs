pub mod context;
pub mod registry;
pub mod spec;
pub mod validation;
