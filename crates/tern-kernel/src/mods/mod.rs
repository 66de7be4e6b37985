//! Modules importable with `use`, registered through
//! [`Evaler::add_module`](crate::Evaler::add_module).

pub mod store;
