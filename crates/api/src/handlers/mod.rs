//! Request handlers, grouped by resource.

pub mod alerts;
pub mod costs;
pub mod dashboard;
pub mod estimation;
pub mod operations;
pub mod safety;
