//! labelnet
//!
//! Backend of a dataset labeling and neural-network building app: an HTTP
//! API over datasets, labels, areas, models and layers, plus the workflow
//! that builds, trains and evaluates the models.

pub mod api;
pub mod commands;
pub mod workflow;
