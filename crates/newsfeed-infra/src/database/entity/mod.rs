//! SeaORM entities.

pub mod article;
