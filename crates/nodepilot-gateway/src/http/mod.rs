pub mod error;
pub mod health;
pub mod machines;
pub mod nodes;
