pub mod categorizer;
pub mod rules;
