pub mod annotation;
pub mod categorize;
pub mod cli;
pub mod commands;
pub mod database;
pub mod sequence;
pub mod settings;
pub mod tools;
pub mod uniprot;
pub mod util;
