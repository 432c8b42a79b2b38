pub mod constants;
pub mod disorder;
pub mod fasta;
pub mod filter;
pub mod header;
pub mod prepare;
pub mod subset;
