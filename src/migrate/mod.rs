pub mod migrator;
pub mod outcome;
pub mod verifier;
