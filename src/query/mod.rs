// Query Processing Module
//
// This module contains the row-expression AST and the execution components
// for scanning VALUES lists.

// Re-export key components
pub mod ast;
pub mod executor;

// Export key public interfaces
pub use executor::result::QueryResult;
