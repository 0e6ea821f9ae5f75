//! # class-weaver
//!
//! Static bytecode weaver for JPA entity classes. Given compiled classes and a
//! descriptor model from the mapping layer, it adds lazy value holders,
//! attribute change tracking, fetch-group guards, keyed attribute access and
//! the other members a persistence runtime expects to find.
//!
//! ## Architecture
//!
//! - **classfile**: Class-file parsing, the append-only constant pool, descriptors and release table
//! - **emit**: Symbolic instructions, frame computation and member assembly
//! - **model**: Attribute and class descriptors, loaded from JSON and validated
//! - **weaver**: The per-class transformation
//! - **jar**: Parallel weaving of jars and class directories with atomic output
//! - **scan**: Class file and jar discovery
//! - **probe**: Classpath checks for optional annotation classes
//! - **cache**: Persistent ledger (heed/LMDB) of woven inputs
//! - **config**: Path, model and Java runtime resolution for the command line tool
//! - **logging**: tracing subscriber setup

pub mod cache;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod emit;
pub mod error;
pub mod jar;
pub mod logging;
pub mod model;
pub mod probe;
pub mod scan;
pub mod weaver;
