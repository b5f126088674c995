//! Code generation — emits the C++ project from a decoded module.
//!
//! The pipeline is strictly one-shot:
//!
//! ```text
//! ParsedModule ──► instruction (OpLowerer, over stack + blocks)
//!                      │  raw body lines
//!                      ▼
//!                  optimizer (textual post-passes)
//!                      │
//!                      ▼
//!                  function (declaration + definition)
//!                      │
//!                      ▼
//!                  module (inst.h/inst.cpp, mem.cpp, runtime templates)
//! ```
//!
//! `stack` and `blocks` hold the per-function translation state: the
//! symbolic operand stack with its flush discipline, and the nested
//! control regions that become labels and gotos. `imports` carries the
//! hand-written host bodies; `types` the value-type mapping.

pub mod blocks;
pub mod function;
pub mod imports;
pub mod instruction;
pub mod module;
pub mod stack;
pub mod types;
