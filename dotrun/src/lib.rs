// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![deny(missing_docs)]

//! # dotrun
//!
//! A standalone interpreter for CIL (Common Intermediate Language) bytecode.
//! `dotrun` loads a .NET assembly in the PE/CLI file format (ECMA-335),
//! resolves its metadata, and interprets the body of its entry-point method,
//! without depending on any existing managed runtime. A minimal subset of the
//! base class library is re-implemented in the host, sufficient to run
//! console-style programs: arithmetic, strings, arrays, simple object graphs,
//! exceptions, reflection tokens and delegates.
//!
//! # Architecture
//!
//! The crate is organized into four layers, each consuming the one below:
//!
//! - **File layer** ([`file`]) - PE32/PE32+ parsing and RVA translation
//! - **Metadata layer** ([`metadata`]) - ECMA-335 streams, tables, signatures
//!   and the immutable descriptor graph ([`metadata::CilImage`])
//! - **Disassembler** ([`disassembler`]) - method-body headers and IL
//!   decoding into operand-resolved instruction streams
//! - **Engine** ([`engine`]) - the execution core: tagged values, managed
//!   heap, static fields, method resolution, opcode dispatch and the
//!   internal-method registry that impersonates the base library
//!
//! # Usage
//!
//! ```rust,no_run
//! use dotrun::{engine::Engine, metadata::CilImage};
//! use std::path::Path;
//!
//! let image = CilImage::from_file(Path::new("program.exe"))?;
//! let mut engine = Engine::new(image, Path::new("."))?;
//! engine.start(&["hello".into()])?;
//! # Ok::<(), dotrun::Error>(())
//! ```
//!
//! # Execution model
//!
//! The engine is single-threaded and synchronous: one logical thread of
//! managed execution, no scheduler, no suspension points inside the
//! interpreter loop. A method call is a blocking recursion on the host
//! stack. Cancellation is cooperative: [`engine::Engine::cancel_token`]
//! exposes a flag that is observed between instructions.
//!
//! # Standards
//!
//! Metadata structures and instruction encodings follow the ECMA-335
//! specification (6th edition). Unsupported features (generics, a verifier,
//! a JIT, garbage collection, P/Invoke) fail with explicit errors rather
//! than silently misbehaving.

#[macro_use]
mod error;

pub mod disassembler;
pub mod engine;
pub mod file;
pub mod metadata;

/// `dotrun` Result type.
///
/// A type alias for `std::result::Result<T, Error>` used throughout the
/// loading and decoding layers.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use file::{parser::Parser, File};
pub use metadata::CilImage;
