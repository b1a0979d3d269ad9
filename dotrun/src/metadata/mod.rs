//! .NET metadata parsing and the resolved type system (ECMA-335).
//!
//! This module is organized in two layers:
//!
//! - **Physical** - [`streams`] and [`tables`] decode the raw metadata
//!   streams (`#~`, `#Strings`, `#US`, `#Blob`) and table rows.
//! - **Logical** - [`typesystem`] defines the immutable descriptors the
//!   execution engine consumes, and [`CilImage`] builds the complete
//!   descriptor graph for one assembly, including eagerly decoded method
//!   bodies with operand-resolved instructions.
//!
//! Once a [`CilImage`] is built it owns everything it needs; no borrow of
//! the underlying file survives construction.

pub mod signatures;
pub mod streams;
pub mod tables;
pub mod token;
pub mod typesystem;

mod image;

pub use image::CilImage;
pub use token::Token;
