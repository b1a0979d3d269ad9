use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic error type covering everything that can go wrong while
/// loading an assembly: file access, PE structure, metadata decoding and
/// IL disassembly.
///
/// Runtime failures raised while *executing* loaded code are a different
/// tier and live in [`crate::engine::RuntimeError`]; they carry CLR error
/// kinds rather than parse diagnostics.
///
/// # Examples
///
/// ```rust,no_run
/// use dotrun::{Error, metadata::CilImage};
///
/// match CilImage::from_file(std::path::Path::new("program.exe")) {
///     Ok(image) => println!("loaded {}", image.name()),
///     Err(Error::NotSupported) => eprintln!("not a .NET executable"),
///     Err(Error::Malformed { message, .. }) => eprintln!("malformed: {message}"),
///     Err(e) => eprintln!("error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The file is damaged and could not be parsed.
    ///
    /// Includes the source location where the malformation was detected,
    /// which is the only practical way to debug a rejected assembly.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of what was malformed
        message: String,
        /// Source file in which the error was detected
        file: &'static str,
        /// Source line in which the error was detected
        line: u32,
    },

    /// An out of bound access was attempted while parsing the file.
    #[error("Out of bound read would have occurred!")]
    OutOfBounds,

    /// This file type is not supported.
    ///
    /// The input is not a PE file with a CLI header, or uses a metadata
    /// feature this interpreter does not implement.
    #[error("This file type is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// A referenced assembly could not be located on the search path.
    #[error("Assembly '{0}' was not found on the search path")]
    AssemblyNotFound(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
