#![forbid(unsafe_code)]

use miette::Diagnostic;
use thiserror::Error;
use veil_ir::Span;

/// Fatal contract violations: malformed or ill-typed input that should have
/// been rejected earlier in the pipeline. There is no recoverable channel
/// and no partial output on failure.
#[derive(Debug, Error, Diagnostic)]
pub enum DsaError {
    #[error("array store through an unsupported base expression")]
    #[diagnostic(code(veil::dsa::store_target))]
    StoreTarget {
        #[label("not a variable or a nested array access")]
        span: Span,
    },

    #[error("expected an array type, found {found}")]
    #[diagnostic(code(veil::dsa::not_an_array))]
    NotAnArray {
        found: String,
        #[label("indexed here")]
        span: Span,
    },
}
