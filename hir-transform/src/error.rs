use thiserror::Error;

/// The two data-dependent failure kinds a tree can hit (spec.md §7). Invariant
/// violations (mismatched operand-sequence lengths, an empty sequence
/// reaching `combine`, a missing type width) are programmer errors, not data
/// errors, and are raised as `assert!`/`debug_assert!` panics instead of this
/// type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum ObfError {
    #[error("no valid parameter exists for this tree")]
    Infeasible,
    #[error("forward transform produced an empty sequence")]
    TransformFailure,
}

/// Receives diagnostics for trees that could not be transformed.
///
/// The engine never propagates these as a `Result` from `run` — per spec.md
/// §7, `run` always returns whether the block was modified, best-effort, and
/// skips the offending tree while continuing with the rest of the forest.
pub trait DiagnosticSink {
    fn report(&mut self, error: ObfError);
}

/// A [`DiagnosticSink`] that reports through the `log` facade, the way the
/// rest of the transform passes in this workspace surface pass-internal
/// events.
#[derive(Debug, Default)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&mut self, error: ObfError) {
        log::warn!(target: "obf-engine", "{error}");
    }
}
