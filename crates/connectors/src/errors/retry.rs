/// Whether a failed call is worth repeating against the same provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Retry with exponential backoff until the attempt budget is spent.
    WithBackoff,
    /// Terminal for this provider; retrying won't help.
    Never,
}

/// What a fallback chain does once retries for a provider are exhausted.
///
/// | Class | Try next provider? | Sync outcome |
/// |-------|-------------------|--------------|
/// | `NextProvider` | Yes | continues with the fallback |
/// | `SkipCycle` | No | account skipped this cycle, no error surfaced |
/// | `Fail` | No | sync fails |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FallbackClass {
    /// Provider unavailable (missing credentials, 5xx, malformed payload).
    NextProvider,
    /// Soft overload. Escalating would hammer the other providers too.
    SkipCycle,
    /// Hard error that no other provider can fix.
    Fail,
}
