//! Operator confirmation hook.
//!
//! The library never reads the terminal itself; front-ends supply an
//! implementation (an interactive prompt, or a fixed answer for `--yes`).

pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Answers every prompt with the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl FixedAnswer {
    pub const YES: FixedAnswer = FixedAnswer(true);
    pub const NO: FixedAnswer = FixedAnswer(false);
}

impl Confirm for FixedAnswer {
    fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}
