//! Verify command. Read-only, so it takes no lock and needs no privilege.

use crate::host::LifecycleContext;
use crate::verify::{VerificationReport, verify};

pub struct VerifyCommand<'a> {
    ctx: LifecycleContext<'a>,
}

impl<'a> VerifyCommand<'a> {
    pub fn new(ctx: LifecycleContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn execute(&self) -> VerificationReport {
        verify(&self.ctx)
    }
}
