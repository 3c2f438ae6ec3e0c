//! Bounded busy-wait on status flags

use crate::regs::{Flag, Registers, Status};

/// Number of status reads a single wait may spend
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PollBudget(u32);

impl PollBudget {
    /// Enough for a 100 kHz byte at a 180 MHz core with margin. Slower buses
    /// need a larger budget; see [`PollBudget::for_scl`].
    pub const DEFAULT: Self = Self(10_000);

    /// [`PollBudget::DEFAULT`] scaled by how much longer a byte takes than at
    /// 100 kHz. Never less than the default.
    pub const fn for_scl(scl_hz: u32) -> Self {
        if scl_hz == 0 {
            return Self(u32::MAX);
        }
        let scaled = Self::DEFAULT.0 * 100_000 / scl_hz;
        if scaled < Self::DEFAULT.0 {
            Self::DEFAULT
        } else {
            Self(scaled)
        }
    }

    /// A budget of zero still checks once.
    pub const fn iterations(count: u32) -> Self {
        Self(count)
    }

    pub const fn get(self) -> u32 {
        if self.0 == 0 { 1 } else { self.0 }
    }
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitError {
    /// The budget ran out before the flag was set
    Expired,
    /// The slave did not acknowledge; AF has been cleared
    Nacked,
}

/// Call `check` until it yields a value or `budget` calls have been made.
pub fn poll<T>(budget: PollBudget, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    (0..budget.get()).find_map(|_| check())
}

/// Wait for `flag` in SR1, giving up early on an acknowledge failure.
pub fn wait_for<R: Registers>(
    regs: &mut R,
    budget: PollBudget,
    flag: Flag,
) -> Result<Status, WaitError> {
    let outcome = poll(budget, || {
        let status = regs.read_status1();
        if status.is_set(Flag::AcknowledgeFailure) {
            Some(Err(WaitError::Nacked))
        } else if status.is_set(flag) {
            Some(Ok(status))
        } else {
            None
        }
    })
    .unwrap_or(Err(WaitError::Expired));

    if outcome == Err(WaitError::Nacked) {
        regs.clear_acknowledge_failure();
    }
    outcome
}
