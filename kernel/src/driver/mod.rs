///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

use core::fmt::{Display, Formatter};

/// AHCI/SATA DMA driver
pub mod ahci;
/// Legacy parallel-ATA (IDE) PIO driver
pub mod ata;
/// SATA shim over the AHCI driver's single active port
pub mod sata;

pub type DriveResult<T> = Result<T, DriveError>;

/// Errors common to all storage drivers. None of these are retried by the
/// driver that produced them; callers may retry a whole request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveError {
    /// Operation attempted against a drive that was never probed present
    Absent,
    /// A bounded busy-wait ran out of iterations before the device responded
    Timeout,
    /// The device reported an error (ATA ERR bit / AHCI task-file error)
    Device,
}
impl Display for DriveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            DriveError::Absent => write!(f, "no drive present"),
            DriveError::Timeout => write!(f, "drive timed out"),
            DriveError::Device => write!(f, "drive reported an error"),
        }
    }
}

/// Poll `f` up to `iterations` times. `f` reports `Some(Ok(v))` when the
/// awaited condition holds, `Some(Err(e))` when the hardware reports a fault,
/// and `None` to keep waiting. Running out of iterations is a [`DriveError::Timeout`].
///
/// Every hardware wait in this subsystem goes through here, except the AHCI
/// command-engine stop sequence (see `ahci::hba`).
pub(crate) fn busy_poll<T>(iterations: u32, mut f: impl FnMut() -> Option<DriveResult<T>>) -> DriveResult<T> {
    for _ in 0..iterations {
        if let Some(result) = f() {
            return result;
        }
    }
    Err(DriveError::Timeout)
}
