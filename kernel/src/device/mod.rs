///////////////////////////////////////////////////////////////////////////////L
// The MIT License (MIT)
// Copyright (c) 2021 [untitled os] Team
// See LICENSE.txt and CREDITS.txt for details
///////////////////////////////////////////////////////////////////////////////L

/// Block devices (logical 512-byte sector I/O over whichever drive probed)
pub mod block;
/// Serial devices (for printing output to a physical terminal)
pub mod serial;
